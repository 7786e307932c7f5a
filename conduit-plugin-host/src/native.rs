//! Native runtime binding
//!
//! The [`NativeRuntime`] trait is the single choke point for ABI calls:
//! everything the bridge does against the runtime goes through it, which
//! also makes it the seam tests substitute a scripted runtime at. The
//! production implementation, [`LibNativeRuntime`], loads the runtime
//! shared library once and resolves every required symbol up front.

use crate::error::{BridgeError, Result};
use conduit_plugin_abi::{
    symbols, AsyncCallFn, CleanupFn, ExecFn, GetPluginsFn, InitializeFn, LoadPluginFn,
    NativeCallback, ProcessEventsFn, ProcessPluginFn, RegisterEventListenerFn, SetPluginsDirFn,
    StartFn, UnloadPluginFn,
};
use libloading::Library;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_void};
use std::path::{Path, PathBuf};

/// Typed access to every native runtime entry point.
///
/// String-array results are already translated: a null base pointer becomes
/// an empty vector, otherwise entries are collected until the null
/// terminator sentinel.
pub trait NativeRuntime: Send + Sync {
    fn initialize(&self, flags: u32);
    fn set_plugins_dir(&self, path: &str);
    fn start(&self);
    /// Blocking event loop; the native side owns the thread until it returns.
    fn exec(&self) -> i32;
    fn cleanup(&self);
    fn loaded_plugins(&self) -> Vec<String>;
    fn known_plugins(&self) -> Vec<String>;
    fn load_plugin(&self, name: &str) -> i32;
    fn unload_plugin(&self, name: &str) -> i32;
    /// Returns the runtime's result string; null maps to an empty string.
    fn process_plugin(&self, path: &str) -> String;
    fn call_async(
        &self,
        target: &str,
        verb: &str,
        payload: &str,
        callback: NativeCallback,
        userdata: *mut c_void,
    );
    fn register_event_listener(
        &self,
        target: &str,
        event: &str,
        callback: NativeCallback,
        userdata: *mut c_void,
    );
    fn process_events(&self);
}

/// Production [`NativeRuntime`] backed by the runtime shared library.
pub struct LibNativeRuntime {
    // Kept alive for the lifetime of the resolved fn pointers.
    _library: Library,
    path: PathBuf,
    initialize: InitializeFn,
    set_plugins_dir: SetPluginsDirFn,
    start: StartFn,
    exec: ExecFn,
    cleanup: CleanupFn,
    get_loaded_plugins: GetPluginsFn,
    get_known_plugins: GetPluginsFn,
    load_plugin: LoadPluginFn,
    unload_plugin: UnloadPluginFn,
    process_plugin: ProcessPluginFn,
    call_async: AsyncCallFn,
    register_event_listener: RegisterEventListenerFn,
    process_events: ProcessEventsFn,
}

impl LibNativeRuntime {
    /// Load the runtime library and resolve all required symbols.
    ///
    /// # Safety
    ///
    /// Loading a shared library executes its initializers. Only point this
    /// at a trusted runtime build.
    pub fn load(path: &Path) -> Result<Self> {
        let library = unsafe { Library::new(path) }
            .map_err(|e| BridgeError::library_load(path, e.to_string()))?;

        let runtime = Self {
            initialize: symbol(&library, symbols::INITIALIZE)?,
            set_plugins_dir: symbol(&library, symbols::SET_PLUGINS_DIR)?,
            start: symbol(&library, symbols::START)?,
            exec: symbol(&library, symbols::EXEC)?,
            cleanup: symbol(&library, symbols::CLEANUP)?,
            get_loaded_plugins: symbol(&library, symbols::GET_LOADED_PLUGINS)?,
            get_known_plugins: symbol(&library, symbols::GET_KNOWN_PLUGINS)?,
            load_plugin: symbol(&library, symbols::LOAD_PLUGIN)?,
            unload_plugin: symbol(&library, symbols::UNLOAD_PLUGIN)?,
            process_plugin: symbol(&library, symbols::PROCESS_PLUGIN)?,
            call_async: symbol(&library, symbols::CALL_ASYNC)?,
            register_event_listener: symbol(&library, symbols::REGISTER_EVENT_LISTENER)?,
            process_events: symbol(&library, symbols::PROCESS_EVENTS)?,
            path: path.to_path_buf(),
            _library: library,
        };

        tracing::info!(path = %runtime.path.display(), "Loaded plugin runtime library");
        Ok(runtime)
    }

    /// Path the library was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl NativeRuntime for LibNativeRuntime {
    fn initialize(&self, flags: u32) {
        unsafe { (self.initialize)(flags, std::ptr::null_mut()) }
    }

    fn set_plugins_dir(&self, path: &str) {
        let path = to_cstring(path);
        unsafe { (self.set_plugins_dir)(path.as_ptr()) }
    }

    fn start(&self) {
        unsafe { (self.start)() }
    }

    fn exec(&self) -> i32 {
        unsafe { (self.exec)() }
    }

    fn cleanup(&self) {
        unsafe { (self.cleanup)() }
    }

    fn loaded_plugins(&self) -> Vec<String> {
        unsafe { string_array((self.get_loaded_plugins)()) }
    }

    fn known_plugins(&self) -> Vec<String> {
        unsafe { string_array((self.get_known_plugins)()) }
    }

    fn load_plugin(&self, name: &str) -> i32 {
        let name = to_cstring(name);
        unsafe { (self.load_plugin)(name.as_ptr()) }
    }

    fn unload_plugin(&self, name: &str) -> i32 {
        let name = to_cstring(name);
        unsafe { (self.unload_plugin)(name.as_ptr()) }
    }

    fn process_plugin(&self, path: &str) -> String {
        let path = to_cstring(path);
        let result = unsafe { (self.process_plugin)(path.as_ptr()) };
        if result.is_null() {
            String::new()
        } else {
            unsafe { CStr::from_ptr(result) }
                .to_string_lossy()
                .into_owned()
        }
    }

    fn call_async(
        &self,
        target: &str,
        verb: &str,
        payload: &str,
        callback: NativeCallback,
        userdata: *mut c_void,
    ) {
        let target = to_cstring(target);
        let verb = to_cstring(verb);
        let payload = to_cstring(payload);
        unsafe {
            (self.call_async)(
                target.as_ptr(),
                verb.as_ptr(),
                payload.as_ptr(),
                callback,
                userdata,
            )
        }
    }

    fn register_event_listener(
        &self,
        target: &str,
        event: &str,
        callback: NativeCallback,
        userdata: *mut c_void,
    ) {
        let target = to_cstring(target);
        let event = to_cstring(event);
        unsafe {
            (self.register_event_listener)(target.as_ptr(), event.as_ptr(), callback, userdata)
        }
    }

    fn process_events(&self) {
        unsafe { (self.process_events)() }
    }
}

fn symbol<T: Copy>(library: &Library, name: &'static [u8]) -> Result<T> {
    let sym = unsafe { library.get::<T>(name) }.map_err(|_| BridgeError::SymbolNotFound {
        symbol: String::from_utf8_lossy(&name[..name.len() - 1]).into_owned(),
    })?;
    Ok(*sym)
}

/// Build a C string, stripping interior NULs rather than failing; the
/// native side has no representation for them anyway.
fn to_cstring(s: &str) -> CString {
    match CString::new(s) {
        Ok(c) => c,
        Err(_) => {
            tracing::warn!("string argument contained interior NUL, stripping");
            CString::new(s.replace('\0', "")).unwrap_or_default()
        }
    }
}

/// Translate a nullable, null-terminated array of C strings.
pub(crate) unsafe fn string_array(base: *const *const c_char) -> Vec<String> {
    let mut out = Vec::new();
    if base.is_null() {
        return out;
    }
    let mut cursor = base;
    while !(*cursor).is_null() {
        out.push(CStr::from_ptr(*cursor).to_string_lossy().into_owned());
        cursor = cursor.add(1);
    }
    out
}
