//! conduit-plugin-abi: C ABI surface of the native plugin runtime
//!
//! This crate pins down the contract between the conduit bridge and the
//! plugin runtime shared library: one function-pointer alias per native
//! entry point, the callback signature used for async deliveries, the
//! exported symbol names, and the platform naming conventions for the
//! runtime library and plugin binaries.

use std::os::raw::{c_char, c_int, c_uint, c_void};

/// Result code the native side uses to signal success.
pub const ABI_RESULT_OK: c_int = 1;

/// Callback invoked by the runtime for async call results and event
/// deliveries.
///
/// `result` is [`ABI_RESULT_OK`] on success, `message` is a null-terminated
/// UTF-8 payload (may be null), `userdata` is the opaque pointer passed at
/// registration time.
pub type NativeCallback =
    unsafe extern "C" fn(result: c_int, message: *const c_char, userdata: *mut c_void);

/// `pr_initialize(flags, reserved)` - one-time runtime initialization.
pub type InitializeFn = unsafe extern "C" fn(flags: c_uint, reserved: *mut c_void);

/// `pr_set_plugins_dir(path)` - fixes the directory plugin binaries are
/// resolved against.
pub type SetPluginsDirFn = unsafe extern "C" fn(path: *const c_char);

/// `pr_start()` - starts the runtime after initialization.
pub type StartFn = unsafe extern "C" fn();

/// `pr_exec()` - blocking event loop; the native side owns the thread until
/// it returns.
pub type ExecFn = unsafe extern "C" fn() -> c_int;

/// `pr_cleanup()` - tears the runtime down. No entry point may be called
/// afterwards.
pub type CleanupFn = unsafe extern "C" fn();

/// `pr_get_loaded_plugins()` / `pr_get_known_plugins()` - nullable pointer
/// to a null-terminated array of null-terminated strings. The array is
/// owned by the runtime and must not be freed by the caller.
pub type GetPluginsFn = unsafe extern "C" fn() -> *const *const c_char;

/// `pr_load_plugin(name)` - returns [`ABI_RESULT_OK`] on success.
pub type LoadPluginFn = unsafe extern "C" fn(name: *const c_char) -> c_int;

/// `pr_unload_plugin(name)` - returns [`ABI_RESULT_OK`] on success.
pub type UnloadPluginFn = unsafe extern "C" fn(name: *const c_char) -> c_int;

/// `pr_process_plugin(path)` - registers a plugin binary with the runtime.
/// Returns a runtime-owned result string; null or empty means rejection.
pub type ProcessPluginFn = unsafe extern "C" fn(path: *const c_char) -> *const c_char;

/// `pr_call_async(target, verb, payload, callback, userdata)` - fire and
/// forget method invocation; the result arrives through `callback` on a
/// later `pr_process_events` drain.
pub type AsyncCallFn = unsafe extern "C" fn(
    target: *const c_char,
    verb: *const c_char,
    payload: *const c_char,
    callback: NativeCallback,
    userdata: *mut c_void,
);

/// `pr_register_event_listener(target, event, callback, userdata)` -
/// multi-fire registration; `callback` may be invoked any number of times.
pub type RegisterEventListenerFn = unsafe extern "C" fn(
    target: *const c_char,
    event: *const c_char,
    callback: NativeCallback,
    userdata: *mut c_void,
);

/// `pr_process_events()` - drains the runtime's internal event queue,
/// delivering any queued callbacks on the calling thread.
pub type ProcessEventsFn = unsafe extern "C" fn();

/// Exported symbol names, null-terminated for direct use with symbol lookup.
pub mod symbols {
    pub const INITIALIZE: &[u8] = b"pr_initialize\0";
    pub const SET_PLUGINS_DIR: &[u8] = b"pr_set_plugins_dir\0";
    pub const START: &[u8] = b"pr_start\0";
    pub const EXEC: &[u8] = b"pr_exec\0";
    pub const CLEANUP: &[u8] = b"pr_cleanup\0";
    pub const GET_LOADED_PLUGINS: &[u8] = b"pr_get_loaded_plugins\0";
    pub const GET_KNOWN_PLUGINS: &[u8] = b"pr_get_known_plugins\0";
    pub const LOAD_PLUGIN: &[u8] = b"pr_load_plugin\0";
    pub const UNLOAD_PLUGIN: &[u8] = b"pr_unload_plugin\0";
    pub const PROCESS_PLUGIN: &[u8] = b"pr_process_plugin\0";
    pub const CALL_ASYNC: &[u8] = b"pr_call_async\0";
    pub const REGISTER_EVENT_LISTENER: &[u8] = b"pr_register_event_listener\0";
    pub const PROCESS_EVENTS: &[u8] = b"pr_process_events\0";
}

/// Shared-library extension for a given OS name (`std::env::consts::OS`
/// values).
pub fn library_extension_for(os: &str) -> &'static str {
    match os {
        "macos" => ".dylib",
        "windows" => ".dll",
        _ => ".so",
    }
}

/// Shared-library extension for the current platform.
pub fn library_extension() -> &'static str {
    library_extension_for(std::env::consts::OS)
}

/// File name of the runtime shared library for a given OS name.
pub fn runtime_library_filename_for(os: &str) -> String {
    match os {
        "windows" => format!("plugin_runtime{}", library_extension_for(os)),
        _ => format!("libplugin_runtime{}", library_extension_for(os)),
    }
}

/// File name of the runtime shared library for the current platform.
pub fn runtime_library_filename() -> String {
    runtime_library_filename_for(std::env::consts::OS)
}

/// File name a plugin binary is expected under: `<name>_plugin<ext>`.
pub fn plugin_filename(name: &str) -> String {
    format!("{}_plugin{}", name, library_extension())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_mapping_is_exhaustive() {
        assert_eq!(library_extension_for("macos"), ".dylib");
        assert_eq!(library_extension_for("windows"), ".dll");
        assert_eq!(library_extension_for("linux"), ".so");
        assert_eq!(library_extension_for("freebsd"), ".so");
    }

    #[test]
    fn runtime_library_filename_per_platform() {
        assert_eq!(runtime_library_filename_for("linux"), "libplugin_runtime.so");
        assert_eq!(
            runtime_library_filename_for("macos"),
            "libplugin_runtime.dylib"
        );
        assert_eq!(runtime_library_filename_for("windows"), "plugin_runtime.dll");
    }

    #[test]
    fn plugin_filename_uses_suffix_convention() {
        let name = plugin_filename("telemetry");
        assert!(name.starts_with("telemetry_plugin."));
        assert!(name.ends_with(library_extension()));
    }

    #[test]
    fn symbols_are_null_terminated() {
        for sym in [
            symbols::INITIALIZE,
            symbols::SET_PLUGINS_DIR,
            symbols::START,
            symbols::EXEC,
            symbols::CLEANUP,
            symbols::GET_LOADED_PLUGINS,
            symbols::GET_KNOWN_PLUGINS,
            symbols::LOAD_PLUGIN,
            symbols::UNLOAD_PLUGIN,
            symbols::PROCESS_PLUGIN,
            symbols::CALL_ASYNC,
            symbols::REGISTER_EVENT_LISTENER,
            symbols::PROCESS_EVENTS,
        ] {
            assert_eq!(sym.last(), Some(&0));
        }
    }
}
