//! Shared test stub for the native runtime seam.

use crate::native::NativeRuntime;
use conduit_plugin_abi::NativeCallback;
use std::collections::HashSet;
use std::ffi::CString;
use std::os::raw::c_void;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Scripted [`NativeRuntime`] that records every call and lets tests drive
/// callback deliveries by hand.
#[derive(Default)]
pub struct StubRuntime {
    pub registered: Mutex<Vec<(NativeCallback, usize)>>,
    pub issued_calls: Mutex<Vec<(String, String, String)>>,
    pub processed_paths: Mutex<Vec<String>>,
    pub loaded: Mutex<Vec<String>>,
    pub unloaded: Mutex<Vec<String>>,
    pub known: Mutex<Vec<String>>,
    pub reject_process: Mutex<HashSet<String>>,
    pub reject_load: Mutex<HashSet<String>>,
    pub process_events_calls: AtomicUsize,
    pub cleanup_calls: AtomicUsize,
}

impl StubRuntime {
    /// Invoke the `index`-th registered callback as the native side would.
    pub fn deliver(&self, index: usize, success: bool, message: &str) {
        let (callback, userdata) = self.registered.lock().unwrap()[index];
        let message = CString::new(message).unwrap();
        unsafe {
            callback(
                if success { 1 } else { 0 },
                message.as_ptr(),
                userdata as *mut c_void,
            )
        }
    }

    pub fn process_events_count(&self) -> usize {
        self.process_events_calls.load(Ordering::SeqCst)
    }
}

/// Plugin name a binary path resolves to: `<name>_plugin<ext>`.
fn plugin_name_from_path(path: &str) -> String {
    std::path::Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| s.strip_suffix("_plugin"))
        .unwrap_or(path)
        .to_string()
}

impl NativeRuntime for StubRuntime {
    fn initialize(&self, _flags: u32) {}

    fn set_plugins_dir(&self, _path: &str) {}

    fn start(&self) {}

    fn exec(&self) -> i32 {
        0
    }

    fn cleanup(&self) {
        self.cleanup_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn loaded_plugins(&self) -> Vec<String> {
        self.loaded.lock().unwrap().clone()
    }

    fn known_plugins(&self) -> Vec<String> {
        self.known.lock().unwrap().clone()
    }

    fn load_plugin(&self, name: &str) -> i32 {
        if self.reject_load.lock().unwrap().contains(name) {
            return 0;
        }
        self.loaded.lock().unwrap().push(name.to_string());
        1
    }

    fn unload_plugin(&self, name: &str) -> i32 {
        self.loaded.lock().unwrap().retain(|n| n != name);
        self.unloaded.lock().unwrap().push(name.to_string());
        1
    }

    fn process_plugin(&self, path: &str) -> String {
        self.processed_paths.lock().unwrap().push(path.to_string());
        let name = plugin_name_from_path(path);
        if self.reject_process.lock().unwrap().contains(&name) {
            String::new()
        } else {
            "processed".to_string()
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
        self.issued_calls.lock().unwrap().push((
            target.to_string(),
            verb.to_string(),
            payload.to_string(),
        ));
        self.registered
            .lock()
            .unwrap()
            .push((callback, userdata as usize));
    }

    fn register_event_listener(
        &self,
        target: &str,
        event: &str,
        callback: NativeCallback,
        userdata: *mut c_void,
    ) {
        self.issued_calls.lock().unwrap().push((
            target.to_string(),
            event.to_string(),
            String::new(),
        ));
        self.registered
            .lock()
            .unwrap()
            .push((callback, userdata as usize));
    }

    fn process_events(&self) {
        self.process_events_calls.fetch_add(1, Ordering::SeqCst);
    }
}
