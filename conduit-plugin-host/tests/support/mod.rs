//! Scripted native runtime for integration tests.
//!
//! Queued replies and events sit in an internal queue and are only
//! released by `process_events`, mirroring how the real runtime delivers
//! callbacks exclusively on pump drains.
#![allow(dead_code)]

use conduit_plugin_abi::NativeCallback;
use conduit_plugin_host::NativeRuntime;
use std::collections::{HashSet, VecDeque};
use std::ffi::CString;
use std::os::raw::c_void;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub struct Registration {
    pub target: String,
    pub verb: String,
    pub payload: String,
    callback: NativeCallback,
    userdata: usize,
}

struct Delivery {
    callback: NativeCallback,
    userdata: usize,
    success: bool,
    message: String,
}

#[derive(Default)]
struct Inner {
    calls: Vec<Registration>,
    listeners: Vec<Registration>,
    queue: VecDeque<Delivery>,
    known: Vec<String>,
    loaded: Vec<String>,
    reject_process: HashSet<String>,
    reject_load: HashSet<String>,
    plugins_dir: Option<String>,
    initialized: bool,
    started: bool,
    cleaned: bool,
}

#[derive(Default)]
pub struct MockRuntime {
    inner: Mutex<Inner>,
    pub process_events_calls: AtomicUsize,
    pub cleanup_calls: AtomicUsize,
}

impl MockRuntime {
    pub fn reject_process(&self, name: &str) {
        self.inner
            .lock()
            .unwrap()
            .reject_process
            .insert(name.to_string());
    }

    pub fn reject_load(&self, name: &str) {
        self.inner
            .lock()
            .unwrap()
            .reject_load
            .insert(name.to_string());
    }

    pub fn set_known(&self, names: &[&str]) {
        self.inner.lock().unwrap().known = names.iter().map(|s| s.to_string()).collect();
    }

    /// Queue a reply for the `index`-th issued async call.
    pub fn queue_call_reply(&self, index: usize, success: bool, message: &str) {
        let mut inner = self.inner.lock().unwrap();
        let reg = &inner.calls[index];
        let delivery = Delivery {
            callback: reg.callback,
            userdata: reg.userdata,
            success,
            message: message.to_string(),
        };
        inner.queue.push_back(delivery);
    }

    /// Queue an event for the `index`-th registered listener.
    pub fn queue_event(&self, index: usize, success: bool, message: &str) {
        let mut inner = self.inner.lock().unwrap();
        let reg = &inner.listeners[index];
        let delivery = Delivery {
            callback: reg.callback,
            userdata: reg.userdata,
            success,
            message: message.to_string(),
        };
        inner.queue.push_back(delivery);
    }

    pub fn calls_len(&self) -> usize {
        self.inner.lock().unwrap().calls.len()
    }

    pub fn listeners_len(&self) -> usize {
        self.inner.lock().unwrap().listeners.len()
    }

    pub fn call_details(&self, index: usize) -> (String, String, String) {
        let inner = self.inner.lock().unwrap();
        let reg = &inner.calls[index];
        (reg.target.clone(), reg.verb.clone(), reg.payload.clone())
    }

    pub fn plugins_dir(&self) -> Option<String> {
        self.inner.lock().unwrap().plugins_dir.clone()
    }

    pub fn is_started(&self) -> bool {
        self.inner.lock().unwrap().started
    }

    fn plugin_name_from_path(path: &str) -> String {
        std::path::Path::new(path)
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.strip_suffix("_plugin"))
            .unwrap_or(path)
            .to_string()
    }
}

impl NativeRuntime for MockRuntime {
    fn initialize(&self, _flags: u32) {
        let mut inner = self.inner.lock().unwrap();
        assert!(!inner.cleaned, "initialize after cleanup");
        inner.initialized = true;
    }

    fn set_plugins_dir(&self, path: &str) {
        self.inner.lock().unwrap().plugins_dir = Some(path.to_string());
    }

    fn start(&self) {
        let mut inner = self.inner.lock().unwrap();
        assert!(inner.initialized, "start before initialize");
        inner.started = true;
    }

    fn exec(&self) -> i32 {
        0
    }

    fn cleanup(&self) {
        // The native side discards its queue and registrations on cleanup;
        // nothing can be delivered afterwards.
        let mut inner = self.inner.lock().unwrap();
        inner.cleaned = true;
        inner.queue.clear();
        inner.calls.clear();
        inner.listeners.clear();
        self.cleanup_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn loaded_plugins(&self) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        assert!(!inner.cleaned, "query after cleanup");
        inner.loaded.clone()
    }

    fn known_plugins(&self) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        assert!(!inner.cleaned, "query after cleanup");
        inner.known.clone()
    }

    fn load_plugin(&self, name: &str) -> i32 {
        let mut inner = self.inner.lock().unwrap();
        assert!(!inner.cleaned, "load after cleanup");
        if inner.reject_load.contains(name) {
            return 0;
        }
        inner.loaded.push(name.to_string());
        1
    }

    fn unload_plugin(&self, name: &str) -> i32 {
        let mut inner = self.inner.lock().unwrap();
        inner.loaded.retain(|n| n != name);
        1
    }

    fn process_plugin(&self, path: &str) -> String {
        let mut inner = self.inner.lock().unwrap();
        assert!(!inner.cleaned, "process after cleanup");
        let name = Self::plugin_name_from_path(path);
        if inner.reject_process.contains(&name) {
            return String::new();
        }
        if !inner.known.contains(&name) {
            inner.known.push(name);
        }
        "processed".to_string()
    }

    fn call_async(
        &self,
        target: &str,
        verb: &str,
        payload: &str,
        callback: NativeCallback,
        userdata: *mut c_void,
    ) {
        let mut inner = self.inner.lock().unwrap();
        assert!(!inner.cleaned, "async call after cleanup");
        inner.calls.push(Registration {
            target: target.to_string(),
            verb: verb.to_string(),
            payload: payload.to_string(),
            callback,
            userdata: userdata as usize,
        });
    }

    fn register_event_listener(
        &self,
        target: &str,
        event: &str,
        callback: NativeCallback,
        userdata: *mut c_void,
    ) {
        let mut inner = self.inner.lock().unwrap();
        assert!(!inner.cleaned, "listener registration after cleanup");
        inner.listeners.push(Registration {
            target: target.to_string(),
            verb: event.to_string(),
            payload: String::new(),
            callback,
            userdata: userdata as usize,
        });
    }

    fn process_events(&self) {
        self.process_events_calls.fetch_add(1, Ordering::SeqCst);
        let deliveries: Vec<Delivery> = {
            let mut inner = self.inner.lock().unwrap();
            inner.queue.drain(..).collect()
        };
        for delivery in deliveries {
            let message = CString::new(delivery.message).unwrap();
            unsafe {
                (delivery.callback)(
                    if delivery.success { 1 } else { 0 },
                    message.as_ptr(),
                    delivery.userdata as *mut c_void,
                )
            }
        }
    }
}
