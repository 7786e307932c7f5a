//! Public bridge surface
//!
//! [`PluginBridge`] ties the pieces together: it resolves and loads the
//! runtime library once, tracks the init/start/cleanup state machine, and
//! exposes lifecycle operations, the explicit async call surface, and
//! cached per-plugin dispatch handles.

use crate::config::{self, BridgeConfig};
use crate::correlator::{CallId, CallReply, CallbackCorrelator};
use crate::dispatch::PluginHandle;
use crate::error::{BridgeError, Result};
use crate::lifecycle::{PluginBatchResult, PluginLifecycle, PluginState};
use crate::native::{LibNativeRuntime, NativeRuntime};
use crate::pump::{EventPump, DEFAULT_PUMP_INTERVAL};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BridgeState {
    Created,
    Initialized,
    Started,
    Closed,
}

/// Bridge from the host process to the native plugin runtime.
///
/// One instance owns one loaded runtime library. All state lives on the
/// instance; there are no process-wide singletons, so independent bridges
/// do not interfere.
pub struct PluginBridge {
    runtime: Arc<dyn NativeRuntime>,
    correlator: CallbackCorrelator,
    lifecycle: PluginLifecycle,
    pump: EventPump,
    handles: Mutex<HashMap<String, Arc<PluginHandle>>>,
    state: Mutex<BridgeState>,
}

impl std::fmt::Debug for PluginBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginBridge")
            .field("state", &*self.lock_state())
            .finish_non_exhaustive()
    }
}

impl PluginBridge {
    /// Resolve paths from `config`, load the runtime library, and (unless
    /// `auto_init` is off) initialize the runtime.
    pub fn new(config: BridgeConfig) -> Result<Self> {
        let library_path = config::resolve_library_path(&config)?;
        let plugins_dir = config::resolve_plugins_dir(&config)?;
        let runtime: Arc<dyn NativeRuntime> =
            Arc::new(LibNativeRuntime::load(&library_path)?);
        Self::from_parts(runtime, config, plugins_dir)
    }

    /// Construct over an injected [`NativeRuntime`] implementation.
    ///
    /// An explicit `plugins_dir` in the config is taken as-is (no existence
    /// check; the runtime is the caller's); otherwise the usual resolution
    /// order applies.
    pub fn with_runtime(runtime: Arc<dyn NativeRuntime>, config: BridgeConfig) -> Result<Self> {
        let plugins_dir = match &config.plugins_dir {
            Some(dir) => dir.clone(),
            None => config::resolve_plugins_dir(&config)?,
        };
        Self::from_parts(runtime, config, plugins_dir)
    }

    fn from_parts(
        runtime: Arc<dyn NativeRuntime>,
        config: BridgeConfig,
        plugins_dir: std::path::PathBuf,
    ) -> Result<Self> {
        let bridge = Self {
            correlator: CallbackCorrelator::new(),
            lifecycle: PluginLifecycle::new(Arc::clone(&runtime), plugins_dir),
            pump: EventPump::new(Arc::clone(&runtime)),
            handles: Mutex::new(HashMap::new()),
            state: Mutex::new(BridgeState::Created),
            runtime,
        };
        if config.auto_init {
            bridge.init()?;
        }
        Ok(bridge)
    }

    /// Initialize the runtime and fix the plugins directory.
    ///
    /// Fails with a lifecycle error when already initialized or after
    /// `cleanup()`.
    pub fn init(&self) -> Result<()> {
        let mut state = self.lock_state();
        match *state {
            BridgeState::Created => {}
            BridgeState::Initialized | BridgeState::Started => {
                return Err(BridgeError::lifecycle("bridge is already initialized"));
            }
            BridgeState::Closed => {
                return Err(BridgeError::lifecycle("bridge was cleaned up"));
            }
        }

        self.runtime.initialize(0);
        self.runtime
            .set_plugins_dir(&self.lifecycle.plugins_dir().to_string_lossy());
        *state = BridgeState::Initialized;
        tracing::info!(plugins_dir = %self.lifecycle.plugins_dir().display(), "Bridge initialized");
        Ok(())
    }

    /// Start the runtime. Requires `init()`; rejects a double start.
    pub fn start(&self) -> Result<()> {
        let mut state = self.lock_state();
        match *state {
            BridgeState::Initialized => {}
            BridgeState::Created => {
                return Err(BridgeError::lifecycle("bridge is not initialized"));
            }
            BridgeState::Started => {
                return Err(BridgeError::lifecycle("bridge is already started"));
            }
            BridgeState::Closed => {
                return Err(BridgeError::lifecycle("bridge was cleaned up"));
            }
        }

        self.runtime.start();
        *state = BridgeState::Started;
        Ok(())
    }

    /// Plugins currently loaded, re-read from the native side.
    pub fn loaded_plugins(&self) -> Result<Vec<String>> {
        self.ensure_ready()?;
        Ok(self.lifecycle.loaded_plugins())
    }

    /// Plugins the runtime knows about, re-read from the native side.
    pub fn known_plugins(&self) -> Result<Vec<String>> {
        self.ensure_ready()?;
        Ok(self.lifecycle.known_plugins())
    }

    /// Per-plugin lifecycle state.
    pub fn plugin_status(&self) -> Result<BTreeMap<String, PluginState>> {
        self.ensure_ready()?;
        Ok(self.lifecycle.plugin_status())
    }

    /// Register a plugin binary with the runtime. False on rejection.
    pub fn process_plugin(&self, name: &str) -> Result<bool> {
        self.ensure_ready()?;
        Ok(self.lifecycle.process(name))
    }

    /// Load a processed plugin. False on rejection.
    pub fn load_plugin(&self, name: &str) -> Result<bool> {
        self.ensure_ready()?;
        Ok(self.lifecycle.load(name))
    }

    /// Unload a loaded plugin. False on rejection.
    pub fn unload_plugin(&self, name: &str) -> Result<bool> {
        self.ensure_ready()?;
        Ok(self.lifecycle.unload(name))
    }

    /// Process then load one plugin, stopping at the first rejected step.
    pub fn process_and_load_plugin(&self, name: &str) -> Result<()> {
        self.ensure_ready()?;
        self.lifecycle.process_and_load(name)
    }

    /// Two-phase batch bring-up; the result map is complete per name.
    pub fn process_and_load_plugins(
        &self,
        names: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<BTreeMap<String, PluginBatchResult>> {
        self.ensure_ready()?;
        Ok(self.lifecycle.process_and_load_many(names))
    }

    /// Issue an async method call with a pre-encoded JSON parameter string.
    /// `handler` fires at most once, on a later pump drain.
    pub fn call_plugin_method_async(
        &self,
        plugin: &str,
        method: &str,
        json_params: &str,
        handler: impl FnOnce(CallReply) + Send + 'static,
    ) -> Result<CallId> {
        self.ensure_ready()?;
        self.correlator.invoke_async(
            self.runtime.as_ref(),
            plugin,
            method,
            json_params,
            Box::new(handler),
        )
    }

    /// Register a multi-fire event listener. The subscription lives until
    /// `cleanup()`.
    pub fn register_event_listener(
        &self,
        plugin: &str,
        event: &str,
        handler: impl FnMut(CallReply) + Send + 'static,
    ) -> Result<CallId> {
        self.ensure_ready()?;
        self.correlator
            .subscribe(self.runtime.as_ref(), plugin, event, Box::new(handler))
    }

    /// Dispatch handle for `name`, cached so repeated lookups return the
    /// same instance.
    pub fn plugin(&self, name: &str) -> Result<Arc<PluginHandle>> {
        self.ensure_ready()?;
        let mut handles = self
            .handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let handle = handles.entry(name.to_string()).or_insert_with(|| {
            Arc::new(PluginHandle::new(
                name,
                Arc::clone(&self.runtime),
                self.correlator.clone(),
            ))
        });
        Ok(Arc::clone(handle))
    }

    /// Start the cooperative event pump with the given tick interval
    /// (see [`DEFAULT_PUMP_INTERVAL`]).
    pub fn start_event_processing(&self, interval: Duration) -> Result<()> {
        self.ensure_ready()?;
        self.pump.start(interval)
    }

    /// Convenience variant using [`DEFAULT_PUMP_INTERVAL`].
    pub fn start_default_event_processing(&self) -> Result<()> {
        self.start_event_processing(DEFAULT_PUMP_INTERVAL)
    }

    /// Stop the event pump; idempotent.
    pub async fn stop_event_processing(&self) {
        self.pump.stop().await;
    }

    /// Hand the thread to the native event loop until it returns. Drains
    /// the same queue as the pump; do not run both at once.
    pub fn exec(&self) -> Result<i32> {
        self.ensure_ready()?;
        Ok(self.runtime.exec())
    }

    /// Tear the bridge down: stop the pump, issue the native cleanup,
    /// discard all correlation state and cached handles. Idempotent; every
    /// later operation fails fast without touching the native handle.
    pub async fn cleanup(&self) {
        let previous = {
            let mut state = self.lock_state();
            let previous = *state;
            if previous == BridgeState::Closed {
                return;
            }
            // Mark closed first so operations racing with teardown fail
            // fast instead of reaching a half-torn-down runtime.
            *state = BridgeState::Closed;
            previous
        };

        self.pump.stop().await;
        if previous != BridgeState::Created {
            self.runtime.cleanup();
        }
        self.correlator.clear();
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        tracing::info!("Bridge cleaned up");
    }

    fn ensure_ready(&self) -> Result<()> {
        match *self.lock_state() {
            BridgeState::Initialized | BridgeState::Started => Ok(()),
            BridgeState::Created => Err(BridgeError::lifecycle("bridge is not initialized")),
            BridgeState::Closed => Err(BridgeError::lifecycle("bridge was cleaned up")),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, BridgeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
