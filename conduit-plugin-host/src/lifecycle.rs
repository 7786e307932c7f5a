//! Plugin lifecycle management
//!
//! Drives the externally-sequenced plugin state machine: a known plugin is
//! processed (its binary registered with the runtime), then loaded, and
//! eventually unloaded. Lifecycle state is owned by the native side; every
//! query re-reads it, nothing is cached here.

use crate::config;
use crate::error::{BridgeError, Result};
use crate::native::NativeRuntime;
use conduit_plugin_abi::ABI_RESULT_OK;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Lifecycle state of a plugin as observed from the native side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PluginState {
    Known,
    Loaded,
}

/// Per-plugin outcome of a batch bring-up
///
/// `loaded` is `None` when the load step was never attempted (the process
/// step already failed).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PluginBatchResult {
    pub processed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loaded: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Sequences plugin lifecycle transitions against the native runtime.
pub struct PluginLifecycle {
    runtime: Arc<dyn NativeRuntime>,
    plugins_dir: PathBuf,
}

impl PluginLifecycle {
    pub fn new(runtime: Arc<dyn NativeRuntime>, plugins_dir: PathBuf) -> Self {
        Self {
            runtime,
            plugins_dir,
        }
    }

    /// Directory plugin binaries are resolved against.
    pub fn plugins_dir(&self) -> &Path {
        &self.plugins_dir
    }

    /// Register the plugin's binary with the runtime.
    ///
    /// Returns false when the native side rejects the binary; the caller
    /// decides whether that is fatal.
    pub fn process(&self, name: &str) -> bool {
        let path = config::plugin_binary_path(&self.plugins_dir, name);
        let result = self.runtime.process_plugin(&path.to_string_lossy());
        let accepted = !result.is_empty();
        if accepted {
            tracing::debug!(plugin = name, "Processed plugin binary");
        } else {
            tracing::warn!(plugin = name, path = %path.display(), "Plugin processing rejected");
        }
        accepted
    }

    /// Load a processed plugin. Returns native success.
    pub fn load(&self, name: &str) -> bool {
        let ok = self.runtime.load_plugin(name) == ABI_RESULT_OK;
        if ok {
            tracing::info!(plugin = name, "Plugin loaded");
        }
        ok
    }

    /// Unload a loaded plugin. Returns native success.
    pub fn unload(&self, name: &str) -> bool {
        let ok = self.runtime.unload_plugin(name) == ABI_RESULT_OK;
        if ok {
            tracing::info!(plugin = name, "Plugin unloaded");
        }
        ok
    }

    /// Process then load, stopping at the first rejected step.
    pub fn process_and_load(&self, name: &str) -> Result<()> {
        if !self.process(name) {
            return Err(BridgeError::PluginLoad {
                name: name.to_string(),
                stage: "process",
            });
        }
        if !self.load(name) {
            return Err(BridgeError::PluginLoad {
                name: name.to_string(),
                stage: "load",
            });
        }
        Ok(())
    }

    /// Bring up a batch of plugins in two phases: process every binary
    /// first, then load only the ones that processed. One plugin's failure
    /// never aborts the batch; the result map is complete for every
    /// requested name.
    pub fn process_and_load_many(
        &self,
        names: impl IntoIterator<Item = impl Into<String>>,
    ) -> BTreeMap<String, PluginBatchResult> {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let mut results: BTreeMap<String, PluginBatchResult> = BTreeMap::new();

        for name in &names {
            let processed = self.process(name);
            results.insert(
                name.clone(),
                PluginBatchResult {
                    processed,
                    loaded: None,
                    error: (!processed)
                        .then(|| "process rejected by native runtime".to_string()),
                },
            );
        }

        for name in &names {
            let Some(entry) = results.get_mut(name) else {
                continue;
            };
            if !entry.processed || entry.loaded.is_some() {
                continue;
            }
            let loaded = self.load(name);
            entry.loaded = Some(loaded);
            if !loaded {
                entry.error = Some("load rejected by native runtime".to_string());
            }
        }

        results
    }

    /// Plugins the runtime currently knows about. Always re-read.
    pub fn known_plugins(&self) -> Vec<String> {
        self.runtime.known_plugins()
    }

    /// Plugins currently loaded. Always re-read.
    pub fn loaded_plugins(&self) -> Vec<String> {
        self.runtime.loaded_plugins()
    }

    /// Per-plugin state derived from the two native queries.
    pub fn plugin_status(&self) -> BTreeMap<String, PluginState> {
        let mut status: BTreeMap<String, PluginState> = self
            .known_plugins()
            .into_iter()
            .map(|name| (name, PluginState::Known))
            .collect();
        for name in self.loaded_plugins() {
            status.insert(name, PluginState::Loaded);
        }
        status
    }
}
