//! Bridge configuration and path resolution
//!
//! The runtime library and plugins directory are resolved once, at bridge
//! construction, against a fixed candidate order. The first existing path
//! wins; resolution is never repeated for the lifetime of a bridge.

use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for constructing a [`PluginBridge`](crate::PluginBridge)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Explicit path to the runtime shared library
    #[serde(default)]
    pub library_path: Option<PathBuf>,

    /// Explicit plugins directory
    #[serde(default)]
    pub plugins_dir: Option<PathBuf>,

    /// Initialize the runtime during construction
    #[serde(default = "default_auto_init")]
    pub auto_init: bool,
}

fn default_auto_init() -> bool {
    true
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            library_path: None,
            plugins_dir: None,
            auto_init: true,
        }
    }
}

/// Application directory name used for SDK-local fallbacks
const APP_DIR: &str = "conduit";

/// Candidate paths for the runtime library, in resolution order:
/// explicit config, SDK-local install, legacy build tree.
pub fn library_candidates(config: &BridgeConfig) -> Vec<PathBuf> {
    let file = conduit_plugin_abi::runtime_library_filename();
    let mut candidates = Vec::new();

    if let Some(path) = &config.library_path {
        candidates.push(path.clone());
    }
    if let Some(data) = dirs::data_local_dir() {
        candidates.push(data.join(APP_DIR).join("sdk").join("lib").join(&file));
    }
    if let Ok(cwd) = std::env::current_dir() {
        candidates.push(cwd.join("native").join("build").join("lib").join(&file));
    }

    candidates
}

/// Candidate plugins directories, in resolution order: explicit config,
/// `<cwd>/plugins`, `<cwd>/modules`, legacy SDK tree.
pub fn plugins_dir_candidates(config: &BridgeConfig) -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if let Some(dir) = &config.plugins_dir {
        candidates.push(dir.clone());
    }
    if let Ok(cwd) = std::env::current_dir() {
        candidates.push(cwd.join("plugins"));
        candidates.push(cwd.join("modules"));
    }
    if let Some(data) = dirs::data_local_dir() {
        candidates.push(data.join(APP_DIR).join("plugins"));
    }

    candidates
}

/// Resolve the runtime library path. First existing candidate wins.
pub fn resolve_library_path(config: &BridgeConfig) -> Result<PathBuf> {
    let candidates = library_candidates(config);
    candidates
        .iter()
        .find(|p| p.is_file())
        .cloned()
        .ok_or(BridgeError::LibraryNotFound {
            searched: candidates,
        })
}

/// Resolve the plugins directory. First existing candidate wins.
pub fn resolve_plugins_dir(config: &BridgeConfig) -> Result<PathBuf> {
    let candidates = plugins_dir_candidates(config);
    candidates
        .iter()
        .find(|p| p.is_dir())
        .cloned()
        .ok_or(BridgeError::PluginsDirNotFound {
            searched: candidates,
        })
}

/// Path a plugin binary is resolved at: `<pluginsDir>/<name>_plugin<ext>`
pub fn plugin_binary_path(plugins_dir: &Path, name: &str) -> PathBuf {
    plugins_dir.join(conduit_plugin_abi::plugin_filename(name))
}
