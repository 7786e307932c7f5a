//! Error types for the plugin bridge

use std::path::PathBuf;
use thiserror::Error;

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors that can occur in the plugin bridge
///
/// Configuration and lifecycle violations are loud because they indicate
/// programmer or environment mistakes. Plugin operation rejections are
/// reported as data (booleans and [`PluginBatchResult`] records), not as
/// errors; malformed callback payloads are absorbed at the delivery
/// boundary.
///
/// [`PluginBatchResult`]: crate::lifecycle::PluginBatchResult
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Runtime shared library not found at any search path
    #[error("runtime library not found, searched: {}", format_paths(.searched))]
    LibraryNotFound { searched: Vec<PathBuf> },

    /// Plugins directory not found at any search path
    #[error("plugins directory not found, searched: {}", format_paths(.searched))]
    PluginsDirNotFound { searched: Vec<PathBuf> },

    /// Failed to load the runtime shared library
    #[error("failed to load runtime library '{path}': {message}")]
    LibraryLoad { path: PathBuf, message: String },

    /// Runtime library does not export a required symbol
    #[error("symbol '{symbol}' not found in runtime library")]
    SymbolNotFound { symbol: String },

    /// Operation invoked out of the required init/start order
    #[error("lifecycle violation: {0}")]
    Lifecycle(String),

    /// Sequential process-and-load composition rejected by the native side
    #[error("failed to bring up plugin '{name}': {stage} step rejected")]
    PluginLoad { name: String, stage: &'static str },
}

impl BridgeError {
    /// Create a lifecycle violation error
    pub fn lifecycle(message: impl Into<String>) -> Self {
        BridgeError::Lifecycle(message.into())
    }

    /// Create a library load error
    pub fn library_load(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        BridgeError::LibraryLoad {
            path: path.into(),
            message: message.into(),
        }
    }
}

fn format_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
