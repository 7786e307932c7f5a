//! conduit-plugin-host: bridge to a C ABI native plugin runtime
//!
//! This crate loads the plugin runtime shared library, drives plugin
//! lifecycle (process, load, unload), and turns the runtime's
//! fire-and-forget callbacks into awaitable results and multi-fire event
//! subscriptions. Results only arrive while the event pump is running.
//!
//! ```no_run
//! use conduit_plugin_host::{BridgeConfig, PluginBridge, DEFAULT_PUMP_INTERVAL};
//! use serde_json::json;
//!
//! # async fn run() -> conduit_plugin_host::Result<()> {
//! let bridge = PluginBridge::new(BridgeConfig::default())?;
//! bridge.start()?;
//! bridge.start_event_processing(DEFAULT_PUMP_INTERVAL)?;
//!
//! bridge.process_and_load_plugin("telemetry")?;
//! let telemetry = bridge.plugin("telemetry")?;
//! let reading = telemetry.invoke("read", &[json!("sensor0")]).await;
//!
//! bridge.cleanup().await;
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod config;
pub mod correlator;
pub mod dispatch;
pub mod error;
pub mod lifecycle;
pub mod native;
pub mod pump;

#[cfg(test)]
mod test_util;

pub use bridge::PluginBridge;
pub use config::BridgeConfig;
pub use correlator::{CallHandler, CallId, CallReply, CallbackCorrelator, EventHandler};
pub use dispatch::{DispatchError, PluginHandle};
pub use error::{BridgeError, Result};
pub use lifecycle::{PluginBatchResult, PluginLifecycle, PluginState};
pub use native::{LibNativeRuntime, NativeRuntime};
pub use pump::{EventPump, DEFAULT_PUMP_INTERVAL};
