//! Per-plugin dispatch handles
//!
//! A [`PluginHandle`] is a cheap, stateless-beyond-its-name handle bound to
//! one plugin: `invoke` issues an async method call and returns a deferred
//! result, `subscribe` registers a multi-fire event listener. Handles are
//! cached by name on the bridge, so repeated lookups return the same
//! instance.
//!
//! Arguments are positional [`serde_json::Value`]s; each is encoded as
//! `{"name": "arg<i>", "value": <text>, "type": <inferred>}` and the whole
//! sequence is JSON-serialized as the call payload.

use crate::correlator::{CallId, CallbackCorrelator};
use crate::error::Result;
use crate::native::NativeRuntime;
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;

/// Errors surfaced by a deferred invocation result
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The native side reported failure; carries the decoded-or-raw message
    #[error("plugin call rejected: {0}")]
    Rejected(Value),

    /// The bridge was torn down before the result arrived
    #[error("bridge was torn down before the call completed")]
    Canceled,
}

/// Dispatch handle bound to one plugin name
pub struct PluginHandle {
    name: String,
    runtime: Arc<dyn NativeRuntime>,
    correlator: CallbackCorrelator,
}

impl PluginHandle {
    pub(crate) fn new(
        name: impl Into<String>,
        runtime: Arc<dyn NativeRuntime>,
        correlator: CallbackCorrelator,
    ) -> Self {
        Self {
            name: name.into(),
            runtime,
            correlator,
        }
    }

    /// The plugin name this handle is bound to.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke `method` with positional arguments and get a deferred result.
    ///
    /// Resolves with the decoded reply payload on success, or
    /// [`DispatchError::Rejected`] carrying the failure message. The result
    /// only arrives while the event pump is running; the call itself never
    /// blocks. Dropping the future merely discards interest — a late
    /// delivery for it is dropped by the correlator.
    pub fn invoke(
        &self,
        method: &str,
        args: &[Value],
    ) -> impl Future<Output = std::result::Result<Value, DispatchError>> {
        let payload = encode_args(args);
        let (tx, rx) = oneshot::channel();

        let issued = self.correlator.invoke_async(
            self.runtime.as_ref(),
            &self.name,
            method,
            &payload,
            Box::new(move |reply| {
                let _ = tx.send(reply);
            }),
        );

        async move {
            if issued.is_err() {
                return Err(DispatchError::Canceled);
            }
            match rx.await {
                Ok(reply) if reply.success => Ok(reply.payload),
                Ok(reply) => Err(DispatchError::Rejected(reply.payload)),
                Err(_) => Err(DispatchError::Canceled),
            }
        }
    }

    /// Subscribe `listener` to `event`. On a successful delivery the
    /// listener receives the decoded payload; on a failed one it receives
    /// `{"error": true, "message": <m>}` — it is never handed a failure
    /// dressed up as a success.
    pub fn subscribe(
        &self,
        event: &str,
        mut listener: impl FnMut(Value) + Send + 'static,
    ) -> Result<CallId> {
        self.correlator.subscribe(
            self.runtime.as_ref(),
            &self.name,
            event,
            Box::new(move |reply| {
                if reply.success {
                    listener(reply.payload);
                } else {
                    listener(json!({"error": true, "message": reply.payload}));
                }
            }),
        )
    }
}

impl fmt::Debug for PluginHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginHandle")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for PluginHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PluginHandle({})", self.name)
    }
}

#[derive(Debug, Serialize, PartialEq)]
struct EncodedArg {
    name: String,
    value: String,
    #[serde(rename = "type")]
    kind: &'static str,
}

fn encode_arg(index: usize, value: &Value) -> EncodedArg {
    let (kind, text) = match value {
        Value::Bool(b) => ("bool", b.to_string()),
        Value::Number(n) if n.is_i64() || n.is_u64() => ("int", n.to_string()),
        Value::Number(n) => ("double", n.to_string()),
        Value::String(s) => ("string", s.clone()),
        Value::Null => ("string", String::new()),
        other => ("string", other.to_string()),
    };
    EncodedArg {
        name: format!("arg{index}"),
        value: text,
        kind,
    }
}

pub(crate) fn encode_args(args: &[Value]) -> String {
    let encoded: Vec<EncodedArg> = args
        .iter()
        .enumerate()
        .map(|(i, v)| encode_arg(i, v))
        .collect();
    serde_json::to_string(&encoded).unwrap_or_else(|_| "[]".to_string())
}
