//! Callback correlation
//!
//! Turns the runtime's fire-and-forget C callbacks into single-fire call
//! results and multi-fire event subscriptions. Every registration gets a
//! process-unique [`CallId`]; the C `userdata` pointer is a boxed context
//! owned by the correlator, so a delivery can always be attributed back to
//! its slot, and a delivery for a discarded slot is a no-op rather than a
//! dangling callback.

use crate::error::{BridgeError, Result};
use crate::native::NativeRuntime;
use conduit_plugin_abi::ABI_RESULT_OK;
use serde_json::Value;
use std::collections::HashMap;
use std::ffi::CStr;
use std::os::raw::{c_char, c_int, c_void};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Instant;

/// Correlation token for one outstanding call or one event subscription.
pub type CallId = u64;

/// One callback delivery, with the payload decoded opportunistically:
/// valid JSON becomes the parsed value, anything else is passed through as
/// a raw string. Malformed payloads never fail a delivery.
#[derive(Debug, Clone)]
pub struct CallReply {
    pub success: bool,
    pub payload: Value,
}

/// Completion handler for a single async call; fires at most once.
pub type CallHandler = Box<dyn FnOnce(CallReply) + Send>;

/// Listener for an event subscription; may fire any number of times.
pub type EventHandler = Box<dyn FnMut(CallReply) + Send>;

struct PendingCall {
    handler: CallHandler,
    issued_at: Instant,
}

struct EventSubscription {
    plugin: String,
    event: String,
    handler: EventHandler,
}

/// Heap context handed to the native side as `userdata`. Owned by the
/// correlator and kept alive until [`CallbackCorrelator::clear`], so the
/// native side never holds a pointer into freed memory while it can still
/// deliver.
struct DeliveryContext {
    state: Weak<CorrelatorState>,
    call_id: CallId,
}

struct Slots {
    /// False once `clear()` ran; late deliveries and new registrations are
    /// refused from then on.
    open: bool,
    next_id: CallId,
    pending: HashMap<CallId, PendingCall>,
    subscriptions: HashMap<CallId, EventSubscription>,
    contexts: HashMap<CallId, Box<DeliveryContext>>,
}

struct CorrelatorState {
    slots: Mutex<Slots>,
}

/// Correlates async native callbacks back to registered handlers.
#[derive(Clone)]
pub struct CallbackCorrelator {
    state: Arc<CorrelatorState>,
}

impl CallbackCorrelator {
    pub fn new() -> Self {
        Self {
            state: Arc::new(CorrelatorState {
                slots: Mutex::new(Slots {
                    open: true,
                    next_id: 1,
                    pending: HashMap::new(),
                    subscriptions: HashMap::new(),
                    contexts: HashMap::new(),
                }),
            }),
        }
    }

    /// Issue an async call against the runtime. `handler` fires at most
    /// once, on a later event-pump drain.
    pub fn invoke_async(
        &self,
        runtime: &dyn NativeRuntime,
        target: &str,
        verb: &str,
        payload: &str,
        handler: CallHandler,
    ) -> Result<CallId> {
        let (call_id, userdata) = {
            let mut slots = self.state.lock();
            if !slots.open {
                return Err(BridgeError::lifecycle("bridge was cleaned up"));
            }
            let call_id = slots.next_id;
            slots.next_id += 1;
            slots.pending.insert(
                call_id,
                PendingCall {
                    handler,
                    issued_at: Instant::now(),
                },
            );
            (call_id, slots.store_context(&self.state, call_id))
        };

        runtime.call_async(target, verb, payload, delivery_trampoline, userdata);
        tracing::trace!(call_id, target, verb, "Issued async call");
        Ok(call_id)
    }

    /// Register an event listener against the runtime. The subscription is
    /// never auto-removed; it lives until [`clear`](Self::clear). Multiple
    /// subscriptions to the same event each fire independently.
    pub fn subscribe(
        &self,
        runtime: &dyn NativeRuntime,
        plugin: &str,
        event: &str,
        handler: EventHandler,
    ) -> Result<CallId> {
        let (call_id, userdata) = {
            let mut slots = self.state.lock();
            if !slots.open {
                return Err(BridgeError::lifecycle("bridge was cleaned up"));
            }
            let call_id = slots.next_id;
            slots.next_id += 1;
            slots.subscriptions.insert(
                call_id,
                EventSubscription {
                    plugin: plugin.to_string(),
                    event: event.to_string(),
                    handler,
                },
            );
            (call_id, slots.store_context(&self.state, call_id))
        };

        runtime.register_event_listener(plugin, event, delivery_trampoline, userdata);
        tracing::debug!(call_id, plugin, event, "Registered event listener");
        Ok(call_id)
    }

    /// Discard every pending call, subscription, and trampoline context.
    ///
    /// The caller must guarantee the native side can no longer deliver
    /// (runtime cleanup already issued) before the contexts are freed.
    pub fn clear(&self) {
        let mut slots = self.state.lock();
        slots.open = false;
        let pending = slots.pending.len();
        let subscriptions = slots.subscriptions.len();
        slots.pending.clear();
        slots.subscriptions.clear();
        slots.contexts.clear();
        if pending + subscriptions > 0 {
            tracing::debug!(pending, subscriptions, "Discarded correlation state");
        }
    }

    /// Number of outstanding single-fire calls.
    pub fn pending_calls(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Number of live event subscriptions.
    pub fn subscriptions(&self) -> usize {
        self.state.lock().subscriptions.len()
    }
}

impl Default for CallbackCorrelator {
    fn default() -> Self {
        Self::new()
    }
}

impl Slots {
    fn store_context(&mut self, state: &Arc<CorrelatorState>, call_id: CallId) -> *mut c_void {
        let context = Box::new(DeliveryContext {
            state: Arc::downgrade(state),
            call_id,
        });
        // The box address is stable while it sits in the map.
        let userdata = &*context as *const DeliveryContext as *mut c_void;
        self.contexts.insert(call_id, context);
        userdata
    }
}

impl CorrelatorState {
    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatch(self: &Arc<Self>, call_id: CallId, success: bool, raw: String) {
        enum Target {
            Call(PendingCall),
            Event(EventSubscription),
        }

        let reply = CallReply {
            success,
            payload: decode_payload(&raw),
        };

        // Take the handler out under the lock, run it outside, so a handler
        // that issues new calls does not deadlock.
        let target = {
            let mut slots = self.lock();
            if !slots.open {
                None
            } else if let Some(call) = slots.pending.remove(&call_id) {
                Some(Target::Call(call))
            } else {
                slots.subscriptions.remove(&call_id).map(Target::Event)
            }
        };

        match target {
            Some(Target::Call(call)) => {
                tracing::trace!(
                    call_id,
                    success,
                    elapsed_ms = call.issued_at.elapsed().as_millis() as u64,
                    "Delivering call result"
                );
                invoke_guarded(call_id, move || (call.handler)(reply));
            }
            Some(Target::Event(mut sub)) => {
                tracing::trace!(call_id, plugin = %sub.plugin, event = %sub.event, "Delivering event");
                invoke_guarded(call_id, || (sub.handler)(reply));
                let mut slots = self.lock();
                if slots.open {
                    slots.subscriptions.insert(call_id, sub);
                }
            }
            None => {
                tracing::trace!(call_id, "Dropping delivery with no registered handler");
            }
        }
    }
}

/// The one callback pointer ever handed to the native side. Tolerates
/// deliveries for discarded registrations and a torn-down correlator.
pub(crate) unsafe extern "C" fn delivery_trampoline(
    result: c_int,
    message: *const c_char,
    userdata: *mut c_void,
) {
    if userdata.is_null() {
        return;
    }
    let context = &*(userdata as *const DeliveryContext);
    let Some(state) = context.state.upgrade() else {
        return;
    };
    let raw = if message.is_null() {
        String::new()
    } else {
        CStr::from_ptr(message).to_string_lossy().into_owned()
    };
    state.dispatch(context.call_id, result == ABI_RESULT_OK, raw);
}

fn decode_payload(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Handler exceptions stop here: they are logged and never propagate back
/// into native code or poison subsequent deliveries.
fn invoke_guarded(call_id: CallId, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        tracing::error!(call_id, "User handler panicked during callback delivery");
    }
}
