//! Event processing driver
//!
//! The native runtime queues callback deliveries internally; nothing
//! arrives until its event queue is drained. The pump drains it
//! cooperatively on a periodic tick. The blocking alternative is
//! [`NativeRuntime::exec`](crate::native::NativeRuntime::exec), which hands
//! the whole thread to the native side; callers must not run both at once,
//! since they drain the same queue.

use crate::error::{BridgeError, Result};
use crate::native::NativeRuntime;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Tick interval used when the caller does not specify one.
pub const DEFAULT_PUMP_INTERVAL: Duration = Duration::from_millis(100);

/// Periodic driver of the runtime's event queue.
pub struct EventPump {
    runtime: Arc<dyn NativeRuntime>,
    active: Mutex<Option<PumpTask>>,
}

struct PumpTask {
    shutdown: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl EventPump {
    pub fn new(runtime: Arc<dyn NativeRuntime>) -> Self {
        Self {
            runtime,
            active: Mutex::new(None),
        }
    }

    /// Start draining the event queue every `interval`.
    ///
    /// Must be called within a tokio runtime. Fails with a lifecycle error
    /// when the pump is already running.
    pub fn start(&self, interval: Duration) -> Result<()> {
        let mut active = self.lock();
        if active.is_some() {
            return Err(BridgeError::lifecycle(
                "event processing is already running",
            ));
        }

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let runtime = Arc::clone(&self.runtime);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = ticker.tick() => runtime.process_events(),
                }
            }
        });

        *active = Some(PumpTask {
            shutdown: shutdown_tx,
            task,
        });
        tracing::debug!(
            interval_ms = interval.as_millis() as u64,
            "Event pump started"
        );
        Ok(())
    }

    /// Stop the pump and wait for any in-flight tick to finish.
    /// Idempotent: stopping a stopped pump is a no-op.
    pub async fn stop(&self) {
        let pump = self.lock().take();
        let Some(pump) = pump else {
            return;
        };
        let _ = pump.shutdown.try_send(());
        let _ = pump.task.await;
        tracing::debug!("Event pump stopped");
    }

    pub fn is_running(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Option<PumpTask>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
