//! Background loops: heartbeat monitor and cleanup scheduler.
//!
//! Both start lazily with the first registration and run until
//! [`Hub::shutdown`]. A tick that errors or panics is logged, followed by a
//! short backoff; the loop keeps going.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::FutureExt;
use futures::future::join_all;
use metrics::counter;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::errors::HubError;
use crate::hub::Hub;
use crate::metrics as names;

/// Handles for the hub's spawned loops.
#[derive(Default)]
pub(crate) struct BackgroundTasks {
    started: bool,
    handles: Vec<JoinHandle<()>>,
}

impl Hub {
    /// Start the background loops once. No-op after shutdown or outside a
    /// Tokio runtime.
    pub(crate) fn ensure_background_tasks(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock();
        if tasks.started || self.cancel.is_cancelled() {
            return;
        }
        let Ok(runtime) = Handle::try_current() else {
            warn!("no tokio runtime; heartbeat and cleanup loops not started");
            return;
        };
        tasks.started = true;

        let heartbeat = runtime.spawn(run_periodic(
            Arc::downgrade(self),
            "heartbeat",
            self.config.heartbeat_interval,
            self.config.loop_error_backoff,
            self.cancel.child_token(),
            |hub| async move { hub.heartbeat_tick().await.map(|_| ()) },
        ));
        let cleanup = runtime.spawn(run_periodic(
            Arc::downgrade(self),
            "cleanup",
            self.config.cleanup_interval,
            self.config.loop_error_backoff,
            self.cancel.child_token(),
            |hub| async move {
                let _ = hub.cleanup_tick();
                Ok(())
            },
        ));
        tasks.handles.push(heartbeat);
        tasks.handles.push(cleanup);
        info!(
            heartbeat_interval_secs = self.config.heartbeat_interval.as_secs(),
            cleanup_interval_secs = self.config.cleanup_interval.as_secs(),
            "hub background tasks started"
        );
    }

    /// Whether the background loops have been started.
    pub fn background_tasks_running(&self) -> bool {
        let tasks = self.tasks.lock();
        tasks.started && !self.cancel.is_cancelled()
    }

    /// Stop the background loops, waiting at most `timeout` for them to
    /// finish before aborting. The loops are never restarted.
    pub async fn shutdown(&self, timeout: Duration) {
        self.cancel.cancel();
        let handles = std::mem::take(&mut self.tasks.lock().handles);
        if handles.is_empty() {
            return;
        }
        let aborts: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();
        if time::timeout(timeout, join_all(handles)).await.is_ok() {
            info!("hub background tasks stopped");
        } else {
            warn!(
                timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                "hub background tasks did not stop in time, aborting"
            );
            for handle in aborts {
                handle.abort();
            }
        }
    }
}

async fn run_periodic<F, Fut>(
    hub: Weak<Hub>,
    task: &'static str,
    period: Duration,
    backoff: Duration,
    cancel: CancellationToken,
    tick: F,
) where
    F: Fn(Arc<Hub>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), HubError>> + Send,
{
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }
        let Some(hub) = hub.upgrade() else { break };

        let failure = match AssertUnwindSafe(tick(hub)).catch_unwind().await {
            Ok(Ok(())) => continue,
            Ok(Err(e)) => e.to_string(),
            Err(panic) => panic_message(panic.as_ref()),
        };
        counter!(names::HUB_LOOP_ERRORS_TOTAL, "task" => task).increment(1);
        error!(task, error = %failure, "background tick failed");

        tokio::select! {
            () = cancel.cancelled() => break,
            () = time::sleep(backoff) => {}
        }
    }
    debug!(task, "background loop stopped");
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_owned()
    }
}
