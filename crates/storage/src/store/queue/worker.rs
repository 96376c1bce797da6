//! Background change-queue worker.
//!
//! The worker owns no state of its own: it locks the shared [`Lix`] only to pick the next entry
//! and to apply a plugin's result, and runs change detection on the blocking pool in between.
//!
//! # Lifecycle
//!
//! 1. Wakes on [`ChangeQueueWorker::trigger`] or on the poll interval
//! 2. Drains every pending entry in order (`Draining`)
//! 3. Publishes the run number it finished and goes back to `Idle`
//! 4. If another trigger arrived while draining, starts a new pass immediately
//!
//! [`ChangeQueueWorker::settled`] resolves once a run that started after the call has
//! finished, so every mutation made before calling it has been processed.

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::super::{Lix, LixError};

#[derive(Debug, Clone)]
pub struct ChangeQueueWorkerConfig {
    /// Interval between passes when nobody triggers the worker (default: 1 second).
    pub poll_interval: Duration,
}

/// Floor for [`ChangeQueueWorkerConfig::poll_interval`]; a zero period cannot drive a ticker.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

impl Default for ChangeQueueWorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Draining,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStatus {
    pub state: WorkerState,
    /// Highest requested run fully drained.
    pub completed_run: u64,
    pub processed_entries: u64,
    pub failed_entries: u64,
}

struct Shared {
    notify: Notify,
    requested_run: AtomicU64,
    status: watch::Sender<WorkerStatus>,
}

/// Publishes `Stopped` however the worker task ends, unwinding included.
struct StoppedOnExit(Arc<Shared>);

impl Drop for StoppedOnExit {
    fn drop(&mut self) {
        self.0
            .status
            .send_modify(|status| status.state = WorkerState::Stopped);
    }
}

/// Handle to a running worker. Dropping the handle does not stop the task; call
/// [`ChangeQueueWorker::shutdown`].
pub struct ChangeQueueWorker {
    shared: Arc<Shared>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ChangeQueueWorker {
    pub fn spawn(lix: Arc<Mutex<Lix>>, mut config: ChangeQueueWorkerConfig) -> Self {
        if config.poll_interval < MIN_POLL_INTERVAL {
            warn!(
                requested_ms = config.poll_interval.as_millis() as u64,
                "poll interval below minimum, clamping"
            );
            config.poll_interval = MIN_POLL_INTERVAL;
        }
        let (status, _) = watch::channel(WorkerStatus {
            state: WorkerState::Idle,
            completed_run: 0,
            processed_entries: 0,
            failed_entries: 0,
        });
        let shared = Arc::new(Shared {
            notify: Notify::new(),
            requested_run: AtomicU64::new(0),
            status,
        });
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run_worker_loop(lix, config, shared.clone(), cancel.clone()));

        Self {
            shared,
            cancel,
            task,
        }
    }

    /// Requests a pass and returns its run number.
    pub fn trigger(&self) -> u64 {
        let run = self.shared.requested_run.fetch_add(1, Ordering::AcqRel) + 1;
        self.shared.notify.notify_one();
        run
    }

    /// Waits until everything enqueued before this call has been processed.
    pub async fn settled(&self) -> Result<WorkerStatus, LixError> {
        let run = self.trigger();
        let mut receiver = self.shared.status.subscribe();
        let status = receiver
            .wait_for(|status| status.completed_run >= run || status.state == WorkerState::Stopped)
            .await
            .map_err(|_| LixError::InvalidInput("change queue worker stopped"))?;
        let status = *status;
        if status.completed_run < run {
            return Err(LixError::InvalidInput("change queue worker stopped"));
        }
        Ok(status)
    }

    pub fn status(&self) -> WorkerStatus {
        *self.shared.status.borrow()
    }

    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(err) = self.task.await {
            warn!(error = %err, "change queue worker task ended abnormally");
        }
    }
}

async fn run_worker_loop(
    lix: Arc<Mutex<Lix>>,
    config: ChangeQueueWorkerConfig,
    shared: Arc<Shared>,
    cancel: CancellationToken,
) {
    let _stopped = StoppedOnExit(shared.clone());
    let mut ticker = interval(config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        poll_interval_ms = config.poll_interval.as_millis() as u64,
        "change queue worker started"
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = shared.notify.notified() => {}
            _ = ticker.tick() => {}
        }

        loop {
            let run = shared.requested_run.load(Ordering::Acquire);
            shared.status.send_modify(|status| status.state = WorkerState::Draining);

            let (processed, failed) = drain(&lix, &cancel).await;

            shared.status.send_modify(|status| {
                status.state = WorkerState::Idle;
                status.completed_run = status.completed_run.max(run);
                status.processed_entries += processed;
                status.failed_entries += failed;
            });

            if cancel.is_cancelled() || shared.requested_run.load(Ordering::Acquire) <= run {
                break;
            }
            debug!(run, "more work requested while draining");
        }
    }

    info!("change queue worker stopped");
}

/// One pass over the queue. Returns (processed, failed) entry counts.
async fn drain(lix: &Arc<Mutex<Lix>>, cancel: &CancellationToken) -> (u64, u64) {
    let mut processed = 0u64;
    let mut failed = 0u64;

    while !cancel.is_cancelled() {
        let next = {
            let guard = lix.lock().await;
            match guard.next_change_queue_entry() {
                Ok(Some(entry)) => {
                    let plugin = guard.plugin_for_path(&entry.path);
                    Some((entry, plugin))
                }
                Ok(None) => None,
                Err(err) => {
                    error!(error = %err, "reading change queue failed");
                    None
                }
            }
        };
        let Some((entry, plugin)) = next else {
            break;
        };

        let Some(plugin) = plugin else {
            let mut guard = lix.lock().await;
            if let Err(err) = guard.discard_change_queue_entry(&entry) {
                error!(error = %err, entry_id = entry.id, "dropping unhandled entry failed");
                break;
            }
            continue;
        };

        let detector = plugin.clone();
        let before = entry.data_before.clone();
        let after = entry.data_after.clone();
        let detected = tokio::task::spawn_blocking(move || {
            detector.detect_changes(before.as_deref(), after.as_deref())
        })
        .await;

        let mut guard = lix.lock().await;
        let outcome = match detected {
            Ok(Ok(changes)) => guard
                .complete_change_queue_entry(&entry, plugin.key(), changes)
                .map(|count| count.is_some()),
            Ok(Err(err)) => guard
                .fail_change_queue_entry(&entry, &err.to_string())
                .map(|()| false),
            Err(join_err) => guard
                .fail_change_queue_entry(&entry, &format!("plugin task failed: {join_err}"))
                .map(|()| false),
        };
        match outcome {
            Ok(true) => processed += 1,
            Ok(false) => failed += 1,
            Err(err) => {
                error!(error = %err, entry_id = entry.id, "recording queue result failed");
                break;
            }
        }
    }

    (processed, failed)
}
