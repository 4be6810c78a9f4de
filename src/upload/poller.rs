//! Progress polling loop for an active upload session.
//!
//! Polls are issued on a fixed cadence without waiting for the previous
//! response, which matches how the backend expects to be polled but means
//! responses can arrive out of order. Every poll therefore carries a
//! sequence number and a response older than the last applied one is
//! discarded instead of overwriting newer state.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::backend::UploadBackend;
use super::types::{UploadProgress, UploadSession};
use crate::api::ApiError;
use crate::config::{
    POLL_FAILURE_INITIAL_BACKOFF_MS, POLL_FAILURE_MAX_BACKOFF_MS, POLL_MAX_CONSECUTIVE_FAILURES,
    PROGRESS_POLL_INTERVAL_MS,
};

/// Why the poll loop stopped
#[derive(Debug)]
pub enum PollOutcome {
    /// The server reported a terminal stage
    Terminal(UploadProgress),
    /// Polling was abandoned after too many consecutive failures
    Aborted(ApiError),
    /// The owning handle cancelled the session
    Cancelled,
}

type PollResult = (u64, Result<UploadProgress, ApiError>);

/// Drives the poll cadence for one session
pub struct ProgressPoller {
    backend: Arc<dyn UploadBackend>,
    interval: Duration,
    max_consecutive_failures: u32,
}

impl ProgressPoller {
    /// Creates a poller with the standard cadence and failure budget
    #[must_use]
    pub fn new(backend: Arc<dyn UploadBackend>) -> Self {
        Self {
            backend,
            interval: Duration::from_millis(PROGRESS_POLL_INTERVAL_MS),
            max_consecutive_failures: POLL_MAX_CONSECUTIVE_FAILURES,
        }
    }

    /// Runs until a terminal stage, abandonment or cancellation, publishing
    /// each newer snapshot to `updates`.
    ///
    /// The first poll is issued immediately, then one per interval. After a
    /// failed poll the next one is pushed out by an exponential backoff;
    /// any successful poll restores the fixed cadence. Once this returns,
    /// in-flight responses are dropped and nothing further is published.
    pub async fn run(
        &self,
        session: UploadSession,
        updates: watch::Sender<Option<UploadProgress>>,
        cancel: CancellationToken,
    ) -> PollOutcome {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let (results_tx, mut results_rx) = mpsc::unbounded_channel::<PollResult>();
        let mut issued: u64 = 0;
        let mut last_applied: u64 = 0;
        let mut failures: u32 = 0;
        let mut backoff = failure_backoff();

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!(session_id = %session.session_id, "polling cancelled");
                    return PollOutcome::Cancelled;
                }
                Some((seq, result)) = results_rx.recv() => {
                    match result {
                        Ok(progress) => {
                            failures = 0;
                            backoff = failure_backoff();
                            if seq <= last_applied {
                                debug!(
                                    session_id = %session.session_id,
                                    seq,
                                    last_applied,
                                    "discarding stale poll response"
                                );
                                continue;
                            }
                            last_applied = seq;
                            let stage = progress.stage;
                            updates.send_replace(Some(progress.clone()));
                            if stage.is_terminal() {
                                debug!(session_id = %session.session_id, %stage, "terminal stage reached");
                                return PollOutcome::Terminal(progress);
                            }
                        }
                        Err(e) => {
                            failures += 1;
                            warn!(
                                session_id = %session.session_id,
                                attempt = failures,
                                error = %e,
                                "progress poll failed"
                            );
                            if failures >= self.max_consecutive_failures {
                                let message = format!(
                                    "progress polling abandoned after {failures} consecutive failures: {e}"
                                );
                                updates.send_replace(Some(UploadProgress::terminal_error(message)));
                                return PollOutcome::Aborted(e);
                            }
                            // Push the next poll out by the backoff delay
                            // instead of the fixed cadence
                            if let Some(delay) = backoff.next() {
                                ticker.reset_after(delay);
                            }
                        }
                    }
                }
                _ = ticker.tick() => {
                    issued += 1;
                    self.spawn_poll(issued, &session, &results_tx);
                }
            }
        }
    }

    fn spawn_poll(
        &self,
        seq: u64,
        session: &UploadSession,
        results: &mpsc::UnboundedSender<PollResult>,
    ) {
        let backend = Arc::clone(&self.backend);
        let session = session.clone();
        let results = results.clone();
        tokio::spawn(async move {
            let result = backend.poll(&session).await;
            // The receiver is gone once the loop has returned
            let _ = results.send((seq, result));
        });
    }
}

fn failure_backoff() -> impl Iterator<Item = Duration> {
    ExponentialBackoff::from_millis(POLL_FAILURE_INITIAL_BACKOFF_MS)
        .max_delay(Duration::from_millis(POLL_FAILURE_MAX_BACKOFF_MS))
        .map(jitter)
}
