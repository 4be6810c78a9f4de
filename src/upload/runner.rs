//! Orchestrates one upload: validate, start the session, poll to a
//! terminal stage, then fire the terminal side effects.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::backend::UploadBackend;
use super::poller::{PollOutcome, ProgressPoller};
use super::types::{UploadProgress, UploadRequest, UploadSession, UploadStage};
use super::UploadError;
use crate::api::ApiError;
use crate::cache::Invalidate;
use crate::config::{
    START_UPLOAD_INITIAL_BACKOFF_MS, START_UPLOAD_MAX_BACKOFF_MS, START_UPLOAD_MAX_RETRIES,
};
use crate::notify::{Notification, Notify};

/// Runs upload sessions against a backend and applies terminal effects.
///
/// The cache and notifier are injected so the flow can be exercised
/// without the process-wide cache or a user-facing sink.
pub struct Uploader {
    backend: Arc<dyn UploadBackend>,
    invalidator: Arc<dyn Invalidate>,
    notifier: Arc<dyn Notify>,
}

impl Uploader {
    /// Creates an uploader over `backend` with the given collaborators
    #[must_use]
    pub fn new(
        backend: Arc<dyn UploadBackend>,
        invalidator: Arc<dyn Invalidate>,
        notifier: Arc<dyn Notify>,
    ) -> Self {
        Self {
            backend,
            invalidator,
            notifier,
        }
    }

    /// Validates `request`, starts a session and spawns the poll loop.
    ///
    /// Transient network failures of the start request are retried with
    /// backoff; any other failure is returned as-is. No session state
    /// exists until this returns `Ok`.
    ///
    /// # Errors
    ///
    /// [`UploadError::InvalidRequest`] when validation fails and
    /// [`UploadError::StartFailed`] when the backend rejects the request
    /// or stays unreachable.
    pub async fn begin(&self, request: UploadRequest) -> Result<UploadHandle, UploadError> {
        request.validate()?;

        let strategy = ExponentialBackoff::from_millis(START_UPLOAD_INITIAL_BACKOFF_MS)
            .max_delay(Duration::from_millis(START_UPLOAD_MAX_BACKOFF_MS))
            .map(jitter)
            .take(START_UPLOAD_MAX_RETRIES.saturating_sub(1));

        let backend = &self.backend;
        let session = RetryIf::spawn(
            strategy,
            || backend.start(&request),
            |e: &ApiError| e.is_transient(),
        )
        .await
        .map_err(UploadError::StartFailed)?;

        info!(
            session_id = %session.session_id,
            kind = ?request.kind(),
            title = request.title(),
            "upload session started"
        );

        let (updates_tx, updates_rx) = watch::channel(None);
        let cancel = CancellationToken::new();
        let poller = ProgressPoller::new(Arc::clone(&self.backend));
        let notifier = Arc::clone(&self.notifier);
        let invalidator = Arc::clone(&self.invalidator);
        let title = request.title().to_string();
        let scopes = request.kind().invalidation_scopes();
        let task_session = session.clone();
        let task_cancel = cancel.clone();

        let task = tokio::spawn(async move {
            let outcome = poller.run(task_session, updates_tx, task_cancel).await;
            match &outcome {
                PollOutcome::Terminal(progress) if progress.stage == UploadStage::Completed => {
                    notifier.notify(Notification::UploadCompleted {
                        title,
                        material_id: progress.material_id.clone(),
                    });
                    invalidator.invalidate(scopes);
                }
                PollOutcome::Terminal(progress) => {
                    let message = progress
                        .error
                        .clone()
                        .unwrap_or_else(|| "upload failed".to_string());
                    notifier.notify(Notification::UploadFailed { title, message });
                }
                PollOutcome::Aborted(e) => {
                    notifier.notify(Notification::UploadFailed {
                        title,
                        message: e.to_string(),
                    });
                }
                PollOutcome::Cancelled => {}
            }
            outcome
        });

        Ok(UploadHandle {
            session,
            updates: updates_rx,
            cancel,
            task: Some(task),
        })
    }
}

/// Exclusive owner of one upload session's client-side state.
///
/// Dropping the handle cancels polling, matching the dashboards where
/// navigating away from the upload dialog tears the tracker down. The
/// server-side upload continues either way.
pub struct UploadHandle {
    session: UploadSession,
    updates: watch::Receiver<Option<UploadProgress>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<PollOutcome>>,
}

impl UploadHandle {
    /// The accepted session
    #[must_use]
    pub const fn session(&self) -> &UploadSession {
        &self.session
    }

    /// Subscribes to progress snapshots; holds `None` until the first
    /// poll response lands
    #[must_use]
    pub fn progress(&self) -> watch::Receiver<Option<UploadProgress>> {
        self.updates.clone()
    }

    /// Latest observed snapshot
    #[must_use]
    pub fn latest(&self) -> Option<UploadProgress> {
        self.updates.borrow().clone()
    }

    /// Stops polling immediately. No cancellation is sent to the backend;
    /// only the client-side loop is torn down.
    pub fn reset(&self) {
        self.cancel.cancel();
    }

    /// Waits for the poll loop to finish and returns its outcome.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::Join`] if the poll task panicked.
    pub async fn wait(mut self) -> Result<PollOutcome, UploadError> {
        match self.task.take() {
            Some(task) => task.await.map_err(|e| UploadError::Join(e.to_string())),
            None => Ok(PollOutcome::Cancelled),
        }
    }
}

impl Drop for UploadHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
