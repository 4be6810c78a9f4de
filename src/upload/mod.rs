//! Upload session state machine: initiation, progress polling, terminal
//! effects.
//!
//! One upload runs as: validate the request, submit the multipart start
//! request, then poll the progress endpoint every two seconds until the
//! backend reports a terminal stage. On `completed` the affected cached
//! listings are invalidated and a success notification fires; on `error`
//! only a failure notification fires. Session state is exclusively owned
//! by the [`UploadHandle`] returned from [`Uploader::begin`].

mod backend;
mod poller;
mod runner;
mod types;

pub use backend::UploadBackend;
pub use poller::{PollOutcome, ProgressPoller};
pub use runner::{UploadHandle, Uploader};
pub use types::{
    FilePayload, MaterialUpload, UploadKind, UploadMeta, UploadProgress, UploadRequest,
    UploadSession, UploadStage, VideoUpload,
};

use crate::api::ApiError;
use thiserror::Error;

/// Errors surfaced before a session exists or outside the polled state
#[derive(Debug, Error)]
pub enum UploadError {
    /// A required field was missing or blank
    #[error("invalid upload request: {0}")]
    InvalidRequest(String),
    /// The payload file could not be staged
    #[error("cannot stage upload payload: {0}")]
    Payload(String),
    /// The start-upload request failed; no session was created
    #[error("failed to start upload: {0}")]
    StartFailed(#[source] ApiError),
    /// The background poll task died unexpectedly
    #[error("upload task failed: {0}")]
    Join(String),
}
