//! Seam between the upload state machine and the HTTP layer.

use async_trait::async_trait;

use super::types::{UploadProgress, UploadRequest, UploadSession};
use crate::api::ApiError;

/// Backend operations the upload flow needs: accept a new session and
/// report progress for it.
///
/// Implemented over HTTP by [`crate::api::ApiClient`]; tests substitute
/// scripted fakes so the state machine runs without a network.
#[async_trait]
pub trait UploadBackend: Send + Sync {
    /// Submits the multipart start-upload request for `request`.
    async fn start(&self, request: &UploadRequest) -> Result<UploadSession, ApiError>;

    /// Fetches the latest progress snapshot for `session`.
    async fn poll(&self, session: &UploadSession) -> Result<UploadProgress, ApiError>;
}
