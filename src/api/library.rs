//! Typed content-library endpoints: upload initiation, progress polling
//! and the cached listing reads.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Method};
use serde_json::Value;
use tokio_util::io::ReaderStream;
use tracing::debug;

use super::http_utils::{read_json_response, send_request};
use super::{ApiClient, ApiError};
use crate::upload::{
    FilePayload, MaterialUpload, UploadBackend, UploadKind, UploadMeta, UploadProgress,
    UploadRequest, UploadSession, VideoUpload,
};

impl ApiClient {
    /// Submits a lecture video and receives an upload session.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] when the payload cannot be opened or the
    /// backend rejects the request; no session exists in that case.
    pub async fn start_video_upload(&self, upload: &VideoUpload) -> Result<UploadSession, ApiError> {
        let mut form = metadata_form(&upload.meta)
            .text("checksumSha256", upload.video.sha256.clone())
            .part("video", file_part(&upload.video).await?);
        if let Some(thumbnail) = &upload.thumbnail {
            form = form.part("thumbnail", file_part(thumbnail).await?);
        }
        self.start_upload(UploadKind::Video.start_path(), form)
            .await
    }

    /// Submits a study material and receives an upload session.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::start_video_upload`].
    pub async fn start_material_upload(
        &self,
        upload: &MaterialUpload,
    ) -> Result<UploadSession, ApiError> {
        let form = metadata_form(&upload.meta)
            .text("checksumSha256", upload.material.sha256.clone())
            .part("material", file_part(&upload.material).await?);
        self.start_upload(UploadKind::Material.start_path(), form)
            .await
    }

    async fn start_upload(&self, path: &str, form: Form) -> Result<UploadSession, ApiError> {
        debug!(path, "starting upload session");
        let response = send_request(self.request(Method::POST, path).multipart(form)).await?;
        read_json_response(response).await
    }

    /// Fetches the latest progress snapshot for `session`.
    ///
    /// Prefers the poll path handed back by the start endpoint and falls
    /// back to the canonical progress route.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] on transport, status or parse failures.
    pub async fn poll_upload_progress(
        &self,
        session: &UploadSession,
    ) -> Result<UploadProgress, ApiError> {
        let default_path = format!(
            "/library/content/upload-progress/{}/poll",
            session.session_id
        );
        let path = session.progress_endpoint.as_deref().unwrap_or(&default_path);
        let response = send_request(self.request(Method::GET, path)).await?;
        read_json_response(response).await
    }

    /// Lists materials attached to a topic
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] on transport, status or parse failures.
    pub async fn topic_materials(&self, topic_id: &str) -> Result<Value, ApiError> {
        let path = format!("/library/topics/{topic_id}/materials");
        let response = send_request(self.request(Method::GET, &path)).await?;
        read_json_response(response).await
    }

    /// Lists contents of a chapter
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] on transport, status or parse failures.
    pub async fn chapter_contents(&self, chapter_id: &str) -> Result<Value, ApiError> {
        let path = format!("/library/chapters/{chapter_id}/contents");
        let response = send_request(self.request(Method::GET, &path)).await?;
        read_json_response(response).await
    }
}

fn metadata_form(meta: &UploadMeta) -> Form {
    let mut form = Form::new()
        .text("topicId", meta.topic_id.clone())
        .text("subjectId", meta.subject_id.clone())
        .text("title", meta.title.clone());
    if let Some(description) = &meta.description {
        form = form.text("description", description.clone());
    }
    form
}

/// Builds a streaming multipart part so large videos are never buffered
/// in memory
async fn file_part(payload: &FilePayload) -> Result<Part, ApiError> {
    let file = tokio::fs::File::open(&payload.path)
        .await
        .map_err(|e| ApiError::Io(format!("cannot open {}: {e}", payload.path.display())))?;
    let body = Body::wrap_stream(ReaderStream::new(file));
    Ok(Part::stream_with_length(body, payload.size_bytes).file_name(payload.file_name.clone()))
}

#[async_trait]
impl UploadBackend for ApiClient {
    async fn start(&self, request: &UploadRequest) -> Result<UploadSession, ApiError> {
        match request {
            UploadRequest::Video(upload) => self.start_video_upload(upload).await,
            UploadRequest::Material(upload) => self.start_material_upload(upload).await,
        }
    }

    async fn poll(&self, session: &UploadSession) -> Result<UploadProgress, ApiError> {
        self.poll_upload_progress(session).await
    }
}
