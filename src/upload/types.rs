//! Wire types and request payloads for content-library uploads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use super::UploadError;
use crate::cache::QueryScope;
use crate::utils::sha256_file;

/// Processing stage reported by the upload-progress endpoint.
///
/// The backend moves forward through the non-terminal stages (any of them
/// may be skipped); `completed` and `error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStage {
    /// Backend is validating the submitted payload
    Validating,
    /// Payload bytes are being transferred to storage
    Uploading,
    /// Post-upload processing (transcoding, previews)
    Processing,
    /// Resource records are being written
    Saving,
    /// Upload finished, a resource was created
    Completed,
    /// Upload failed; `UploadProgress::error` carries the reason
    Error,
}

impl UploadStage {
    /// Whether this stage ends the session. Once a terminal stage is
    /// observed, no further state updates are published for the session.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

impl fmt::Display for UploadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Validating => "validating",
            Self::Uploading => "uploading",
            Self::Processing => "processing",
            Self::Saving => "saving",
            Self::Completed => "completed",
            Self::Error => "error",
        })
    }
}

/// Snapshot returned by one progress poll
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadProgress {
    /// Current stage
    pub stage: UploadStage,
    /// Completion percentage, trusted from the server
    #[serde(default)]
    pub progress: f64,
    /// Bytes transferred so far
    #[serde(default)]
    pub bytes_uploaded: u64,
    /// Total payload size in bytes
    #[serde(default)]
    pub total_bytes: u64,
    /// Server estimate of seconds remaining, when available
    #[serde(default)]
    pub estimated_time_remaining: Option<f64>,
    /// Failure reason, populated only when `stage` is `error`
    #[serde(default)]
    pub error: Option<String>,
    /// Identifier of the created resource, populated only on `completed`
    #[serde(default)]
    pub material_id: Option<String>,
}

impl UploadProgress {
    /// A synthetic terminal failure produced client-side, used when the
    /// poll loop is abandoned without the server reporting a stage.
    #[must_use]
    pub fn terminal_error(message: impl Into<String>) -> Self {
        Self {
            stage: UploadStage::Error,
            progress: 0.0,
            bytes_uploaded: 0,
            total_bytes: 0,
            estimated_time_remaining: None,
            error: Some(message.into()),
            material_id: None,
        }
    }
}

/// An accepted upload session, as returned by a start-upload endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    /// Opaque identifier assigned by the backend
    pub session_id: String,
    /// Poll path returned by the start endpoint
    #[serde(default)]
    pub progress_endpoint: Option<String>,
    /// When the client observed the session being accepted
    #[serde(default = "Utc::now")]
    pub started_at: DateTime<Utc>,
}

/// A local file staged for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePayload {
    /// Location on disk; the payload is streamed from here at send time
    pub path: PathBuf,
    /// File name sent in the multipart part
    pub file_name: String,
    /// Size in bytes
    pub size_bytes: u64,
    /// Lowercase hex SHA-256 digest of the contents
    pub sha256: String,
}

impl FilePayload {
    /// Stages `path` for upload: verifies the file is readable, records
    /// its size and content digest.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::Payload`] if the file is missing, not a
    /// regular file path, unreadable, or empty.
    pub async fn from_path(path: impl Into<PathBuf>) -> Result<Self, UploadError> {
        let path = path.into();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(ToString::to_string)
            .ok_or_else(|| UploadError::Payload(format!("not a file path: {}", path.display())))?;

        let (sha256, size_bytes) = sha256_file(&path)
            .await
            .map_err(|e| UploadError::Payload(format!("cannot read {}: {e}", path.display())))?;

        if size_bytes == 0 {
            return Err(UploadError::Payload(format!(
                "file is empty: {}",
                path.display()
            )));
        }

        Ok(Self {
            path,
            file_name,
            size_bytes,
            sha256,
        })
    }
}

/// Metadata shared by both upload kinds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadMeta {
    /// Topic the resource is attached to
    pub topic_id: String,
    /// Subject the topic belongs to
    pub subject_id: String,
    /// Display title of the resource
    pub title: String,
    /// Optional longer description
    pub description: Option<String>,
}

impl UploadMeta {
    fn validate(&self) -> Result<(), UploadError> {
        for (field, value) in [
            ("topicId", &self.topic_id),
            ("subjectId", &self.subject_id),
            ("title", &self.title),
        ] {
            if value.trim().is_empty() {
                return Err(UploadError::InvalidRequest(format!(
                    "required field {field} is empty"
                )));
            }
        }
        Ok(())
    }
}

/// A lecture-video upload: the video payload plus an optional thumbnail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoUpload {
    /// Association metadata
    pub meta: UploadMeta,
    /// The video file
    pub video: FilePayload,
    /// Optional poster image
    pub thumbnail: Option<FilePayload>,
}

/// A study-material upload (document, worksheet, slide deck)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterialUpload {
    /// Association metadata
    pub meta: UploadMeta,
    /// The material file
    pub material: FilePayload,
}

/// Which upload flow a request belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    /// Lecture video
    Video,
    /// Study material
    Material,
}

impl UploadKind {
    /// Path of the start-upload endpoint for this kind
    #[must_use]
    pub const fn start_path(self) -> &'static str {
        match self {
            Self::Video => "/library/content/upload-video/start",
            Self::Material => "/library/content/upload-material/start",
        }
    }

    /// Cached listings that become stale when an upload of this kind
    /// completes
    #[must_use]
    pub const fn invalidation_scopes(self) -> &'static [QueryScope] {
        &[
            QueryScope::TopicMaterials,
            QueryScope::ChapterContents,
            QueryScope::ClassResources,
        ]
    }
}

/// A validated-on-begin upload request, either kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadRequest {
    /// Lecture-video upload
    Video(VideoUpload),
    /// Study-material upload
    Material(MaterialUpload),
}

impl UploadRequest {
    /// The flow this request belongs to
    #[must_use]
    pub const fn kind(&self) -> UploadKind {
        match self {
            Self::Video(_) => UploadKind::Video,
            Self::Material(_) => UploadKind::Material,
        }
    }

    /// Shared association metadata
    #[must_use]
    pub const fn meta(&self) -> &UploadMeta {
        match self {
            Self::Video(v) => &v.meta,
            Self::Material(m) => &m.meta,
        }
    }

    /// Display title of the resource being uploaded
    #[must_use]
    pub fn title(&self) -> &str {
        &self.meta().title
    }

    /// Checks required fields before any network traffic happens.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::InvalidRequest`] when a required association
    /// identifier or the title is blank.
    pub fn validate(&self) -> Result<(), UploadError> {
        self.meta().validate()
    }
}
