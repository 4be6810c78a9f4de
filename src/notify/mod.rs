//! User-facing notifications for terminal upload outcomes.
//!
//! The web dashboards surface these as toast pop-ups; here the default
//! implementation writes structured log lines. The trait exists so the
//! upload runner can be tested against a recording fake.

use tracing::{error, info};

/// A terminal-outcome notification for one upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// The upload reached the `completed` stage
    UploadCompleted {
        /// Title the upload was submitted with
        title: String,
        /// Identifier of the created resource, when the backend reports one
        material_id: Option<String>,
    },
    /// The upload reached the `error` stage or polling was abandoned
    UploadFailed {
        /// Title the upload was submitted with
        title: String,
        /// Human-readable failure message
        message: String,
    },
}

/// Sink for terminal upload notifications
pub trait Notify: Send + Sync {
    /// Publishes a notification. Fire-and-forget: implementations must not fail.
    fn notify(&self, notification: Notification);
}

/// Notifier that reports outcomes through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notify for LogNotifier {
    fn notify(&self, notification: Notification) {
        match notification {
            Notification::UploadCompleted { title, material_id } => {
                info!(title = %title, material_id = ?material_id, "upload completed");
            }
            Notification::UploadFailed { title, message } => {
                error!(title = %title, message = %message, "upload failed");
            }
        }
    }
}
