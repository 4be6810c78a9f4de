//! Command-line interface: argument parsing and command execution.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;

use crate::api::ApiClient;
use crate::cache::{QueryCache, QueryKey, QueryScope};
use crate::config::{Settings, QUERY_CACHE_MAX_CAPACITY, QUERY_CACHE_TTL_SECS};
use crate::notify::LogNotifier;
use crate::upload::{
    FilePayload, MaterialUpload, PollOutcome, UploadHandle, UploadMeta, UploadProgress,
    UploadRequest, UploadStage, Uploader, VideoUpload,
};
use crate::utils::{format_bytes, format_eta};

/// Upload client for the school content library
#[derive(Debug, Parser)]
#[command(name = "lectern", version, about)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Upload a lecture video to a topic
    UploadVideo {
        /// Topic the video is attached to
        #[arg(long)]
        topic: String,
        /// Subject the topic belongs to
        #[arg(long)]
        subject: String,
        /// Display title of the video
        #[arg(long)]
        title: String,
        /// Optional longer description
        #[arg(long)]
        description: Option<String>,
        /// Optional poster image
        #[arg(long)]
        thumbnail: Option<PathBuf>,
        /// Video file to upload
        video: PathBuf,
    },
    /// Upload a study material (document, worksheet, slides) to a topic
    UploadMaterial {
        /// Topic the material is attached to
        #[arg(long)]
        topic: String,
        /// Subject the topic belongs to
        #[arg(long)]
        subject: String,
        /// Display title of the material
        #[arg(long)]
        title: String,
        /// Optional longer description
        #[arg(long)]
        description: Option<String>,
        /// Material file to upload
        material: PathBuf,
    },
    /// List materials attached to a topic
    Materials {
        /// Topic to list
        #[arg(long)]
        topic: String,
    },
    /// List contents of a chapter
    Chapter {
        /// Chapter to list
        #[arg(long)]
        id: String,
    },
}

impl Cli {
    /// Executes the parsed command against the configured API.
    ///
    /// # Errors
    ///
    /// Returns an error when the command fails; upload failures carry the
    /// server-reported reason.
    pub async fn run(self, settings: &Settings) -> Result<()> {
        let api = Arc::new(ApiClient::new(settings));
        let cache = Arc::new(QueryCache::new(QUERY_CACHE_MAX_CAPACITY, QUERY_CACHE_TTL_SECS));
        let uploader = Uploader::new(api.clone(), cache.clone(), Arc::new(LogNotifier));

        match self.command {
            Command::UploadVideo {
                topic,
                subject,
                title,
                description,
                thumbnail,
                video,
            } => {
                let video = FilePayload::from_path(video).await?;
                let thumbnail = match thumbnail {
                    Some(path) => Some(FilePayload::from_path(path).await?),
                    None => None,
                };
                let request = UploadRequest::Video(VideoUpload {
                    meta: UploadMeta {
                        topic_id: topic,
                        subject_id: subject,
                        title,
                        description,
                    },
                    video,
                    thumbnail,
                });
                run_upload(&uploader, request).await
            }
            Command::UploadMaterial {
                topic,
                subject,
                title,
                description,
                material,
            } => {
                let material = FilePayload::from_path(material).await?;
                let request = UploadRequest::Material(MaterialUpload {
                    meta: UploadMeta {
                        topic_id: topic,
                        subject_id: subject,
                        title,
                        description,
                    },
                    material,
                });
                run_upload(&uploader, request).await
            }
            Command::Materials { topic } => {
                let key = QueryKey::new(QueryScope::TopicMaterials, topic.clone());
                let listing = cache
                    .get_or_fetch(key, || async { api.topic_materials(&topic).await })
                    .await?;
                println!("{}", serde_json::to_string_pretty(listing.as_ref())?);
                Ok(())
            }
            Command::Chapter { id } => {
                let key = QueryKey::new(QueryScope::ChapterContents, id.clone());
                let listing = cache
                    .get_or_fetch(key, || async { api.chapter_contents(&id).await })
                    .await?;
                println!("{}", serde_json::to_string_pretty(listing.as_ref())?);
                Ok(())
            }
        }
    }
}

async fn run_upload(uploader: &Uploader, request: UploadRequest) -> Result<()> {
    let title = request.title().to_string();
    let handle = uploader
        .begin(request)
        .await
        .context("could not start the upload")?;
    eprintln!("session {} started", handle.session().session_id);

    let outcome = render_progress(handle).await?;
    match outcome {
        PollOutcome::Terminal(progress) if progress.stage == UploadStage::Completed => {
            match progress.material_id {
                Some(material_id) => println!("{title} uploaded (resource {material_id})"),
                None => println!("{title} uploaded"),
            }
            Ok(())
        }
        PollOutcome::Terminal(progress) => {
            let reason = progress
                .error
                .unwrap_or_else(|| "upload failed".to_string());
            anyhow::bail!("upload failed: {reason}")
        }
        PollOutcome::Aborted(e) => anyhow::bail!("lost contact with the upload session: {e}"),
        PollOutcome::Cancelled => {
            println!("upload cancelled; the server may still finish processing it");
            Ok(())
        }
    }
}

/// Renders progress snapshots to a terminal bar until the poll loop
/// finishes. Ctrl-C resets the session instead of killing the process
/// mid-render.
async fn render_progress(handle: UploadHandle) -> Result<PollOutcome> {
    let bar = ProgressBar::new(100);
    bar.set_style(ProgressStyle::with_template(
        "{bar:40.cyan/blue} {pos:>3}% {msg}",
    )?);

    let mut updates = handle.progress();
    loop {
        tokio::select! {
            changed = updates.changed() => {
                // The sender side closes once the poll loop returns
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                if let Some(progress) = snapshot {
                    bar.set_position(progress.progress.clamp(0.0, 100.0) as u64);
                    bar.set_message(progress_message(&progress));
                }
            }
            _ = tokio::signal::ctrl_c() => {
                handle.reset();
                break;
            }
        }
    }
    bar.finish_and_clear();

    handle.wait().await.map_err(Into::into)
}

fn progress_message(progress: &UploadProgress) -> String {
    let mut message = progress.stage.to_string();
    if progress.total_bytes > 0 {
        message.push_str(&format!(
            " {} / {}",
            format_bytes(progress.bytes_uploaded),
            format_bytes(progress.total_bytes)
        ));
    }
    if let Some(eta) = progress.estimated_time_remaining {
        message.push_str(&format!(" (ETA {})", format_eta(eta)));
    }
    message
}
