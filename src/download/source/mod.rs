//! Extraction backend abstraction.
//!
//! The orchestrator talks to media extraction through the `ExtractionSource`
//! trait so workers can be tested against fakes. The built-in backend is
//! `YtDlpSource`, which drives the yt-dlp binary.

pub mod ytdlp;

use crate::core::error::AppError;
use crate::download::options::DownloadOptions;
use crate::download::progress::ProgressInfo;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tokio::sync::mpsc;
use url::Url;

pub use ytdlp::YtDlpSource;

/// Progress information emitted during download.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceProgress {
    /// Download progress percentage (0-100)
    pub percent: f64,
    /// Download speed in bytes per second
    pub speed_bytes_sec: Option<u64>,
    /// Estimated time remaining in seconds
    pub eta_seconds: Option<u64>,
    /// Bytes downloaded so far
    pub downloaded_bytes: Option<u64>,
    /// Total bytes expected
    pub total_bytes: Option<u64>,
}

impl From<ProgressInfo> for SourceProgress {
    fn from(info: ProgressInfo) -> Self {
        Self {
            percent: info.percent,
            speed_bytes_sec: info.speed,
            eta_seconds: info.eta_seconds,
            downloaded_bytes: info.downloaded_bytes,
            total_bytes: info.total_bytes,
        }
    }
}

/// Parameters for one extraction run.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub url: Url,
    /// Directory the artifact must land in
    pub output_dir: PathBuf,
    /// yt-dlp output template relative to `output_dir` (contains `%(ext)s`)
    pub output_template: String,
    /// Netscape cookie bundle, if one was resolved
    pub cookies: Option<PathBuf>,
    pub options: DownloadOptions,
}

/// Result of a successful extraction.
#[derive(Debug, Clone, Default)]
pub struct ExtractionOutput {
    /// Final path reported by the backend, when it knows it
    pub file_path: Option<PathBuf>,
}

/// Media extraction backend.
#[async_trait]
pub trait ExtractionSource: Send + Sync {
    /// Human-readable name of this source (e.g., "yt-dlp")
    fn name(&self) -> &str;

    /// Runs the extraction, sending progress updates through the channel.
    ///
    /// A failure is final for the task; the error message is shown to users as-is.
    async fn extract(
        &self,
        request: &ExtractionRequest,
        progress_tx: mpsc::UnboundedSender<SourceProgress>,
    ) -> Result<ExtractionOutput, AppError>;
}

/// Collision-resistant output template: `<sha256(url)[..12]>_<unix-ts>_<task[..8]>.%(ext)s`.
pub fn output_template(url: &str, created_at: DateTime<Utc>, task_id: &str) -> String {
    let digest = hex::encode(Sha256::digest(url.as_bytes()));
    let short_task: String = task_id.chars().filter(|c| *c != '-').take(8).collect();
    format!("{}_{}_{}.%(ext)s", &digest[..12], created_at.timestamp(), short_task)
}
