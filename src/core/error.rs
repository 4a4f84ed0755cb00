use thiserror::Error;

use crate::download::cookies::CookieError;

/// Centralized error types for the application
///
/// All errors in the orchestration and delivery pipeline are converted to this enum
/// for consistent handling. The variant decides what happens to the task:
///
/// - `Validation` is raised before a task exists and never reaches the store.
/// - `Extraction` and `Credentials` turn the task `failed`.
/// - `ResolutionAmbiguity` keeps the task `completed` with no file reference.
/// - `Delivery` is only ever logged; it never changes task status.
///
/// # Example
///
/// ```no_run
/// use vidrelay::core::error::AppError;
///
/// fn handle_error(err: AppError) {
///     eprintln!("Error: {}", err);
/// }
/// ```
#[derive(Error, Debug)]
pub enum AppError {
    /// Input rejected before a task was created
    #[error("Validation error: {0}")]
    Validation(String),

    /// The extraction capability reported a failure (message kept verbatim)
    #[error("{0}")]
    Extraction(String),

    /// No usable credential bundle for the URL's platform
    #[error(transparent)]
    Credentials(#[from] CookieError),

    /// Extraction succeeded but no artifact could be located on disk
    #[error("Download finished but no output file was found in {0}")]
    ResolutionAmbiguity(String),

    /// Transport failure while pushing an artifact to the messaging service
    #[error("Delivery error: {0}")]
    Delivery(String),

    /// Unknown task id
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// Task exists but has no artifact yet (still running, failed, or unresolved)
    #[error("Task {0} has no artifact available")]
    ArtifactNotReady(String),

    /// The artifact was resolved once but is gone now (retention sweep, manual removal)
    #[error("Artifact for task {task_id} no longer exists at {path}")]
    ArtifactMissing { task_id: String, path: String },

    /// HTTP errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// URL parsing errors
    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),
}

/// Type alias for Result with AppError
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Short machine-readable category, used in log lines.
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation",
            AppError::Extraction(_) => "extraction",
            AppError::Credentials(_) => "credentials",
            AppError::ResolutionAmbiguity(_) => "resolution",
            AppError::Delivery(_) => "delivery",
            AppError::TaskNotFound(_) => "task_not_found",
            AppError::ArtifactNotReady(_) => "artifact_not_ready",
            AppError::ArtifactMissing { .. } => "artifact_missing",
            AppError::Http(_) => "http",
            AppError::Json(_) => "json",
            AppError::Io(_) => "io",
            AppError::Url(_) => "url",
        }
    }
}
