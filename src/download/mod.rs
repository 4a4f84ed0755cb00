//! Download management: tasks, queue, extraction and artifact resolution

pub mod cookie_backup;
pub mod cookie_check;
pub mod cookies;
pub mod options;
pub mod progress;
pub mod queue;
pub mod resolver;
pub mod source;
pub mod store;
pub mod task;

// Re-exports for convenience
pub use cookie_backup::BackupInfo;
pub use cookie_check::{CookieValidity, PlatformCheck};
pub use cookies::{CookieError, CookieRouter, CookieStore, Platform};
pub use options::DownloadOptions;
pub use queue::DownloadOrchestrator;
pub use source::{ExtractionSource, YtDlpSource};
pub use store::TaskStore;
pub use task::{Task, TaskId, TaskStatus};
