//! vidrelay - download-task orchestration on top of yt-dlp with Telegram delivery
//!
//! A URL goes in, a bounded pool of workers runs yt-dlp for it, the produced
//! file is located on disk and optionally pushed to a Telegram chat.
//!
//! # Module Structure
//!
//! - `core`: configuration, errors, logging and small helpers
//! - `download`: tasks, the worker queue, cookies, extraction and file resolution
//! - `telegram`: delivery transports and the fallback dispatcher

pub mod cli;
pub mod core;
pub mod download;
pub mod telegram;

// Re-export commonly used types for convenience
pub use self::core::{config, AppError, AppResult};
pub use download::{DownloadOptions, DownloadOrchestrator, Task, TaskStatus};
pub use telegram::DeliveryDispatcher;
