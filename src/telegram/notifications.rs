//! Text built for chat messages: captions and lifecycle notifications.
//!
//! Messages are plain text (no parse mode) so filenames and error output never
//! need escaping.

use chrono::Local;
use std::path::Path;

use crate::core::utils::{format_megabytes, sanitize_filename, truncate_tail_utf8};
use crate::download::task::Task;

/// Telegram rejects messages longer than 4096 characters; stay well under it.
const MAX_ERROR_BYTES: usize = 1500;

/// Caption limit for media messages.
const MAX_CAPTION_CHARS: usize = 1024;

/// Why a file was announced instead of sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationReason {
    /// No transport accepts a file this large
    TooLarge,
    /// Every eligible transport failed
    SendFailed,
}

fn now() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn display_name(path: &Path) -> String {
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    sanitize_filename(&name)
}

/// Caption attached to a delivered file.
pub fn file_caption(task: &Task, path: &Path, size: u64) -> String {
    let caption = format!(
        "🎬 {}\n📊 {}\n🔗 {}",
        display_name(path),
        format_megabytes(size),
        task.url
    );
    caption.chars().take(MAX_CAPTION_CHARS).collect()
}

pub fn started_message(task: &Task) -> String {
    format!(
        "🚀 Download started\n\n🔗 URL: {}\n🆔 Task: {}\n⏰ Started: {}",
        task.url,
        task.id,
        now()
    )
}

pub fn failed_message(task: &Task) -> String {
    let error = task.error.as_deref().unwrap_or("unknown error");
    format!(
        "❌ Download failed\n\n🔗 URL: {}\n🆔 Task: {}\n💥 Error: {}\n⏰ Time: {}",
        task.url,
        task.id,
        truncate_tail_utf8(error, MAX_ERROR_BYTES),
        now()
    )
}

/// Text sent when the artifact itself could not be delivered.
pub fn notification_message(task: &Task, path: &Path, size: u64, reason: NotificationReason) -> String {
    let mut message = format!(
        "🎬 Download completed\n\n📁 File: {}\n📊 Size: {}\n⏰ Time: {}\n🔗 URL: {}\n",
        display_name(path),
        format_megabytes(size),
        now(),
        task.url
    );
    match reason {
        NotificationReason::TooLarge => message.push_str("\n⚠️ File is too large to send directly"),
        NotificationReason::SendFailed => message.push_str("\n❌ Sending the file failed"),
    }
    message.push_str("\nFetch it from the server instead.");
    message
}
