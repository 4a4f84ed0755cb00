//! Messaging transport abstraction.
//!
//! Each way of reaching the chat (Bot API over HTTP, MTProto) implements
//! `Transport`. The delivery dispatcher walks an ordered list of them.

use async_trait::async_trait;
use std::path::Path;

use crate::core::error::AppResult;
use crate::telegram::media::MediaKind;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name used in logs and dispatch trails (e.g. "bot_api", "mtproto")
    fn name(&self) -> &str;

    /// Largest file this transport can upload, in bytes
    fn max_file_size(&self) -> u64;

    /// Sends a file presented as `kind`.
    ///
    /// `MediaKind::Document` is the generic send every transport must support.
    async fn send_file(&self, kind: MediaKind, path: &Path, caption: &str) -> AppResult<()>;

    /// Sends a plain text message.
    async fn send_text(&self, text: &str) -> AppResult<()>;

    /// Checks that the credentials work. Returns how the account identifies itself.
    async fn verify(&self) -> AppResult<String> {
        Ok(self.name().to_string())
    }

    /// Opens long-lived connections ahead of the first send.
    async fn start(&self) -> AppResult<()> {
        Ok(())
    }

    /// Releases whatever `start` or a send opened.
    async fn stop(&self) {}
}
