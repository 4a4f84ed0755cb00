//! Delivery dispatcher: pushes a finished artifact to the chat.
//!
//! Transports are tried in order. A transport whose size limit the file
//! exceeds is skipped. Each attempt sends with the media-specific method first
//! and falls back to a plain document on the same transport. When nothing
//! delivers the file, a text notification describing it is sent instead.
//!
//! Plain text has its own transport order: the Bot API first, MTProto only
//! as a fallback.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::core::config::{split_tgram_token, DeliveryConfig};
use crate::core::error::{AppError, AppResult};
use crate::download::task::Task;
use crate::telegram::bot_api::BotApiTransport;
use crate::telegram::media::{classify, MediaKind};
use crate::telegram::mtproto::MtProtoTransport;
use crate::telegram::notifications::{self, NotificationReason};
use crate::telegram::transport::Transport;

/// Steps the dispatcher walks through for one artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchState {
    NotAttempted,
    Attempting(String),
    Delivered(String),
    Failed(String),
    NotificationOnly,
}

impl fmt::Display for DispatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchState::NotAttempted => write!(f, "not_attempted"),
            DispatchState::Attempting(t) => write!(f, "attempting({})", t),
            DispatchState::Delivered(t) => write!(f, "delivered({})", t),
            DispatchState::Failed(t) => write!(f, "failed({})", t),
            DispatchState::NotificationOnly => write!(f, "notification_only"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    /// Every state visited, starting with `NotAttempted`
    pub trail: Vec<DispatchState>,
    pub kind: MediaKind,
    pub file_size: u64,
    /// Whether the fallback text message went out
    pub notification_sent: bool,
}

impl DeliveryOutcome {
    pub fn final_state(&self) -> &DispatchState {
        self.trail.last().unwrap_or(&DispatchState::NotAttempted)
    }

    /// Name of the transport that delivered the file, if any.
    pub fn delivered_by(&self) -> Option<&str> {
        match self.final_state() {
            DispatchState::Delivered(name) => Some(name),
            _ => None,
        }
    }

    pub fn trail_summary(&self) -> String {
        self.trail.iter().map(|s| s.to_string()).collect::<Vec<_>>().join(" → ")
    }
}

/// `<8-10 digit bot id>:<35 character secret>`
static BOT_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{8,10}:[A-Za-z0-9_-]{35}$").expect("bot token regex"));

/// Checks the shape of a bot token, accepting the `tgram://TOKEN/CHAT` form.
pub fn validate_bot_token(raw: &str) -> Result<String, String> {
    let (token, _) = split_tgram_token(raw.trim());
    if BOT_TOKEN_RE.is_match(&token) {
        return Ok(token);
    }
    let detail = match token.split_once(':') {
        None => "missing the ':' separator".to_string(),
        Some((id, _)) if !(8..=10).contains(&id.len()) || !id.chars().all(|c| c.is_ascii_digit()) => {
            format!("bot id '{}' should be 8-10 digits", id)
        }
        Some((_, secret)) => format!("secret should be 35 characters, got {}", secret.chars().count()),
    };
    Err(format!("Malformed bot token: {}", detail))
}

/// Result of `DeliveryDispatcher::test_connection`.
#[derive(Debug, Clone)]
pub struct ConnectionReport {
    /// Per transport: the account name it reported, or why it failed
    pub transports: Vec<(String, Result<String, String>)>,
    pub test_message_sent: bool,
}

impl ConnectionReport {
    pub fn is_ok(&self) -> bool {
        self.test_message_sent && self.transports.iter().any(|(_, r)| r.is_ok())
    }
}

pub struct DeliveryDispatcher {
    transports: Vec<Arc<dyn Transport>>,
    text_transports: Vec<Arc<dyn Transport>>,
}

impl DeliveryDispatcher {
    /// Files and text both go through `transports` in order.
    pub fn new(transports: Vec<Arc<dyn Transport>>) -> Self {
        Self {
            text_transports: transports.clone(),
            transports,
        }
    }

    /// Overrides the order used for plain text messages.
    pub fn with_text_transports(mut self, text_transports: Vec<Arc<dyn Transport>>) -> Self {
        self.text_transports = text_transports;
        self
    }

    /// Builds the transport chains. Files try MTProto first when the identity
    /// pair is configured, then the Bot API. Text goes the other way round.
    pub fn from_config(config: &DeliveryConfig) -> AppResult<Self> {
        let bot: Arc<dyn Transport> = Arc::new(BotApiTransport::new(config)?);
        let mtproto: Option<Arc<dyn Transport>> = if config.has_mtproto() {
            match MtProtoTransport::new(config) {
                Ok(t) => Some(Arc::new(t)),
                Err(e) => {
                    log::warn!("⚠️ MTProto transport disabled: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let mut files = Vec::new();
        let mut text = vec![Arc::clone(&bot)];
        if let Some(mtproto) = mtproto {
            files.push(Arc::clone(&mtproto));
            text.push(mtproto);
        }
        files.push(bot);

        log::info!(
            "Delivery chain: files {}, text {}",
            files.iter().map(|t| t.name()).collect::<Vec<_>>().join(" → "),
            text.iter().map(|t| t.name()).collect::<Vec<_>>().join(" → ")
        );
        Ok(Self::new(files).with_text_transports(text))
    }

    /// Runs every transport's `start` hook. Failures are logged, not fatal.
    pub async fn start(&self) {
        for transport in &self.transports {
            if let Err(e) = transport.start().await {
                log::warn!("⚠️ Transport {} failed to start: {}", transport.name(), e);
            }
        }
    }

    pub async fn stop(&self) {
        for transport in &self.transports {
            transport.stop().await;
        }
    }

    pub fn transport_names(&self) -> Vec<&str> {
        self.transports.iter().map(|t| t.name()).collect()
    }

    pub fn text_transport_names(&self) -> Vec<&str> {
        self.text_transports.iter().map(|t| t.name()).collect()
    }

    /// Verifies every transport and sends a test message.
    pub async fn test_connection(&self) -> ConnectionReport {
        let mut transports = Vec::with_capacity(self.transports.len());
        for transport in &self.transports {
            let result = transport.verify().await.map_err(|e| e.to_string());
            match &result {
                Ok(account) => log::info!("✅ {} connected as {}", transport.name(), account),
                Err(e) => log::warn!("⚠️ {} check failed: {}", transport.name(), e),
            }
            transports.push((transport.name().to_string(), result));
        }

        let test_message_sent = self.send_text("🧪 Telegram connection test\n\n✅ Connected").await;
        ConnectionReport {
            transports,
            test_message_sent,
        }
    }

    /// Delivers the artifact of a completed task.
    ///
    /// Transport failures never surface as errors: they end in a
    /// `NotificationOnly` outcome. Errors are reserved for a task with no
    /// artifact to deliver.
    pub async fn deliver(&self, task: &Task) -> AppResult<DeliveryOutcome> {
        let path = task
            .file_path
            .as_deref()
            .ok_or_else(|| AppError::ArtifactNotReady(task.id.clone()))?;
        let file_size = match tokio::fs::metadata(path).await {
            Ok(meta) => meta.len(),
            Err(_) => {
                return Err(AppError::ArtifactMissing {
                    task_id: task.id.clone(),
                    path: path.display().to_string(),
                })
            }
        };

        let kind = classify(path).await;
        let caption = notifications::file_caption(task, path, file_size);
        let mut trail = vec![DispatchState::NotAttempted];
        let mut attempted = false;

        for transport in &self.transports {
            let name = transport.name().to_string();
            if file_size > transport.max_file_size() {
                log::info!(
                    "Skipping {} for task {}: {} bytes exceeds limit {}",
                    name,
                    task.short_id(),
                    file_size,
                    transport.max_file_size()
                );
                continue;
            }

            attempted = true;
            trail.push(DispatchState::Attempting(name.clone()));
            match send_with_fallback(transport.as_ref(), kind, path, &caption).await {
                Ok(()) => {
                    log::info!("✅ Task {} delivered via {} as {}", task.short_id(), name, kind);
                    trail.push(DispatchState::Delivered(name));
                    return Ok(DeliveryOutcome {
                        trail,
                        kind,
                        file_size,
                        notification_sent: false,
                    });
                }
                Err(e) => {
                    log::warn!("⚠️ Delivery via {} failed for task {}: {}", name, task.short_id(), e);
                    trail.push(DispatchState::Failed(name));
                }
            }
        }

        let reason = if attempted {
            NotificationReason::SendFailed
        } else {
            NotificationReason::TooLarge
        };
        let message = notifications::notification_message(task, path, file_size, reason);
        let notification_sent = self.send_text(&message).await;
        trail.push(DispatchState::NotificationOnly);

        Ok(DeliveryOutcome {
            trail,
            kind,
            file_size,
            notification_sent,
        })
    }

    pub async fn notify_started(&self, task: &Task) -> bool {
        self.send_text(&notifications::started_message(task)).await
    }

    pub async fn notify_failed(&self, task: &Task) -> bool {
        self.send_text(&notifications::failed_message(task)).await
    }

    /// Sends text through the first text transport that accepts it.
    pub async fn send_text(&self, text: &str) -> bool {
        for transport in &self.text_transports {
            match transport.send_text(text).await {
                Ok(()) => return true,
                Err(e) => log::warn!("⚠️ Text message via {} failed: {}", transport.name(), e),
            }
        }
        log::error!("❌ No transport could send the text message");
        false
    }
}

async fn send_with_fallback(transport: &dyn Transport, kind: MediaKind, path: &Path, caption: &str) -> AppResult<()> {
    match transport.send_file(kind, path, caption).await {
        Ok(()) => Ok(()),
        Err(e) if kind != MediaKind::Document => {
            log::warn!("{} send as {} rejected ({}), retrying as document", transport.name(), kind, e);
            transport.send_file(MediaKind::Document, path, caption).await
        }
        Err(e) => Err(e),
    }
}
