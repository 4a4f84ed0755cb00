//! MTProto transport built on grammers.
//!
//! Signs in with the bot token plus the application identity pair (api id/hash),
//! which lifts the upload ceiling to 2 GB. The client is connected lazily on
//! first use and shared by every send afterwards. Connecting and every send run
//! under a deadline. A failed connect is remembered for a cooldown period so
//! callers fail fast instead of queueing behind another handshake.

use async_trait::async_trait;
use grammers_client::types::Attribute;
use grammers_client::{Client, Config, InitParams, InputMessage};
use grammers_session::{PackedChat, PackedType, Session};
use std::path::{Path, PathBuf};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::core::config::{self, DeliveryConfig};
use crate::core::error::{AppError, AppResult};
use crate::telegram::media::MediaKind;
use crate::telegram::transport::Transport;

#[derive(Error, Debug)]
pub enum MtProtoError {
    #[error("MTProto client error: {0}")]
    Invocation(#[from] grammers_mtsender::InvocationError),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Sign-in failed: {0}")]
    SignIn(String),

    #[error("Upload failed: {0}")]
    Upload(#[from] std::io::Error),

    #[error("Invalid chat id: {0}")]
    InvalidChat(String),

    #[error("MTProto credentials are incomplete")]
    MissingCredentials,

    #[error("{0} timed out after {1:?}")]
    Timeout(&'static str, Duration),

    #[error("MTProto unavailable for another {0}s after a failed connect: {1}")]
    CoolingDown(u64, String),
}

impl From<MtProtoError> for AppError {
    fn from(err: MtProtoError) -> Self {
        AppError::Delivery(format!("MTProto error: {}", err))
    }
}

/// Maps a Bot-API-style chat id to the packed form grammers addresses.
///
/// `-100XXXX` is a channel/supergroup, other negatives are basic groups,
/// positives are users. No access hash is known for ids obtained this way,
/// which works for chats the bot has already seen.
pub fn packed_chat(chat_id: &str) -> Result<PackedChat, MtProtoError> {
    let raw: i64 = chat_id
        .trim()
        .parse()
        .map_err(|_| MtProtoError::InvalidChat(chat_id.to_string()))?;

    let packed = if let Some(channel) = chat_id.trim().strip_prefix("-100") {
        let id = channel
            .parse()
            .map_err(|_| MtProtoError::InvalidChat(chat_id.to_string()))?;
        PackedChat {
            ty: PackedType::Megagroup,
            id,
            access_hash: None,
        }
    } else if raw < 0 {
        PackedChat {
            ty: PackedType::Chat,
            id: -raw,
            access_hash: None,
        }
    } else {
        PackedChat {
            ty: PackedType::User,
            id: raw,
            access_hash: None,
        }
    };
    Ok(packed)
}

pub struct MtProtoTransport {
    api_id: i32,
    api_hash: String,
    bot_token: String,
    chat_id: String,
    session_path: PathBuf,
    max_file_size: u64,
    connect_timeout: Duration,
    retry_cooldown: Duration,
    client: Mutex<ClientSlot>,
}

enum ClientSlot {
    Empty,
    Connected(Arc<Client>),
    Failed { at: Instant, reason: String },
}

/// Runs `fut` under `limit`, mapping expiry to `MtProtoError::Timeout`.
async fn deadline<T>(
    what: &'static str,
    limit: Duration,
    fut: impl Future<Output = Result<T, MtProtoError>>,
) -> Result<T, MtProtoError> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(MtProtoError::Timeout(what, limit)),
    }
}

impl MtProtoTransport {
    pub fn new(config: &DeliveryConfig) -> Result<Self, MtProtoError> {
        let (api_id, api_hash) = match (config.api_id, config.api_hash.as_deref()) {
            (Some(id), Some(hash)) if !hash.is_empty() => (id, hash.to_string()),
            _ => return Err(MtProtoError::MissingCredentials),
        };
        Ok(Self {
            api_id,
            api_hash,
            bot_token: config.bot_token.clone(),
            chat_id: config.chat_id.clone(),
            session_path: config.session_path.clone(),
            max_file_size: config.mtproto_max_size,
            connect_timeout: config.mtproto_connect_timeout,
            retry_cooldown: config.mtproto_retry_cooldown,
            client: Mutex::new(ClientSlot::Empty),
        })
    }

    /// Shared client, connecting on first use.
    ///
    /// The slot lock is held for at most `connect_timeout`. Within the
    /// cooldown after a failure no new attempt is made.
    async fn get_or_create_client(&self) -> Result<Arc<Client>, MtProtoError> {
        let mut slot = self.client.lock().await;
        match &*slot {
            ClientSlot::Connected(client) => return Ok(Arc::clone(client)),
            ClientSlot::Failed { at, reason } => {
                let elapsed = at.elapsed();
                if elapsed < self.retry_cooldown {
                    let remaining = (self.retry_cooldown - elapsed).as_secs().max(1);
                    return Err(MtProtoError::CoolingDown(remaining, reason.clone()));
                }
            }
            ClientSlot::Empty => {}
        }

        match deadline("MTProto connect", self.connect_timeout, self.connect()).await {
            Ok(client) => {
                let client = Arc::new(client);
                *slot = ClientSlot::Connected(Arc::clone(&client));
                Ok(client)
            }
            Err(e) => {
                log::warn!("⚠️ MTProto connect failed, pausing retries for {:?}: {}", self.retry_cooldown, e);
                *slot = ClientSlot::Failed {
                    at: Instant::now(),
                    reason: e.to_string(),
                };
                Err(e)
            }
        }
    }

    async fn connect(&self) -> Result<Client, MtProtoError> {
        let session = if self.session_path.exists() {
            log::info!("Loading MTProto session from {:?}", self.session_path);
            Session::load_file(&self.session_path)
                .map_err(|e| MtProtoError::Session(format!("Failed to load session: {}", e)))?
        } else {
            Session::new()
        };

        let config = Config {
            session,
            api_id: self.api_id,
            api_hash: self.api_hash.clone(),
            params: InitParams {
                device_model: "vidrelay".to_string(),
                system_version: "1.0".to_string(),
                app_version: env!("CARGO_PKG_VERSION").to_string(),
                system_lang_code: "en".to_string(),
                lang_code: "en".to_string(),
                ..Default::default()
            },
        };

        log::info!("Connecting to Telegram over MTProto...");
        let client = Client::connect(config)
            .await
            .map_err(|e| MtProtoError::Session(format!("Failed to connect: {}", e)))?;

        if !client.is_authorized().await? {
            client
                .bot_sign_in(&self.bot_token)
                .await
                .map_err(|e| MtProtoError::SignIn(e.to_string()))?;
            self.save_session(&client)?;
            log::info!("✅ MTProto bot signed in, session saved to {:?}", self.session_path);
        }
        Ok(client)
    }

    fn save_session(&self, client: &Client) -> Result<(), MtProtoError> {
        if let Some(parent) = self.session_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| MtProtoError::Session(format!("Failed to create session directory: {}", e)))?;
            }
        }
        // save_to_file writes into an existing file
        if !self.session_path.exists() {
            std::fs::File::create(&self.session_path)
                .map_err(|e| MtProtoError::Session(format!("Failed to create session file: {}", e)))?;
        }
        client
            .session()
            .save_to_file(&self.session_path)
            .map_err(|e| MtProtoError::Session(format!("Failed to save session: {}", e)))
    }

    async fn send(&self, kind: MediaKind, path: &Path, caption: &str) -> Result<(), MtProtoError> {
        let chat = packed_chat(&self.chat_id)?;
        let client = self.get_or_create_client().await?;

        log::info!("📤 MTProto upload ({}): {}", kind, path.display());
        let uploaded = deadline("MTProto upload", config::network::upload_timeout(), async {
            Ok(client.upload_file(path).await?)
        })
        .await?;

        let message = InputMessage::text(caption);
        let message = match kind {
            MediaKind::Photo => message.photo(uploaded),
            MediaKind::Video => message.document(uploaded).attribute(Attribute::Video {
                round_message: false,
                supports_streaming: true,
                duration: Duration::ZERO,
                w: 0,
                h: 0,
            }),
            MediaKind::Audio => message.document(uploaded).attribute(Attribute::Audio {
                duration: Duration::ZERO,
                title: None,
                performer: None,
            }),
            MediaKind::Document => message.document(uploaded),
        };

        deadline("MTProto send", config::network::timeout(), async {
            client.send_message(chat, message).await?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl Transport for MtProtoTransport {
    fn name(&self) -> &str {
        "mtproto"
    }

    fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    async fn send_file(&self, kind: MediaKind, path: &Path, caption: &str) -> AppResult<()> {
        Ok(self.send(kind, path, caption).await?)
    }

    async fn send_text(&self, text: &str) -> AppResult<()> {
        let chat = packed_chat(&self.chat_id)?;
        let client = self.get_or_create_client().await?;
        deadline("MTProto send", config::network::timeout(), async {
            client.send_message(chat, InputMessage::text(text)).await?;
            Ok(())
        })
        .await?;
        Ok(())
    }

    /// Connects and asks the server who we are.
    async fn verify(&self) -> AppResult<String> {
        let client = self.get_or_create_client().await?;
        let me = deadline("MTProto get_me", config::network::timeout(), async { Ok(client.get_me().await?) }).await?;
        Ok(match me.username() {
            Some(username) => format!("@{}", username),
            None => me.first_name().to_string(),
        })
    }

    /// Connects eagerly so the first send does not pay for the handshake.
    async fn start(&self) -> AppResult<()> {
        self.get_or_create_client().await?;
        Ok(())
    }

    /// Drops the shared client and any remembered failure. The next send reconnects.
    async fn stop(&self) {
        let mut slot = self.client.lock().await;
        if let ClientSlot::Connected(client) = std::mem::replace(&mut *slot, ClientSlot::Empty) {
            if let Err(e) = self.save_session(&client) {
                log::warn!("⚠️ Failed to persist MTProto session: {}", e);
            }
            log::info!("MTProto client stopped");
        }
    }
}
