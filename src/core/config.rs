use once_cell::sync::Lazy;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Expands `~` and returns an owned path.
fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).to_string())
}

/// Reads a boolean switch, accepting `true/false`, `1/0`, `yes/no` and `on/off`.
///
/// Unrecognised values log a warning and fall back to `default`.
pub fn parse_flag(key: &str, raw: Option<&str>, default: bool) -> bool {
    let Some(raw) = raw.map(str::trim).filter(|v| !v.is_empty()) else {
        return default;
    };
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        other => {
            log::warn!("⚠️ {}={} is not a boolean, using {}", key, other, default);
            default
        }
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Cached yt-dlp binary path
/// Read once at startup from YTDL_BIN environment variable or defaults to "yt-dlp"
pub static YTDL_BIN: Lazy<String> = Lazy::new(|| env::var("YTDL_BIN").unwrap_or_else(|_| "yt-dlp".to_string()));

/// Shared download directory
/// Read from DOWNLOAD_FOLDER environment variable
/// Default: ~/downloads. Supports tilde (~) expansion
pub static DOWNLOAD_FOLDER: Lazy<PathBuf> =
    Lazy::new(|| expand_path(&env::var("DOWNLOAD_FOLDER").unwrap_or_else(|_| "~/downloads".to_string())));

/// Directory holding per-platform cookie bundles (`<platform>_cookies.txt`)
/// Read from COOKIES_DIR environment variable
/// Default: config
pub static COOKIES_DIR: Lazy<PathBuf> =
    Lazy::new(|| expand_path(&env::var("COOKIES_DIR").unwrap_or_else(|_| "config".to_string())));

/// Platform used when a URL matches no known domain family
/// Read from DEFAULT_COOKIE_PLATFORM environment variable
/// Default: youtube
pub static DEFAULT_COOKIE_PLATFORM: Lazy<String> =
    Lazy::new(|| env::var("DEFAULT_COOKIE_PLATFORM").unwrap_or_else(|_| "youtube".to_string()));

/// Log file path
/// Read from LOG_FILE_PATH environment variable
/// Default: app.log
pub static LOG_FILE_PATH: Lazy<String> =
    Lazy::new(|| env::var("LOG_FILE_PATH").unwrap_or_else(|_| "app.log".to_string()));

/// Log level for this crate's modules (error, warn, info, debug, trace)
/// Read from LOG_LEVEL environment variable
/// Default: info
pub static LOG_LEVEL: Lazy<log::LevelFilter> = Lazy::new(|| {
    env::var("LOG_LEVEL")
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(log::LevelFilter::Info)
});

/// Queue processing configuration
pub mod queue {
    use once_cell::sync::Lazy;
    use std::env;

    /// Default number of concurrent downloads
    pub const MAX_CONCURRENT_DOWNLOADS: usize = 3;

    /// Worker pool size
    /// Read from MAX_CONCURRENT_DOWNLOADS environment variable
    pub static WORKERS: Lazy<usize> = Lazy::new(|| {
        env::var("MAX_CONCURRENT_DOWNLOADS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(MAX_CONCURRENT_DOWNLOADS)
    });
}

/// Download configuration
pub mod download {
    use super::Duration;

    /// Timeout for a single yt-dlp run (in seconds)
    pub const YTDLP_TIMEOUT_SECS: u64 = 3600;

    /// Files created up to this many seconds before the task count as its output
    pub const RESOLVE_TOLERANCE_SECS: i64 = 30;

    /// Number of stderr lines kept for the failure message
    pub const STDERR_TAIL_LINES: usize = 200;

    /// yt-dlp command timeout duration
    pub fn ytdlp_timeout() -> Duration {
        Duration::from_secs(YTDLP_TIMEOUT_SECS)
    }
}

/// Delivery (Telegram) configuration
pub mod delivery {
    use once_cell::sync::Lazy;
    use std::env;
    use std::path::PathBuf;

    /// Bot API upload limit (50 MiB)
    pub const BOT_API_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

    /// MTProto upload limit (2 GiB)
    pub const MTPROTO_MAX_FILE_SIZE: u64 = 2 * 1024 * 1024 * 1024;

    /// Default Bot API base URL
    pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

    /// Bot token
    /// Read from TELEGRAM_BOT_TOKEN, accepts the `tgram://TOKEN/CHAT` form
    pub static BOT_TOKEN: Lazy<Option<String>> = Lazy::new(|| super::env_non_empty("TELEGRAM_BOT_TOKEN"));

    /// Target chat id
    /// Read from TELEGRAM_CHAT_ID environment variable
    pub static CHAT_ID: Lazy<Option<String>> = Lazy::new(|| super::env_non_empty("TELEGRAM_CHAT_ID"));

    /// Application id from my.telegram.org (enables the MTProto transport)
    /// Read from TELEGRAM_API_ID environment variable
    pub static API_ID: Lazy<Option<i32>> =
        Lazy::new(|| super::env_non_empty("TELEGRAM_API_ID").and_then(|v| v.parse().ok()));

    /// Application hash from my.telegram.org
    /// Read from TELEGRAM_API_HASH environment variable
    pub static API_HASH: Lazy<Option<String>> = Lazy::new(|| super::env_non_empty("TELEGRAM_API_HASH"));

    /// Bot API base URL (point at a local Bot API server if you run one)
    /// Read from TELEGRAM_API_URL environment variable
    pub static API_URL: Lazy<String> =
        Lazy::new(|| super::env_non_empty("TELEGRAM_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()));

    /// MTProto session file
    /// Read from TELEGRAM_SESSION_PATH environment variable
    /// Default: config/telegram.session
    pub static SESSION_PATH: Lazy<PathBuf> = Lazy::new(|| {
        super::expand_path(&env::var("TELEGRAM_SESSION_PATH").unwrap_or_else(|_| "config/telegram.session".to_string()))
    });

    /// Master switch for delivery
    /// Read from TELEGRAM_ENABLED environment variable
    /// Default: true (delivery still needs a token and chat id)
    pub static ENABLED: Lazy<bool> =
        Lazy::new(|| super::parse_flag("TELEGRAM_ENABLED", env::var("TELEGRAM_ENABLED").ok().as_deref(), true));

    /// Deadline for the MTProto handshake and bot sign-in (in seconds)
    pub const MTPROTO_CONNECT_TIMEOUT_SECS: u64 = 30;

    /// After a failed MTProto connect, further attempts are refused for this long (in seconds)
    pub const MTPROTO_RETRY_COOLDOWN_SECS: u64 = 60;
}

/// Network configuration
pub mod network {
    use super::Duration;

    /// Request timeout for Bot API text calls (in seconds)
    pub const REQUEST_TIMEOUT_SECS: u64 = 30;

    /// Request timeout for Bot API uploads (in seconds)
    pub const UPLOAD_TIMEOUT_SECS: u64 = 300;

    /// Request timeout duration
    pub fn timeout() -> Duration {
        Duration::from_secs(REQUEST_TIMEOUT_SECS)
    }

    /// Upload timeout duration
    pub fn upload_timeout() -> Duration {
        Duration::from_secs(UPLOAD_TIMEOUT_SECS)
    }
}

/// Settings for the download orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Number of workers (tasks running at once)
    pub workers: usize,
    /// Shared download directory
    pub download_dir: PathBuf,
    /// Directory holding cookie bundles
    pub cookies_dir: PathBuf,
}

impl OrchestratorConfig {
    pub fn from_env() -> Self {
        Self {
            workers: *queue::WORKERS,
            download_dir: DOWNLOAD_FOLDER.clone(),
            cookies_dir: COOKIES_DIR.clone(),
        }
    }
}

/// Credentials and thresholds for the delivery dispatcher.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    pub bot_token: String,
    pub chat_id: String,
    pub api_url: String,
    pub api_id: Option<i32>,
    pub api_hash: Option<String>,
    pub session_path: PathBuf,
    pub bot_api_max_size: u64,
    pub mtproto_max_size: u64,
    /// Deadline for connecting and signing in over MTProto
    pub mtproto_connect_timeout: Duration,
    /// How long a failed MTProto connect is remembered
    pub mtproto_retry_cooldown: Duration,
}

impl DeliveryConfig {
    /// Builds the config from the environment.
    ///
    /// Returns `None` when delivery is disabled or the token/chat id are missing.
    pub fn from_env() -> Option<Self> {
        if !*delivery::ENABLED {
            return None;
        }
        let raw_token = delivery::BOT_TOKEN.clone()?;
        let (bot_token, chat_from_token) = split_tgram_token(&raw_token);
        let chat_id = delivery::CHAT_ID.clone().or(chat_from_token)?;

        Some(Self {
            bot_token,
            chat_id,
            api_url: delivery::API_URL.clone(),
            api_id: *delivery::API_ID,
            api_hash: delivery::API_HASH.clone(),
            session_path: delivery::SESSION_PATH.clone(),
            bot_api_max_size: delivery::BOT_API_MAX_FILE_SIZE,
            mtproto_max_size: delivery::MTPROTO_MAX_FILE_SIZE,
            mtproto_connect_timeout: Duration::from_secs(delivery::MTPROTO_CONNECT_TIMEOUT_SECS),
            mtproto_retry_cooldown: Duration::from_secs(delivery::MTPROTO_RETRY_COOLDOWN_SECS),
        })
    }

    /// Bot-API-only config with default limits.
    pub fn bot_only(bot_token: &str, chat_id: &str, api_url: &str) -> Self {
        Self {
            bot_token: bot_token.to_string(),
            chat_id: chat_id.to_string(),
            api_url: api_url.to_string(),
            api_id: None,
            api_hash: None,
            session_path: delivery::SESSION_PATH.clone(),
            bot_api_max_size: delivery::BOT_API_MAX_FILE_SIZE,
            mtproto_max_size: delivery::MTPROTO_MAX_FILE_SIZE,
            mtproto_connect_timeout: Duration::from_secs(delivery::MTPROTO_CONNECT_TIMEOUT_SECS),
            mtproto_retry_cooldown: Duration::from_secs(delivery::MTPROTO_RETRY_COOLDOWN_SECS),
        }
    }

    /// The MTProto transport needs the application identity pair on top of the bot token.
    pub fn has_mtproto(&self) -> bool {
        self.api_id.is_some() && self.api_hash.as_deref().is_some_and(|h| !h.is_empty())
    }
}

/// Splits `tgram://TOKEN/CHAT` into the bare token and the embedded chat id.
///
/// Plain tokens pass through untouched.
pub fn split_tgram_token(raw: &str) -> (String, Option<String>) {
    match raw.strip_prefix("tgram://") {
        Some(rest) => {
            let mut parts = rest.splitn(2, '/');
            let token = parts.next().unwrap_or_default().to_string();
            let chat = parts
                .next()
                .map(|c| c.trim_matches('/').to_string())
                .filter(|c| !c.is_empty());
            (token, chat)
        }
        None => (raw.to_string(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_tgram_token_with_chat() {
        let (token, chat) = split_tgram_token("tgram://123:ABC/-100200");
        assert_eq!(token, "123:ABC");
        assert_eq!(chat.as_deref(), Some("-100200"));
    }

    #[test]
    fn test_split_tgram_token_plain() {
        let (token, chat) = split_tgram_token("123:ABC");
        assert_eq!(token, "123:ABC");
        assert!(chat.is_none());
    }

    #[test]
    fn test_parse_flag_spellings() {
        for raw in ["1", "true", "YES", " on "] {
            assert!(parse_flag("TELEGRAM_ENABLED", Some(raw), false), "{}", raw);
        }
        for raw in ["0", "False", "no", "off"] {
            assert!(!parse_flag("TELEGRAM_ENABLED", Some(raw), true), "{}", raw);
        }
        assert!(parse_flag("TELEGRAM_ENABLED", None, true));
        assert!(parse_flag("TELEGRAM_ENABLED", Some(""), true));
        assert!(!parse_flag("TELEGRAM_ENABLED", Some("maybe"), false));
        assert!(parse_flag("TELEGRAM_ENABLED", Some("maybe"), true));
    }

    #[test]
    fn test_has_mtproto_requires_both_halves() {
        let mut cfg = DeliveryConfig::bot_only("t", "1", delivery::DEFAULT_API_URL);
        assert!(!cfg.has_mtproto());
        cfg.api_id = Some(12345);
        assert!(!cfg.has_mtproto());
        cfg.api_hash = Some("abcdef".into());
        assert!(cfg.has_mtproto());
    }
}
