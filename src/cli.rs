use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "vidrelay")]
#[command(author, version, about = "Download media with yt-dlp and relay it to Telegram", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download a URL through the worker queue and wait for it to finish
    Download {
        /// Media URL (http or https)
        url: String,

        /// Output format: best, mp4, webm, mkv
        #[arg(short, long)]
        format: Option<String>,

        /// Video quality: best, 1080p, 720p, 480p, 360p
        #[arg(short, long)]
        quality: Option<String>,

        /// Extract audio only
        #[arg(long)]
        audio_only: bool,

        /// Send the result to the configured Telegram chat
        #[arg(long)]
        send: bool,
    },

    /// Manage stored cookie bundles
    Cookies {
        #[command(subcommand)]
        action: CookiesAction,
    },

    /// Show which cookie bundle a URL would use
    ResolveCookies {
        /// Media URL
        url: String,
    },

    /// Check the Telegram credentials and send a test message
    TelegramTest,
}

#[derive(Subcommand)]
pub enum CookiesAction {
    /// Import a browser export (JSON) or Netscape cookie file
    Import {
        /// Path to the cookie file
        file: String,
    },

    /// Show per-platform bundle status
    Status,

    /// List the cookies of one platform bundle
    Inspect {
        /// youtube, twitter, instagram, tiktok or bilibili
        platform: String,
    },

    /// Drop expired cookies from one platform bundle
    Clean { platform: String },

    /// Delete one platform bundle
    Delete { platform: String },

    /// Try every bundle with an auth cookie against its platform
    Test,

    /// Copy every bundle into a named backup
    Backup {
        /// Backup name (default: cookies_backup_<timestamp>)
        #[arg(long)]
        name: Option<String>,
    },

    /// List backups, newest first
    Backups,

    /// Restore bundles from a backup
    Restore { name: String },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
