//! Cookie validity check: runs yt-dlp with each bundle against a known page.
//!
//! Only bundles carrying an auth cookie are exercised; the others are reported
//! as skipped. yt-dlp's stderr decides the verdict when the run fails.

use std::fmt;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

use crate::download::cookies::{CookieError, CookieStore, Platform};

/// Deadline for one yt-dlp run
pub const CHECK_TIMEOUT_SECS: u64 = 60;

/// Characters of stderr kept in a failure verdict
const STDERR_EXCERPT: usize = 300;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieValidity {
    Valid(String),
    Invalid(String),
    /// Not exercised (no auth cookie in the bundle)
    Skipped(String),
}

impl CookieValidity {
    pub fn is_valid(&self) -> bool {
        matches!(self, CookieValidity::Valid(_))
    }
}

impl fmt::Display for CookieValidity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CookieValidity::Valid(msg) => write!(f, "valid: {}", msg),
            CookieValidity::Invalid(msg) => write!(f, "invalid: {}", msg),
            CookieValidity::Skipped(msg) => write!(f, "skipped: {}", msg),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlatformCheck {
    pub platform: Platform,
    pub validity: CookieValidity,
}

/// Page each platform's cookies are tried against.
pub fn check_url(platform: Platform) -> &'static str {
    match platform {
        Platform::Youtube => "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
        Platform::Twitter => "https://x.com/elonmusk",
        Platform::Instagram => "https://www.instagram.com/",
        Platform::Tiktok => "https://www.tiktok.com/",
        Platform::Bilibili => "https://www.bilibili.com/",
    }
}

/// Turns a failed yt-dlp run into a verdict.
///
/// Some failures say nothing about the cookies themselves: X answers 403/404
/// for anonymous pages, and an unavailable video still proves the session
/// was accepted.
pub fn interpret_failure(platform: Platform, stderr: &str) -> CookieValidity {
    let lower = stderr.to_lowercase();

    if platform == Platform::Twitter {
        if stderr.contains("HTTP Error 403") && stderr.contains("Forbidden") {
            return CookieValidity::Valid("403 on the check page, session accepted".into());
        }
        if stderr.contains("HTTP Error 404") {
            return CookieValidity::Valid("check page missing, session accepted".into());
        }
        if stderr.contains("Unable to extract") && lower.contains("twitter") {
            return CookieValidity::Valid("content restricted, session accepted".into());
        }
    }

    if stderr.contains("Sign in to confirm you're not a bot") || lower.contains("bot") {
        return CookieValidity::Invalid("bot check triggered, refresh the cookies".into());
    }
    if stderr.contains("Private video") || stderr.contains("Video unavailable") {
        return CookieValidity::Valid("check content unavailable, session accepted".into());
    }
    if stderr.contains("HTTP Error 403") {
        return CookieValidity::Invalid("403 Forbidden, cookies expired or revoked".into());
    }

    let excerpt: String = stderr.trim().chars().take(STDERR_EXCERPT).collect();
    if excerpt.is_empty() {
        CookieValidity::Invalid("yt-dlp failed without output".into())
    } else {
        CookieValidity::Invalid(excerpt)
    }
}

/// Runs yt-dlp once with `bundle` against the platform's check page.
pub async fn check_bundle(ytdl_bin: &str, platform: Platform, bundle: &Path, limit: Duration) -> CookieValidity {
    let url = check_url(platform);
    log::info!("🧪 Checking {} cookies against {}", platform, url);

    let mut cmd = Command::new(ytdl_bin);
    cmd.arg("--cookies")
        .arg(bundle)
        .arg("--dump-json")
        .arg("--no-warnings")
        .arg("--skip-download")
        .arg("--no-playlist")
        .arg(url)
        .kill_on_drop(true);

    let output = match timeout(limit, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => return CookieValidity::Invalid(format!("could not run {}: {}", ytdl_bin, e)),
        Err(_) => return CookieValidity::Invalid(format!("check timed out after {:?}", limit)),
    };

    if output.status.success() {
        let title = serde_json::from_slice::<serde_json::Value>(&output.stdout)
            .ok()
            .and_then(|v| v.get("title").and_then(|t| t.as_str()).map(str::to_string));
        return CookieValidity::Valid(match title {
            Some(title) => format!("fetched '{}'", title),
            None => "yt-dlp accepted the session".to_string(),
        });
    }

    interpret_failure(platform, &String::from_utf8_lossy(&output.stderr))
}

/// Checks every existing bundle. Fails when there is nothing to check.
pub async fn check_all(store: &CookieStore, ytdl_bin: &str, limit: Duration) -> Result<Vec<PlatformCheck>, CookieError> {
    let present: Vec<_> = store.status().await.into_iter().filter(|s| s.exists).collect();
    if present.is_empty() {
        return Err(CookieError::CredentialsUnavailable("any".to_string()));
    }

    let mut checks = Vec::with_capacity(present.len());
    for status in present {
        let validity = if status.has_auth {
            check_bundle(ytdl_bin, status.platform, &status.path, limit).await
        } else {
            CookieValidity::Skipped(format!("no auth cookie ({})", status.platform.auth_cookies().join(" / ")))
        };
        match &validity {
            CookieValidity::Valid(_) => log::info!("✅ {} cookies {}", status.platform, validity),
            CookieValidity::Invalid(_) => log::warn!("❌ {} cookies {}", status.platform, validity),
            CookieValidity::Skipped(_) => log::info!("⏭️ {} cookies {}", status.platform, validity),
        }
        checks.push(PlatformCheck {
            platform: status.platform,
            validity,
        });
    }
    Ok(checks)
}
