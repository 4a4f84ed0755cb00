//! Per-platform cookie bundles for yt-dlp
//!
//! This module provides:
//! - The platform table (domain families, important and auth cookies)
//! - Netscape line-format parsing and rendering
//! - JSON browser-export conversion with expiry normalization
//! - Administrative import/status/inspect/clean/delete over `<dir>/<platform>_cookies.txt`
//! - URL → bundle routing with fallback to any existing bundle

use once_cell::sync::Lazy;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;

/// Serializes bundle writes so readers always see a complete file
pub(crate) static COOKIES_WRITE_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// First line of every generated bundle
pub const NETSCAPE_HEADER: &str = "# Netscape HTTP Cookie File";

/// Lifetime given to session cookies and cookies without an expiry
const SESSION_EXTENSION_SECS: i64 = 365 * 24 * 3600;

/// Prefix browsers use to mark HttpOnly entries in line format
const HTTP_ONLY_PREFIX: &str = "#HttpOnly_";

#[derive(Error, Debug)]
pub enum CookieError {
    #[error("Credentials unavailable: no cookie bundle found (requested platform: {0})")]
    CredentialsUnavailable(String),

    #[error("Cookie content is empty")]
    EmptyContent,

    #[error("Unrecognized cookie format (expected a JSON array or Netscape lines)")]
    UnknownFormat,

    #[error("No cookies for a supported platform were found")]
    NoRecognisedCookies,

    #[error("No {0} cookie bundle to operate on")]
    BundleMissing(Platform),

    #[error("Unknown platform: {0}")]
    UnknownPlatform(String),

    #[error("Backup not found: {0}")]
    BackupNotFound(String),

    #[error("Invalid backup name: {0}")]
    InvalidBackupName(String),

    #[error("No cookie bundles to back up")]
    NothingToBackUp,

    #[error("Backup {0} holds no restorable bundles")]
    NothingToRestore(String),

    #[error("Invalid cookie JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Cookie storage error: {0}")]
    Io(#[from] std::io::Error),
}

/// Platforms that have their own cookie bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Youtube,
    Twitter,
    Instagram,
    Tiktok,
    Bilibili,
}

impl Platform {
    /// Table order; also the order used when falling back to any existing bundle.
    pub const ALL: [Platform; 5] = [
        Platform::Youtube,
        Platform::Twitter,
        Platform::Instagram,
        Platform::Tiktok,
        Platform::Bilibili,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Youtube => "youtube",
            Platform::Twitter => "twitter",
            Platform::Instagram => "instagram",
            Platform::Tiktok => "tiktok",
            Platform::Bilibili => "bilibili",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(name.trim()))
    }

    /// Registrable domains belonging to the platform.
    pub fn domains(&self) -> &'static [&'static str] {
        match self {
            Platform::Youtube => &["youtube.com", "youtu.be", "google.com"],
            Platform::Twitter => &["twitter.com", "x.com"],
            Platform::Instagram => &["instagram.com"],
            Platform::Tiktok => &["tiktok.com"],
            Platform::Bilibili => &["bilibili.com"],
        }
    }

    /// Cookies worth reporting in status output.
    pub fn important_cookies(&self) -> &'static [&'static str] {
        match self {
            Platform::Youtube => &[
                "SID",
                "HSID",
                "SSID",
                "APISID",
                "SAPISID",
                "LOGIN_INFO",
                "VISITOR_INFO1_LIVE",
                "__Secure-1PSID",
                "__Secure-3PSID",
                "__Secure-1PAPISID",
                "__Secure-3PAPISID",
                "__Secure-1PSIDCC",
                "__Secure-3PSIDCC",
                "__Secure-1PSIDTS",
                "__Secure-3PSIDTS",
                "SIDCC",
                "CONSENT",
                "NID",
                "AEC",
            ],
            Platform::Twitter => &[
                "auth_token",
                "ct0",
                "guest_id",
                "personalization_id",
                "gt",
                "twid",
                "_twitter_sess",
                "remember_checked_on",
                "kdt",
                "dnt",
                "mbox",
            ],
            Platform::Instagram => &["sessionid", "csrftoken", "ds_user_id", "ig_did", "ig_nrcb"],
            Platform::Tiktok => &["sessionid", "sid_tt", "uid_tt", "sid_guard", "uid_guard", "ssid_ucp_v1"],
            Platform::Bilibili => &["SESSDATA", "bili_jct", "DedeUserID", "DedeUserID__ckMd5", "sid"],
        }
    }

    /// Any one of these means the bundle carries a logged-in session.
    pub fn auth_cookies(&self) -> &'static [&'static str] {
        match self {
            Platform::Youtube => &["SID", "__Secure-1PSID", "__Secure-3PSID"],
            Platform::Twitter => &["auth_token", "ct0"],
            Platform::Instagram => &["sessionid"],
            Platform::Tiktok => &["sessionid", "sid_tt"],
            Platform::Bilibili => &["SESSDATA"],
        }
    }

    /// Matches a host or cookie domain (leading dot allowed) against the table.
    ///
    /// Exact or dot-suffix match: `www.youtube.com` is youtube, `notyoutube.com` is nothing.
    pub fn from_domain(domain: &str) -> Option<Self> {
        let host = domain.trim().trim_start_matches('.').trim_end_matches('.').to_ascii_lowercase();
        if host.is_empty() {
            return None;
        }
        Self::ALL.into_iter().find(|platform| {
            platform
                .domains()
                .iter()
                .any(|d| host == *d || host.ends_with(&format!(".{}", d)))
        })
    }

    /// Platform of the URL's host, `None` for unparseable or unknown URLs.
    pub fn from_url(url: &str) -> Option<Self> {
        let parsed = url::Url::parse(url.trim()).ok()?;
        Self::from_domain(parsed.host_str()?)
    }

    pub fn bundle_file_name(&self) -> String {
        format!("{}_cookies.txt", self.as_str())
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One cookie in Netscape line form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieEntry {
    pub domain: String,
    pub include_subdomains: bool,
    pub path: String,
    pub secure: bool,
    /// Unix timestamp, 0 for session cookies
    pub expires: i64,
    pub name: String,
    pub value: String,
    pub http_only: bool,
}

impl CookieEntry {
    /// Parses a single `domain\tflag\tpath\tsecure\texpiry\tname\tvalue` line.
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let (line, http_only) = match line.strip_prefix(HTTP_ONLY_PREFIX) {
            Some(rest) => (rest, true),
            None => (line, false),
        };
        if line.trim().is_empty() || line.starts_with('#') {
            return None;
        }

        let parts: Vec<&str> = line.split('\t').collect();
        if parts.len() < 7 {
            return None;
        }

        Some(Self {
            domain: parts[0].trim().to_string(),
            include_subdomains: parts[1].eq_ignore_ascii_case("TRUE"),
            path: parts[2].to_string(),
            secure: parts[3].eq_ignore_ascii_case("TRUE"),
            expires: parts[4].trim().parse::<f64>().map(|v| v as i64).unwrap_or(0),
            name: parts[5].to_string(),
            value: parts[6..].join("\t"),
            http_only,
        })
    }

    pub fn to_netscape_line(&self) -> String {
        format!(
            "{}{}\t{}\t{}\t{}\t{}\t{}\t{}",
            if self.http_only { HTTP_ONLY_PREFIX } else { "" },
            self.domain,
            flag(self.include_subdomains),
            self.path,
            flag(self.secure),
            self.expires,
            self.name,
            sanitize_value(&self.value),
        )
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.expires > 0 && self.expires < now
    }

    pub fn platform(&self) -> Option<Platform> {
        Platform::from_domain(&self.domain)
    }
}

fn flag(value: bool) -> &'static str {
    if value {
        "TRUE"
    } else {
        "FALSE"
    }
}

/// Replaces characters that would break the line format and collapses whitespace runs.
pub fn sanitize_value(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parses Netscape content, skipping comments, blank lines and short lines.
pub fn parse_netscape(content: &str) -> Vec<CookieEntry> {
    content.lines().filter_map(CookieEntry::parse_line).collect()
}

/// Drops expired entries and gives session entries a one-year lifetime.
fn normalize_expiry(entries: Vec<CookieEntry>, now: i64) -> Vec<CookieEntry> {
    let mut dropped = 0usize;
    let kept: Vec<CookieEntry> = entries
        .into_iter()
        .filter_map(|mut entry| {
            if entry.is_expired(now) {
                log::debug!("Dropping expired cookie {} ({})", entry.name, entry.domain);
                dropped += 1;
                return None;
            }
            if entry.expires <= 0 {
                entry.expires = now + SESSION_EXTENSION_SECS;
            }
            Some(entry)
        })
        .collect();

    if dropped > 0 {
        log::info!("Dropped {} expired cookies", dropped);
    }
    kept
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonCookie {
    domain: String,
    name: String,
    #[serde(default)]
    value: String,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    secure: bool,
    #[serde(default)]
    http_only: bool,
    #[serde(default)]
    expiration_date: Option<f64>,
    #[serde(default)]
    session: bool,
}

/// Converts a browser-extension JSON export into line-format entries.
///
/// Objects without `domain`/`name` are skipped. Expired cookies are dropped;
/// session cookies and cookies without an expiry get `now + 365 days`.
pub fn convert_json_cookies(json: &str, now: i64) -> Result<Vec<CookieEntry>, CookieError> {
    let raw: Vec<serde_json::Value> = serde_json::from_str(json)?;

    let entries = raw
        .into_iter()
        .filter_map(|value| serde_json::from_value::<JsonCookie>(value).ok())
        .map(|cookie| {
            let expires = if cookie.session {
                0
            } else {
                cookie.expiration_date.map(|e| e as i64).unwrap_or(0)
            };
            CookieEntry {
                include_subdomains: cookie.domain.starts_with('.'),
                domain: cookie.domain,
                path: cookie.path.filter(|p| !p.is_empty()).unwrap_or_else(|| "/".to_string()),
                secure: cookie.secure,
                expires,
                name: cookie.name,
                value: sanitize_value(&cookie.value),
                http_only: cookie.http_only,
            }
        })
        .collect();

    Ok(normalize_expiry(entries, now))
}

/// Applies the expiry policy to line-format content, keeping comments and blank lines.
pub fn clean_netscape(content: &str, now: i64) -> String {
    let mut cleaned = Vec::new();
    for line in content.lines() {
        match CookieEntry::parse_line(line) {
            Some(entry) => {
                if let Some(entry) = normalize_expiry(vec![entry], now).pop() {
                    cleaned.push(entry.to_netscape_line());
                }
            }
            None => cleaned.push(line.to_string()),
        }
    }
    cleaned.join("\n")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CookieFormat {
    Json,
    Netscape,
    Unknown,
}

impl fmt::Display for CookieFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CookieFormat::Json => "json",
            CookieFormat::Netscape => "netscape",
            CookieFormat::Unknown => "unknown",
        })
    }
}

pub fn detect_format(content: &str) -> CookieFormat {
    let trimmed = content.trim_start();
    if serde_json::from_str::<serde_json::Value>(trimmed).is_ok() {
        return CookieFormat::Json;
    }
    if trimmed.starts_with(NETSCAPE_HEADER) {
        return CookieFormat::Netscape;
    }
    if content.contains('\t') && content.lines().any(|l| CookieEntry::parse_line(l).is_some()) {
        return CookieFormat::Netscape;
    }
    CookieFormat::Unknown
}

/// Per-platform result of an import.
#[derive(Debug, Clone)]
pub struct PlatformImport {
    pub platform: Platform,
    pub path: PathBuf,
    pub count: usize,
    pub has_auth: bool,
}

#[derive(Debug, Clone)]
pub struct ImportReport {
    pub format: CookieFormat,
    pub platforms: Vec<PlatformImport>,
    /// Cookies whose domain belongs to no known platform
    pub skipped: usize,
}

impl ImportReport {
    pub fn total(&self) -> usize {
        self.platforms.iter().map(|p| p.count).sum()
    }
}

/// One cookie as shown by `inspect`, with the value shortened.
#[derive(Debug, Clone)]
pub struct InspectedCookie {
    pub domain: String,
    pub name: String,
    pub value_preview: String,
    /// Unix timestamp, 0 for session cookies
    pub expires: i64,
    pub is_expired: bool,
    pub is_important: bool,
}

#[derive(Debug, Clone)]
pub struct BundleInspection {
    pub platform: Platform,
    pub path: PathBuf,
    pub file_size: u64,
    pub total_lines: usize,
    pub cookies: Vec<InspectedCookie>,
}

/// Cookie counts before and after `clean_platform`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanReport {
    pub before: usize,
    pub after: usize,
}

/// Characters of a cookie value shown by `inspect`
const VALUE_PREVIEW_CHARS: usize = 20;

fn preview(value: &str) -> String {
    if value.chars().count() > VALUE_PREVIEW_CHARS {
        format!("{}...", value.chars().take(VALUE_PREVIEW_CHARS).collect::<String>())
    } else {
        value.to_string()
    }
}

/// State of one platform bundle on disk.
#[derive(Debug, Clone)]
pub struct BundleStatus {
    pub platform: Platform,
    pub path: PathBuf,
    pub exists: bool,
    pub entries: usize,
    pub important_found: Vec<String>,
    pub has_auth: bool,
}

pub(crate) fn important_found(platform: Platform, entries: &[CookieEntry]) -> Vec<String> {
    let mut found: Vec<String> = entries
        .iter()
        .filter(|e| platform.important_cookies().contains(&e.name.as_str()))
        .map(|e| e.name.clone())
        .collect();
    found.sort();
    found.dedup();
    found
}

pub(crate) fn has_auth(platform: Platform, entries: &[CookieEntry]) -> bool {
    entries
        .iter()
        .any(|e| platform.auth_cookies().contains(&e.name.as_str()))
}

/// Administrative operations on the bundle directory.
#[derive(Debug, Clone)]
pub struct CookieStore {
    dir: PathBuf,
}

impl CookieStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn bundle_path(&self, platform: Platform) -> PathBuf {
        self.dir.join(platform.bundle_file_name())
    }

    /// Imports JSON or Netscape content, splitting it into per-platform bundles.
    ///
    /// Every bundle is written to a temporary sibling and renamed into place while
    /// holding the process-wide write mutex.
    pub async fn import(&self, content: &str) -> Result<ImportReport, CookieError> {
        if content.trim().is_empty() {
            return Err(CookieError::EmptyContent);
        }

        let now = chrono::Utc::now().timestamp();
        let format = detect_format(content);
        let entries = match format {
            CookieFormat::Json => convert_json_cookies(content, now)?,
            CookieFormat::Netscape => normalize_expiry(parse_netscape(content), now),
            CookieFormat::Unknown => return Err(CookieError::UnknownFormat),
        };

        let mut by_platform: Vec<(Platform, Vec<CookieEntry>)> = Platform::ALL.iter().map(|p| (*p, Vec::new())).collect();
        let mut skipped = 0usize;
        for entry in entries {
            match entry.platform() {
                Some(platform) => {
                    if let Some((_, bucket)) = by_platform.iter_mut().find(|(p, _)| *p == platform) {
                        bucket.push(entry);
                    }
                }
                None => skipped += 1,
            }
        }

        if by_platform.iter().all(|(_, bucket)| bucket.is_empty()) {
            return Err(CookieError::NoRecognisedCookies);
        }

        tokio::fs::create_dir_all(&self.dir).await?;
        let _lock = COOKIES_WRITE_MUTEX.lock().await;

        let mut platforms = Vec::new();
        for (platform, bucket) in by_platform.into_iter().filter(|(_, b)| !b.is_empty()) {
            let path = self.bundle_path(platform);
            write_atomically(&path, &render_bundle(platform, &bucket)).await?;

            let report = PlatformImport {
                platform,
                path,
                count: bucket.len(),
                has_auth: has_auth(platform, &bucket),
            };
            log::info!(
                "🍪 {}: saved {} cookies to {} (auth: {})",
                platform,
                report.count,
                report.path.display(),
                report.has_auth
            );
            platforms.push(report);
        }

        if skipped > 0 {
            log::warn!("Skipped {} cookies from unsupported domains", skipped);
        }

        Ok(ImportReport {
            format,
            platforms,
            skipped,
        })
    }

    /// Status of every platform bundle, in table order.
    pub async fn status(&self) -> Vec<BundleStatus> {
        let mut statuses = Vec::with_capacity(Platform::ALL.len());
        for platform in Platform::ALL {
            let path = self.bundle_path(platform);
            let status = match tokio::fs::read_to_string(&path).await {
                Ok(content) => {
                    let entries = parse_netscape(&content);
                    BundleStatus {
                        platform,
                        exists: true,
                        entries: entries.len(),
                        important_found: important_found(platform, &entries),
                        has_auth: has_auth(platform, &entries),
                        path,
                    }
                }
                Err(_) => BundleStatus {
                    platform,
                    path,
                    exists: false,
                    entries: 0,
                    important_found: Vec::new(),
                    has_auth: false,
                },
            };
            statuses.push(status);
        }
        statuses
    }

    async fn read_bundle(&self, platform: Platform) -> Result<(PathBuf, String), CookieError> {
        let path = self.bundle_path(platform);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok((path, content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(CookieError::BundleMissing(platform)),
            Err(e) => Err(e.into()),
        }
    }

    /// Lists the cookies of one bundle with expiry and importance flags.
    pub async fn inspect(&self, platform: Platform) -> Result<BundleInspection, CookieError> {
        let (path, content) = self.read_bundle(platform).await?;
        let now = chrono::Utc::now().timestamp();
        let cookies = parse_netscape(&content)
            .into_iter()
            .map(|e| InspectedCookie {
                is_expired: e.is_expired(now),
                is_important: platform.important_cookies().contains(&e.name.as_str()),
                value_preview: preview(&e.value),
                expires: e.expires,
                domain: e.domain,
                name: e.name,
            })
            .collect();

        Ok(BundleInspection {
            platform,
            path,
            file_size: content.len() as u64,
            total_lines: content.lines().count(),
            cookies,
        })
    }

    /// Drops expired cookies from one bundle and extends session cookies.
    pub async fn clean_platform(&self, platform: Platform) -> Result<CleanReport, CookieError> {
        let _lock = COOKIES_WRITE_MUTEX.lock().await;
        let (path, content) = self.read_bundle(platform).await?;
        let cleaned = clean_netscape(&content, chrono::Utc::now().timestamp());
        let report = CleanReport {
            before: parse_netscape(&content).len(),
            after: parse_netscape(&cleaned).len(),
        };
        write_atomically(&path, &cleaned).await?;
        log::info!(
            "🧹 Cleaned {} cookies: {} → {} entries",
            platform,
            report.before,
            report.after
        );
        Ok(report)
    }

    /// Removes one platform bundle. Returns the deleted path.
    pub async fn delete_platform(&self, platform: Platform) -> Result<PathBuf, CookieError> {
        let _lock = COOKIES_WRITE_MUTEX.lock().await;
        let path = self.bundle_path(platform);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                log::info!("Deleted {} cookie bundle: {}", platform, path.display());
                Ok(path)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(CookieError::BundleMissing(platform)),
            Err(e) => Err(e.into()),
        }
    }

    /// Removes every platform bundle. Returns how many files were deleted.
    pub async fn delete_all(&self) -> Result<usize, CookieError> {
        let _lock = COOKIES_WRITE_MUTEX.lock().await;
        let mut deleted = 0;
        for platform in Platform::ALL {
            let path = self.bundle_path(platform);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    log::info!("Deleted {} cookie bundle: {}", platform, path.display());
                    deleted += 1;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(deleted)
    }
}

fn render_bundle(platform: Platform, entries: &[CookieEntry]) -> String {
    let mut content = format!(
        "{}\n# {} cookies for yt-dlp\n# Generated at: {}\n\n",
        NETSCAPE_HEADER,
        platform,
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S")
    );
    for entry in entries {
        content.push_str(&entry.to_netscape_line());
        content.push('\n');
    }
    content
}

pub(crate) async fn write_atomically(path: &Path, content: &str) -> Result<(), CookieError> {
    let temp_path = PathBuf::from(format!("{}.tmp.{}", path.display(), std::process::id()));

    tokio::fs::write(&temp_path, content).await?;
    if let Err(e) = tokio::fs::rename(&temp_path, path).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e.into());
    }
    Ok(())
}

/// Maps URLs to the bundle yt-dlp should use.
#[derive(Debug, Clone)]
pub struct CookieRouter {
    dir: PathBuf,
    default_platform: Platform,
}

impl CookieRouter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            default_platform: Platform::Youtube,
        }
    }

    /// Router using `DEFAULT_COOKIE_PLATFORM` for unmatched URLs.
    pub fn from_config(dir: impl Into<PathBuf>) -> Self {
        let default_platform =
            Platform::from_name(&crate::core::config::DEFAULT_COOKIE_PLATFORM).unwrap_or(Platform::Youtube);
        Self::new(dir).with_default(default_platform)
    }

    pub fn with_default(mut self, platform: Platform) -> Self {
        self.default_platform = platform;
        self
    }

    /// Bundle path for the URL's platform, degrading to the first existing bundle.
    pub fn resolve(&self, url: &str) -> Result<PathBuf, CookieError> {
        let platform = Platform::from_url(url).unwrap_or(self.default_platform);
        let preferred = self.dir.join(platform.bundle_file_name());
        if preferred.is_file() {
            log::info!("🍪 Using {} cookies: {}", platform, preferred.display());
            return Ok(preferred);
        }

        for candidate in Platform::ALL {
            let path = self.dir.join(candidate.bundle_file_name());
            if path.is_file() {
                log::warn!(
                    "🔄 No {} cookie bundle, falling back to {} cookies: {}",
                    platform,
                    candidate,
                    path.display()
                );
                return Ok(path);
            }
        }

        log::error!("❌ No cookie bundle found in {}", self.dir.display());
        Err(CookieError::CredentialsUnavailable(platform.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const NOW: i64 = 1_700_000_000;

    #[test]
    fn test_platform_from_url() {
        assert_eq!(Platform::from_url("https://www.youtube.com/watch?v=x"), Some(Platform::Youtube));
        assert_eq!(Platform::from_url("https://youtu.be/x"), Some(Platform::Youtube));
        assert_eq!(Platform::from_url("https://x.com/user/status/1"), Some(Platform::Twitter));
        assert_eq!(Platform::from_url("https://m.bilibili.com/video/BV1"), Some(Platform::Bilibili));
        assert_eq!(Platform::from_url("https://notyoutube.com/watch"), None);
        assert_eq!(Platform::from_url("not a url"), None);
    }

    #[test]
    fn test_platform_from_domain_accepts_leading_dot() {
        assert_eq!(Platform::from_domain(".tiktok.com"), Some(Platform::Tiktok));
        assert_eq!(Platform::from_domain(".google.com"), Some(Platform::Youtube));
        assert_eq!(Platform::from_domain(".example.com"), None);
    }

    #[test]
    fn test_parse_netscape_skips_comments_and_short_lines() {
        let content = "# Netscape HTTP Cookie File\n\n\
            .youtube.com\tTRUE\t/\tTRUE\t1800000000\tSID\tabc\n\
            broken\tline\n\
            #HttpOnly_.x.com\tTRUE\t/\tTRUE\t0\tauth_token\tt0k\n";
        let entries = parse_netscape(content);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "SID");
        assert!(entries[0].include_subdomains);
        assert!(entries[1].http_only);
        assert_eq!(entries[1].platform(), Some(Platform::Twitter));
    }

    #[test]
    fn test_to_netscape_line() {
        let entry = CookieEntry {
            domain: ".youtube.com".into(),
            include_subdomains: true,
            path: "/".into(),
            secure: true,
            expires: 1800000000,
            name: "SID".into(),
            value: "a\tb".into(),
            http_only: false,
        };
        assert_eq!(entry.to_netscape_line(), ".youtube.com\tTRUE\t/\tTRUE\t1800000000\tSID\ta b");
    }

    #[test]
    fn test_convert_json_cookies_expiry_policy() {
        let json = r#"[
            {"domain": ".youtube.com", "name": "SID", "value": "v1", "secure": true, "expirationDate": 1800000000.5},
            {"domain": "youtube.com", "name": "OLD", "value": "v2", "expirationDate": 1600000000},
            {"domain": ".instagram.com", "name": "sessionid", "value": "v3", "session": true},
            {"name": "no-domain"},
            "garbage"
        ]"#;
        let entries = convert_json_cookies(json, NOW).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].expires, 1800000000);
        assert!(entries[0].include_subdomains);
        assert_eq!(entries[1].expires, NOW + SESSION_EXTENSION_SECS);
        assert_eq!(entries[1].path, "/");
    }

    #[test]
    fn test_clean_netscape_keeps_comments() {
        let content = "# header\n.x.com\tTRUE\t/\tTRUE\t100\tct0\told\n.x.com\tTRUE\t/\tTRUE\t0\tauth_token\tnew";
        let cleaned = clean_netscape(content, NOW);
        let lines: Vec<&str> = cleaned.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "# header");
        assert!(lines[1].contains(&(NOW + SESSION_EXTENSION_SECS).to_string()));
    }

    #[test]
    fn test_detect_format() {
        assert_eq!(detect_format("[{\"domain\": \".x.com\"}]"), CookieFormat::Json);
        assert_eq!(detect_format("# Netscape HTTP Cookie File\n"), CookieFormat::Netscape);
        assert_eq!(
            detect_format(".x.com\tTRUE\t/\tTRUE\t0\tct0\tv"),
            CookieFormat::Netscape
        );
        assert_eq!(detect_format("hello world"), CookieFormat::Unknown);
    }

    #[tokio::test]
    async fn test_import_splits_by_platform() {
        let dir = TempDir::new().unwrap();
        let store = CookieStore::new(dir.path());
        let content = "# Netscape HTTP Cookie File\n\
            .youtube.com\tTRUE\t/\tTRUE\t0\tSID\ty\n\
            .x.com\tTRUE\t/\tTRUE\t0\tguest_id\tg\n\
            .example.org\tTRUE\t/\tFALSE\t0\tfoo\tbar\n";

        let report = store.import(content).await.unwrap();
        assert_eq!(report.format, CookieFormat::Netscape);
        assert_eq!(report.platforms.len(), 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.total(), 2);

        let youtube = &report.platforms[0];
        assert_eq!(youtube.platform, Platform::Youtube);
        assert!(youtube.has_auth);
        assert!(!report.platforms[1].has_auth);

        let written = std::fs::read_to_string(store.bundle_path(Platform::Youtube)).unwrap();
        assert!(written.starts_with(NETSCAPE_HEADER));
        assert_eq!(parse_netscape(&written).len(), 1);
    }

    #[tokio::test]
    async fn test_import_rejects_empty_and_unrecognised() {
        let dir = TempDir::new().unwrap();
        let store = CookieStore::new(dir.path());
        assert!(matches!(store.import("   ").await, Err(CookieError::EmptyContent)));
        assert!(matches!(
            store.import(".example.org\tTRUE\t/\tFALSE\t0\tfoo\tbar").await,
            Err(CookieError::NoRecognisedCookies)
        ));
    }

    #[tokio::test]
    async fn test_status_and_delete_all() {
        let dir = TempDir::new().unwrap();
        let store = CookieStore::new(dir.path());
        store
            .import(".bilibili.com\tTRUE\t/\tFALSE\t0\tSESSDATA\ts\n.bilibili.com\tTRUE\t/\tFALSE\t0\tbili_jct\tj")
            .await
            .unwrap();

        let status = store.status().await;
        assert_eq!(status.len(), Platform::ALL.len());
        let bili = status.iter().find(|s| s.platform == Platform::Bilibili).unwrap();
        assert!(bili.exists);
        assert!(bili.has_auth);
        assert_eq!(bili.entries, 2);
        assert_eq!(bili.important_found, vec!["SESSDATA".to_string(), "bili_jct".to_string()]);
        assert!(!status[0].exists);

        assert_eq!(store.delete_all().await.unwrap(), 1);
        assert!(!store.bundle_path(Platform::Bilibili).exists());
    }

    #[tokio::test]
    async fn test_inspect_clean_and_delete_one_platform() {
        let dir = TempDir::new().unwrap();
        let store = CookieStore::new(dir.path());
        let long_value = "v".repeat(40);
        std::fs::write(
            store.bundle_path(Platform::Tiktok),
            format!(
                "{}\n.tiktok.com\tTRUE\t/\tTRUE\t4102444800\tsessionid\t{}\n.tiktok.com\tTRUE\t/\tFALSE\t1000\told\tx\n",
                NETSCAPE_HEADER, long_value
            ),
        )
        .unwrap();

        let inspection = store.inspect(Platform::Tiktok).await.unwrap();
        assert_eq!(inspection.cookies.len(), 2);
        assert_eq!(inspection.total_lines, 3);
        let session = &inspection.cookies[0];
        assert!(session.is_important);
        assert!(!session.is_expired);
        assert_eq!(session.value_preview, format!("{}...", "v".repeat(20)));
        assert!(inspection.cookies[1].is_expired);

        let report = store.clean_platform(Platform::Tiktok).await.unwrap();
        assert_eq!(report, CleanReport { before: 2, after: 1 });
        let cleaned = std::fs::read_to_string(store.bundle_path(Platform::Tiktok)).unwrap();
        assert!(cleaned.starts_with(NETSCAPE_HEADER));
        assert!(!cleaned.contains("\told\t"));

        assert_eq!(
            store.delete_platform(Platform::Tiktok).await.unwrap(),
            store.bundle_path(Platform::Tiktok)
        );
        assert!(matches!(
            store.delete_platform(Platform::Tiktok).await,
            Err(CookieError::BundleMissing(Platform::Tiktok))
        ));
        assert!(matches!(
            store.inspect(Platform::Youtube).await,
            Err(CookieError::BundleMissing(Platform::Youtube))
        ));
    }

    #[test]
    fn test_router_prefers_platform_bundle() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("youtube_cookies.txt"), "").unwrap();
        std::fs::write(dir.path().join("twitter_cookies.txt"), "").unwrap();

        let router = CookieRouter::new(dir.path());
        assert_eq!(
            router.resolve("https://twitter.com/a/status/1").unwrap(),
            dir.path().join("twitter_cookies.txt")
        );
        assert_eq!(
            router.resolve("https://vimeo.com/1").unwrap(),
            dir.path().join("youtube_cookies.txt")
        );
    }

    #[test]
    fn test_router_falls_back_in_table_order() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("bilibili_cookies.txt"), "").unwrap();
        std::fs::write(dir.path().join("instagram_cookies.txt"), "").unwrap();

        let router = CookieRouter::new(dir.path());
        assert_eq!(
            router.resolve("https://www.tiktok.com/@a/video/1").unwrap(),
            dir.path().join("instagram_cookies.txt")
        );
    }

    #[test]
    fn test_router_without_bundles() {
        let dir = TempDir::new().unwrap();
        let err = CookieRouter::new(dir.path())
            .resolve("https://www.tiktok.com/@a/video/1")
            .unwrap_err();
        assert!(matches!(err, CookieError::CredentialsUnavailable(ref p) if p == "tiktok"));
    }
}
