//! Cookie bundle backups under `<cookies dir>/backups/<name>/`.
//!
//! A backup is a copy of every existing bundle plus a `backup_info.json`
//! manifest. Directories without a manifest are still listed and restorable:
//! their `<platform>_cookies.txt` files are taken as they are.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::download::cookies::{write_atomically, CookieError, CookieStore, Platform, COOKIES_WRITE_MUTEX};

const BACKUP_DIR: &str = "backups";
const MANIFEST: &str = "backup_info.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackedUpBundle {
    pub platform: String,
    pub size: u64,
}

/// Manifest written next to the copied bundles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupInfo {
    pub backup_name: String,
    pub backup_time: DateTime<Utc>,
    pub bundles: Vec<BackedUpBundle>,
    pub total_size: u64,
    /// Set by `list_backups`: every listed bundle is still on disk
    #[serde(skip)]
    pub files_exist: bool,
    /// Set by `list_backups`: no manifest, details inferred from the directory
    #[serde(skip)]
    pub legacy: bool,
}

/// Bundle put back by `restore`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoredBundle {
    pub platform: Platform,
    pub path: PathBuf,
    pub size: u64,
}

fn check_name(name: &str) -> Result<(), CookieError> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(CookieError::InvalidBackupName(name.to_string()))
    }
}

fn platform_of(file_name: &str) -> Option<Platform> {
    file_name.strip_suffix("_cookies.txt").and_then(Platform::from_name)
}

async fn bundle_files(dir: &Path) -> Result<Vec<(Platform, PathBuf)>, CookieError> {
    let mut found = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if let Some(platform) = entry.file_name().to_str().and_then(platform_of) {
            found.push((platform, entry.path()));
        }
    }
    found.sort_by_key(|(platform, _)| Platform::ALL.iter().position(|p| p == platform));
    Ok(found)
}

async fn read_backup(path: &Path, name: &str) -> Result<BackupInfo, CookieError> {
    let manifest = path.join(MANIFEST);
    match tokio::fs::read_to_string(&manifest).await {
        Ok(content) => {
            let mut info: BackupInfo = serde_json::from_str(&content)?;
            info.files_exist = info
                .bundles
                .iter()
                .all(|b| path.join(format!("{}_cookies.txt", b.platform)).is_file());
            Ok(info)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let modified = tokio::fs::metadata(path).await?.modified()?;
            let mut bundles = Vec::new();
            for (platform, file) in bundle_files(path).await? {
                bundles.push(BackedUpBundle {
                    platform: platform.to_string(),
                    size: tokio::fs::metadata(&file).await?.len(),
                });
            }
            Ok(BackupInfo {
                backup_name: name.to_string(),
                backup_time: DateTime::<Utc>::from(modified),
                total_size: bundles.iter().map(|b| b.size).sum(),
                bundles,
                files_exist: true,
                legacy: true,
            })
        }
        Err(e) => Err(e.into()),
    }
}

impl CookieStore {
    pub fn backups_dir(&self) -> PathBuf {
        self.dir().join(BACKUP_DIR)
    }

    /// Copies every existing bundle into a new backup.
    ///
    /// Without a name, `cookies_backup_<YYYYmmdd_HHMMSS>` is used.
    pub async fn backup(&self, name: Option<&str>) -> Result<BackupInfo, CookieError> {
        let name = match name {
            Some(name) => name.trim().to_string(),
            None => format!("cookies_backup_{}", Utc::now().format("%Y%m%d_%H%M%S")),
        };
        check_name(&name)?;

        let _lock = COOKIES_WRITE_MUTEX.lock().await;
        let existing: Vec<_> = Platform::ALL
            .into_iter()
            .map(|p| (p, self.bundle_path(p)))
            .filter(|(_, path)| path.is_file())
            .collect();
        if existing.is_empty() {
            return Err(CookieError::NothingToBackUp);
        }

        let target = self.backups_dir().join(&name);
        tokio::fs::create_dir_all(&target).await?;

        let mut bundles = Vec::with_capacity(existing.len());
        for (platform, source) in existing {
            let size = tokio::fs::copy(&source, target.join(platform.bundle_file_name())).await?;
            log::debug!("📦 Backed up {} cookies ({} bytes)", platform, size);
            bundles.push(BackedUpBundle {
                platform: platform.to_string(),
                size,
            });
        }

        let info = BackupInfo {
            backup_name: name,
            backup_time: Utc::now(),
            total_size: bundles.iter().map(|b| b.size).sum(),
            bundles,
            files_exist: true,
            legacy: false,
        };
        tokio::fs::write(target.join(MANIFEST), serde_json::to_string_pretty(&info)?).await?;
        log::info!(
            "✅ Cookie backup {} written: {} bundles, {} bytes",
            info.backup_name,
            info.bundles.len(),
            info.total_size
        );
        Ok(info)
    }

    /// Every backup, newest first. A missing backup directory means none.
    pub async fn list_backups(&self) -> Result<Vec<BackupInfo>, CookieError> {
        let root = self.backups_dir();
        let mut entries = match tokio::fs::read_dir(&root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut backups = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            match read_backup(&entry.path(), &name).await {
                Ok(info) => backups.push(info),
                Err(e) => log::warn!("⚠️ Skipping unreadable cookie backup {}: {}", name, e),
            }
        }
        backups.sort_by(|a, b| b.backup_time.cmp(&a.backup_time));
        Ok(backups)
    }

    /// Copies the bundles of a backup over the live ones.
    pub async fn restore(&self, name: &str) -> Result<Vec<RestoredBundle>, CookieError> {
        check_name(name)?;
        let source = self.backups_dir().join(name);
        if !source.is_dir() {
            return Err(CookieError::BackupNotFound(name.to_string()));
        }

        let files = bundle_files(&source).await?;
        if files.is_empty() {
            return Err(CookieError::NothingToRestore(name.to_string()));
        }

        let _lock = COOKIES_WRITE_MUTEX.lock().await;
        tokio::fs::create_dir_all(self.dir()).await?;
        let mut restored = Vec::with_capacity(files.len());
        for (platform, file) in files {
            let content = tokio::fs::read_to_string(&file).await?;
            let path = self.bundle_path(platform);
            write_atomically(&path, &content).await?;
            log::debug!("🔄 Restored {} cookies to {}", platform, path.display());
            restored.push(RestoredBundle {
                platform,
                path,
                size: content.len() as u64,
            });
        }
        log::info!("✅ Restored {} cookie bundles from backup {}", restored.len(), name);
        Ok(restored)
    }

    pub async fn delete_backup(&self, name: &str) -> Result<(), CookieError> {
        check_name(name)?;
        let path = self.backups_dir().join(name);
        if !path.is_dir() {
            return Err(CookieError::BackupNotFound(name.to_string()));
        }
        tokio::fs::remove_dir_all(&path).await?;
        log::info!("Deleted cookie backup {}", name);
        Ok(())
    }
}
