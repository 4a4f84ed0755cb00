//! Locating the artifact yt-dlp produced
//!
//! yt-dlp decides the final extension (and sometimes the name) only after
//! merging and post-processing. The path it prints with `--print after_move:filepath`
//! is trusted first; scanning the download directory is the fallback.
//!
//! The scan considers every file created within 30 seconds before the task.
//! Two tasks finishing inside that window in the same directory can pick each
//! other's files; `Resolution::Scanned::competing` reports how many other
//! candidates were in play so callers can log the ambiguity.

use chrono::{DateTime, Duration, Utc};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use crate::core::config;
use crate::core::error::{AppError, AppResult};

/// Extensions treated as finished media.
pub const MEDIA_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "webm", "avi", "mov", "flv", "m4v", "3gp", "ts", "mp3", "m4a", "aac", "flac", "wav", "ogg", "opus",
    "jpg", "jpeg", "png", "gif", "webp",
];

/// Suffixes of files yt-dlp is still writing.
const PARTIAL_SUFFIXES: &[&str] = &["part", "ytdl", "temp"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The extraction reported this path and it exists
    Reported(PathBuf),
    /// Picked by directory scan; `competing` counts the other in-window candidates
    Scanned { path: PathBuf, competing: usize },
}

impl Resolution {
    pub fn path(&self) -> &Path {
        match self {
            Resolution::Reported(path) => path,
            Resolution::Scanned { path, .. } => path,
        }
    }

    pub fn into_path(self) -> PathBuf {
        match self {
            Resolution::Reported(path) => path,
            Resolution::Scanned { path, .. } => path,
        }
    }
}

struct Candidate {
    path: PathBuf,
    name: String,
    created: DateTime<Utc>,
    media: bool,
}

pub fn is_media_file(path: &Path) -> bool {
    extension_of(path).is_some_and(|ext| MEDIA_EXTENSIONS.contains(&ext.as_str()))
}

fn is_partial(path: &Path) -> bool {
    extension_of(path).is_some_and(|ext| PARTIAL_SUFFIXES.contains(&ext.as_str()))
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase())
}

/// Newest first, ties by name ascending.
fn newest_first(a: &Candidate, b: &Candidate) -> Ordering {
    b.created.cmp(&a.created).then_with(|| a.name.cmp(&b.name))
}

fn scan(dir: &Path) -> AppResult<Vec<Candidate>> {
    let mut candidates = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let metadata = match entry.metadata() {
            Ok(m) if m.is_file() => m,
            _ => continue,
        };
        if is_partial(&path) {
            continue;
        }

        // Birth time is missing on some filesystems
        let Ok(created) = metadata.created().or_else(|_| metadata.modified()) else {
            continue;
        };

        candidates.push(Candidate {
            name: entry.file_name().to_string_lossy().into_owned(),
            media: is_media_file(&path),
            created: DateTime::<Utc>::from(created),
            path,
        });
    }
    Ok(candidates)
}

/// Finds the artifact for a task created at `created_at`.
///
/// `hint` is the path yt-dlp reported, if any.
pub fn resolve(dir: &Path, created_at: DateTime<Utc>, hint: Option<&Path>) -> AppResult<Resolution> {
    if let Some(hint) = hint {
        let hinted = if hint.is_absolute() { hint.to_path_buf() } else { dir.join(hint) };
        if hinted.is_file() {
            return Ok(Resolution::Reported(hinted));
        }
        log::warn!("Reported output {} does not exist, scanning {}", hinted.display(), dir.display());
    }

    let all = scan(dir)?;
    let window_start = created_at - Duration::seconds(config::download::RESOLVE_TOLERANCE_SECS);

    let mut in_window: Vec<&Candidate> = all.iter().filter(|c| c.created >= window_start).collect();
    if in_window.iter().any(|c| c.media) {
        in_window.retain(|c| c.media);
    }

    if !in_window.is_empty() {
        in_window.sort_by(|a, b| newest_first(a, b));
        let competing = in_window.len() - 1;
        if competing > 0 {
            log::warn!(
                "{} other files were created near {} in {}; picked the newest",
                competing,
                created_at,
                dir.display()
            );
        }
        return Ok(Resolution::Scanned {
            path: in_window[0].path.clone(),
            competing,
        });
    }

    let newest = all
        .iter()
        .filter(|c| c.media)
        .min_by(|a, b| newest_first(a, b))
        .or_else(|| all.iter().min_by(|a, b| newest_first(a, b)));

    match newest {
        Some(candidate) => {
            log::warn!(
                "No file created after {} in {}; falling back to {}",
                window_start,
                dir.display(),
                candidate.name
            );
            Ok(Resolution::Scanned {
                path: candidate.path.clone(),
                competing: 0,
            })
        }
        None => Err(AppError::ResolutionAmbiguity(dir.display().to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"data").unwrap();
        path
    }

    #[test]
    fn test_reported_path_wins() {
        let dir = TempDir::new().unwrap();
        let reported = touch(dir.path(), "abc_1700000000.mp4");
        touch(dir.path(), "zzz.mkv");

        let resolution = resolve(dir.path(), Utc::now(), Some(&reported)).unwrap();
        assert_eq!(resolution, Resolution::Reported(reported));
    }

    #[test]
    fn test_relative_hint_is_joined_to_dir() {
        let dir = TempDir::new().unwrap();
        let reported = touch(dir.path(), "clip.webm");
        let resolution = resolve(dir.path(), Utc::now(), Some(Path::new("clip.webm"))).unwrap();
        assert_eq!(resolution.path(), reported.as_path());
    }

    #[test]
    fn test_partials_and_sidecars_are_skipped() {
        let dir = TempDir::new().unwrap();
        let created_at = Utc::now();
        touch(dir.path(), "video.mp4.part");
        touch(dir.path(), "video.info.json");
        let media = touch(dir.path(), "video.mp4");

        let resolution = resolve(dir.path(), created_at, Some(Path::new("missing.mp4"))).unwrap();
        assert_eq!(resolution.path(), media.as_path());
    }

    #[test]
    fn test_old_files_still_resolve_as_fallback() {
        let dir = TempDir::new().unwrap();
        let only = touch(dir.path(), "old.mp3");
        let future = Utc::now() + Duration::hours(1);

        let resolution = resolve(dir.path(), future, None).unwrap();
        assert_eq!(
            resolution,
            Resolution::Scanned {
                path: only,
                competing: 0
            }
        );
    }

    #[test]
    fn test_empty_directory_is_ambiguous() {
        let dir = TempDir::new().unwrap();
        let err = resolve(dir.path(), Utc::now(), None).unwrap_err();
        assert!(matches!(err, AppError::ResolutionAmbiguity(_)));
    }

    #[test]
    fn test_non_media_used_when_nothing_else() {
        let dir = TempDir::new().unwrap();
        let notes = touch(dir.path(), "notes.description");
        let resolution = resolve(dir.path(), Utc::now(), None).unwrap();
        assert_eq!(resolution.path(), notes.as_path());
    }
}
