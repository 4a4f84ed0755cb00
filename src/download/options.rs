//! Per-task download options and their translation into yt-dlp arguments

use serde::{Deserialize, Serialize};

use crate::core::error::{AppError, AppResult};

const VIDEO_CONTAINERS: &[&str] = &["mp4", "webm", "mkv"];
const AUDIO_CONVERSION_FORMATS: &[&str] = &["mp3", "aac", "flac", "wav"];
const AUDIO_ONLY_FORMATS: &[&str] = &["mp3", "m4a", "wav", "flac", "ogg"];

/// Options supplied with a download request.
///
/// Every field has a default, so `{}` is a valid request body. Unknown keys are
/// rejected instead of silently ignored.
///
/// | field                  | default  |
/// |------------------------|----------|
/// | `video_quality`        | none (yt-dlp picks) |
/// | `output_format`        | `best`   |
/// | `audio_only`           | `false`  |
/// | `audio_format`         | `mp3`    |
/// | `audio_quality`        | `192`    |
/// | `download_subtitles`   | `false`  |
/// | `subtitle_lang`        | none     |
/// | `download_thumbnail`   | `false`  |
/// | `download_description` | `false`  |
/// | `allow_playlist`       | `false`  |
/// | `send_to_telegram`     | `false`  |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DownloadOptions {
    /// `best`, `worst`, `720p`/`1080p`/`480p`/`360p` or any height in pixels
    pub video_quality: Option<String>,
    /// `best`, a container (`mp4`, `webm`, `mkv`) or an audio codec (`mp3`, `aac`, `flac`, `wav`)
    pub output_format: String,
    pub audio_only: bool,
    /// Codec used with `audio_only`: `mp3`, `m4a`, `wav`, `flac`, `ogg`
    pub audio_format: String,
    /// Bitrate in kbit/s for audio extraction
    pub audio_quality: String,
    pub download_subtitles: bool,
    /// Subtitle language code, or `all`
    pub subtitle_lang: Option<String>,
    pub download_thumbnail: bool,
    pub download_description: bool,
    pub allow_playlist: bool,
    /// Push the finished artifact to the configured chat
    pub send_to_telegram: bool,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            video_quality: None,
            output_format: "best".to_string(),
            audio_only: false,
            audio_format: "mp3".to_string(),
            audio_quality: "192".to_string(),
            download_subtitles: false,
            subtitle_lang: None,
            download_thumbnail: false,
            download_description: false,
            allow_playlist: false,
            send_to_telegram: false,
        }
    }
}

impl DownloadOptions {
    /// Parses a JSON object, rejecting unknown keys.
    pub fn from_json(json: &str) -> AppResult<Self> {
        serde_json::from_str(json).map_err(|e| AppError::Validation(format!("invalid download options: {}", e)))
    }

    pub fn validate(&self) -> AppResult<()> {
        if let Some(quality) = &self.video_quality {
            if !matches!(quality.as_str(), "best" | "worst") && height_limit(quality).is_none() {
                return Err(AppError::Validation(format!("unsupported video_quality '{}'", quality)));
            }
        }

        let output = self.output_format.to_lowercase();
        if output != "best" && !VIDEO_CONTAINERS.contains(&output.as_str()) && !AUDIO_CONVERSION_FORMATS.contains(&output.as_str())
        {
            return Err(AppError::Validation(format!(
                "unsupported output_format '{}'",
                self.output_format
            )));
        }

        if self.audio_only && !AUDIO_ONLY_FORMATS.contains(&self.audio_format.to_lowercase().as_str()) {
            return Err(AppError::Validation(format!(
                "unsupported audio_format '{}'",
                self.audio_format
            )));
        }

        let bitrate = self.audio_quality.trim_end_matches(['k', 'K']);
        if bitrate.is_empty() || !bitrate.chars().all(|c| c.is_ascii_digit()) {
            return Err(AppError::Validation(format!(
                "unsupported audio_quality '{}'",
                self.audio_quality
            )));
        }

        if let Some(lang) = &self.subtitle_lang {
            if lang.trim().is_empty() || lang.chars().any(char::is_whitespace) {
                return Err(AppError::Validation(format!("invalid subtitle_lang '{}'", lang)));
            }
        }

        Ok(())
    }

    /// yt-dlp `-f` selector. Later rules win: quality, then container, then audio-only.
    pub fn format_selector(&self) -> Option<String> {
        let mut selector = self.video_quality.as_deref().map(|quality| match quality {
            "best" | "worst" => quality.to_string(),
            other => match height_limit(other) {
                Some(height) => format!("best[height<={}]", height),
                None => "best".to_string(),
            },
        });

        let output = self.output_format.to_lowercase();
        if VIDEO_CONTAINERS.contains(&output.as_str()) {
            let height = self.video_quality.as_deref().and_then(height_limit);
            selector = Some(match height {
                Some(h) => format!("best[ext={}][height<={}]", output, h),
                None => format!("best[ext={}]", output),
            });
        } else if AUDIO_CONVERSION_FORMATS.contains(&output.as_str()) {
            selector = Some("bestaudio".to_string());
        }

        if self.audio_only {
            selector = Some("bestaudio".to_string());
        }

        selector
    }

    /// Codec for `-x --audio-format`, when the request converts to audio.
    pub fn audio_extraction(&self) -> Option<String> {
        if self.audio_only {
            let format = self.audio_format.to_lowercase();
            return AUDIO_ONLY_FORMATS.contains(&format.as_str()).then_some(format);
        }
        let output = self.output_format.to_lowercase();
        AUDIO_CONVERSION_FORMATS.contains(&output.as_str()).then_some(output)
    }

    /// All option-derived yt-dlp arguments (format, post-processing, side files, playlist).
    pub fn ytdlp_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(selector) = self.format_selector() {
            args.push("-f".to_string());
            args.push(selector);
        }

        if let Some(codec) = self.audio_extraction() {
            args.push("-x".to_string());
            args.push("--audio-format".to_string());
            args.push(codec);
            args.push("--audio-quality".to_string());
            args.push(format!("{}K", self.audio_quality.trim_end_matches(['k', 'K'])));
        }

        if self.download_subtitles {
            args.push("--write-subs".to_string());
            if let Some(lang) = &self.subtitle_lang {
                args.push("--sub-langs".to_string());
                args.push(lang.clone());
            }
        }
        if self.download_thumbnail {
            args.push("--write-thumbnail".to_string());
        }
        if self.download_description {
            args.push("--write-description".to_string());
        }
        if !self.allow_playlist {
            args.push("--no-playlist".to_string());
        }

        args
    }
}

/// "720p" / "720" → 720
fn height_limit(quality: &str) -> Option<u32> {
    quality
        .trim()
        .trim_end_matches(['p', 'P'])
        .parse::<u32>()
        .ok()
        .filter(|h| *h > 0)
}
