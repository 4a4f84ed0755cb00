//! Content-type classification for outgoing files

use std::fmt;
use std::path::Path;
use tokio::io::AsyncReadExt;

const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "avi", "mkv", "mov", "wmv", "flv", "webm", "m4v", "3gp", "mpg", "mpeg", "ogv", "ts", "mts", "m2ts", "vob",
];

const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "wav", "flac", "aac", "ogg", "wma", "m4a", "opus", "aiff", "alac", "ape", "dts", "ac3",
];

const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "webp", "tiff", "svg", "ico", "heic", "avif",
];

/// How a file is presented in the chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Video,
    Audio,
    Photo,
    Document,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::Photo => "photo",
            MediaKind::Document => "document",
        }
    }

    /// Classifies by extension only; `None` for unknown extensions.
    pub fn from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Video)
        } else if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Audio)
        } else if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Photo)
        } else {
            None
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Guesses the kind from the first bytes of a file.
pub fn sniff(header: &[u8]) -> MediaKind {
    let starts = |magic: &[u8]| header.starts_with(magic);
    let at = |offset: usize, magic: &[u8]| header.get(offset..offset + magic.len()) == Some(magic);

    if at(4, b"ftyp") {
        // ISO base media: the major brand tells audio from video
        return if at(8, b"M4A ") || at(8, b"M4B ") {
            MediaKind::Audio
        } else {
            MediaKind::Video
        };
    }
    if starts(b"RIFF") {
        return match header.get(8..12) {
            Some(b"WAVE") => MediaKind::Audio,
            Some(b"WEBP") => MediaKind::Photo,
            Some(b"AVI ") => MediaKind::Video,
            _ => MediaKind::Document,
        };
    }
    if starts(&[0x1A, 0x45, 0xDF, 0xA3]) || starts(b"FLV") {
        return MediaKind::Video;
    }
    if starts(b"ID3") || starts(b"fLaC") || starts(b"OggS") || (header.len() >= 2 && header[0] == 0xFF && header[1] & 0xE0 == 0xE0) {
        return MediaKind::Audio;
    }
    if starts(&[0xFF, 0xD8, 0xFF]) || starts(b"\x89PNG") || starts(b"GIF8") {
        return MediaKind::Photo;
    }
    MediaKind::Document
}

/// Classifies a file: extension first, magic bytes when the extension is unknown.
pub async fn classify(path: &Path) -> MediaKind {
    if let Some(kind) = MediaKind::from_extension(path) {
        return kind;
    }

    let mut header = [0u8; 16];
    let read = match tokio::fs::File::open(path).await {
        Ok(mut file) => file.read(&mut header).await.unwrap_or(0),
        Err(e) => {
            log::warn!("Cannot open {} for sniffing: {}", path.display(), e);
            0
        }
    };
    let kind = sniff(&header[..read]);
    log::debug!("Sniffed {} as {}", path.display(), kind);
    kind
}
