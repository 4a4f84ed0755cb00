/// Characters reserved by common filesystems.
const RESERVED: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Maximum length of the filename stem shown in captions.
const MAX_STEM_CHARS: usize = 50;

/// Cleans a filename for display in chat captions.
///
/// - reserved characters (`<>:"/\|?*`) become `_`
/// - brackets `()（）` and emoji/symbol characters are dropped
/// - whitespace runs become a single `_`
/// - the stem is cut to 50 characters, the extension is kept
///
/// # Example
///
/// ```
/// use vidrelay::core::utils::sanitize_filename;
///
/// assert_eq!(sanitize_filename("My Clip (HD) 🎬.mp4"), "My_Clip_HD.mp4");
/// ```
pub fn sanitize_filename(filename: &str) -> String {
    let (stem, ext) = match filename.rsplit_once('.') {
        Some((stem, ext)) if !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) => {
            (stem, format!(".{}", ext))
        }
        _ => (filename, String::new()),
    };

    let mut cleaned = String::with_capacity(stem.len());
    for c in stem.chars() {
        match c {
            c if RESERVED.contains(&c) => cleaned.push('_'),
            '(' | ')' | '（' | '）' => {}
            c if c.is_whitespace() => {
                if !cleaned.ends_with('_') {
                    cleaned.push('_');
                }
            }
            c if c.is_alphanumeric() || c.is_ascii_punctuation() => cleaned.push(c),
            // emoji and other symbols
            _ => {}
        }
    }

    let stem: String = cleaned.trim_matches('_').chars().take(MAX_STEM_CHARS).collect();
    if stem.is_empty() {
        format!("video{}", ext)
    } else {
        format!("{}{}", stem, ext)
    }
}

/// Formats a byte count as megabytes with one decimal ("12.3 MB").
pub fn format_megabytes(bytes: u64) -> String {
    format!("{:.1} MB", bytes as f64 / 1024.0 / 1024.0)
}

/// Keeps at most `max_bytes` from the end of `text`, cutting on a char boundary.
///
/// Error output tends to put the useful part last.
pub fn truncate_tail_utf8(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut start = text.len() - max_bytes;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("song name.mp3"), "song_name.mp3");
        assert_eq!(sanitize_filename("a/b:c.mp4"), "a_b_c.mp4");
        assert_eq!(sanitize_filename("Видео (live)   2024.webm"), "Видео_live_2024.webm");
        assert_eq!(sanitize_filename("🎬🎬.mp4"), "video.mp4");
        assert_eq!(sanitize_filename(""), "video");
    }

    #[test]
    fn test_sanitize_filename_limits_stem() {
        let long = format!("{}.mkv", "x".repeat(80));
        let cleaned = sanitize_filename(&long);
        assert_eq!(cleaned, format!("{}.mkv", "x".repeat(50)));
    }

    #[test]
    fn test_format_megabytes() {
        assert_eq!(format_megabytes(0), "0.0 MB");
        assert_eq!(format_megabytes(60 * 1024 * 1024), "60.0 MB");
        assert_eq!(format_megabytes(1_572_864), "1.5 MB");
    }

    #[test]
    fn test_truncate_tail_utf8() {
        assert_eq!(truncate_tail_utf8("hello", 10), "hello");
        assert_eq!(truncate_tail_utf8("hello world", 5), "world");
        // "é" is two bytes; never split it
        assert_eq!(truncate_tail_utf8("aéb", 2), "b");
    }
}
