//! yt-dlp `--newline` progress line parsing

/// Progress extracted from a single yt-dlp output line.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressInfo {
    /// 0.0..=100.0
    pub percent: f64,
    /// Bytes per second
    pub speed: Option<u64>,
    pub eta_seconds: Option<u64>,
    pub downloaded_bytes: Option<u64>,
    pub total_bytes: Option<u64>,
    /// Total was prefixed with `~` (fragment-based estimate)
    pub total_estimated: bool,
}

/// Parses progress from yt-dlp output line
/// Example: "[download]  45.2% of 10.00MiB at 500.00KiB/s ETA 00:10"
pub fn parse_progress(line: &str) -> Option<ProgressInfo> {
    if !line.contains("[download]") {
        return None;
    }

    if !line.contains('%') {
        // "[download] Destination: ..." and friends
        log::trace!("Download line without percent: {}", line);
        return None;
    }

    let mut percent = None;
    let mut speed = None;
    let mut eta_seconds = None;
    let mut total_bytes = None;
    let mut total_estimated = false;

    let parts: Vec<&str> = line.split_whitespace().collect();
    for (i, part) in parts.iter().enumerate() {
        if part.ends_with('%') && percent.is_none() {
            if let Ok(p) = part.trim_end_matches('%').parse::<f64>() {
                percent = Some(p.clamp(0.0, 100.0));
            }
        }

        let next = parts.get(i + 1);
        match (*part, next) {
            ("of", Some(size)) => {
                total_estimated = size.starts_with('~');
                total_bytes = parse_size(size.trim_start_matches('~'));
            }
            ("at", Some(rate)) => speed = parse_size(rate),
            ("ETA", Some(eta)) => eta_seconds = parse_eta(eta),
            _ => {}
        }
    }

    let percent = percent?;
    let downloaded_bytes = total_bytes.map(|total| (total as f64 * percent / 100.0) as u64);

    Some(ProgressInfo {
        percent,
        speed,
        eta_seconds,
        downloaded_bytes,
        total_bytes,
        total_estimated,
    })
}

/// Parses "10.00MiB", "500.00KiB/s", "1.2GiB", "512B" into bytes.
pub fn parse_size(size_str: &str) -> Option<u64> {
    let size_str = size_str.trim_end_matches("/s");
    let units: [(&str, f64); 7] = [
        ("GiB", 1024.0 * 1024.0 * 1024.0),
        ("MiB", 1024.0 * 1024.0),
        ("KiB", 1024.0),
        ("GB", 1_000_000_000.0),
        ("MB", 1_000_000.0),
        ("KB", 1_000.0),
        ("B", 1.0),
    ];

    units.iter().find_map(|(suffix, factor)| {
        size_str
            .strip_suffix(suffix)
            .and_then(|number| number.parse::<f64>().ok())
            .map(|value| (value * factor) as u64)
    })
}

/// Parses "00:10", "1:23" or "1:02:03" into seconds.
pub fn parse_eta(eta_str: &str) -> Option<u64> {
    let mut total = 0u64;
    let parts: Vec<&str> = eta_str.split(':').collect();
    if !(2..=3).contains(&parts.len()) {
        return None;
    }
    for part in parts {
        total = total * 60 + part.parse::<u64>().ok()?;
    }
    Some(total)
}
