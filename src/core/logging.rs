//! Logger setup and the startup cookie report.
//!
//! Console and file receive the same records. This crate logs at `LOG_LEVEL`;
//! the HTTP and MTProto stacks underneath only get through at warn.

use anyhow::{Context, Result};
use simplelog::*;
use std::fs::OpenOptions;

use crate::core::config;
use crate::download::cookies::CookieStore;

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

/// Crates whose records are held to warn and above
const NOISY_TARGETS: [&str; 6] = [
    "hyper",
    "reqwest",
    "rustls",
    "grammers_mtsender",
    "grammers_client",
    "grammers_session",
];

fn logger_config() -> simplelog::Config {
    let mut builder = ConfigBuilder::new();
    builder.set_target_level(LevelFilter::Off).set_thread_level(LevelFilter::Off);
    for target in NOISY_TARGETS {
        builder.add_filter_ignore_str(target);
    }
    builder.build()
}

fn dependency_config() -> simplelog::Config {
    let mut builder = ConfigBuilder::new();
    for target in NOISY_TARGETS {
        builder.add_filter_allow_str(target);
    }
    builder.build()
}

/// Installs console and file loggers.
///
/// The file at `log_file_path` is appended to, so earlier runs stay readable.
pub fn init_logger(log_file_path: &str) -> Result<()> {
    let level = *config::LOG_LEVEL;
    let open_log = || {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file_path)
            .with_context(|| format!("Failed to open log file {}", log_file_path))
    };

    CombinedLogger::init(vec![
        TermLogger::new(level, logger_config(), TerminalMode::Mixed, ColorChoice::Auto),
        WriteLogger::new(level, logger_config(), open_log()?),
        TermLogger::new(LevelFilter::Warn, dependency_config(), TerminalMode::Stderr, ColorChoice::Auto),
        WriteLogger::new(LevelFilter::Warn, dependency_config(), open_log()?),
    ])
    .context("Failed to initialize logger")?;

    log::info!("Logging at {} to {}", level, log_file_path);
    Ok(())
}

/// Logs the state of every platform cookie bundle at startup.
///
/// Returns the number of bundles that exist.
pub async fn log_cookies_configuration(store: &CookieStore) -> usize {
    log::info!("{}", RULE);
    log::info!("🍪 Cookies Configuration Check ({})", store.dir().display());
    log::info!("{}", RULE);

    let statuses = store.status().await;
    for status in &statuses {
        if !status.exists {
            log::warn!("⚠️  {}: no bundle", status.platform);
        } else if status.has_auth {
            log::info!(
                "✅ {}: {} cookies, auth present ({})",
                status.platform,
                status.entries,
                status.important_found.join(", ")
            );
        } else {
            log::warn!(
                "⚠️  {}: {} cookies but no auth cookie ({})",
                status.platform,
                status.entries,
                status.platform.auth_cookies().join(" / ")
            );
        }
    }

    let present = statuses.iter().filter(|s| s.exists).count();
    log::info!("{}", RULE);
    if present == 0 {
        log::error!("❌ NO COOKIE BUNDLES - downloads needing credentials will FAIL");
        log::error!("   Import some with: vidrelay cookies import <file>");
    } else {
        log::info!("✅ {} of {} platform bundles available", present, statuses.len());
    }
    log::info!("{}", RULE);

    present
}
