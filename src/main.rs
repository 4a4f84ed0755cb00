use anyhow::Result;
use dotenvy::dotenv;
use std::sync::Arc;
use std::time::Duration;

use vidrelay::cli::{Cli, Commands, CookiesAction};
use vidrelay::core::config::{self, DeliveryConfig, OrchestratorConfig};
use vidrelay::core::utils::format_megabytes;
use vidrelay::core::{init_logger, log_cookies_configuration};
use vidrelay::download::cookie_check::{self, CHECK_TIMEOUT_SECS};
use vidrelay::download::{
    CookieError, CookieRouter, CookieStore, DownloadOptions, DownloadOrchestrator, Platform, TaskStatus, YtDlpSource,
};
use vidrelay::telegram::{validate_bot_token, DeliveryDispatcher};

/// Poll interval while waiting for a CLI download.
const STATUS_POLL: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    std::panic::set_hook(Box::new(|panic_info| {
        log::error!("Panic caught: {:?}", panic_info);
        if let Some(location) = panic_info.location() {
            log::error!("Panic at {}:{}:{}", location.file(), location.line(), location.column());
        }
    }));

    // .env before the logger so LOG_FILE_PATH can come from it
    let _ = dotenv();
    init_logger(&config::LOG_FILE_PATH)?;

    match cli.command {
        Commands::Download {
            url,
            format,
            quality,
            audio_only,
            send,
        } => {
            let mut options = DownloadOptions {
                video_quality: quality,
                audio_only,
                send_to_telegram: send,
                ..Default::default()
            };
            if let Some(format) = format {
                options.output_format = format;
            }
            run_download(&url, options).await
        }
        Commands::Cookies { action } => run_cookies(action).await,
        Commands::ResolveCookies { url } => {
            let path = CookieRouter::from_config(config::COOKIES_DIR.clone()).resolve(&url)?;
            println!("{}", path.display());
            Ok(())
        }
        Commands::TelegramTest => run_telegram_test().await,
    }
}

async fn run_telegram_test() -> Result<()> {
    let delivery = DeliveryConfig::from_env()
        .ok_or_else(|| anyhow::anyhow!("Telegram is disabled or TELEGRAM_BOT_TOKEN/TELEGRAM_CHAT_ID are missing"))?;
    validate_bot_token(&delivery.bot_token).map_err(anyhow::Error::msg)?;

    let dispatcher = DeliveryDispatcher::from_config(&delivery)?;
    let report = dispatcher.test_connection().await;
    dispatcher.stop().await;

    for (name, result) in &report.transports {
        match result {
            Ok(account) => println!("  {}: ok ({})", name, account),
            Err(e) => println!("  {}: failed ({})", name, e),
        }
    }
    if report.is_ok() {
        println!("Test message sent to chat {}", delivery.chat_id);
        Ok(())
    } else {
        Err(anyhow::anyhow!("Telegram connection test failed"))
    }
}

fn parse_platform(name: &str) -> Result<Platform, CookieError> {
    Platform::from_name(name).ok_or_else(|| CookieError::UnknownPlatform(name.to_string()))
}

async fn run_download(url: &str, options: DownloadOptions) -> Result<()> {
    let dispatcher = if options.send_to_telegram {
        let delivery = DeliveryConfig::from_env()
            .ok_or_else(|| anyhow::anyhow!("--send needs TELEGRAM_BOT_TOKEN and TELEGRAM_CHAT_ID"))?;
        let dispatcher = Arc::new(DeliveryDispatcher::from_config(&delivery)?);
        dispatcher.start().await;
        Some(dispatcher)
    } else {
        None
    };

    let config = OrchestratorConfig::from_env();
    log_cookies_configuration(&CookieStore::new(&config.cookies_dir)).await;

    let orchestrator = DownloadOrchestrator::new(config, Arc::new(YtDlpSource::new()), dispatcher.clone())?;
    let task_id = orchestrator.submit(url, options)?;

    let mut last_progress = -1.0;
    let task = loop {
        let task = orchestrator.get_status(&task_id)?;
        if task.status.is_terminal() {
            break task;
        }
        if task.status == TaskStatus::Downloading && task.progress - last_progress >= 5.0 {
            last_progress = task.progress;
            log::info!(
                "📥 {:.1}% ({} bytes, eta {}s)",
                task.progress,
                task.downloaded_bytes,
                task.eta.unwrap_or(0)
            );
        }
        tokio::time::sleep(STATUS_POLL).await;
    };

    // Delivery runs inside the worker; let it finish before exiting
    orchestrator.shutdown().await;
    if let Some(dispatcher) = &dispatcher {
        dispatcher.stop().await;
    }

    match (task.status, task.file_path) {
        (TaskStatus::Completed, Some(path)) => {
            println!(
                "{} ({})",
                path.display(),
                format_megabytes(task.file_size.unwrap_or_default())
            );
            Ok(())
        }
        (TaskStatus::Completed, None) => Err(anyhow::anyhow!(
            "download finished but the file could not be located: {}",
            task.error.unwrap_or_default()
        )),
        _ => Err(anyhow::anyhow!(
            "download failed: {}",
            task.error.unwrap_or_else(|| "unknown error".to_string())
        )),
    }
}

async fn run_cookies(action: CookiesAction) -> Result<()> {
    let store = CookieStore::new(config::COOKIES_DIR.clone());
    match action {
        CookiesAction::Import { file } => {
            let content = tokio::fs::read_to_string(&file).await?;
            let report = store.import(&content).await?;
            println!(
                "Imported {} cookies ({} format, {} skipped)",
                report.total(),
                report.format,
                report.skipped
            );
            for platform in &report.platforms {
                println!(
                    "  {}: {} cookies{} -> {}",
                    platform.platform,
                    platform.count,
                    if platform.has_auth { ", auth present" } else { "" },
                    platform.path.display()
                );
            }
        }
        CookiesAction::Status => {
            let found = log_cookies_configuration(&store).await;
            println!("{} of {} platform bundles present", found, store.status().await.len());
        }
        CookiesAction::Inspect { platform } => {
            let inspection = store.inspect(parse_platform(&platform)?).await?;
            println!(
                "{} ({} bytes, {} cookies)",
                inspection.path.display(),
                inspection.file_size,
                inspection.cookies.len()
            );
            for cookie in &inspection.cookies {
                println!(
                    "  {}{} {}={} expires {}{}",
                    if cookie.is_important { "*" } else { " " },
                    cookie.domain,
                    cookie.name,
                    cookie.value_preview,
                    if cookie.expires == 0 { "session".to_string() } else { cookie.expires.to_string() },
                    if cookie.is_expired { " (expired)" } else { "" }
                );
            }
        }
        CookiesAction::Clean { platform } => {
            let report = store.clean_platform(parse_platform(&platform)?).await?;
            println!("{} cookies kept, {} dropped", report.after, report.before.saturating_sub(report.after));
        }
        CookiesAction::Delete { platform } => {
            let path = store.delete_platform(parse_platform(&platform)?).await?;
            println!("Deleted {}", path.display());
        }
        CookiesAction::Test => {
            let checks =
                cookie_check::check_all(&store, &config::YTDL_BIN, Duration::from_secs(CHECK_TIMEOUT_SECS)).await?;
            for check in &checks {
                println!("  {}: {}", check.platform, check.validity);
            }
            if !checks.iter().any(|c| c.validity.is_valid()) {
                return Err(anyhow::anyhow!("no platform has working cookies"));
            }
        }
        CookiesAction::Backup { name } => {
            let info = store.backup(name.as_deref()).await?;
            println!(
                "Backup {}: {} bundles, {} bytes",
                info.backup_name,
                info.bundles.len(),
                info.total_size
            );
        }
        CookiesAction::Backups => {
            for info in store.list_backups().await? {
                println!(
                    "  {}  {}  {} bundles{}{}",
                    info.backup_name,
                    info.backup_time.format("%Y-%m-%d %H:%M:%S"),
                    info.bundles.len(),
                    if info.legacy { ", no manifest" } else { "" },
                    if info.files_exist { "" } else { ", INCOMPLETE" }
                );
            }
        }
        CookiesAction::Restore { name } => {
            let restored = store.restore(&name).await?;
            for bundle in &restored {
                println!("  {} -> {} ({} bytes)", bundle.platform, bundle.path.display(), bundle.size);
            }
        }
    }
    Ok(())
}
