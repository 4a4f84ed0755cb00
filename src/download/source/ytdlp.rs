//! Extraction backend that drives the yt-dlp binary.
//!
//! The process runs inside `spawn_blocking`. stdout and stderr are drained on
//! their own threads: `[download]` lines become `SourceProgress`, the final
//! path comes back through `--print after_move:filepath`, and the last 200
//! stderr lines become the error message when yt-dlp fails.

use crate::core::config;
use crate::core::error::AppError;
use crate::download::progress::parse_progress;
use crate::download::source::{ExtractionOutput, ExtractionRequest, ExtractionSource, SourceProgress};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Extraction source that shells out to yt-dlp.
#[derive(Debug, Clone)]
pub struct YtDlpSource {
    bin: String,
    timeout: Duration,
}

impl Default for YtDlpSource {
    fn default() -> Self {
        Self::new()
    }
}

impl YtDlpSource {
    /// Uses `YTDL_BIN` and the configured timeout.
    pub fn new() -> Self {
        Self {
            bin: config::YTDL_BIN.clone(),
            timeout: config::download::ytdlp_timeout(),
        }
    }

    pub fn with_binary(bin: impl Into<String>) -> Self {
        Self {
            bin: bin.into(),
            ..Self::new()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Full argument list for a request (the URL goes last, after `--`).
    pub fn build_args(request: &ExtractionRequest) -> Vec<String> {
        let output = request.output_dir.join(&request.output_template);
        let mut args: Vec<String> = vec![
            "--newline".into(),
            "--progress".into(),
            "--no-simulate".into(),
            "--print".into(),
            "after_move:filepath".into(),
            "--socket-timeout".into(),
            "30".into(),
            "--retries".into(),
            "3".into(),
            "--fragment-retries".into(),
            "3".into(),
            "-o".into(),
            output.to_string_lossy().into_owned(),
        ];

        if let Some(cookies) = &request.cookies {
            args.push("--cookies".into());
            args.push(cookies.to_string_lossy().into_owned());
        }

        args.extend(request.options.ytdlp_args());
        args.push("--".into());
        args.push(request.url.to_string());
        args
    }
}

fn push_tail(lines: &Mutex<VecDeque<String>>, line: String) {
    if let Ok(mut lines) = lines.lock() {
        lines.push_back(line);
        if lines.len() > config::download::STDERR_TAIL_LINES {
            lines.pop_front();
        }
    }
}

/// Reads a pipe line by line on a dedicated thread.
///
/// Progress lines go to `tx`; everything else lands in `tail`.
fn drain_pipe<R: Read + Send + 'static>(
    stream: R,
    label: &'static str,
    tx: mpsc::UnboundedSender<SourceProgress>,
    tail: Arc<Mutex<VecDeque<String>>>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let reader = BufReader::new(stream);
        for line in reader.lines().map_while(Result::ok) {
            log::debug!("yt-dlp {}: {}", label, line);
            match parse_progress(&line) {
                Some(info) => {
                    let _ = tx.send(info.into());
                }
                None => push_tail(&tail, line),
            }
        }
    })
}

/// Waits for the child, killing it once `timeout` elapses.
fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Result<ExitStatus, AppError> {
    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait()? {
            Some(status) => return Ok(status),
            None => {
                if Instant::now() >= deadline {
                    log::error!("yt-dlp process timed out after {}s, killing", timeout.as_secs());
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(AppError::Extraction(format!(
                        "yt-dlp process timed out after {}s",
                        timeout.as_secs()
                    )));
                }
                std::thread::sleep(Duration::from_millis(200));
            }
        }
    }
}

/// Path printed by `--print after_move:filepath`: the last non-bracketed stdout line.
fn reported_path(stdout_tail: &VecDeque<String>) -> Option<PathBuf> {
    stdout_tail
        .iter()
        .rev()
        .map(|l| l.trim())
        .find(|l| !l.is_empty() && !l.starts_with('['))
        .map(PathBuf::from)
}

fn join_tail(tail: &Mutex<VecDeque<String>>) -> String {
    match tail.lock() {
        Ok(lines) => lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n"),
        Err(_) => String::new(),
    }
}

fn run_blocking(
    bin: String,
    args: Vec<String>,
    timeout: Duration,
    tx: mpsc::UnboundedSender<SourceProgress>,
) -> Result<ExtractionOutput, AppError> {
    log::debug!("yt-dlp command: {} {}", bin, args.join(" "));

    let mut child = Command::new(&bin)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| AppError::Extraction(format!("Failed to spawn {}: {}", bin, e)))?;

    let stdout_tail = Arc::new(Mutex::new(VecDeque::new()));
    let stderr_tail = Arc::new(Mutex::new(VecDeque::new()));

    let mut readers = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        readers.push(drain_pipe(stdout, "stdout", tx.clone(), Arc::clone(&stdout_tail)));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(drain_pipe(stderr, "stderr", tx, Arc::clone(&stderr_tail)));
    }

    let waited = wait_with_timeout(&mut child, timeout);
    for reader in readers {
        let _ = reader.join();
    }
    let status = waited?;

    if status.success() {
        let file_path = match stdout_tail.lock() {
            Ok(lines) => reported_path(&lines),
            Err(_) => None,
        };
        return Ok(ExtractionOutput { file_path });
    }

    let stderr_text = join_tail(&stderr_tail);
    let message = if stderr_text.trim().is_empty() {
        format!("yt-dlp exited with {}", status)
    } else {
        stderr_text
    };
    Err(AppError::Extraction(message))
}

#[async_trait]
impl ExtractionSource for YtDlpSource {
    fn name(&self) -> &str {
        "yt-dlp"
    }

    async fn extract(
        &self,
        request: &ExtractionRequest,
        progress_tx: mpsc::UnboundedSender<SourceProgress>,
    ) -> Result<ExtractionOutput, AppError> {
        tokio::fs::create_dir_all(&request.output_dir).await?;

        let bin = self.bin.clone();
        let args = Self::build_args(request);
        let timeout = self.timeout;
        log::info!("📥 yt-dlp starting: {}", request.url);

        let output = tokio::task::spawn_blocking(move || run_blocking(bin, args, timeout, progress_tx))
            .await
            .map_err(|e| AppError::Extraction(format!("yt-dlp task panicked: {}", e)))??;

        log::info!("✅ yt-dlp finished: {} -> {:?}", request.url, output.file_path);
        Ok(output)
    }
}
