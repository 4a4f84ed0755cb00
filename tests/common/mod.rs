//! Common test utilities
//!
//! Shared across all integration tests: fake extraction backends, fake
//! transports and a scratch environment with download/cookie directories.

#![allow(dead_code)]

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

use vidrelay::core::config::OrchestratorConfig;
use vidrelay::download::source::{ExtractionOutput, ExtractionRequest, ExtractionSource, SourceProgress};
use vidrelay::download::{DownloadOrchestrator, Task};
use vidrelay::telegram::{MediaKind, Transport};
use vidrelay::{AppError, AppResult};

/// Scratch directories for one test.
pub struct TestEnvironment {
    pub root: TempDir,
}

impl TestEnvironment {
    /// Download and cookie directories, with a YouTube bundle in place.
    pub fn new() -> Self {
        let env = Self::without_cookies();
        std::fs::write(
            env.cookies_dir().join("youtube_cookies.txt"),
            "# Netscape HTTP Cookie File\n.youtube.com\tTRUE\t/\tTRUE\t4102444800\tSID\tabc\n",
        )
        .unwrap();
        env
    }

    pub fn without_cookies() -> Self {
        let root = TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("downloads")).unwrap();
        std::fs::create_dir_all(root.path().join("cookies")).unwrap();
        Self { root }
    }

    pub fn download_dir(&self) -> PathBuf {
        self.root.path().join("downloads")
    }

    pub fn cookies_dir(&self) -> PathBuf {
        self.root.path().join("cookies")
    }

    pub fn config(&self, workers: usize) -> OrchestratorConfig {
        OrchestratorConfig {
            workers,
            download_dir: self.download_dir(),
            cookies_dir: self.cookies_dir(),
        }
    }
}

/// How the fake names its output.
#[derive(Clone)]
pub enum OutputName {
    /// Fixed name, not reported back (forces a directory scan)
    Unreported(String),
    /// The request's template with this extension, reported back
    Reported(&'static str),
    /// Succeeds without writing anything
    Nothing,
    /// Fails with this extraction error after emitting progress
    Fails(&'static str),
}

/// Extraction double: emits progress, waits, writes a file.
pub struct FakeSource {
    pub delay: Duration,
    pub output: OutputName,
    pub steps: usize,
    running: AtomicUsize,
    pub max_running: AtomicUsize,
    pub calls: AtomicUsize,
}

impl FakeSource {
    pub fn new(delay: Duration, output: OutputName) -> Self {
        Self {
            delay,
            output,
            steps: 4,
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_steps(mut self, steps: usize) -> Self {
        self.steps = steps.max(1);
        self
    }
}

#[async_trait]
impl ExtractionSource for FakeSource {
    fn name(&self) -> &str {
        "fake"
    }

    async fn extract(
        &self,
        request: &ExtractionRequest,
        progress_tx: mpsc::UnboundedSender<SourceProgress>,
    ) -> Result<ExtractionOutput, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);

        let pause = self.delay / self.steps as u32;
        for step in 1..=self.steps {
            let percent = step as f64 * 100.0 / self.steps as f64;
            let _ = progress_tx.send(SourceProgress {
                percent,
                speed_bytes_sec: Some(1024),
                eta_seconds: Some((self.steps - step) as u64),
                downloaded_bytes: Some(step as u64 * 1024),
                total_bytes: Some(self.steps as u64 * 1024),
            });
            tokio::time::sleep(pause).await;
        }

        let result = match &self.output {
            OutputName::Nothing => ExtractionOutput { file_path: None },
            OutputName::Fails(message) => {
                self.running.fetch_sub(1, Ordering::SeqCst);
                return Err(AppError::Extraction(message.to_string()));
            }
            OutputName::Unreported(name) => {
                tokio::fs::write(request.output_dir.join(name), b"media").await?;
                ExtractionOutput { file_path: None }
            }
            OutputName::Reported(ext) => {
                let path = request.output_dir.join(request.output_template.replace("%(ext)s", ext));
                tokio::fs::write(&path, b"media").await?;
                ExtractionOutput { file_path: Some(path) }
            }
        };

        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(result)
    }
}

/// Polls until the task is terminal or the deadline passes.
pub async fn wait_for_terminal(orchestrator: &DownloadOrchestrator, id: &str) -> Task {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let task = orchestrator.get_status(id).unwrap();
        if task.status.is_terminal() {
            return task;
        }
        assert!(tokio::time::Instant::now() < deadline, "task {} never finished", id);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Transport double recording every call.
pub struct FakeTransport {
    pub name: &'static str,
    pub limit: u64,
    pub fail_files: bool,
    pub fail_text: bool,
    pub calls: Mutex<Vec<String>>,
}

impl FakeTransport {
    pub fn new(name: &'static str, limit: u64) -> Self {
        Self {
            name,
            limit,
            fail_files: false,
            fail_text: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(name: &'static str, limit: u64) -> Self {
        Self {
            fail_files: true,
            fail_text: true,
            ..Self::new(name, limit)
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    fn name(&self) -> &str {
        self.name
    }

    fn max_file_size(&self) -> u64 {
        self.limit
    }

    async fn send_file(&self, kind: MediaKind, _path: &Path, _caption: &str) -> AppResult<()> {
        self.calls.lock().unwrap().push(format!("file:{}", kind));
        if self.fail_files {
            Err(AppError::Delivery(format!("{} unavailable", self.name)))
        } else {
            Ok(())
        }
    }

    async fn send_text(&self, _text: &str) -> AppResult<()> {
        self.calls.lock().unwrap().push("text".to_string());
        if self.fail_text {
            Err(AppError::Delivery(format!("{} unavailable", self.name)))
        } else {
            Ok(())
        }
    }
}
