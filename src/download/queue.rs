//! Download orchestrator: a FIFO queue drained by a fixed pool of workers.
//!
//! `submit` validates the request, registers a `pending` task and enqueues its
//! id. Each worker takes one id at a time and runs the whole pipeline for it:
//! credentials, extraction with live progress, artifact resolution, store
//! finalization and optional delivery.

use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use url::Url;

use crate::core::config::OrchestratorConfig;
use crate::core::error::{AppError, AppResult};
use crate::download::cookies::CookieRouter;
use crate::download::options::DownloadOptions;
use crate::download::resolver::{self, Resolution};
use crate::download::source::{output_template, ExtractionRequest, ExtractionSource, SourceProgress};
use crate::download::store::TaskStore;
use crate::download::task::{Task, TaskId, TaskStatus, TaskUpdate};
use crate::telegram::delivery::DeliveryDispatcher;

type TaskReceiver = Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<TaskId>>>;

/// Everything a worker needs, shared by all workers.
struct WorkerContext {
    store: Arc<TaskStore>,
    source: Arc<dyn ExtractionSource>,
    router: CookieRouter,
    dispatcher: Option<Arc<DeliveryDispatcher>>,
    download_dir: PathBuf,
}

pub struct DownloadOrchestrator {
    store: Arc<TaskStore>,
    sender: Mutex<Option<mpsc::UnboundedSender<TaskId>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    download_dir: PathBuf,
}

fn lock_or_recover<'a, T>(mutex: &'a Mutex<T>, what: &str) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("{} mutex was poisoned, recovering", what);
            poisoned.into_inner()
        }
    }
}

impl DownloadOrchestrator {
    /// Creates the download directory and spawns `config.workers` workers.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        config: OrchestratorConfig,
        source: Arc<dyn ExtractionSource>,
        dispatcher: Option<Arc<DeliveryDispatcher>>,
    ) -> AppResult<Self> {
        std::fs::create_dir_all(&config.download_dir)?;

        let store = Arc::new(TaskStore::new());
        let (tx, rx) = mpsc::unbounded_channel::<TaskId>();
        let rx: TaskReceiver = Arc::new(tokio::sync::Mutex::new(rx));
        let context = Arc::new(WorkerContext {
            store: Arc::clone(&store),
            source,
            router: CookieRouter::from_config(&config.cookies_dir),
            dispatcher,
            download_dir: config.download_dir.clone(),
        });

        let worker_count = config.workers.max(1);
        let workers = (0..worker_count)
            .map(|n| tokio::spawn(worker_loop(n, Arc::clone(&context), Arc::clone(&rx))))
            .collect();

        log::info!(
            "✅ Download orchestrator started: {} workers, source {}, directory {}",
            worker_count,
            context.source.name(),
            config.download_dir.display()
        );

        Ok(Self {
            store,
            sender: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
            download_dir: config.download_dir,
        })
    }

    pub fn store(&self) -> Arc<TaskStore> {
        Arc::clone(&self.store)
    }

    pub fn download_dir(&self) -> &std::path::Path {
        &self.download_dir
    }

    /// Validates and enqueues a download. Rejected requests create no task.
    pub fn submit(&self, url: &str, options: DownloadOptions) -> AppResult<TaskId> {
        let parsed = Url::parse(url.trim()).map_err(|e| AppError::Validation(format!("Invalid URL '{}': {}", url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AppError::Validation(format!(
                "Unsupported URL scheme '{}': only http and https are accepted",
                parsed.scheme()
            )));
        }
        options.validate()?;

        let sender = lock_or_recover(&self.sender, "queue sender");
        let Some(tx) = sender.as_ref() else {
            return Err(AppError::Validation("Download queue is shut down".to_string()));
        };

        let id = self.store.create(parsed.as_str(), options);
        if tx.send(id.clone()).is_err() {
            self.store.update(&id, TaskUpdate::failed("Download queue is closed"));
            return Err(AppError::Validation("Download queue is closed".to_string()));
        }
        log::info!("Queued task {} (active: {})", id, self.store.active_count());
        Ok(id)
    }

    /// Entry point taking options as JSON. `None` means all defaults.
    pub fn submit_download(&self, url: &str, options_json: Option<&str>) -> AppResult<TaskId> {
        let options = match options_json {
            Some(json) if !json.trim().is_empty() => DownloadOptions::from_json(json)?,
            _ => DownloadOptions::default(),
        };
        self.submit(url, options)
    }

    pub fn get_status(&self, task_id: &str) -> AppResult<Task> {
        self.store
            .get(task_id)
            .ok_or_else(|| AppError::TaskNotFound(task_id.to_string()))
    }

    pub fn list_downloads(&self) -> Vec<Task> {
        self.store.list()
    }

    pub fn active_count(&self) -> usize {
        self.store.active_count()
    }

    pub fn completed_files(&self) -> Vec<Task> {
        self.store.completed_files()
    }

    /// Opens the finished artifact of a task for reading.
    pub async fn fetch_artifact(&self, task_id: &str) -> AppResult<tokio::fs::File> {
        let task = self.get_status(task_id)?;
        let path = match (&task.status, &task.file_path) {
            (TaskStatus::Completed, Some(path)) => path.clone(),
            _ => return Err(AppError::ArtifactNotReady(task_id.to_string())),
        };

        match tokio::fs::File::open(&path).await {
            Ok(file) => Ok(file),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(AppError::ArtifactMissing {
                task_id: task_id.to_string(),
                path: path.display().to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Stops accepting work and waits until queued tasks are drained.
    pub async fn shutdown(&self) {
        lock_or_recover(&self.sender, "queue sender").take();
        let workers = std::mem::take(&mut *lock_or_recover(&self.workers, "worker list"));
        for handle in workers {
            if let Err(e) = handle.await {
                log::error!("❌ Download worker ended abnormally: {}", e);
            }
        }
        log::info!("Download orchestrator stopped");
    }
}

async fn worker_loop(n: usize, context: Arc<WorkerContext>, rx: TaskReceiver) {
    log::debug!("Worker {} started", n);
    loop {
        let next = rx.lock().await.recv().await;
        let Some(task_id) = next else {
            break;
        };
        log::info!("Worker {} picked task {}", n, task_id);
        run_task(&context, &task_id).await;
    }
    log::debug!("Worker {} stopped", n);
}

/// Runs one task and turns any error or panic into a terminal store update.
async fn run_task(context: &WorkerContext, task_id: &str) {
    let result = AssertUnwindSafe(execute(context, task_id)).catch_unwind().await;

    let error = match result {
        Ok(Ok(())) => return,
        Ok(Err(e)) => {
            log::error!("❌ Task {} failed ({}): {}", task_id, e.category(), e);
            e.to_string()
        }
        Err(panic) => {
            let detail = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            log::error!("❌ Worker panicked on task {}: {}", task_id, detail);
            format!("Internal error: {}", detail)
        }
    };

    context.store.update(task_id, TaskUpdate::failed(error));

    if let Some(dispatcher) = &context.dispatcher {
        if let Some(task) = context.store.get(task_id) {
            if task.options.send_to_telegram {
                dispatcher.notify_failed(&task).await;
            }
        }
    }
}

fn progress_update(progress: SourceProgress) -> TaskUpdate {
    TaskUpdate {
        progress: Some(progress.percent),
        downloaded_bytes: progress.downloaded_bytes,
        total_bytes: progress.total_bytes,
        speed: progress.speed_bytes_sec,
        eta: progress.eta_seconds,
        ..Default::default()
    }
}

async fn execute(context: &WorkerContext, task_id: &str) -> AppResult<()> {
    let task = context
        .store
        .get(task_id)
        .ok_or_else(|| AppError::TaskNotFound(task_id.to_string()))?;
    context.store.update(task_id, TaskUpdate::status(TaskStatus::Downloading));

    let dispatcher = context.dispatcher.as_ref().filter(|_| task.options.send_to_telegram);
    if let Some(dispatcher) = dispatcher {
        dispatcher.notify_started(&task).await;
    }

    let cookies = context.router.resolve(&task.url)?;
    let request = ExtractionRequest {
        url: Url::parse(&task.url)?,
        output_dir: context.download_dir.clone(),
        output_template: output_template(&task.url, task.created_at, &task.id),
        cookies: Some(cookies),
        options: task.options.clone(),
    };

    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
    let extraction = context.source.extract(&request, progress_tx);
    let progress = async {
        while let Some(update) = progress_rx.recv().await {
            context.store.update(task_id, progress_update(update));
        }
    };
    let (output, ()) = tokio::join!(extraction, progress);
    let output = output?;

    match resolver::resolve(&context.download_dir, task.created_at, output.file_path.as_deref()) {
        Ok(resolution) => {
            if let Resolution::Scanned { competing, .. } = &resolution {
                if *competing > 0 {
                    log::warn!(
                        "⚠️ Task {} resolved by directory scan with {} competing candidates",
                        task.short_id(),
                        competing
                    );
                }
            }
            let path = resolution.into_path();
            let file_size = tokio::fs::metadata(&path).await.map(|m| m.len()).ok();
            let filename = path.file_name().map(|n| n.to_string_lossy().into_owned());
            log::info!("✅ Task {} completed: {}", task.short_id(), path.display());
            context.store.update(
                task_id,
                TaskUpdate {
                    status: Some(TaskStatus::Completed),
                    progress: Some(100.0),
                    filename,
                    file_path: Some(path),
                    file_size,
                    completed_at: Some(chrono::Utc::now()),
                    ..Default::default()
                },
            );
        }
        Err(e @ AppError::ResolutionAmbiguity(_)) => {
            log::warn!("⚠️ Task {} finished but its file could not be located: {}", task.short_id(), e);
            context.store.update(
                task_id,
                TaskUpdate {
                    status: Some(TaskStatus::Completed),
                    progress: Some(100.0),
                    error: Some(e.to_string()),
                    completed_at: Some(chrono::Utc::now()),
                    ..Default::default()
                },
            );
            return Ok(());
        }
        Err(e) => return Err(e),
    }

    if let Some(dispatcher) = dispatcher {
        if let Some(finished) = context.store.get(task_id) {
            match dispatcher.deliver(&finished).await {
                Ok(outcome) => log::info!("Delivery for task {}: {}", finished.short_id(), outcome.trail_summary()),
                Err(e) => log::warn!("⚠️ Delivery skipped for task {}: {}", finished.short_id(), e),
            }
        }
    }
    Ok(())
}
