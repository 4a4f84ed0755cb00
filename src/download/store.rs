//! In-memory task registry
//!
//! One `std::sync::Mutex` guards the map. Critical sections are short and never
//! cross an `.await`, so workers and pollers can share it freely.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::download::options::DownloadOptions;
use crate::download::task::{Task, TaskId, TaskStatus, TaskUpdate};

#[derive(Debug, Default)]
pub struct TaskStore {
    tasks: Mutex<HashMap<TaskId, Task>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TaskId, Task>> {
        match self.tasks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Task store lock was poisoned, recovering...");
                poisoned.into_inner()
            }
        }
    }

    /// Registers a new `pending` task and returns its id.
    pub fn create(&self, url: &str, options: DownloadOptions) -> TaskId {
        let id = uuid::Uuid::new_v4().to_string();
        let task = Task::new(id.clone(), url.to_string(), options);
        self.lock().insert(id.clone(), task);
        log::info!("📥 Created download task {} - {}", id, url);
        id
    }

    /// Applies a partial update.
    ///
    /// Returns `false` when the task is unknown, already terminal, or the update
    /// would move the status backwards; such updates are dropped whole.
    /// Progress never decreases and stays within 0..=100.
    pub fn update(&self, id: &str, update: TaskUpdate) -> bool {
        let mut tasks = self.lock();
        let Some(task) = tasks.get_mut(id) else {
            log::warn!("Update for unknown task {}", id);
            return false;
        };

        if task.status.is_terminal() {
            log::warn!("Ignoring update for task {}: already {}", id, task.status);
            return false;
        }
        if let Some(next) = update.status {
            if !task.status.can_advance_to(next) {
                log::warn!("Ignoring backward status change for task {}: {} -> {}", id, task.status, next);
                return false;
            }
            task.status = next;
        }

        if let Some(progress) = update.progress {
            let progress = if progress.is_finite() { progress.clamp(0.0, 100.0) } else { task.progress };
            task.progress = task.progress.max(progress);
        }
        if let Some(bytes) = update.downloaded_bytes {
            task.downloaded_bytes = bytes;
        }
        if update.total_bytes.is_some() {
            task.total_bytes = update.total_bytes;
        }
        if update.speed.is_some() {
            task.speed = update.speed;
        }
        if update.eta.is_some() {
            task.eta = update.eta;
        }
        if update.filename.is_some() {
            task.filename = update.filename;
        }
        if update.file_path.is_some() {
            task.file_path = update.file_path;
        }
        if update.file_size.is_some() {
            task.file_size = update.file_size;
        }
        if update.error.is_some() {
            task.error = update.error;
        }
        if update.completed_at.is_some() {
            task.completed_at = update.completed_at;
        }

        true
    }

    pub fn get(&self, id: &str) -> Option<Task> {
        self.lock().get(id).cloned()
    }

    /// All tasks, newest first.
    pub fn list(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.lock().values().cloned().collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        tasks
    }

    /// Number of tasks still `pending` or `downloading`.
    pub fn active_count(&self) -> usize {
        self.lock().values().filter(|t| t.status.is_active()).count()
    }

    /// Completed tasks that carry a file path, newest first.
    pub fn completed_files(&self) -> Vec<Task> {
        self.list()
            .into_iter()
            .filter(|t| t.status == TaskStatus::Completed && t.file_path.is_some())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn progress(p: f64) -> TaskUpdate {
        TaskUpdate {
            progress: Some(p),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_and_get() {
        let store = TaskStore::new();
        let id = store.create("https://example.com/v", DownloadOptions::default());
        let task = store.get(&id).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.url, "https://example.com/v");
        assert!(store.get("missing").is_none());
    }

    #[test]
    fn test_progress_never_decreases() {
        let store = TaskStore::new();
        let id = store.create("https://example.com/v", DownloadOptions::default());
        store.update(&id, TaskUpdate::status(TaskStatus::Downloading));
        store.update(&id, progress(40.0));
        store.update(&id, progress(25.0));
        assert_eq!(store.get(&id).unwrap().progress, 40.0);
        store.update(&id, progress(250.0));
        assert_eq!(store.get(&id).unwrap().progress, 100.0);
    }

    #[test]
    fn test_backward_and_post_terminal_updates_are_ignored() {
        let store = TaskStore::new();
        let id = store.create("https://example.com/v", DownloadOptions::default());
        assert!(store.update(&id, TaskUpdate::status(TaskStatus::Downloading)));
        assert!(!store.update(&id, TaskUpdate::status(TaskStatus::Pending)));
        assert_eq!(store.get(&id).unwrap().status, TaskStatus::Downloading);

        assert!(store.update(&id, TaskUpdate::failed("boom")));
        assert!(!store.update(&id, TaskUpdate::status(TaskStatus::Completed)));
        assert!(!store.update(&id, progress(90.0)));

        let task = store.get(&id).unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error.as_deref(), Some("boom"));
        assert_eq!(task.progress, 0.0);
    }

    #[test]
    fn test_active_count_and_completed_files() {
        let store = TaskStore::new();
        let a = store.create("https://example.com/a", DownloadOptions::default());
        let b = store.create("https://example.com/b", DownloadOptions::default());
        let c = store.create("https://example.com/c", DownloadOptions::default());
        assert_eq!(store.active_count(), 3);

        store.update(
            &a,
            TaskUpdate {
                status: Some(TaskStatus::Completed),
                file_path: Some(PathBuf::from("/tmp/a.mp4")),
                ..Default::default()
            },
        );
        store.update(&b, TaskUpdate::status(TaskStatus::Completed));
        store.update(&c, TaskUpdate::status(TaskStatus::Downloading));

        assert_eq!(store.active_count(), 1);
        let files = store.completed_files();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].id, a);
    }

    #[test]
    fn test_list_newest_first() {
        let store = TaskStore::new();
        let first = store.create("https://example.com/1", DownloadOptions::default());
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = store.create("https://example.com/2", DownloadOptions::default());
        let ids: Vec<String> = store.list().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![second, first]);
    }
}
