use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::models::{FileTree, SyncError};

/// Destination of debounced file tree snapshots. Implemented by the
/// project store client; tests substitute a recorder.
pub trait ProjectSink: Send + Sync + 'static {
    fn persist(
        &self,
        project_id: String,
        tree: FileTree,
    ) -> Pin<Box<dyn Future<Output = Result<(), SyncError>> + Send>>;
}

struct Entry {
    /// Latest known snapshot; only the most recent one is ever written
    latest: Arc<StdMutex<FileTree>>,
    timer: JoinHandle<()>,
}

/// Coalesces rapid edits per project into periodic writes against the
/// project store. One cancellable timer per actively edited project;
/// every edit rearms it. A write already in flight is never cancelled
/// by a rearm, but superseded snapshots are never queued.
#[derive(Clone)]
pub struct PersistDebouncer {
    interval: Duration,
    sink: Arc<dyn ProjectSink>,
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl PersistDebouncer {
    pub fn new(interval: Duration, sink: Arc<dyn ProjectSink>) -> Self {
        Self {
            interval,
            sink,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Record a local edit. Resets the project's timer; when the timer
    /// fires, a single persistence call carries the latest snapshot.
    pub async fn note_edit(&self, project_id: &str, tree: FileTree) {
        let mut entries = self.entries.lock().await;
        match entries.get_mut(project_id) {
            Some(entry) => {
                *entry.latest.lock().unwrap_or_else(|e| e.into_inner()) = tree;
                entry.timer.abort();
                entry.timer = self.arm_timer(project_id.to_string(), entry.latest.clone());
            }
            None => {
                let latest = Arc::new(StdMutex::new(tree));
                let timer = self.arm_timer(project_id.to_string(), latest.clone());
                entries.insert(project_id.to_string(), Entry { latest, timer });
            }
        }
    }

    fn arm_timer(&self, project_id: String, latest: Arc<StdMutex<FileTree>>) -> JoinHandle<()> {
        let interval = self.interval;
        let sink = self.sink.clone();
        tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            let snapshot = latest.lock().unwrap_or_else(|e| e.into_inner()).clone();
            // Detached, so a rearm cannot cancel a write already in flight
            tokio::spawn(async move {
                if let Err(e) = sink.persist(project_id.clone(), snapshot).await {
                    error!("Persistence failed for project {}: {}", project_id, e);
                }
            });
        })
    }

    /// Best-effort teardown flush: cancel any pending timer and write
    /// the latest snapshot fire-and-forget. Failure is unobserved.
    pub async fn flush(&self, project_id: &str, last_known: Option<FileTree>) {
        let snapshot = {
            let mut entries = self.entries.lock().await;
            match entries.remove(project_id) {
                Some(entry) => {
                    entry.timer.abort();
                    Some(entry.latest.lock().unwrap_or_else(|e| e.into_inner()).clone())
                }
                None => last_known,
            }
        };
        if let Some(tree) = snapshot {
            let sink = self.sink.clone();
            let project_id = project_id.to_string();
            debug!("Teardown flush for project {}", project_id);
            tokio::spawn(async move {
                let _ = sink.persist(project_id, tree).await;
            });
        }
    }

    /// Process teardown: flush every tracked project fire-and-forget
    pub async fn flush_all(&self) {
        let project_ids: Vec<String> = {
            let entries = self.entries.lock().await;
            entries.keys().cloned().collect()
        };
        for project_id in project_ids {
            self.flush(&project_id, None).await;
        }
    }

    /// Projects with a snapshot still waiting on a timer
    pub async fn pending_count(&self) -> u32 {
        let entries = self.entries.lock().await;
        entries.values().filter(|e| !e.timer.is_finished()).count() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        calls: StdMutex<Vec<(String, FileTree)>>,
    }

    impl ProjectSink for RecordingSink {
        fn persist(
            &self,
            project_id: String,
            tree: FileTree,
        ) -> Pin<Box<dyn Future<Output = Result<(), SyncError>> + Send>> {
            self.calls.lock().unwrap().push((project_id, tree));
            Box::pin(async { Ok(()) })
        }
    }

    fn tree_with(content: &str) -> FileTree {
        let mut tree = FileTree::new();
        tree.insert("index.js".to_string(), content.to_string());
        tree
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_edits_yields_one_call_with_final_content() {
        let sink = Arc::new(RecordingSink::default());
        let debouncer = PersistDebouncer::new(Duration::from_millis(1000), sink.clone());

        for i in 0..5 {
            debouncer.note_edit("p1", tree_with(&format!("v{i}"))).await;
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        // Quiet period elapses after the last edit
        tokio::time::sleep(Duration::from_millis(1100)).await;
        settle().await;

        let calls = sink.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "p1");
        assert_eq!(calls[0].1.get("index.js").unwrap(), "v4");
    }

    #[tokio::test(start_paused = true)]
    async fn no_call_before_the_window_elapses() {
        let sink = Arc::new(RecordingSink::default());
        let debouncer = PersistDebouncer::new(Duration::from_millis(1000), sink.clone());

        debouncer.note_edit("p1", tree_with("v0")).await;
        tokio::time::sleep(Duration::from_millis(900)).await;
        debouncer.note_edit("p1", tree_with("v1")).await;
        tokio::time::sleep(Duration::from_millis(900)).await;
        settle().await;
        assert!(sink.calls.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(200)).await;
        settle().await;
        assert_eq!(sink.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn flush_cancels_the_timer_and_writes_latest() {
        let sink = Arc::new(RecordingSink::default());
        let debouncer = PersistDebouncer::new(Duration::from_millis(1000), sink.clone());

        debouncer.note_edit("p1", tree_with("v0")).await;
        debouncer.flush("p1", None).await;
        settle().await;

        let calls = sink.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1.get("index.js").unwrap(), "v0");

        // Timer was cancelled, nothing further fires
        tokio::time::sleep(Duration::from_millis(2000)).await;
        settle().await;
        assert_eq!(sink.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn independent_projects_debounce_independently() {
        let sink = Arc::new(RecordingSink::default());
        let debouncer = PersistDebouncer::new(Duration::from_millis(1000), sink.clone());

        debouncer.note_edit("p1", tree_with("a")).await;
        debouncer.note_edit("p2", tree_with("b")).await;
        assert_eq!(debouncer.pending_count().await, 2);

        tokio::time::sleep(Duration::from_millis(1100)).await;
        settle().await;
        let mut projects: Vec<_> =
            sink.calls.lock().unwrap().iter().map(|(p, _)| p.clone()).collect();
        projects.sort();
        assert_eq!(projects, vec!["p1", "p2"]);
    }
}
