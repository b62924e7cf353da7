pub mod runtime;
pub mod sandbox;
pub mod embedded;
pub mod remote;

use tracing::{debug, info};

use crate::config::Config;
use crate::models::RunProjectRequest;
use crate::models::SyncError;
use crate::run::runtime::{OutputStream, RunPhase, RuntimeKind, runtime_for};
use crate::sync::broadcast::Broadcaster;

/// Routes a run request to one of the three runtimes by file extension
/// and streams its output back through the broadcaster. Every run gets
/// its own task; a slow or hung runtime never blocks other connections.
#[derive(Clone)]
pub struct ExecutionDispatcher {
    node_bin: String,
    python_bin: String,
    exec_service_url: Option<String>,
    http: reqwest::Client,
    broadcaster: Broadcaster,
}

impl ExecutionDispatcher {
    pub fn new(config: &Config, broadcaster: Broadcaster) -> Self {
        Self {
            node_bin: config.node_bin.clone(),
            python_bin: config.python_bin.clone(),
            exec_service_url: config.exec_service_url.clone(),
            http: reqwest::Client::new(),
            broadcaster,
        }
    }

    /// Start a run. Returns as soon as the run task is spawned; output
    /// arrives as `project-output` chunks. There is no cancellation for
    /// a dispatched run; it goes to completion or external timeout.
    pub fn dispatch(&self, req: RunProjectRequest) {
        let this = self.clone();
        tokio::spawn(async move {
            let kind = runtime_for(&req.run_file);
            info!(
                "Run of {} for project {} is {:?} via {:?}",
                req.run_file,
                req.project_id,
                RunPhase::Dispatched,
                kind
            );
            let out = OutputStream::new(
                this.broadcaster.clone(),
                req.room_id.clone(),
                req.socket_id.clone(),
            );
            debug!("Run of {} entering {:?}", req.run_file, RunPhase::Streaming);
            let result = match kind {
                RuntimeKind::Sandboxed => {
                    sandbox::run(&this.node_bin, &req.code, &req.run_file, &out).await
                }
                RuntimeKind::Embedded => {
                    embedded::run(&this.python_bin, &req.code, &req.run_file, &out).await
                }
                RuntimeKind::Remote => match &this.exec_service_url {
                    Some(url) => remote::submit(&this.http, url, &req, &out).await,
                    None => Err(SyncError::ExecutionFailure(
                        "No execution service configured".to_string(),
                    )),
                },
            };
            let phase = match result {
                Ok(()) => RunPhase::Done,
                Err(e) => {
                    // The stream stays open for further chunks; the
                    // error is just another chunk to the viewer
                    out.error(format!("\nError: {}\n", e)).await;
                    RunPhase::Error
                }
            };
            debug!("Run of {} finished in phase {:?}", req.run_file, phase);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::project_store_client::DiscardSink;
    use crate::models::{FileTree, ServerEvent, UserRef};
    use crate::persist::debounce::PersistDebouncer;
    use crate::sync::registry::SessionRegistry;
    use crate::sync::room::RoomManager;
    use crate::ws::connection::Connection;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;

    async fn python_available() -> bool {
        tokio::process::Command::new("python3")
            .arg("--version")
            .output()
            .await
            .is_ok()
    }

    #[tokio::test]
    async fn embedded_run_streams_stdout_then_exit_marker() {
        if !python_available().await {
            eprintln!("python3 not on PATH, skipping");
            return;
        }
        let debouncer = PersistDebouncer::new(Duration::from_millis(1000), Arc::new(DiscardSink));
        let bc = Broadcaster::new(SessionRegistry::new(), RoomManager::new(), debouncer);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let viewer = Connection::new(
            "a".to_string(),
            "p1".to_string(),
            UserRef { id: "user-a".to_string(), email: "a@test".to_string() },
            tx,
        );
        bc.registry().attach(viewer).await;

        let mut tree = FileTree::new();
        tree.insert("main.py".to_string(), "print('hi')".to_string());
        let out = OutputStream::new(bc.clone(), None, "a".to_string());
        embedded::run("python3", &tree, "main.py", &out).await.unwrap();

        let mut chunks = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let ServerEvent::Output(chunk) = event {
                chunks.push(chunk);
            }
        }
        assert!(chunks[0].is_start);
        assert!(chunks.iter().all(|c| !c.is_error));
        let text: String = chunks.iter().map(|c| c.output.as_str()).collect();
        assert!(text.contains("hi"));
        assert!(text.ends_with("[Exited]"));
    }
}
