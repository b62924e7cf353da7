use crate::models::OutputChunk;
use crate::sync::broadcast::Broadcaster;

/// The three run backends, all converging on one output-chunk contract
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuntimeKind {
    /// Local sandboxed JS interpreter process over a mounted tree
    Sandboxed,
    /// Embedded Python interpreter, synchronous relative to the caller
    Embedded,
    /// Remote execution service, chunks pushed back asynchronously
    Remote,
}

/// Pure routing function: pick the runtime from the entry file extension
pub fn runtime_for(run_file: &str) -> RuntimeKind {
    let ext = run_file.rsplit('.').next().unwrap_or("");
    match ext.to_ascii_lowercase().as_str() {
        "js" | "mjs" | "cjs" | "jsx" => RuntimeKind::Sandboxed,
        "py" | "pyw" => RuntimeKind::Embedded,
        _ => RuntimeKind::Remote,
    }
}

/// Lifecycle of one dispatched run; before dispatch a run has no phase
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunPhase {
    Dispatched,
    Streaming,
    Done,
    Error,
}

/// Handle through which a runtime emits output chunks to the requesting
/// room (or back to the lone requester). The first chunk of a run opens
/// the output view and clears any prior buffer; later chunks append; an
/// error chunk marks the stream but does not stop it.
#[derive(Clone)]
pub struct OutputStream {
    broadcaster: Broadcaster,
    room_id: Option<String>,
    socket_id: String,
}

impl OutputStream {
    pub fn new(broadcaster: Broadcaster, room_id: Option<String>, socket_id: String) -> Self {
        Self { broadcaster, room_id, socket_id }
    }

    pub async fn start(&self, output: impl Into<String>) {
        self.emit(output.into(), false, true).await;
    }

    pub async fn append(&self, output: impl Into<String>) {
        self.emit(output.into(), false, false).await;
    }

    pub async fn error(&self, output: impl Into<String>) {
        self.emit(output.into(), true, false).await;
    }

    async fn emit(&self, output: String, is_error: bool, is_start: bool) {
        self.broadcaster
            .deliver_output(
                self.room_id.as_deref(),
                Some(&self.socket_id),
                OutputChunk { output, is_error, is_start },
            )
            .await;
    }
}
