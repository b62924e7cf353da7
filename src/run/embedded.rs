use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::models::{FileTree, SyncError};
use crate::run::runtime::OutputStream;
use crate::run::sandbox::mount_tree;

/// Run a Python-family entry file to completion, synchronous relative
/// to the caller. Interpreter stdout feeds the chunk stream; a normal
/// exit appends the `[Exited]` marker, an exception appends an error
/// chunk with the interpreter's stderr.
pub async fn run(
    python_bin: &str,
    tree: &FileTree,
    entry: &str,
    out: &OutputStream,
) -> Result<(), SyncError> {
    if !tree.contains_key(entry) {
        return Err(SyncError::ExecutionFailure(format!("No such file: {}", entry)));
    }
    let dir = mount_tree(tree).await?;

    out.start("Starting (Python)...\n").await;
    let output = Command::new(python_bin)
        .arg(entry)
        .current_dir(dir.path())
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| {
            SyncError::ExecutionFailure(format!("Failed to spawn {}: {}", python_bin, e))
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.is_empty() {
        out.append(stdout.to_string()).await;
    }
    debug!("Embedded run of {} exited with {}", entry, output.status);
    if output.status.success() {
        out.append("\n[Exited]").await;
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        out.error(format!("\nError: {}", stderr.trim_end())).await;
    }
    Ok(())
}
