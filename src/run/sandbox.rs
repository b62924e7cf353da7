use std::path::Path;
use std::process::Stdio;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::debug;

use crate::models::{FileTree, SyncError, is_valid_tree_path};
use crate::run::runtime::OutputStream;

/// Run a JS-family entry file in a local interpreter process over a
/// throwaway mount of the tree. stdout and stderr stream back as chunks
/// while the process runs.
pub async fn run(
    node_bin: &str,
    tree: &FileTree,
    entry: &str,
    out: &OutputStream,
) -> Result<(), SyncError> {
    let dir = mount_tree(tree).await?;

    out.start("Starting (Node.js)...\n").await;
    let mut child = Command::new(node_bin)
        .arg(entry)
        .current_dir(dir.path())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| SyncError::ExecutionFailure(format!("Failed to spawn {}: {}", node_bin, e)))?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let out_task = {
        let out = out.clone();
        async move {
            if let Some(stdout) = stdout {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    out.append(format!("{line}\n")).await;
                }
            }
        }
    };
    let err_task = {
        let out = out.clone();
        async move {
            if let Some(stderr) = stderr {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    out.error(format!("{line}\n")).await;
                }
            }
        }
    };
    tokio::join!(out_task, err_task);

    let status = child
        .wait()
        .await
        .map_err(|e| SyncError::ExecutionFailure(format!("Failed to wait on process: {}", e)))?;
    debug!("Sandboxed run of {} exited with {}", entry, status);
    if !status.success() {
        out.error(format!("\nProcess exited with {}\n", status)).await;
    }
    Ok(())
}

/// Write the tree into a temp directory. Keys are validated again here;
/// the mount is the last line of defense against path escapes.
pub async fn mount_tree(tree: &FileTree) -> Result<TempDir, SyncError> {
    let dir = tempfile::tempdir()
        .map_err(|e| SyncError::ExecutionFailure(format!("Failed to create workdir: {}", e)))?;
    for (path, content) in tree {
        if !is_valid_tree_path(path) {
            return Err(SyncError::ExecutionFailure(format!("Invalid file path: {}", path)));
        }
        let full = dir.path().join(path);
        if let Some(parent) = full.parent() {
            if parent != Path::new("") {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    SyncError::ExecutionFailure(format!("Failed to create {}: {}", path, e))
                })?;
            }
        }
        tokio::fs::write(&full, content).await.map_err(|e| {
            SyncError::ExecutionFailure(format!("Failed to write {}: {}", path, e))
        })?;
    }
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mounts_nested_paths() {
        let mut tree = FileTree::new();
        tree.insert("index.js".to_string(), "console.log(1)".to_string());
        tree.insert("lib/util.js".to_string(), "module.exports = {}".to_string());
        let dir = mount_tree(&tree).await.unwrap();
        assert!(dir.path().join("index.js").is_file());
        assert!(dir.path().join("lib/util.js").is_file());
    }

    #[tokio::test]
    async fn refuses_escaping_tree() {
        let mut tree = FileTree::new();
        tree.insert("../evil.js".to_string(), String::new());
        let err = mount_tree(&tree).await.err().unwrap();
        assert!(matches!(err, SyncError::ExecutionFailure(_)));
    }
}
