use tracing::info;

use crate::models::{RunProjectRequest, SyncError};
use crate::run::runtime::OutputStream;

/// Submit a run request to the remote execution service. The service
/// pushes output chunks back asynchronously through the run-output
/// ingest endpoint; there is no upper bound on its latency and the
/// dispatcher does not wait for completion.
pub async fn submit(
    client: &reqwest::Client,
    service_url: &str,
    req: &RunProjectRequest,
    out: &OutputStream,
) -> Result<(), SyncError> {
    out.start("Sending to execution service...\n").await;
    let url = format!("{}/run", service_url);
    info!("Submitting {} run for project {} to {}", req.run_file, req.project_id, url);
    client
        .post(&url)
        .json(req)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| SyncError::ExecutionFailure(format!("Execution service rejected run: {}", e)))?;
    Ok(())
}
