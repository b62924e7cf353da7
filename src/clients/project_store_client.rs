use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::models::{ChatMessage, FileTree, ProjectState, SyncError};
use crate::persist::debounce::ProjectSink;

static PROJECT_STORE_CLIENT: OnceCell<Arc<ProjectStoreClient>> = OnceCell::const_new();

/// HTTP client for the external project store and assistant service.
/// The store owns project CRUD and the persisted file trees; this
/// service only reads projects and replaces trees on its behalf.
#[derive(Debug)]
pub struct ProjectStoreClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct GetProjectResponse {
    project: ProjectState,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateFileTreeRequest<'a> {
    file_tree: &'a FileTree,
}

#[derive(Debug, Serialize)]
struct AssistantRequest<'a> {
    #[serde(rename = "projectId")]
    project_id: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct AssistantResponse {
    result: String,
}

impl ProjectStoreClient {
    pub fn new(base_url: String) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("Failed to build reqwest client");

        Self { client, base_url }
    }

    /// Fetch a project by id
    pub async fn get_project(&self, project_id: &str) -> Result<ProjectState, reqwest::Error> {
        let url = format!("{}/projects/get-project/{}", self.base_url, project_id);
        let res: GetProjectResponse =
            self.client.get(&url).send().await?.error_for_status()?.json().await?;
        Ok(res.project)
    }

    /// Replace a project's persisted file tree with the given snapshot
    pub async fn update_file_tree(
        &self,
        project_id: &str,
        tree: &FileTree,
    ) -> Result<(), reqwest::Error> {
        let url = format!("{}/projects/update-file-tree/{}", self.base_url, project_id);
        self.client
            .put(&url)
            .json(&UpdateFileTreeRequest { file_tree: tree })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Append one entry to the project's message log
    pub async fn append_message(
        &self,
        project_id: &str,
        message: &ChatMessage,
    ) -> Result<(), reqwest::Error> {
        let url = format!("{}/projects/append-message/{}", self.base_url, project_id);
        self.client.post(&url).json(message).send().await?.error_for_status()?;
        Ok(())
    }

    /// Forward an assistant-mentioned chat message; the reply re-enters
    /// the chat channel under the reserved assistant sender id.
    pub async fn ask_assistant(
        &self,
        project_id: &str,
        prompt: &str,
    ) -> Result<String, reqwest::Error> {
        let url = format!("{}/ai/get-result", self.base_url);
        let res: AssistantResponse = self
            .client
            .post(&url)
            .json(&AssistantRequest { project_id, prompt })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(res.result)
    }
}

impl ProjectSink for ProjectStoreClient {
    fn persist(
        &self,
        project_id: String,
        tree: FileTree,
    ) -> Pin<Box<dyn Future<Output = Result<(), SyncError>> + Send>> {
        let this = Self { client: self.client.clone(), base_url: self.base_url.clone() };
        Box::pin(async move {
            debug!("Persisting file tree for project {}", project_id);
            this.update_file_tree(&project_id, &tree)
                .await
                .map_err(|e| SyncError::PersistenceFailure(e.to_string()))?;
            Ok(())
        })
    }
}

/// Sink used when no project store is configured; snapshots are dropped
pub struct DiscardSink;

impl ProjectSink for DiscardSink {
    fn persist(
        &self,
        project_id: String,
        _tree: FileTree,
    ) -> Pin<Box<dyn Future<Output = Result<(), SyncError>> + Send>> {
        Box::pin(async move {
            debug!("No project store configured, dropping snapshot for {}", project_id);
            Ok(())
        })
    }
}

/// Initialize the global ProjectStoreClient
pub fn init_project_store_client(base_url: String) -> Result<(), &'static str> {
    let client = ProjectStoreClient::new(base_url);
    PROJECT_STORE_CLIENT
        .set(Arc::new(client))
        .map_err(|_| "ProjectStoreClient already initialized")
}

/// Get the global ProjectStoreClient instance
pub fn get_project_store_client() -> Option<Arc<ProjectStoreClient>> {
    PROJECT_STORE_CLIENT.get().cloned()
}
