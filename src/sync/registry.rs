use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::ws::connection::Connection;

/// Process-wide table of live connections per project topic.
///
/// An entry is created on the first connection for a project and pruned
/// when its last connection detaches. Created at server start and
/// injected into the components that need it, not held as an ambient
/// global.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<RwLock<HashMap<String, Vec<Connection>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn attach(&self, conn: Connection) {
        let mut projects = self.inner.write().await;
        let members = projects.entry(conn.project_id.clone()).or_default();
        if members.iter().all(|c| c.id != conn.id) {
            debug!("Connection {} attached to project {}", conn.id, conn.project_id);
            members.push(conn);
        }
    }

    /// Detach a connection. Detaching an unknown connection is a no-op.
    pub async fn detach(&self, conn: &Connection) {
        let mut projects = self.inner.write().await;
        if let Some(members) = projects.get_mut(&conn.project_id) {
            members.retain(|c| c.id != conn.id);
            if members.is_empty() {
                projects.remove(&conn.project_id);
                debug!("Project topic {} emptied, pruning", conn.project_id);
            }
        }
    }

    pub async fn members(&self, project_id: &str) -> Vec<Connection> {
        let projects = self.inner.read().await;
        projects.get(project_id).cloned().unwrap_or_default()
    }

    /// Look up a live connection by its id across all project topics
    pub async fn find(&self, conn_id: &str) -> Option<Connection> {
        let projects = self.inner.read().await;
        projects.values().flatten().find(|c| c.id == conn_id).cloned()
    }

    /// (projects, connections) counts for diagnostics
    pub async fn counts(&self) -> (u32, u32) {
        let projects = self.inner.read().await;
        let conns = projects.values().map(|v| v.len() as u32).sum();
        (projects.len() as u32, conns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserRef;
    use tokio::sync::mpsc;

    fn conn(id: &str, project: &str) -> Connection {
        let (tx, _rx) = mpsc::unbounded_channel();
        Connection::new(
            id.to_string(),
            project.to_string(),
            UserRef { id: format!("user-{id}"), email: format!("{id}@test") },
            tx,
        )
    }

    #[tokio::test]
    async fn attach_detach_prunes_empty_entries() {
        let registry = SessionRegistry::new();
        let a = conn("a", "p1");
        let b = conn("b", "p1");
        registry.attach(a.clone()).await;
        registry.attach(b.clone()).await;
        assert_eq!(registry.members("p1").await.len(), 2);

        registry.detach(&a).await;
        registry.detach(&b).await;
        assert!(registry.members("p1").await.is_empty());
        assert_eq!(registry.counts().await, (0, 0));
    }

    #[tokio::test]
    async fn duplicate_attach_and_unknown_detach_are_noops() {
        let registry = SessionRegistry::new();
        let a = conn("a", "p1");
        registry.attach(a.clone()).await;
        registry.attach(a.clone()).await;
        assert_eq!(registry.members("p1").await.len(), 1);

        let ghost = conn("ghost", "p2");
        registry.detach(&ghost).await;
        assert_eq!(registry.counts().await, (1, 1));
    }
}
