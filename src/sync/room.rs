use std::collections::HashMap;
use std::sync::Arc;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{FileTree, SyncError};
use crate::ws::connection::Connection;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoomState {
    Forming,
    Active,
    Closed,
}

/// An ephemeral collaboration session scoped to one project, with one
/// host and a roster of members in join order. The room's file tree is
/// the point of truth while the session is active; clients hold read
/// replicas updated by applying received events.
pub struct Room {
    pub id: String,
    pub project_id: String,
    pub host_id: String,
    pub state: RoomState,
    pub roster: Vec<Connection>,
    pub file_tree: FileTree,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

pub struct JoinOutcome {
    pub host: Connection,
    pub roster: Vec<Connection>,
    pub newly_joined: bool,
}

pub struct LeaveOutcome {
    pub room_id: String,
    pub project_id: String,
    /// Roster after the departure, join order preserved
    pub roster: Vec<Connection>,
    pub closed: bool,
    /// Set when the departing connection was host and members remain
    pub new_host: Option<Connection>,
    /// Final cached tree, handed to the teardown flush when the room closed
    pub last_tree: Option<FileTree>,
}

pub struct WriteOutcome {
    pub project_id: String,
    /// Every current member except the writer
    pub peers: Vec<Connection>,
    /// Full tree after the write, for the persistence debouncer
    pub snapshot: FileTree,
}

struct Tables {
    rooms: HashMap<String, Room>,
    by_conn: HashMap<String, String>,
}

/// Room lifecycle and roster bookkeeping on top of the session registry.
/// A connection belongs to at most one room at a time; callers enforce
/// this by leaving before creating or joining another room.
#[derive(Clone)]
pub struct RoomManager {
    inner: Arc<RwLock<Tables>>,
}

impl Default for RoomManager {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomManager {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Tables {
                rooms: HashMap::new(),
                by_conn: HashMap::new(),
            })),
        }
    }

    /// Create a room with the requester as host. The requester's cached
    /// tree arrives later through the sync handshake; the room starts
    /// from the provided snapshot (usually the requester's working copy).
    pub async fn create_room(&self, conn: &Connection, tree: FileTree) -> (String, Vec<Connection>) {
        let room_id = new_room_token();
        let mut tables = self.inner.write().await;
        let mut room = Room {
            id: room_id.clone(),
            project_id: conn.project_id.clone(),
            host_id: String::new(),
            state: RoomState::Forming,
            roster: vec![conn.clone()],
            file_tree: tree,
            created_at: chrono::Utc::now(),
        };
        // Room becomes active once a host is assigned
        room.host_id = conn.id.clone();
        room.state = RoomState::Active;

        let roster = room.roster.clone();
        tables.by_conn.insert(conn.id.clone(), room_id.clone());
        tables.rooms.insert(room_id.clone(), room);
        info!("Room {} created for project {} by {}", room_id, conn.project_id, conn.id);
        (room_id, roster)
    }

    /// Add a connection to an existing room. Duplicate joins are a
    /// no-op, not an error.
    pub async fn join_room(&self, room_id: &str, conn: &Connection) -> Result<JoinOutcome, SyncError> {
        let mut tables = self.inner.write().await;
        let room = match tables.rooms.get_mut(room_id) {
            Some(room) if room.state == RoomState::Active => room,
            _ => return Err(SyncError::RoomNotFound(room_id.to_string())),
        };
        // A room token is only meaningful within its own project topic;
        // the roster must stay a subset of the project's connections
        if room.project_id != conn.project_id {
            debug!(
                "Connection {} on project {} tried to join room {} of project {}",
                conn.id, conn.project_id, room_id, room.project_id
            );
            return Err(SyncError::RoomNotFound(room_id.to_string()));
        }

        let newly_joined = room.roster.iter().all(|c| c.id != conn.id);
        if newly_joined {
            room.roster.push(conn.clone());
        }
        let host = room
            .roster
            .iter()
            .find(|c| c.id == room.host_id)
            .cloned()
            .unwrap_or_else(|| conn.clone());
        let roster = room.roster.clone();
        if newly_joined {
            tables.by_conn.insert(conn.id.clone(), room_id.to_string());
        }
        Ok(JoinOutcome { host, roster, newly_joined })
    }

    /// Remove a connection from its room, if any. A lost connection is
    /// handled identically to an explicit leave. When the host departs
    /// and members remain, the earliest-joined member becomes host so
    /// later joiners still have a sync source.
    pub async fn leave(&self, conn_id: &str) -> Option<LeaveOutcome> {
        let mut tables = self.inner.write().await;
        let room_id = tables.by_conn.remove(conn_id)?;
        let (emptied, was_host) = {
            let room = tables.rooms.get_mut(&room_id)?;
            room.roster.retain(|c| c.id != conn_id);
            (room.roster.is_empty(), room.host_id == conn_id)
        };

        if emptied {
            let mut room = tables.rooms.remove(&room_id)?;
            room.state = RoomState::Closed;
            info!(
                "Room {} emptied after {}s, evicting",
                room.id,
                (chrono::Utc::now() - room.created_at).num_seconds()
            );
            return Some(LeaveOutcome {
                room_id,
                project_id: room.project_id,
                roster: Vec::new(),
                closed: true,
                new_host: None,
                last_tree: Some(room.file_tree),
            });
        }

        let room = tables.rooms.get_mut(&room_id)?;
        let mut new_host = None;
        if was_host {
            let promoted = room.roster[0].clone();
            debug!("Host {} left room {}, promoting {}", conn_id, room_id, promoted.id);
            room.host_id = promoted.id.clone();
            new_host = Some(promoted);
        }
        Some(LeaveOutcome {
            room_id: room_id.clone(),
            project_id: room.project_id.clone(),
            roster: room.roster.clone(),
            closed: false,
            new_host,
            last_tree: None,
        })
    }

    /// Apply a full-content overwrite to the writer's room tree.
    /// Last-applied edit for a file wins; no merge, no rejection.
    pub async fn apply_write(&self, conn_id: &str, file: &str, content: &str) -> Option<WriteOutcome> {
        let mut tables = self.inner.write().await;
        let room_id = tables.by_conn.get(conn_id)?.clone();
        let room = tables.rooms.get_mut(&room_id)?;
        room.file_tree.insert(file.to_string(), content.to_string());
        Some(WriteOutcome {
            project_id: room.project_id.clone(),
            peers: room.roster.iter().filter(|c| c.id != conn_id).cloned().collect(),
            snapshot: room.file_tree.clone(),
        })
    }

    /// Replace the room tree with the host's snapshot during handoff.
    /// Only the current host may do this; returns the joiner connection
    /// the snapshot should be forwarded to.
    pub async fn replace_tree(
        &self,
        host_conn_id: &str,
        target_socket_id: &str,
        tree: FileTree,
    ) -> Option<Connection> {
        let mut tables = self.inner.write().await;
        let room_id = tables.by_conn.get(host_conn_id)?.clone();
        let room = tables.rooms.get_mut(&room_id)?;
        if room.host_id != host_conn_id {
            debug!("Ignoring sync-file-tree from non-host {}", host_conn_id);
            return None;
        }
        room.file_tree = tree;
        room.roster.iter().find(|c| c.id == target_socket_id).cloned()
    }

    pub async fn room_of(&self, conn_id: &str) -> Option<String> {
        let tables = self.inner.read().await;
        tables.by_conn.get(conn_id).cloned()
    }

    pub async fn members(&self, room_id: &str) -> Vec<Connection> {
        let tables = self.inner.read().await;
        tables.rooms.get(room_id).map(|r| r.roster.clone()).unwrap_or_default()
    }

    pub async fn count(&self) -> u32 {
        let tables = self.inner.read().await;
        tables.rooms.len() as u32
    }
}

/// Opaque random room token: 128 random bits, URL-safe base64
fn new_room_token() -> String {
    URL_SAFE_NO_PAD.encode(Uuid::new_v4().as_bytes())
}
