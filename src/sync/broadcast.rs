use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::clients::project_store_client::get_project_store_client;
use crate::models::{
    ChatMessage, ClientEvent, CursorMoveMessage, CursorPos, FileChangeMessage, FileTree,
    OutputChunk, RosterEntry, ServerEvent, SyncFileTreeMessage, UserRef, WriteMessage,
    is_valid_tree_path,
};
use crate::persist::debounce::PersistDebouncer;
use crate::sync::registry::SessionRegistry;
use crate::sync::room::RoomManager;
use crate::ws::connection::Connection;

/// "Who is editing what", volatile, evicted on disconnect
#[derive(Clone, Debug)]
struct FilePresence {
    file: String,
    sender: UserRef,
}

/// Routes edit, cursor, presence, chat and execution-output events to
/// the correct subset of room members, and drives the host-handoff
/// handshake. All routing is scoped to the sender's current room, never
/// to all project viewers.
#[derive(Clone)]
pub struct Broadcaster {
    registry: SessionRegistry,
    rooms: RoomManager,
    debouncer: PersistDebouncer,
    presence: Arc<RwLock<HashMap<String, FilePresence>>>,
    cursors: Arc<RwLock<HashMap<String, CursorPos>>>,
}

impl Broadcaster {
    pub fn new(registry: SessionRegistry, rooms: RoomManager, debouncer: PersistDebouncer) -> Self {
        Self {
            registry,
            rooms,
            debouncer,
            presence: Arc::new(RwLock::new(HashMap::new())),
            cursors: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn rooms(&self) -> &RoomManager {
        &self.rooms
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn debouncer(&self) -> &PersistDebouncer {
        &self.debouncer
    }

    /// Dispatch one client event. Failures surface as an `error` event
    /// to the originating connection only; nothing here is fatal.
    pub async fn handle_event(&self, conn: &Connection, event: ClientEvent) {
        match event {
            ClientEvent::CreateRoom { project_id } => self.create_room(conn, project_id).await,
            ClientEvent::JoinRoom { room_id } => self.join_room(conn, room_id).await,
            ClientEvent::LeaveRoom => self.leave_current(conn).await,
            ClientEvent::SyncFileTree(msg) => self.sync_file_tree(conn, msg).await,
            ClientEvent::Write(msg) => self.write(conn, msg).await,
            ClientEvent::CursorMove(msg) => self.cursor_move(conn, msg).await,
            ClientEvent::FileChange(msg) => self.file_change(conn, msg).await,
            ClientEvent::Message(msg) => self.message(conn, msg).await,
        }
    }

    /// A lost connection is treated identically to an explicit leave
    pub async fn handle_disconnect(&self, conn: &Connection) {
        self.cursors.write().await.remove(&conn.id);
        self.presence.write().await.remove(&conn.id);
        self.leave_current(conn).await;
        self.registry.detach(conn).await;
    }

    async fn create_room(&self, conn: &Connection, project_id: String) {
        if project_id != conn.project_id {
            self.send_error(conn, "Cannot create a room for another project");
            return;
        }
        // A connection holds at most one room at a time
        self.leave_current(conn).await;
        // Seed the room cache from the store; the tree converges anyway
        // through writes and the host handoff if this fails
        let initial_tree = match get_project_store_client() {
            Some(store) => match store.get_project(&project_id).await {
                Ok(project) => project.file_tree,
                Err(e) => {
                    warn!("Could not seed room tree for project {}: {}", project_id, e);
                    FileTree::new()
                }
            },
            None => FileTree::new(),
        };
        let (room_id, roster) = self.rooms.create_room(conn, initial_tree).await;
        conn.send(ServerEvent::RoomCreated { room_id });
        self.send_roster(&roster);
    }

    async fn join_room(&self, conn: &Connection, room_id: String) {
        if let Some(current) = self.rooms.room_of(&conn.id).await {
            if current != room_id {
                self.leave_current(conn).await;
            }
        }
        match self.rooms.join_room(&room_id, conn).await {
            Ok(outcome) => {
                conn.send(ServerEvent::RoomJoined { room_id: room_id.clone() });
                if outcome.newly_joined {
                    self.send_roster(&outcome.roster);
                    // Ask the host to push its tree to the joiner
                    if outcome.host.id != conn.id {
                        outcome.host.send(ServerEvent::RequestSync { socket_id: conn.id.clone() });
                    }
                    self.catch_up(conn, &outcome.roster).await;
                } else {
                    conn.send(ServerEvent::RoomUsers { users: roster_entries(&outcome.roster) });
                }
            }
            Err(e) => self.send_error(conn, &e.to_string()),
        }
    }

    /// Replay the volatile presence and cursor state of existing
    /// members to a fresh joiner, so "who is editing what" renders
    /// without waiting for everyone to move again.
    async fn catch_up(&self, joiner: &Connection, roster: &[Connection]) {
        let presence = self.presence.read().await;
        let cursors = self.cursors.read().await;
        for member in roster {
            if member.id == joiner.id {
                continue;
            }
            if let Some(p) = presence.get(&member.id) {
                joiner.send(ServerEvent::FileChange {
                    file: p.file.clone(),
                    sender: p.sender.clone(),
                    socket_id: member.id.clone(),
                    color: member.color.clone(),
                });
            }
            if let Some(cursor) = cursors.get(&member.id) {
                joiner.send(ServerEvent::CursorMove {
                    cursor: *cursor,
                    socket_id: member.id.clone(),
                    user_id: member.user.id.clone(),
                    email: member.user.email.clone(),
                    color: member.color.clone(),
                });
            }
        }
    }

    async fn leave_current(&self, conn: &Connection) {
        if let Some(outcome) = self.rooms.leave(&conn.id).await {
            if outcome.closed {
                // Best-effort flush of the final tree on teardown
                self.debouncer.flush(&outcome.project_id, outcome.last_tree).await;
            } else {
                if let Some(host) = &outcome.new_host {
                    debug!("Room {} host is now {}", outcome.room_id, host.id);
                }
                self.send_roster(&outcome.roster);
            }
        }
    }

    /// Host handoff: the host's snapshot replaces the room tree and is
    /// forwarded point-to-point to the requesting joiner.
    async fn sync_file_tree(&self, conn: &Connection, msg: SyncFileTreeMessage) {
        if let Some(bad) = msg.file_tree.keys().find(|k| !is_valid_tree_path(k)) {
            self.send_error(conn, &format!("Invalid file path in tree: {}", bad));
            return;
        }
        match self.rooms.replace_tree(&conn.id, &msg.socket_id, msg.file_tree.clone()).await {
            Some(target) => target.send(ServerEvent::SyncFileTree(msg)),
            None => debug!("Dropping sync-file-tree from {} (not host, or joiner gone)", conn.id),
        }
    }

    async fn write(&self, conn: &Connection, msg: WriteMessage) {
        if !is_valid_tree_path(&msg.file) {
            self.send_error(conn, &format!("Invalid file path: {}", msg.file));
            return;
        }
        match self.rooms.apply_write(&conn.id, &msg.file, &msg.content).await {
            Some(outcome) => {
                for peer in &outcome.peers {
                    peer.send(ServerEvent::Write(msg.clone()));
                }
                self.debouncer.note_edit(&outcome.project_id, outcome.snapshot).await;
            }
            None => debug!("Ignoring write from {} outside a room", conn.id),
        }
    }

    async fn cursor_move(&self, conn: &Connection, msg: CursorMoveMessage) {
        self.cursors.write().await.insert(conn.id.clone(), msg.cursor);
        let Some(room_id) = self.rooms.room_of(&conn.id).await else {
            return;
        };
        let event = ServerEvent::CursorMove {
            cursor: msg.cursor,
            socket_id: conn.id.clone(),
            user_id: conn.user.id.clone(),
            email: conn.user.email.clone(),
            color: conn.color.clone(),
        };
        for member in self.rooms.members(&room_id).await {
            if member.id != conn.id {
                member.send(event.clone());
            }
        }
    }

    async fn file_change(&self, conn: &Connection, msg: FileChangeMessage) {
        self.presence.write().await.insert(
            conn.id.clone(),
            FilePresence { file: msg.file.clone(), sender: conn.user.clone() },
        );
        let Some(room_id) = self.rooms.room_of(&conn.id).await else {
            return;
        };
        let event = ServerEvent::FileChange {
            file: msg.file,
            sender: conn.user.clone(),
            socket_id: conn.id.clone(),
            color: conn.color.clone(),
        };
        for member in self.rooms.members(&room_id).await {
            member.send(event.clone());
        }
    }

    async fn message(&self, conn: &Connection, msg: ChatMessage) {
        let Some(room_id) = self.rooms.room_of(&conn.id).await else {
            debug!("Ignoring chat message from {} outside a room", conn.id);
            return;
        };
        for member in self.rooms.members(&room_id).await {
            if member.id != conn.id {
                member.send(ServerEvent::Message(msg.clone()));
            }
        }
        let project_id = conn.project_id.clone();
        if let Some(store) = get_project_store_client() {
            let log_msg = msg.clone();
            let pid = project_id.clone();
            let store_clone = store.clone();
            tokio::spawn(async move {
                if let Err(e) = store_clone.append_message(&pid, &log_msg).await {
                    warn!("Failed to append message to project {}: {}", pid, e);
                }
            });
        }
        if msg.mentions_assistant() {
            self.route_to_assistant(room_id, project_id, msg).await;
        }
    }

    /// Forward an @ai mention to the assistant collaborator; the reply
    /// re-enters the chat channel under the reserved assistant sender.
    async fn route_to_assistant(&self, room_id: String, project_id: String, msg: ChatMessage) {
        let Some(store) = get_project_store_client() else {
            warn!("Assistant mentioned but no project store configured");
            return;
        };
        let rooms = self.rooms.clone();
        tokio::spawn(async move {
            let reply = match store.ask_assistant(&project_id, &msg.message).await {
                Ok(text) => ChatMessage::from_assistant(text),
                Err(e) => {
                    warn!("Assistant request failed for project {}: {}", project_id, e);
                    return;
                }
            };
            // Membership may have changed while the assistant was thinking
            for member in rooms.members(&room_id).await {
                member.send(ServerEvent::Message(reply.clone()));
            }
            if let Err(e) = store.append_message(&project_id, &reply).await {
                warn!("Failed to append assistant reply to project {}: {}", project_id, e);
            }
        });
    }

    /// Execution output fan-out: a room-scoped run streams to every
    /// member; a solo run streams back to the requester only.
    pub async fn deliver_output(
        &self,
        room_id: Option<&str>,
        socket_id: Option<&str>,
        chunk: OutputChunk,
    ) {
        if let Some(room_id) = room_id {
            let members = self.rooms.members(room_id).await;
            if !members.is_empty() {
                for member in members {
                    member.send(ServerEvent::Output(chunk.clone()));
                }
                return;
            }
        }
        if let Some(socket_id) = socket_id {
            match self.registry.find(socket_id).await {
                Some(conn) => conn.send(ServerEvent::Output(chunk)),
                None => debug!("Dropping output chunk for unknown connection {}", socket_id),
            }
        }
    }

    fn send_roster(&self, roster: &[Connection]) {
        let event = ServerEvent::RoomUsers { users: roster_entries(roster) };
        for member in roster {
            member.send(event.clone());
        }
    }

    fn send_error(&self, conn: &Connection, message: &str) {
        conn.send(ServerEvent::Error { message: message.to_string() });
    }
}

fn roster_entries(roster: &[Connection]) -> Vec<RosterEntry> {
    roster.iter().map(|c| c.roster_entry()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::project_store_client::DiscardSink;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn broadcaster() -> Broadcaster {
        let debouncer = PersistDebouncer::new(Duration::from_millis(1000), Arc::new(DiscardSink));
        Broadcaster::new(SessionRegistry::new(), RoomManager::new(), debouncer)
    }

    fn conn(id: &str) -> (Connection, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = Connection::new(
            id.to_string(),
            "p1".to_string(),
            UserRef { id: format!("user-{id}"), email: format!("{id}@test") },
            tx,
        );
        (conn, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    async fn create_room(bc: &Broadcaster, conn: &Connection) -> String {
        bc.handle_event(conn, ClientEvent::CreateRoom { project_id: conn.project_id.clone() })
            .await;
        bc.rooms().room_of(&conn.id).await.expect("room created")
    }

    #[tokio::test]
    async fn join_handshake_requests_sync_from_host_and_hands_off_tree() {
        let bc = broadcaster();
        let (a, mut a_rx) = conn("a");
        let (b, mut b_rx) = conn("b");

        let room_id = create_room(&bc, &a).await;
        let events = drain(&mut a_rx);
        assert!(matches!(&events[0], ServerEvent::RoomCreated { room_id: r } if *r == room_id));
        assert!(matches!(&events[1], ServerEvent::RoomUsers { users } if users.len() == 1));

        bc.handle_event(&b, ClientEvent::JoinRoom { room_id: room_id.clone() }).await;

        let b_events = drain(&mut b_rx);
        assert!(matches!(&b_events[0], ServerEvent::RoomJoined { room_id: r } if *r == room_id));
        assert!(matches!(&b_events[1], ServerEvent::RoomUsers { users } if users.len() == 2));

        let a_events = drain(&mut a_rx);
        assert!(matches!(&a_events[0], ServerEvent::RoomUsers { users } if users.len() == 2));
        let ServerEvent::RequestSync { socket_id } = &a_events[1] else {
            panic!("host did not receive request-sync: {:?}", a_events[1]);
        };
        assert_eq!(socket_id, "b");

        // Host answers with its tree; the joiner receives it point-to-point
        let mut tree = FileTree::new();
        tree.insert("index.js".to_string(), "console.log(1)".to_string());
        bc.handle_event(
            &a,
            ClientEvent::SyncFileTree(SyncFileTreeMessage {
                socket_id: "b".to_string(),
                file_tree: tree.clone(),
            }),
        )
        .await;

        let b_events = drain(&mut b_rx);
        let ServerEvent::SyncFileTree(msg) = &b_events[0] else {
            panic!("joiner did not receive snapshot: {:?}", b_events[0]);
        };
        assert_eq!(msg.file_tree, tree);
        assert!(drain(&mut a_rx).is_empty());
    }

    #[tokio::test]
    async fn writes_reach_every_other_member_and_are_never_echoed() {
        let bc = broadcaster();
        let (a, mut a_rx) = conn("a");
        let (b, mut b_rx) = conn("b");
        let (c, mut c_rx) = conn("c");

        let room_id = create_room(&bc, &a).await;
        bc.handle_event(&b, ClientEvent::JoinRoom { room_id: room_id.clone() }).await;
        bc.handle_event(&c, ClientEvent::JoinRoom { room_id }).await;
        drain(&mut a_rx);
        drain(&mut b_rx);
        drain(&mut c_rx);

        let write = WriteMessage {
            file: "index.js".to_string(),
            content: "console.log(1)".to_string(),
        };
        bc.handle_event(&a, ClientEvent::Write(write.clone())).await;

        for rx in [&mut b_rx, &mut c_rx] {
            let events = drain(rx);
            let ServerEvent::Write(msg) = &events[0] else {
                panic!("peer did not receive write: {:?}", events[0]);
            };
            assert_eq!(msg.content, write.content);
        }
        assert!(drain(&mut a_rx).is_empty(), "write echoed back to sender");
    }

    #[tokio::test]
    async fn join_unknown_room_yields_error_to_originator_only() {
        let bc = broadcaster();
        let (a, mut a_rx) = conn("a");
        bc.handle_event(&a, ClientEvent::JoinRoom { room_id: "ghost".to_string() }).await;
        let events = drain(&mut a_rx);
        assert!(matches!(&events[0], ServerEvent::Error { message } if message.contains("ghost")));
        assert!(bc.rooms().room_of("a").await.is_none());
    }

    #[tokio::test]
    async fn duplicate_join_does_not_retrigger_sync() {
        let bc = broadcaster();
        let (a, mut a_rx) = conn("a");
        let (b, mut b_rx) = conn("b");

        let room_id = create_room(&bc, &a).await;
        bc.handle_event(&b, ClientEvent::JoinRoom { room_id: room_id.clone() }).await;
        drain(&mut a_rx);
        drain(&mut b_rx);

        bc.handle_event(&b, ClientEvent::JoinRoom { room_id }).await;
        let b_events = drain(&mut b_rx);
        assert!(matches!(&b_events[0], ServerEvent::RoomJoined { .. }));
        assert!(matches!(&b_events[1], ServerEvent::RoomUsers { users } if users.len() == 2));
        assert!(drain(&mut a_rx).is_empty(), "host saw events for a no-op join");
    }

    #[tokio::test]
    async fn disconnect_is_treated_as_leave() {
        let bc = broadcaster();
        let (a, mut a_rx) = conn("a");
        let (b, mut b_rx) = conn("b");

        let room_id = create_room(&bc, &a).await;
        bc.handle_event(&b, ClientEvent::JoinRoom { room_id: room_id.clone() }).await;
        drain(&mut a_rx);
        drain(&mut b_rx);

        bc.handle_disconnect(&b).await;
        let events = drain(&mut a_rx);
        let ServerEvent::RoomUsers { users } = &events[0] else {
            panic!("no roster update after disconnect: {:?}", events[0]);
        };
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].socket_id, "a");
        assert_eq!(bc.rooms().members(&room_id).await.len(), 1);
    }

    #[tokio::test]
    async fn cursor_moves_carry_sender_identity_and_skip_the_sender() {
        let bc = broadcaster();
        let (a, mut a_rx) = conn("a");
        let (b, mut b_rx) = conn("b");

        let room_id = create_room(&bc, &a).await;
        bc.handle_event(&b, ClientEvent::JoinRoom { room_id: room_id.clone() }).await;
        drain(&mut a_rx);
        drain(&mut b_rx);

        bc.handle_event(
            &a,
            ClientEvent::CursorMove(CursorMoveMessage {
                cursor: CursorPos { line_number: 4, column: 2 },
                room_id: Some(room_id),
            }),
        )
        .await;

        let events = drain(&mut b_rx);
        let ServerEvent::CursorMove { cursor, socket_id, email, .. } = &events[0] else {
            panic!("peer did not receive cursor: {:?}", events[0]);
        };
        assert_eq!(*cursor, CursorPos { line_number: 4, column: 2 });
        assert_eq!(socket_id, "a");
        assert_eq!(email, "a@test");
        assert!(drain(&mut a_rx).is_empty());
    }

    #[tokio::test]
    async fn invalid_write_path_is_rejected_with_error() {
        let bc = broadcaster();
        let (a, mut a_rx) = conn("a");
        create_room(&bc, &a).await;
        drain(&mut a_rx);

        bc.handle_event(
            &a,
            ClientEvent::Write(WriteMessage {
                file: "../escape.js".to_string(),
                content: String::new(),
            }),
        )
        .await;
        let events = drain(&mut a_rx);
        assert!(matches!(&events[0], ServerEvent::Error { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn edits_in_one_window_persist_once_with_final_content() {
        use crate::persist::debounce::ProjectSink;
        use std::future::Future;
        use std::pin::Pin;

        #[derive(Default)]
        struct RecordingSink {
            calls: std::sync::Mutex<Vec<(String, FileTree)>>,
        }
        impl ProjectSink for RecordingSink {
            fn persist(
                &self,
                project_id: String,
                tree: FileTree,
            ) -> Pin<Box<dyn Future<Output = Result<(), crate::models::SyncError>> + Send>>
            {
                self.calls.lock().unwrap().push((project_id, tree));
                Box::pin(async { Ok(()) })
            }
        }

        let sink = Arc::new(RecordingSink::default());
        let debouncer = PersistDebouncer::new(Duration::from_millis(1000), sink.clone());
        let bc = Broadcaster::new(SessionRegistry::new(), RoomManager::new(), debouncer);
        let (a, _a_rx) = conn("a");
        create_room(&bc, &a).await;

        for i in 0..5 {
            bc.handle_event(
                &a,
                ClientEvent::Write(WriteMessage {
                    file: "index.js".to_string(),
                    content: format!("v{i}"),
                }),
            )
            .await;
            tokio::time::sleep(Duration::from_millis(40)).await;
        }
        tokio::time::sleep(Duration::from_millis(1100)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        let calls = sink.calls.lock().unwrap();
        assert_eq!(calls.len(), 1, "burst must coalesce into one persistence call");
        assert_eq!(calls[0].0, "p1");
        assert_eq!(calls[0].1.get("index.js").unwrap(), "v4");
    }

    #[tokio::test]
    async fn output_falls_back_to_requester_when_no_room() {
        let bc = broadcaster();
        let (a, mut a_rx) = conn("a");
        bc.registry().attach(a.clone()).await;

        let chunk = OutputChunk { output: "hi".to_string(), is_error: false, is_start: true };
        bc.deliver_output(None, Some("a"), chunk).await;
        let events = drain(&mut a_rx);
        assert!(matches!(&events[0], ServerEvent::Output(c) if c.output == "hi" && c.is_start));
    }
}
