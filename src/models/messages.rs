use serde::{Deserialize, Serialize};

use crate::models::project::{ChatMessage, FileTree, UserRef};

/// Cursor position inside an open file
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CursorPos {
    pub line_number: u32,
    pub column: u32,
}

/// Roster entry as rendered by clients on every membership change
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub socket_id: String,
    #[serde(rename = "_id")]
    pub user_id: String,
    pub email: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct WriteMessage {
    pub file: String,
    pub content: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CursorMoveMessage {
    pub cursor: CursorPos,
    pub room_id: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FileChangeMessage {
    pub file: String,
    pub sender: UserRef,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SyncFileTreeMessage {
    pub socket_id: String,
    pub file_tree: FileTree,
}

/// One chunk of an execution output stream. The first chunk of a run
/// carries `isStart` and replaces any prior buffer; later chunks append.
/// An `isError` chunk marks the stream but does not terminate it.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct OutputChunk {
    pub output: String,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default)]
    pub is_start: bool,
}

/// Events received from a client over its project socket
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "create-room", rename_all = "camelCase")]
    CreateRoom { project_id: String },
    #[serde(rename = "join-room", rename_all = "camelCase")]
    JoinRoom { room_id: String },
    #[serde(rename = "leave-room")]
    LeaveRoom,
    #[serde(rename = "sync-file-tree")]
    SyncFileTree(SyncFileTreeMessage),
    #[serde(rename = "project-write")]
    Write(WriteMessage),
    #[serde(rename = "project-cursor-move")]
    CursorMove(CursorMoveMessage),
    #[serde(rename = "project-file-change")]
    FileChange(FileChangeMessage),
    #[serde(rename = "project-message")]
    Message(ChatMessage),
}

/// Events sent to clients. Cursor and presence broadcasts are the client
/// payload augmented with the sender's connection identity.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "room-created", rename_all = "camelCase")]
    RoomCreated { room_id: String },
    #[serde(rename = "room-joined", rename_all = "camelCase")]
    RoomJoined { room_id: String },
    #[serde(rename = "room-users")]
    RoomUsers { users: Vec<RosterEntry> },
    #[serde(rename = "request-sync", rename_all = "camelCase")]
    RequestSync { socket_id: String },
    #[serde(rename = "sync-file-tree")]
    SyncFileTree(SyncFileTreeMessage),
    #[serde(rename = "project-write")]
    Write(WriteMessage),
    #[serde(rename = "project-cursor-move", rename_all = "camelCase")]
    CursorMove {
        cursor: CursorPos,
        socket_id: String,
        user_id: String,
        email: String,
        color: String,
    },
    #[serde(rename = "project-file-change", rename_all = "camelCase")]
    FileChange {
        file: String,
        sender: UserRef,
        socket_id: String,
        color: String,
    },
    #[serde(rename = "project-message")]
    Message(ChatMessage),
    #[serde(rename = "project-output")]
    Output(OutputChunk),
    #[serde(rename = "error")]
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_events_parse_from_wire_shape() {
        let msg: ClientEvent =
            serde_json::from_str(r#"{"type":"create-room","projectId":"p1"}"#).unwrap();
        assert!(matches!(msg, ClientEvent::CreateRoom { ref project_id } if project_id == "p1"));

        let msg: ClientEvent = serde_json::from_str(
            r#"{"type":"project-cursor-move","cursor":{"lineNumber":3,"column":7},"roomId":"r1"}"#,
        )
        .unwrap();
        match msg {
            ClientEvent::CursorMove(m) => {
                assert_eq!(m.cursor, CursorPos { line_number: 3, column: 7 });
                assert_eq!(m.room_id.as_deref(), Some("r1"));
            }
            other => panic!("unexpected event: {:?}", other),
        }

        let msg: ClientEvent = serde_json::from_str(r#"{"type":"leave-room"}"#).unwrap();
        assert!(matches!(msg, ClientEvent::LeaveRoom));
    }

    #[test]
    fn roster_entries_serialize_with_client_field_names() {
        let entry = RosterEntry {
            socket_id: "s1".to_string(),
            user_id: "u1".to_string(),
            email: "a@b.c".to_string(),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["socketId"], "s1");
        assert_eq!(json["_id"], "u1");
    }

    #[test]
    fn output_chunk_flags_default_to_false() {
        let chunk: OutputChunk = serde_json::from_str(r#"{"output":"hi"}"#).unwrap();
        assert!(!chunk.is_error);
        assert!(!chunk.is_start);
    }
}
