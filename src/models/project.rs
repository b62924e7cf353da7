use std::collections::HashMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// In-memory representation of a project's files: relative path -> text content.
/// Content is always a complete replacement, never a partial patch.
pub type FileTree = HashMap<String, String>;

/// Reference to a user as carried in chat and presence payloads
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, ToSchema)]
pub struct UserRef {
    #[serde(rename = "_id")]
    pub id: String,
    pub email: String,
}

/// One entry of the project's append-only message log
#[derive(Serialize, Deserialize, Debug, Clone, ToSchema)]
pub struct ChatMessage {
    pub message: String,
    pub sender: UserRef,
}

/// Working copy of a project as held by the project store
#[derive(Serialize, Deserialize, Debug, Clone, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectState {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub file_tree: FileTree,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub collaborators: Vec<String>,
}

/// Reserved sender id for messages produced by the assistant channel
pub const AI_SENDER_ID: &str = "ai";

/// Mention tag that routes a chat message to the assistant
pub const AI_MENTION: &str = "@ai";

impl ChatMessage {
    pub fn mentions_assistant(&self) -> bool {
        self.message.contains(AI_MENTION)
    }

    pub fn from_assistant(text: String) -> Self {
        Self {
            message: text,
            sender: UserRef {
                id: AI_SENDER_ID.to_string(),
                email: "AI".to_string(),
            },
        }
    }
}

/// Check that a file tree key is a normalized relative path that cannot
/// escape the project root. Rejects absolute paths, drive prefixes and
/// any `..` component.
pub fn is_valid_tree_path(path: &str) -> bool {
    if path.is_empty() || path.starts_with('/') || path.starts_with('\\') || path.contains(':') {
        return false;
    }
    path.split(['/', '\\'])
        .all(|part| !part.is_empty() && part != "." && part != "..")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_relative_paths() {
        assert!(is_valid_tree_path("index.js"));
        assert!(is_valid_tree_path("src/app/main.py"));
    }

    #[test]
    fn rejects_escaping_paths() {
        assert!(!is_valid_tree_path(""));
        assert!(!is_valid_tree_path("/etc/passwd"));
        assert!(!is_valid_tree_path("../secrets.txt"));
        assert!(!is_valid_tree_path("src/../../other"));
        assert!(!is_valid_tree_path("C:\\windows"));
    }

    #[test]
    fn assistant_mention_detection() {
        let msg = ChatMessage {
            message: "@ai explain this".to_string(),
            sender: UserRef { id: "u1".to_string(), email: "a@b.c".to_string() },
        };
        assert!(msg.mentions_assistant());
        assert!(ChatMessage::from_assistant("hi".to_string()).sender.id == AI_SENDER_ID);
    }
}
