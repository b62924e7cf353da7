use tokio::sync::mpsc;
use tracing::debug;

use crate::models::{RosterEntry, ServerEvent, UserRef};

/// Display colors handed out to connections, mirrored by editor cursors
const COLOR_PALETTE: &[&str] = &[
    "#4F8EF7", "#F7764F", "#3DBE7B", "#C76BF7", "#F7C84F", "#F74F8E", "#4FD7F7", "#A3F74F",
];

/// Ephemeral per-socket identity. Created on attach, destroyed on
/// disconnect, never persisted.
#[derive(Clone, Debug)]
pub struct Connection {
    pub id: String,
    pub project_id: String,
    pub user: UserRef,
    pub color: String,
    tx: mpsc::UnboundedSender<ServerEvent>,
}

impl Connection {
    pub fn new(
        id: String,
        project_id: String,
        user: UserRef,
        tx: mpsc::UnboundedSender<ServerEvent>,
    ) -> Self {
        let color = pick_color(&id).to_string();
        Self { id, project_id, user, color, tx }
    }

    /// Queue an event for delivery to this connection. A send to a
    /// connection whose socket already closed is dropped silently; the
    /// disconnect path will prune it.
    pub fn send(&self, event: ServerEvent) {
        if self.tx.send(event).is_err() {
            debug!("Dropping event for closed connection {}", self.id);
        }
    }

    pub fn roster_entry(&self) -> RosterEntry {
        RosterEntry {
            socket_id: self.id.clone(),
            user_id: self.user.id.clone(),
            email: self.user.email.clone(),
        }
    }
}

/// Stable palette pick per connection id
fn pick_color(id: &str) -> &'static str {
    let hash = id.bytes().fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
    COLOR_PALETTE[hash % COLOR_PALETTE.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_is_stable_per_connection() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let user = UserRef { id: "u1".to_string(), email: "a@b.c".to_string() };
        let a = Connection::new("conn-1".to_string(), "p1".to_string(), user.clone(), tx.clone());
        let b = Connection::new("conn-1".to_string(), "p1".to_string(), user, tx);
        assert_eq!(a.color, b.color);
        assert!(a.color.starts_with('#'));
    }
}
