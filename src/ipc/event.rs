//! JSON-RPC notification fan-out.
//!
//! Mutating todo operations announce themselves to every connected client so
//! a list view can refresh without polling.

use serde_json::Value;
use tokio::sync::broadcast;

/// Notification method names.
pub const DAEMON_READY: &str = "daemon.ready";
pub const TODO_CREATED: &str = "todo.created";
pub const TODO_UPDATED: &str = "todo.updated";
pub const TODO_DELETED: &str = "todo.deleted";

/// Broadcasts JSON-RPC notification strings to all connected WebSocket clients.
#[derive(Clone)]
pub struct EventBroadcaster {
    tx: broadcast::Sender<String>,
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBroadcaster {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self { tx }
    }

    /// Send a JSON-RPC notification to all connected clients.
    pub fn broadcast(&self, method: &str, params: Value) {
        let notification = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params
        });
        // Ignore errors — no subscribers is fine
        let _ = self
            .tx
            .send(serde_json::to_string(&notification).unwrap_or_default());
    }

    /// Shorthand for the todo lifecycle notifications, which all carry the
    /// affected id.
    pub fn broadcast_todo(&self, method: &str, id: i64) {
        self.broadcast(method, serde_json::json!({ "id": id }));
    }

    /// Subscribe to all broadcast events.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_todo_notification() {
        let broadcaster = EventBroadcaster::new();
        let mut rx = broadcaster.subscribe();

        broadcaster.broadcast_todo(TODO_DELETED, 7);

        let raw = rx.recv().await.unwrap();
        let v: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(v["method"], TODO_DELETED);
        assert_eq!(v["params"]["id"], 7);
        assert!(v.get("id").is_none(), "notifications carry no request id");
    }
}
