//! Live session tracking.
//!
//! The registry owns the only handle to each connection's outbound channel.
//! It is touched exclusively by the dispatch loop; connection tasks never see
//! each other's transports.

use log::info;
use shared::SessionId;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

/// Outbound half of one live connection. Sends are fire-and-forget: a closed
/// channel means the writer task is gone and the message is simply dropped.
#[derive(Debug)]
pub struct SessionHandle {
    sender: mpsc::UnboundedSender<Message>,
}

impl SessionHandle {
    pub fn new(sender: mpsc::UnboundedSender<Message>) -> Self {
        Self { sender }
    }

    /// Queues a frame for delivery. Returns false if the session's writer
    /// has already shut down.
    pub fn send(&self, message: Message) -> bool {
        self.sender.send(message).is_ok()
    }
}

/// All currently connected sessions, keyed by their server-assigned id.
pub struct SessionRegistry {
    sessions: HashMap<SessionId, SessionHandle>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
        }
    }

    pub fn insert(&mut self, id: SessionId, sender: mpsc::UnboundedSender<Message>) {
        info!("session {} registered, total sessions: {}", id, self.sessions.len() + 1);
        self.sessions.insert(id, SessionHandle::new(sender));
    }

    /// Drops a session. Idempotent: removing an id twice returns false the
    /// second time, which callers use to suppress duplicate removePlayer
    /// broadcasts on double-close.
    pub fn remove(&mut self, id: SessionId) -> bool {
        if self.sessions.remove(&id).is_some() {
            info!("session {} removed, total sessions: {}", id, self.sessions.len());
            true
        } else {
            false
        }
    }

    pub fn get(&self, id: SessionId) -> Option<&SessionHandle> {
        self.sessions.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SessionId, &SessionHandle)> {
        self.sessions.iter()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
