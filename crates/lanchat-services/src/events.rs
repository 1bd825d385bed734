//! Outbound notifications for the host application.
//!
//! Every subscriber gets its own unbounded queue, so a slow UI never makes a
//! network task wait and never loses a state transition. Ordering holds per
//! publisher call site, not across peers.

use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

use lanchat_core::ChatMessage;
use tokio::sync::mpsc;

use crate::peer::Peer;

/// Something the host may want to react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// A peer record was created or changed. Carries the stored state.
    PeerUpdated(Peer),
    /// An envelope arrived. `message.recipient_address` is already ours.
    MessageReceived { message: ChatMessage, sender: Ipv4Addr },
    /// An envelope was written and flushed to `target`.
    MessageSent { message: ChatMessage, target: Ipv4Addr },
    /// Human-readable lifecycle and failure reports.
    StatusChanged(String),
}

pub type EventReceiver = mpsc::UnboundedReceiver<ChatEvent>;

/// Fan-out publisher shared by the registry and every network task.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<ChatEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber. Events published before this call are not replayed.
    pub fn subscribe(&self) -> EventReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().push(tx);
        rx
    }

    /// Deliver `event` to every live subscriber. Dropped receivers are pruned.
    pub fn publish(&self, event: ChatEvent) {
        let mut subscribers = self.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Publish a `StatusChanged` and mirror it to the log.
    pub fn status(&self, text: impl Into<String>) {
        let text = text.into();
        tracing::info!(status = %text, "status changed");
        self.publish(ChatEvent::StatusChanged(text));
    }

    #[cfg(test)]
    fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<mpsc::UnboundedSender<ChatEvent>>> {
        // A panic while holding this lock cannot leave the Vec half-updated.
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner())
    }
}
