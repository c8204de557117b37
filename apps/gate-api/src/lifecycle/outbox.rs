//! Broadcast hub carrying intents to delivery clients.
//!
//! A single `tokio::sync::broadcast` channel; every `/intents` socket holds
//! its own receiver. Intents published while nobody listens are dropped.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::lifecycle::events::Intent;

/// Slow receivers that fall behind skip intents (`RecvError::Lagged`).
const OUTBOX_CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct IntentOutbox {
    sender: broadcast::Sender<Arc<Intent>>,
}

impl Default for IntentOutbox {
    fn default() -> Self {
        Self::new()
    }
}

impl IntentOutbox {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(OUTBOX_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Intent>> {
        self.sender.subscribe()
    }

    /// Hand intents to every connected delivery client, in order.
    pub fn publish(&self, intents: &[Intent]) {
        for intent in intents {
            // Err only means there are no receivers.
            let _ = self.sender.send(Arc::new(intent.clone()));
        }
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
