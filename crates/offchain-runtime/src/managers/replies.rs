//! Reply routing
//!
//! A suspended `SendAndWait` registers a waiter keyed by the run's process id
//! and the peer it waits on. Replies are matched on that key; anything that
//! matches no waiter is a late or duplicate reply and is dropped.

use dashmap::DashMap;
use tokio::sync::oneshot;
use tracing::debug;
use uuid::Uuid;

use offchain_core::{Address, ProtocolMessage};

#[derive(Debug, Default)]
pub struct ReplyRouter {
    waiters: DashMap<(Uuid, Address), oneshot::Sender<ProtocolMessage>>,
}

impl ReplyRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in the next reply from `peer` for `process_id`
    pub fn register(&self, process_id: Uuid, peer: Address) -> oneshot::Receiver<ProtocolMessage> {
        let (tx, rx) = oneshot::channel();
        self.waiters.insert((process_id, peer), tx);
        rx
    }

    pub fn cancel(&self, process_id: Uuid, peer: &Address) {
        self.waiters.remove(&(process_id, *peer));
    }

    /// Hand a reply to its waiter. Returns false if nobody was waiting.
    pub fn deliver(&self, reply: ProtocolMessage) -> bool {
        let key = (reply.process_id, reply.from_identifier);
        match self.waiters.remove(&key) {
            Some((_, waiter)) => waiter.send(reply).is_ok(),
            None => {
                debug!(
                    process_id = %key.0,
                    from = %key.1,
                    protocol = %reply.protocol,
                    "dropping reply with no waiter"
                );
                false
            }
        }
    }

    pub fn pending(&self) -> usize {
        self.waiters.len()
    }
}
