//! In-process message network
//!
//! Every registered address gets an unbounded inbox. Messages go through the
//! JSON wire encoding on the way, so peers only ever see what a real
//! transport would carry. An isolated address silently loses its traffic.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use tokio::sync::mpsc;
use tracing::trace;

use offchain_core::errors::MessagingError;
use offchain_core::{Address, Messenger, ProtocolMessage, Result};

pub type Inbox = mpsc::UnboundedReceiver<ProtocolMessage>;

#[derive(Debug, Default)]
pub struct MemoryNetwork {
    inboxes: DashMap<Address, mpsc::UnboundedSender<ProtocolMessage>>,
    isolated: DashSet<Address>,
    delivered: AtomicUsize,
}

impl MemoryNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Open the inbox for `address`, replacing any earlier one
    pub fn register(&self, address: Address) -> Inbox {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inboxes.insert(address, tx);
        rx
    }

    /// Drop all traffic to `address` until [`MemoryNetwork::reconnect`]
    pub fn isolate(&self, address: Address) {
        self.isolated.insert(address);
    }

    pub fn reconnect(&self, address: &Address) {
        self.isolated.remove(address);
    }

    /// Messages handed to an inbox so far
    pub fn delivered(&self) -> usize {
        self.delivered.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Messenger for MemoryNetwork {
    async fn send(&self, to: Address, message: ProtocolMessage) -> Result<()> {
        if self.isolated.contains(&to) {
            trace!(to = %to, process_id = %message.process_id, "dropping message to isolated peer");
            return Ok(());
        }
        let wire = message.to_json()?;
        let inbox = self
            .inboxes
            .get(&to)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| MessagingError::PeerUnreachable {
                peer: to.to_string(),
            })?;
        inbox
            .send(ProtocolMessage::from_json(&wire)?)
            .map_err(|_| MessagingError::SendFailed {
                peer: to.to_string(),
                reason: "inbox closed".into(),
            })?;
        self.delivered.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use offchain_core::ProtocolName;
    use uuid::Uuid;

    #[tokio::test]
    async fn delivers_through_the_wire_encoding() {
        let network = MemoryNetwork::new();
        let to = Address::new([2u8; 20]);
        let mut inbox = network.register(to);
        let message = ProtocolMessage::reply(Uuid::new_v4(), ProtocolName::Setup, Address::new([1u8; 20]), to);

        network.send(to, message.clone()).await.unwrap();
        assert_eq!(inbox.recv().await.unwrap(), message);
        assert_eq!(network.delivered(), 1);
    }

    #[tokio::test]
    async fn unknown_peer_is_unreachable() {
        let network = MemoryNetwork::new();
        let to = Address::new([2u8; 20]);
        let err = network
            .send(to, ProtocolMessage::reply(Uuid::nil(), ProtocolName::Setup, Address::ZERO, to))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "messaging");
    }

    #[tokio::test]
    async fn isolated_peer_loses_traffic() {
        let network = MemoryNetwork::new();
        let to = Address::new([2u8; 20]);
        let mut inbox = network.register(to);
        network.isolate(to);
        network
            .send(to, ProtocolMessage::reply(Uuid::nil(), ProtocolName::Setup, Address::ZERO, to))
            .await
            .unwrap();
        assert!(inbox.try_recv().is_err());
        assert_eq!(network.delivered(), 0);
    }
}
