//! Message transport seam
//!
//! Delivery is at least once and unordered across runs. Inbound messages
//! reach the engine through the runtime's `Node::on_message`.

use async_trait::async_trait;

use crate::errors::Result;
use crate::types::Address;
use crate::wire::ProtocolMessage;

#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send(&self, to: Address, message: ProtocolMessage) -> Result<()>;
}
