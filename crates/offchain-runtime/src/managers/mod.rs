//! Stateful managers for the off-chain runtime
//!
//! This module contains the shared state a node keeps across protocol runs:
//! per-channel locks, the routing of replies to suspended runs and the
//! initiating messages already acted on.

pub mod dedup;
pub mod locks;
pub mod replies;

pub use dedup::SeenMessages;
pub use locks::{ChannelGuards, ChannelLockManager};
pub use replies::ReplyRouter;
