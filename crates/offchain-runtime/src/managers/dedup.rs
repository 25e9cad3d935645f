//! Repeated message detection
//!
//! Initiating messages are remembered by process, step and sender so a
//! repeat delivery does not start a second run. Entries expire after a
//! fixed horizon; a run that old has timed out on both sides.

use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::Instant;
use uuid::Uuid;

use offchain_core::Address;

type MessageKey = (Uuid, i32, Address);

#[derive(Debug)]
pub struct SeenMessages {
    horizon: Duration,
    entries: DashMap<MessageKey, Instant>,
}

impl SeenMessages {
    pub fn new(horizon: Duration) -> Self {
        Self {
            horizon,
            entries: DashMap::new(),
        }
    }

    /// Record a message; false if it was already seen within the horizon
    pub fn first_sighting(&self, process_id: Uuid, seq: i32, from: Address) -> bool {
        let now = Instant::now();
        self.entries
            .retain(|_, seen_at| now.duration_since(*seen_at) < self.horizon);
        match self.entries.entry((process_id, seq, from)) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(now);
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
