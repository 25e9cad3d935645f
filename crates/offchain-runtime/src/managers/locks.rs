//! Per-channel locks
//!
//! One protocol run per channel at a time. A run takes every lock it needs
//! up front, in ascending multisig-address order, and gives up at the first
//! busy one instead of waiting.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use offchain_core::{Address, OffchainError, Result};

// ----------------------------------------------------------------------------
// Lock Manager
// ----------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct ChannelLockManager {
    locks: DashMap<Address, Arc<Mutex<()>>>,
}

impl ChannelLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock every channel in `multisigs` or none of them
    pub fn try_lock_all(&self, multisigs: &[Address]) -> Result<ChannelGuards> {
        let mut ordered = multisigs.to_vec();
        ordered.sort();
        ordered.dedup();

        let mut guards = Vec::with_capacity(ordered.len());
        for multisig in &ordered {
            let lock = self.locks.entry(*multisig).or_default().clone();
            match lock.try_lock_owned() {
                Ok(guard) => guards.push(guard),
                Err(_) => {
                    debug!(multisig = %multisig, "channel lock is busy");
                    return Err(OffchainError::concurrency_conflict(multisig));
                }
            }
        }
        Ok(ChannelGuards {
            multisigs: ordered,
            _guards: guards,
        })
    }

    #[cfg(test)]
    fn is_locked(&self, multisig: &Address) -> bool {
        self.locks
            .get(multisig)
            .map(|lock| lock.try_lock().is_err())
            .unwrap_or(false)
    }
}

/// Held locks, released on drop
#[derive(Debug)]
pub struct ChannelGuards {
    multisigs: Vec<Address>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl ChannelGuards {
    pub fn multisigs(&self) -> &[Address] {
        &self.multisigs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> Address {
        Address::new([b; 20])
    }

    #[test]
    fn second_run_on_a_busy_channel_is_rejected() {
        let locks = ChannelLockManager::new();
        let guards = locks.try_lock_all(&[addr(1)]).unwrap();
        let err = locks.try_lock_all(&[addr(1)]).unwrap_err();
        assert_eq!(err.kind(), "concurrency_conflict");
        assert!(err.is_retryable());

        drop(guards);
        assert!(locks.try_lock_all(&[addr(1)]).is_ok());
    }

    #[test]
    fn partial_acquisition_is_released() {
        let locks = ChannelLockManager::new();
        let busy = locks.try_lock_all(&[addr(5)]).unwrap();
        assert!(locks.try_lock_all(&[addr(5), addr(1)]).is_err());
        assert!(!locks.is_locked(&addr(1)));
        drop(busy);
    }

    #[test]
    fn locks_are_taken_in_address_order() {
        let locks = ChannelLockManager::new();
        let guards = locks.try_lock_all(&[addr(9), addr(2), addr(9)]).unwrap();
        assert_eq!(guards.multisigs(), &[addr(2), addr(9)]);
        assert!(locks.is_locked(&addr(2)));
        assert!(locks.is_locked(&addr(9)));
    }
}
