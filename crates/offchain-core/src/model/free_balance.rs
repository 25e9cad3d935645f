//! Free balance
//!
//! The free balance is the channel's always-present app instance that tracks
//! how much of each token every owner has not yet committed to an app. It
//! also lists the identity hashes of apps currently funded from it.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::abi::{self, Token};
use crate::errors::{Result, ValidationError};
use crate::model::app_instance::{AppIdentity, AppInstance, AppInterface};
use crate::model::outcome::{CoinTransfer, InterpreterParams};
use crate::types::{Address, Bytes, Bytes32, U256, ETH_TOKEN_ADDRESS};

/// Sequence number reserved for the free balance app
pub const FREE_BALANCE_SEQ_NO: u64 = 0;

// ----------------------------------------------------------------------------
// Free Balance State
// ----------------------------------------------------------------------------

/// Balances per token and owner, plus the set of funded apps
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FreeBalanceState {
    balances: BTreeMap<Address, BTreeMap<Address, U256>>,
    active_apps: BTreeSet<Bytes32>,
}

impl FreeBalanceState {
    /// Zero ETH balance for every owner
    pub fn new(owners: &[Address]) -> Self {
        let eth = owners.iter().map(|o| (*o, U256::zero())).collect();
        Self {
            balances: BTreeMap::from([(ETH_TOKEN_ADDRESS, eth)]),
            active_apps: BTreeSet::new(),
        }
    }

    pub fn balance_of(&self, token: &Address, owner: &Address) -> U256 {
        self.balances
            .get(token)
            .and_then(|per_owner| per_owner.get(owner))
            .copied()
            .unwrap_or_default()
    }

    /// Balances of one token
    pub fn balances(&self, token: &Address) -> BTreeMap<Address, U256> {
        self.balances.get(token).cloned().unwrap_or_default()
    }

    /// Sum of all owners' balances of one token
    pub fn total(&self, token: &Address) -> U256 {
        self.balances
            .get(token)
            .map(|per_owner| per_owner.values().fold(U256::zero(), |acc, v| acc + *v))
            .unwrap_or_default()
    }

    pub fn tokens(&self) -> impl Iterator<Item = &Address> {
        self.balances.keys()
    }

    pub fn active_apps(&self) -> &BTreeSet<Bytes32> {
        &self.active_apps
    }

    pub fn is_active(&self, identity_hash: &Bytes32) -> bool {
        self.active_apps.contains(identity_hash)
    }

    /// Credit each payout
    pub fn increment(&mut self, token: &Address, payouts: &[CoinTransfer]) {
        let per_owner = self.balances.entry(*token).or_default();
        for payout in payouts {
            let balance = per_owner.entry(payout.to).or_default();
            *balance = balance.saturating_add(payout.amount);
        }
    }

    /// Debit each amount, failing without any change if one owner lacks funds
    pub fn decrement(&mut self, token: &Address, debits: &[CoinTransfer]) -> Result<()> {
        let mut next = self.balances(token);
        for debit in debits {
            let available = next.get(&debit.to).copied().unwrap_or_default();
            let remaining =
                available
                    .checked_sub(debit.amount)
                    .ok_or_else(|| ValidationError::InsufficientFunds {
                        owner: debit.to.to_string(),
                        requested: debit.amount.to_string(),
                        available: available.to_string(),
                    })?;
            next.insert(debit.to, remaining);
        }
        self.balances.insert(*token, next);
        Ok(())
    }

    pub fn add_active_app(&mut self, identity_hash: Bytes32) {
        self.active_apps.insert(identity_hash);
    }

    pub fn remove_active_app(&mut self, identity_hash: &Bytes32) -> bool {
        self.active_apps.remove(identity_hash)
    }

    /// `(address[] tokens, (address to, uint256 amount)[][] balances, bytes32[] activeApps)`
    pub fn encode(&self) -> Vec<u8> {
        let tokens = self.balances.keys().map(|t| Token::Address(*t)).collect();
        let balances = self
            .balances
            .values()
            .map(|per_owner| {
                Token::Array(
                    per_owner
                        .iter()
                        .map(|(to, amount)| {
                            Token::Tuple(vec![Token::Address(*to), Token::Uint(*amount)])
                        })
                        .collect(),
                )
            })
            .collect();
        let active = self
            .active_apps
            .iter()
            .map(|h| Token::FixedBytes(*h))
            .collect();
        abi::encode(&[
            Token::Array(tokens),
            Token::Array(balances),
            Token::Array(active),
        ])
    }
}

// ----------------------------------------------------------------------------
// Free Balance App
// ----------------------------------------------------------------------------

/// The free balance app instance together with its typed state.
///
/// The instance's encoded state is always `state.encode()`; both change only
/// through [`FreeBalance::apply`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeBalance {
    instance: AppInstance,
    state: FreeBalanceState,
}

impl FreeBalance {
    /// Fresh zero-balance free balance at version 0
    pub fn new(multisig: Address, owners: &[Address], app_definition: Address, timeout: u64) -> Self {
        let state = FreeBalanceState::new(owners);
        let instance = AppInstance::new(
            AppIdentity {
                owner: multisig,
                participants: owners.to_vec(),
                app_definition,
                default_timeout: timeout,
                channel_nonce: FREE_BALANCE_SEQ_NO,
            },
            AppInterface {
                addr: app_definition,
                state_encoding: "tuple(address[] tokens, tuple(address to, uint256 amount)[][] balances, bytes32[] activeApps)".into(),
                action_encoding: None,
            },
            Bytes::new(state.encode()),
            InterpreterParams::CoinTransfer {
                limit: U256::MAX,
                token: ETH_TOKEN_ADDRESS,
            },
        );
        Self { instance, state }
    }

    pub fn instance(&self) -> &AppInstance {
        &self.instance
    }

    pub fn state(&self) -> &FreeBalanceState {
        &self.state
    }

    pub fn identity_hash(&self) -> Bytes32 {
        self.instance.identity_hash()
    }

    pub fn version_number(&self) -> u64 {
        self.instance.version_number()
    }

    /// Replace the state, moving the instance to its next version
    pub fn apply(&mut self, state: FreeBalanceState) {
        self.instance = self.instance.set_state(Bytes::new(state.encode()));
        self.state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owners() -> Vec<Address> {
        vec![Address::new([1u8; 20]), Address::new([2u8; 20])]
    }

    #[test]
    fn starts_at_zero() {
        let fb = FreeBalance::new(Address::new([9u8; 20]), &owners(), Address::new([5u8; 20]), 172800);
        assert_eq!(fb.version_number(), 0);
        for owner in owners() {
            assert_eq!(fb.state().balance_of(&ETH_TOKEN_ADDRESS, &owner), U256::zero());
        }
        assert_eq!(fb.instance().latest_state().to_vec(), fb.state().encode());
    }

    #[test]
    fn decrement_is_all_or_nothing() {
        let [a, b] = [owners()[0], owners()[1]];
        let mut state = FreeBalanceState::new(&owners());
        state.increment(&ETH_TOKEN_ADDRESS, &[CoinTransfer::new(a, U256::from(5))]);
        let before = state.clone();
        let err = state
            .decrement(
                &ETH_TOKEN_ADDRESS,
                &[
                    CoinTransfer::new(a, U256::from(1)),
                    CoinTransfer::new(b, U256::from(1)),
                ],
            )
            .unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert_eq!(state, before);
    }

    #[test]
    fn apply_keeps_encoding_in_sync() {
        let mut fb = FreeBalance::new(Address::new([9u8; 20]), &owners(), Address::new([5u8; 20]), 10);
        let mut next = fb.state().clone();
        next.increment(&ETH_TOKEN_ADDRESS, &[CoinTransfer::new(owners()[0], U256::from(3))]);
        next.add_active_app(Bytes32::new([4u8; 32]));
        fb.apply(next);
        assert_eq!(fb.version_number(), 1);
        assert_eq!(fb.instance().latest_state().to_vec(), fb.state().encode());
        assert_eq!(fb.state().total(&ETH_TOKEN_ADDRESS), U256::from(3));
    }

    #[test]
    fn encoding_is_independent_of_insertion_order() {
        let [a, b] = [owners()[0], owners()[1]];
        let mut first = FreeBalanceState::new(&[a, b]);
        first.add_active_app(Bytes32::new([1u8; 32]));
        first.add_active_app(Bytes32::new([2u8; 32]));
        let mut second = FreeBalanceState::new(&[b, a]);
        second.add_active_app(Bytes32::new([2u8; 32]));
        second.add_active_app(Bytes32::new([1u8; 32]));
        assert_eq!(first.encode(), second.encode());
    }
}
