//! App logic
//!
//! The engine never interprets app state itself. Every app definition
//! address maps to an [`AppLogic`] that applies actions and resolves final
//! states into outcomes; the on-chain contract at that address is the
//! authority these implementations mirror.

use std::collections::HashMap;
use std::sync::Arc;

use crate::abi::{self, Decoder, Token};
use crate::config::NetworkContext;
use crate::errors::{OffchainError, Result, ValidationError};
use crate::model::{CoinTransfer, Outcome};
use crate::types::{Address, Bytes, U256};

// ----------------------------------------------------------------------------
// App Logic Trait
// ----------------------------------------------------------------------------

/// Off-chain mirror of an app definition contract
pub trait AppLogic: Send + Sync {
    /// State after applying `action` to `state`
    fn apply_action(&self, state: &[u8], action: &[u8]) -> Result<Bytes>;

    /// Outcome of `state` when the app is uninstalled
    fn compute_outcome(&self, state: &[u8]) -> Result<Outcome>;

    /// Index of the participant allowed to act next, or `None` when any
    /// participant may act
    fn turn_taker(&self, _state: &[u8]) -> Result<Option<usize>> {
        Ok(None)
    }
}

// ----------------------------------------------------------------------------
// App Registry
// ----------------------------------------------------------------------------

/// App definition address to logic
#[derive(Clone, Default)]
pub struct AppRegistry {
    apps: HashMap<Address, Arc<dyn AppLogic>>,
}

impl AppRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the engine's own apps at their deployed addresses
    pub fn with_builtins(network: &NetworkContext) -> Self {
        let mut registry = Self::new();
        registry.register(network.balance_refund_app, Arc::new(BalanceRefundApp));
        registry
    }

    pub fn register(&mut self, app_definition: Address, logic: Arc<dyn AppLogic>) {
        self.apps.insert(app_definition, logic);
    }

    pub fn get(&self, app_definition: &Address) -> Result<Arc<dyn AppLogic>> {
        self.apps.get(app_definition).cloned().ok_or_else(|| {
            ValidationError::UnknownAppDefinition {
                app_definition: app_definition.to_string(),
            }
            .into()
        })
    }

    pub fn contains(&self, app_definition: &Address) -> bool {
        self.apps.contains_key(app_definition)
    }
}

impl core::fmt::Debug for AppRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AppRegistry")
            .field("apps", &self.apps.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Balance Refund App
// ----------------------------------------------------------------------------

/// Credits a deposit to its depositor.
///
/// Installed with no funds while a deposit is in flight. Its state fixes the
/// multisig's ledger balance before funding as `threshold`; on uninstall the
/// depositor is paid whatever the multisig holds above it, bounded by the
/// limit fixed at install. The payout depends on the ledger, so it is
/// resolved with [`BalanceRefundApp::outcome_for_balance`] rather than
/// [`AppLogic::compute_outcome`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BalanceRefundApp;

impl BalanceRefundApp {
    pub const STATE_ENCODING: &'static str =
        "tuple(address recipient, address multisig, uint256 threshold)";

    pub fn encode_state(recipient: Address, multisig: Address, threshold: U256) -> Bytes {
        Bytes::new(abi::encode(&[
            Token::Address(recipient),
            Token::Address(multisig),
            Token::Uint(threshold),
        ]))
    }

    /// `(recipient, multisig, threshold)`
    pub fn decode_state(state: &[u8]) -> Result<(Address, Address, U256)> {
        let decoder = Decoder::new(state);
        Ok((decoder.address(0)?, decoder.address(1)?, decoder.uint(2)?))
    }

    /// Outcome once the multisig holds `balance`
    pub fn outcome_for_balance(state: &[u8], balance: U256) -> Result<Outcome> {
        let (recipient, _, threshold) = Self::decode_state(state)?;
        Ok(Outcome::CoinTransfer(vec![CoinTransfer::new(
            recipient,
            balance.saturating_sub(threshold),
        )]))
    }
}

impl AppLogic for BalanceRefundApp {
    fn apply_action(&self, _state: &[u8], _action: &[u8]) -> Result<Bytes> {
        Err(OffchainError::illegal_action(
            "balance refund app takes no actions",
        ))
    }

    fn compute_outcome(&self, _state: &[u8]) -> Result<Outcome> {
        Err(ValidationError::UnverifiedRefund {
            reason: "the refund outcome depends on the multisig's ledger balance".into(),
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refund_pays_what_arrived_above_the_threshold() {
        let recipient = Address::new([4u8; 20]);
        let multisig = Address::new([5u8; 20]);
        let state = BalanceRefundApp::encode_state(recipient, multisig, U256::from(100));

        let outcome = BalanceRefundApp::outcome_for_balance(&state, U256::from(142)).unwrap();
        assert_eq!(
            outcome,
            Outcome::CoinTransfer(vec![CoinTransfer::new(recipient, U256::from(42))])
        );
        let nothing_arrived = BalanceRefundApp::outcome_for_balance(&state, U256::from(100)).unwrap();
        assert_eq!(
            nothing_arrived,
            Outcome::CoinTransfer(vec![CoinTransfer::new(recipient, U256::zero())])
        );
        assert_eq!(
            BalanceRefundApp.compute_outcome(&state).unwrap_err().kind(),
            "validation"
        );
        assert!(BalanceRefundApp.apply_action(&state, &[]).is_err());
    }

    #[test]
    fn unknown_definition_is_a_validation_error() {
        let registry = AppRegistry::with_builtins(&NetworkContext::development());
        let err = registry.get(&Address::new([1u8; 20])).err().unwrap();
        assert_eq!(err.kind(), "validation");
        assert!(registry.contains(&NetworkContext::development().balance_refund_app));
    }
}
