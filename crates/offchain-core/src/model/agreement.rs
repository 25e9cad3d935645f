//! Virtual app agreements
//!
//! When a virtual app runs between two parties without a direct channel, the
//! intermediary's channel with each of them holds an agreement locking the
//! user's deposit plus the capital the intermediary puts up to mirror the
//! other side. On uninstall the user receives what the virtual app paid it
//! and the intermediary receives the remainder.

use serde::{Deserialize, Serialize};

use crate::abi::Token;
use crate::model::outcome::{CoinTransfer, InterpreterParams};
use crate::types::{Address, Bytes32, U256};

/// Single-asset two-party agreement backing a virtual app
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualAppAgreement {
    pub target_identity_hash: Bytes32,
    pub target_app_definition: Address,
    pub target_interpreter_params: InterpreterParams,
    pub capital_provided: U256,
    pub capital_provider: Address,
    pub virtual_app_user: Address,
    pub user_deposit: U256,
    pub token: Address,
    /// Version bound after which the intermediary's signature stops counting
    pub expiry: u64,
}

impl VirtualAppAgreement {
    /// Total locked in this channel
    pub fn total(&self) -> U256 {
        self.capital_provided + self.user_deposit
    }

    /// Debits applied to the channel's free balance on install
    pub fn debits(&self) -> Vec<CoinTransfer> {
        vec![
            CoinTransfer::new(self.virtual_app_user, self.user_deposit),
            CoinTransfer::new(self.capital_provider, self.capital_provided),
        ]
    }

    /// Split the locked total given the virtual app's payouts
    pub fn settle(&self, payouts: &[CoinTransfer]) -> Vec<CoinTransfer> {
        let to_user = payouts
            .iter()
            .filter(|p| p.to == self.virtual_app_user)
            .fold(U256::zero(), |acc, p| acc + p.amount)
            .min(self.total());
        vec![
            CoinTransfer::new(self.virtual_app_user, to_user),
            CoinTransfer::new(self.capital_provider, self.total() - to_user),
        ]
    }

    /// `(uint256 capitalProvided, address capitalProvider, address virtualAppUser,
    /// address tokenAddress, uint256 expiry)`
    pub fn to_token(&self) -> Token {
        Token::Tuple(vec![
            Token::Uint(self.capital_provided),
            Token::Address(self.capital_provider),
            Token::Address(self.virtual_app_user),
            Token::Address(self.token),
            Token::uint(self.expiry),
        ])
    }
}
