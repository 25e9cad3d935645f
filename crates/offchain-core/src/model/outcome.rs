//! Outcome types and interpreter parameters
//!
//! An app's final state resolves to an [`Outcome`]. The interpreter
//! parameters fixed at install time turn that outcome into concrete payouts
//! and cap them at the limit both parties agreed to.

use serde::{Deserialize, Serialize};

use crate::abi::{self, Token};
use crate::errors::{OffchainError, Result, ValidationError};
use crate::types::{Address, U256, ETH_TOKEN_ADDRESS};

/// How an app's outcome is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeType {
    /// Explicit list of (recipient, amount) transfers
    CoinTransfer,
    /// One of three fixed splits between two players
    TwoPartyFixed,
}

/// Asset class named in resolution terms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AssetType {
    Eth = 0,
    Erc20 = 1,
}

impl AssetType {
    /// Asset class implied by a token address
    pub fn for_token(token: &Address) -> Self {
        if *token == ETH_TOKEN_ADDRESS {
            AssetType::Eth
        } else {
            AssetType::Erc20
        }
    }
}

/// Resolution terms bounding how an outcome may be paid out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Terms {
    pub asset_type: AssetType,
    pub limit: U256,
    pub token: Address,
}

impl Terms {
    pub fn new(token: Address, limit: U256) -> Self {
        Self {
            asset_type: AssetType::for_token(&token),
            limit,
            token,
        }
    }

    /// `(uint8 assetType, uint256 limit, address token)`
    pub fn to_token(&self) -> Token {
        Token::Tuple(vec![
            Token::Uint8(self.asset_type as u8),
            Token::Uint(self.limit),
            Token::Address(self.token),
        ])
    }
}

/// A single payout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinTransfer {
    pub to: Address,
    pub amount: U256,
}

impl CoinTransfer {
    pub fn new(to: Address, amount: U256) -> Self {
        Self { to, amount }
    }
}

/// Fixed two-party split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TwoPartyFixedOutcome {
    SendToAddrOne,
    SendToAddrTwo,
    SplitAndSendToBoth,
}

/// Result of resolving an app's final state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    CoinTransfer(Vec<CoinTransfer>),
    TwoPartyFixed(TwoPartyFixedOutcome),
}

/// Interpreter parameters fixed when an app is installed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterpreterParams {
    CoinTransfer {
        limit: U256,
        token: Address,
    },
    TwoPartyFixed {
        player_addrs: [Address; 2],
        amount: U256,
        token: Address,
    },
}

impl InterpreterParams {
    pub fn outcome_type(&self) -> OutcomeType {
        match self {
            InterpreterParams::CoinTransfer { .. } => OutcomeType::CoinTransfer,
            InterpreterParams::TwoPartyFixed { .. } => OutcomeType::TwoPartyFixed,
        }
    }

    pub fn token(&self) -> Address {
        match self {
            InterpreterParams::CoinTransfer { token, .. }
            | InterpreterParams::TwoPartyFixed { token, .. } => *token,
        }
    }

    pub fn limit(&self) -> U256 {
        match self {
            InterpreterParams::CoinTransfer { limit, .. } => *limit,
            InterpreterParams::TwoPartyFixed { amount, .. } => *amount,
        }
    }

    pub fn terms(&self) -> Terms {
        Terms::new(self.token(), self.limit())
    }

    /// ABI encoding handed to the on-chain interpreter
    pub fn encode(&self) -> Vec<u8> {
        match self {
            InterpreterParams::CoinTransfer { limit, token } => {
                abi::encode(&[Token::Uint(*limit), Token::Address(*token)])
            }
            InterpreterParams::TwoPartyFixed {
                player_addrs,
                amount,
                token,
            } => abi::encode(&[
                Token::Array(player_addrs.iter().map(|a| Token::Address(*a)).collect()),
                Token::Uint(*amount),
                Token::Address(*token),
            ]),
        }
    }

    /// Turn an outcome into payouts, rejecting mismatched outcome kinds and
    /// totals above the limit.
    pub fn interpret(&self, outcome: &Outcome) -> Result<Vec<CoinTransfer>> {
        let payouts = match (self, outcome) {
            (InterpreterParams::CoinTransfer { .. }, Outcome::CoinTransfer(transfers)) => {
                transfers.clone()
            }
            (
                InterpreterParams::TwoPartyFixed {
                    player_addrs,
                    amount,
                    ..
                },
                Outcome::TwoPartyFixed(fixed),
            ) => match fixed {
                TwoPartyFixedOutcome::SendToAddrOne => {
                    vec![CoinTransfer::new(player_addrs[0], *amount)]
                }
                TwoPartyFixedOutcome::SendToAddrTwo => {
                    vec![CoinTransfer::new(player_addrs[1], *amount)]
                }
                TwoPartyFixedOutcome::SplitAndSendToBoth => {
                    let half = *amount / U256::from(2u8);
                    vec![
                        CoinTransfer::new(player_addrs[0], half),
                        CoinTransfer::new(player_addrs[1], *amount - half),
                    ]
                }
            },
            _ => {
                return Err(OffchainError::malformed_state(format!(
                    "outcome {:?} does not match interpreter {:?}",
                    outcome,
                    self.outcome_type()
                )))
            }
        };

        let total = payouts
            .iter()
            .try_fold(U256::zero(), |acc, p| acc.checked_add(p.amount))
            .ok_or_else(|| OffchainError::malformed_state("payout total overflows"))?;
        if total > self.limit() {
            return Err(ValidationError::OutcomeExceedsLimit {
                total: total.to_string(),
                limit: self.limit().to_string(),
            }
            .into());
        }
        Ok(payouts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> Address {
        Address::new([b; 20])
    }

    #[test]
    fn coin_transfer_within_limit() {
        let params = InterpreterParams::CoinTransfer {
            limit: U256::from(3),
            token: ETH_TOKEN_ADDRESS,
        };
        let outcome = Outcome::CoinTransfer(vec![
            CoinTransfer::new(addr(1), U256::from(3)),
            CoinTransfer::new(addr(2), U256::zero()),
        ]);
        assert_eq!(params.interpret(&outcome).unwrap().len(), 2);
    }

    #[test]
    fn coin_transfer_over_limit_is_rejected() {
        let params = InterpreterParams::CoinTransfer {
            limit: U256::from(2),
            token: ETH_TOKEN_ADDRESS,
        };
        let outcome = Outcome::CoinTransfer(vec![CoinTransfer::new(addr(1), U256::from(3))]);
        assert_eq!(params.interpret(&outcome).unwrap_err().kind(), "validation");
    }

    #[test]
    fn two_party_split_conserves_odd_amounts() {
        let params = InterpreterParams::TwoPartyFixed {
            player_addrs: [addr(1), addr(2)],
            amount: U256::from(5),
            token: ETH_TOKEN_ADDRESS,
        };
        let payouts = params
            .interpret(&Outcome::TwoPartyFixed(TwoPartyFixedOutcome::SplitAndSendToBoth))
            .unwrap();
        assert_eq!(payouts[0].amount + payouts[1].amount, U256::from(5));

        let one = params
            .interpret(&Outcome::TwoPartyFixed(TwoPartyFixedOutcome::SendToAddrOne))
            .unwrap();
        assert_eq!(one, vec![CoinTransfer::new(addr(1), U256::from(5))]);
    }

    #[test]
    fn mismatched_outcome_kind() {
        let params = InterpreterParams::CoinTransfer {
            limit: U256::from(2),
            token: ETH_TOKEN_ADDRESS,
        };
        assert!(params
            .interpret(&Outcome::TwoPartyFixed(TwoPartyFixedOutcome::SendToAddrOne))
            .is_err());
    }

    #[test]
    fn asset_type_from_token() {
        assert_eq!(AssetType::for_token(&ETH_TOKEN_ADDRESS), AssetType::Eth);
        assert_eq!(AssetType::for_token(&addr(9)), AssetType::Erc20);
    }
}
