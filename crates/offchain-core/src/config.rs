//! Centralized Configuration Management
//!
//! Deployment parameters for the engine: protocol step timeouts, persistence
//! retry policy, channel defaults, and the addresses of the settlement
//! contracts commitments are built against. Loadable from TOML; any section
//! or field left out takes its default.

use core::time::Duration;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::crypto::keccak256;
use crate::errors::{OffchainError, Result};
use crate::model::OutcomeType;
use crate::types::{Address, Bytes32};

// ----------------------------------------------------------------------------
// Protocol Timeouts
// ----------------------------------------------------------------------------

/// Timeouts applied while a protocol is running
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolTimeouts {
    /// Maximum wait for the reply to one SendAndWait step
    pub step_timeout_secs: u64,
}

impl Default for ProtocolTimeouts {
    fn default() -> Self {
        Self {
            step_timeout_secs: 30,
        }
    }
}

impl ProtocolTimeouts {
    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }
}

// ----------------------------------------------------------------------------
// Persistence Configuration
// ----------------------------------------------------------------------------

/// Retry policy for writing a completed protocol's results
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Attempts per write before reporting StorageFailure
    pub max_attempts: u32,
    /// Pause between attempts in milliseconds
    pub retry_backoff_millis: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_backoff_millis: 1000,
        }
    }
}

impl PersistenceConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_millis)
    }
}

// ----------------------------------------------------------------------------
// Channel Defaults
// ----------------------------------------------------------------------------

/// Timeouts and bounds used when creating channels and apps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelDefaults {
    /// Dispute timeout of the free balance app, in blocks
    pub free_balance_timeout: u64,
    /// Version bound on the intermediary's virtual app signature
    pub virtual_app_nonce_expiry: u64,
    /// Dispute timeout of the deposit refund app, in blocks
    pub refund_app_timeout: u64,
}

impl Default for ChannelDefaults {
    fn default() -> Self {
        Self {
            free_balance_timeout: 172800, // ~30 days of 15s blocks
            virtual_app_nonce_expiry: 65536,
            refund_app_timeout: 1008, // ~4 hours
        }
    }
}

// ----------------------------------------------------------------------------
// Network Context
// ----------------------------------------------------------------------------

/// Addresses of the settlement contracts commitments target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkContext {
    pub app_registry: Address,
    pub conditional_transaction_delegate_target: Address,
    pub free_balance_app: Address,
    pub balance_refund_app: Address,
    pub coin_transfer_interpreter: Address,
    pub two_party_fixed_outcome_interpreter: Address,
    pub proxy_factory: Address,
    pub multisig_proxy_code_hash: Bytes32,
}

impl Default for NetworkContext {
    fn default() -> Self {
        Self::development()
    }
}

impl NetworkContext {
    /// Placeholder deployment with addresses derived from contract names,
    /// for local development and tests
    pub fn development() -> Self {
        let named = |name: &str| Address::from_word(&keccak256(name.as_bytes()));
        Self {
            app_registry: named("AppRegistry"),
            conditional_transaction_delegate_target: named("ConditionalTransactionDelegateTarget"),
            free_balance_app: named("FreeBalanceApp"),
            balance_refund_app: named("BalanceRefundApp"),
            coin_transfer_interpreter: named("CoinTransferInterpreter"),
            two_party_fixed_outcome_interpreter: named("TwoPartyFixedOutcomeInterpreter"),
            proxy_factory: named("ProxyFactory"),
            multisig_proxy_code_hash: keccak256(b"MinimumViableMultisig"),
        }
    }

    /// Interpreter contract for an outcome type
    pub fn interpreter_for(&self, outcome_type: OutcomeType) -> Address {
        match outcome_type {
            OutcomeType::CoinTransfer => self.coin_transfer_interpreter,
            OutcomeType::TwoPartyFixed => self.two_party_fixed_outcome_interpreter,
        }
    }

    fn validate(&self) -> Result<()> {
        let required = [
            ("app_registry", self.app_registry),
            (
                "conditional_transaction_delegate_target",
                self.conditional_transaction_delegate_target,
            ),
            ("free_balance_app", self.free_balance_app),
        ];
        match required.iter().find(|(_, addr)| addr.is_zero()) {
            Some((name, _)) => Err(OffchainError::config_error(format!(
                "network address {name} must be set"
            ))),
            None => Ok(()),
        }
    }
}

// ----------------------------------------------------------------------------
// Engine Configuration
// ----------------------------------------------------------------------------

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub protocol: ProtocolTimeouts,
    pub persistence: PersistenceConfig,
    pub channel: ChannelDefaults,
    pub network: NetworkContext,
}

impl EngineConfig {
    /// Short timeouts and immediate retries for tests
    pub fn testing() -> Self {
        Self {
            protocol: ProtocolTimeouts {
                step_timeout_secs: 2,
            },
            persistence: PersistenceConfig {
                max_attempts: 2,
                retry_backoff_millis: 10,
            },
            ..Self::default()
        }
    }

    /// Fail fast on slow counterparties and flaky storage
    pub fn strict() -> Self {
        Self {
            protocol: ProtocolTimeouts {
                step_timeout_secs: 10,
            },
            persistence: PersistenceConfig {
                max_attempts: 5,
                retry_backoff_millis: 500,
            },
            ..Self::default()
        }
    }

    /// Parse from a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| OffchainError::config_error(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            OffchainError::config_error(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| OffchainError::config_error(format!("cannot render TOML: {e}")))
    }

    pub fn validate(&self) -> Result<()> {
        if self.protocol.step_timeout_secs == 0 {
            return Err(OffchainError::config_error(
                "protocol.step_timeout_secs must be at least 1",
            ));
        }
        if self.persistence.max_attempts == 0 {
            return Err(OffchainError::config_error(
                "persistence.max_attempts must be at least 1",
            ));
        }
        if self.channel.virtual_app_nonce_expiry == 0 {
            return Err(OffchainError::config_error(
                "channel.virtual_app_nonce_expiry must be at least 1",
            ));
        }
        self.network.validate()
    }
}
