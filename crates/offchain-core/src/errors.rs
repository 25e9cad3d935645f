//! Error types for the off-chain protocol engine
//!
//! This module contains all error types used throughout the core protocol,
//! including validation errors, model transition errors, signature errors, and
//! the main OffchainError type that unifies them all.

use core::fmt;

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Request or message contents that fail local validation
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Channel not found: {multisig}")]
    ChannelNotFound { multisig: String },
    #[error("Channel already exists: {multisig}")]
    ChannelAlreadyExists { multisig: String },
    #[error("No channel between {first} and {second}")]
    NoChannelBetween { first: String, second: String },
    #[error("App instance not found: {identity_hash}")]
    AppNotFound { identity_hash: String },
    #[error("Proposal not found: {identity_hash}")]
    ProposalNotFound { identity_hash: String },
    #[error("Unknown app definition: {app_definition}")]
    UnknownAppDefinition { app_definition: String },
    #[error("Insufficient funds for {owner}: requested {requested}, available {available}")]
    InsufficientFunds {
        owner: String,
        requested: String,
        available: String,
    },
    #[error("Not the turn taker: expected {expected}, got {actual}")]
    NotTurnTaker { expected: String, actual: String },
    #[error("Illegal action: {reason}")]
    IllegalAction { reason: String },
    #[error("Outcome pays out {total} which exceeds the limit of {limit}")]
    OutcomeExceedsLimit { total: String, limit: String },
    #[error("Payout limit {limit} exceeds the {deposits} the parties lock")]
    LimitExceedsDeposits { limit: String, deposits: String },
    #[error("Refund not backed by the ledger: {reason}")]
    UnverifiedRefund { reason: String },
    #[error("Invalid owners: {reason}")]
    InvalidOwners { reason: String },
    #[error("{identifier} is not a participant of {context}")]
    NotParticipant { identifier: String, context: String },
    #[error("Invalid protocol parameters: {reason}")]
    InvalidParams { reason: String },
    #[error("Malformed protocol message: {reason}")]
    MalformedMessage { reason: String },
    #[error("Malformed app state: {reason}")]
    MalformedState { reason: String },
}

/// Rejected mutation of the channel model
#[derive(Debug, thiserror::Error)]
pub enum StateTransitionError {
    #[error("App instance {identity_hash} is already installed")]
    AlreadyInstalled { identity_hash: String },
    #[error("App instance {identity_hash} is not installed")]
    NotInstalled { identity_hash: String },
    #[error("Proposal {identity_hash} is already recorded")]
    DuplicateProposal { identity_hash: String },
    #[error("Version {proposed} does not exceed current version {current}")]
    StaleVersion { current: u64, proposed: u64 },
    #[error("App sequence number {actual} does not match expected {expected}")]
    SequenceMismatch { expected: u64, actual: u64 },
    #[error("Virtual app agreement for {identity_hash} is {reason}")]
    Agreement { identity_hash: String, reason: String },
}

/// Signature collection and verification failures
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("Expected signer {expected}, recovered {recovered}")]
    SignerMismatch { expected: String, recovered: String },
    #[error("Expected {expected} signatures, got {actual}")]
    CountMismatch { expected: usize, actual: usize },
    #[error("Missing signature from {signer} for commitment slot {slot}")]
    Missing { slot: usize, signer: String },
    #[error("Malformed signature: {reason}")]
    Malformed { reason: String },
}

/// Key handling and primitive failures
#[derive(Debug, thiserror::Error)]
pub enum CryptographicError {
    #[error("Invalid key format")]
    InvalidKeyFormat,
    #[error("Signing failed")]
    SigningFailed,
    #[error("Public key recovery failed")]
    RecoveryFailed,
}

/// Failures reported by the messaging collaborator
#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    #[error("Peer unreachable: {peer}")]
    PeerUnreachable { peer: String },
    #[error("Send to {peer} failed: {reason}")]
    SendFailed { peer: String, reason: String },
}

/// Failures reported by the store collaborator
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage backend error: {reason}")]
    Backend { reason: String },
    #[error("Stored record is corrupt: {reason}")]
    Corrupt { reason: String },
}

// ----------------------------------------------------------------------------
// Main Error Type
// ----------------------------------------------------------------------------

/// Core error type for the off-chain protocol engine
#[derive(Debug, thiserror::Error)]
pub enum OffchainError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Invalid transition: {0}")]
    InvalidTransition(#[from] StateTransitionError),

    #[error("Signature mismatch: {0}")]
    SignatureMismatch(#[from] SignatureError),

    #[error("Cryptographic error: {0}")]
    Crypto(#[from] CryptographicError),

    #[error("Protocol {protocol} timed out waiting for {peer} after {duration_ms}ms")]
    Timeout {
        protocol: String,
        peer: String,
        duration_ms: u64,
    },

    #[error("Channel {multisig} is already running a protocol")]
    ConcurrencyConflict { multisig: String },

    #[error("Storage failure: {0}")]
    StorageFailure(#[from] StorageError),

    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    /// Settlement ledger rejected or failed a transaction
    #[error("Ledger error: {reason}")]
    Ledger { reason: String },

    /// Configuration error
    #[error("Configuration error: {reason}")]
    Configuration { reason: String },
}

// ----------------------------------------------------------------------------
// Convenience Error Constructors
// ----------------------------------------------------------------------------

impl OffchainError {
    /// Create an invalid parameters error with a reason
    pub fn invalid_params<T: Into<String>>(reason: T) -> Self {
        OffchainError::Validation(ValidationError::InvalidParams {
            reason: reason.into(),
        })
    }

    /// Create a malformed message error with a reason
    pub fn malformed_message<T: Into<String>>(reason: T) -> Self {
        OffchainError::Validation(ValidationError::MalformedMessage {
            reason: reason.into(),
        })
    }

    /// Create a malformed state error with a reason
    pub fn malformed_state<T: Into<String>>(reason: T) -> Self {
        OffchainError::Validation(ValidationError::MalformedState {
            reason: reason.into(),
        })
    }

    /// Create a channel not found error
    pub fn channel_not_found<A: fmt::Display>(multisig: A) -> Self {
        OffchainError::Validation(ValidationError::ChannelNotFound {
            multisig: multisig.to_string(),
        })
    }

    /// Create an app not found error
    pub fn app_not_found<H: fmt::Display>(identity_hash: H) -> Self {
        OffchainError::Validation(ValidationError::AppNotFound {
            identity_hash: identity_hash.to_string(),
        })
    }

    /// Create a proposal not found error
    pub fn proposal_not_found<H: fmt::Display>(identity_hash: H) -> Self {
        OffchainError::Validation(ValidationError::ProposalNotFound {
            identity_hash: identity_hash.to_string(),
        })
    }

    /// Create an illegal action error with a reason
    pub fn illegal_action<T: Into<String>>(reason: T) -> Self {
        OffchainError::Validation(ValidationError::IllegalAction {
            reason: reason.into(),
        })
    }

    /// Create a concurrency conflict error for a busy channel
    pub fn concurrency_conflict<A: fmt::Display>(multisig: A) -> Self {
        OffchainError::ConcurrencyConflict {
            multisig: multisig.to_string(),
        }
    }

    /// Create a storage backend error with a reason
    pub fn storage<T: Into<String>>(reason: T) -> Self {
        OffchainError::StorageFailure(StorageError::Backend {
            reason: reason.into(),
        })
    }

    /// Create a configuration error with a reason
    pub fn config_error<T: Into<String>>(reason: T) -> Self {
        OffchainError::Configuration {
            reason: reason.into(),
        }
    }

    /// Create a ledger error with a reason
    pub fn ledger<T: Into<String>>(reason: T) -> Self {
        OffchainError::Ledger {
            reason: reason.into(),
        }
    }

    /// Whether the whole operation may be retried unchanged.
    ///
    /// Timeouts and lock conflicts leave no partial state behind, so a caller
    /// can simply issue the same request again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OffchainError::Timeout { .. } | OffchainError::ConcurrencyConflict { .. }
        )
    }

    /// Short machine-readable name of the error category
    pub fn kind(&self) -> &'static str {
        match self {
            OffchainError::Validation(_) => "validation",
            OffchainError::InvalidTransition(_) => "invalid_transition",
            OffchainError::SignatureMismatch(_) => "signature_mismatch",
            OffchainError::Crypto(_) => "crypto",
            OffchainError::Timeout { .. } => "timeout",
            OffchainError::ConcurrencyConflict { .. } => "concurrency_conflict",
            OffchainError::StorageFailure(_) => "storage_failure",
            OffchainError::Messaging(_) => "messaging",
            OffchainError::Serialization(_) | OffchainError::Encoding(_) => "serialization",
            OffchainError::Ledger { .. } => "ledger",
            OffchainError::Configuration { .. } => "configuration",
        }
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, OffchainError>;
pub type OffchainResult<T> = Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(OffchainError::concurrency_conflict("0xabc").is_retryable());
        assert!(OffchainError::Timeout {
            protocol: "install".into(),
            peer: "0x01".into(),
            duration_ms: 10,
        }
        .is_retryable());
        assert!(!OffchainError::invalid_params("bad").is_retryable());
        assert!(!OffchainError::from(SignatureError::CountMismatch {
            expected: 2,
            actual: 1
        })
        .is_retryable());
    }

    #[test]
    fn error_kinds() {
        assert_eq!(OffchainError::storage("disk").kind(), "storage_failure");
        assert_eq!(
            OffchainError::from(StateTransitionError::NotInstalled {
                identity_hash: "0x00".into()
            })
            .kind(),
            "invalid_transition"
        );
    }
}
