//! Error types for the settlement core

use crate::chain::Chain;
use crate::escrow::EscrowState;
use thiserror::Error;

/// Failure reported by an external collaborator (oracle, ledger, verifier)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CollaboratorError {
    #[error("network error: {0}")]
    Network(String),

    #[error("contract reverted: {0}")]
    Reverted(String),

    #[error("unavailable: {0}")]
    Unavailable(String),
}

/// Main error type for the settlement core
#[derive(Error, Debug)]
pub enum SettlementError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid amount {amount}: {reason}")]
    InvalidAmount { amount: f64, reason: String },

    #[error("Chain {chain} is not registered")]
    UnknownChain { chain: String },

    #[error("No route from {chain} to itself: source and destination chains must differ")]
    SameChain { chain: Chain },

    #[error("Bridge transaction {tx_ref} not found")]
    TransactionNotFound { tx_ref: String },

    #[error("Escrow {escrow_id} not found")]
    EscrowNotFound { escrow_id: u64 },

    #[error("Escrow {escrow_id}: {operation} requires state {expected}, found {actual}")]
    InvalidState {
        escrow_id: u64,
        operation: &'static str,
        expected: EscrowState,
        actual: EscrowState,
    },

    #[error("Escrow {escrow_id} already verified with passed={existing}; conflicting verdict rejected")]
    AlreadyVerified { escrow_id: u64, existing: bool },

    #[error("Escrow {escrow_id} cannot be released: state is {state}, requires VERIFIED_PASS")]
    NotVerified { escrow_id: u64, state: EscrowState },

    #[error("Escrow {escrow_id}: deadline {deadline} has passed")]
    DeadlineExpired { escrow_id: u64, deadline: i64 },

    #[error("Escrow {escrow_id}: work {work_url} does not match submitted fingerprint {fingerprint}")]
    WorkMismatch {
        escrow_id: u64,
        work_url: String,
        fingerprint: String,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Timeout after {timeout_ms}ms waiting for {collaborator} ({context})")]
    CollaboratorTimeout {
        collaborator: &'static str,
        context: String,
        timeout_ms: u64,
    },

    #[error("{collaborator} failed ({context}): {source}")]
    CollaboratorFailure {
        collaborator: &'static str,
        context: String,
        #[source]
        source: CollaboratorError,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SettlementError {
    /// Check if the caller may retry the operation as-is
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SettlementError::CollaboratorTimeout { .. }
                | SettlementError::CollaboratorFailure {
                    source: CollaboratorError::Network(_),
                    ..
                }
        )
    }

    /// Check if the error was a rejected precondition on caller input
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            SettlementError::InvalidAmount { .. }
                | SettlementError::UnknownChain { .. }
                | SettlementError::SameChain { .. }
                | SettlementError::InvalidRequest(_)
                | SettlementError::WorkMismatch { .. }
        )
    }

    pub(crate) fn invalid_amount(amount: f64, reason: impl Into<String>) -> Self {
        SettlementError::InvalidAmount {
            amount,
            reason: reason.into(),
        }
    }
}

/// Result type for settlement operations
pub type SettlementResult<T> = Result<T, SettlementError>;
