//! External collaborators consumed by the settlement core
//!
//! The core never performs network I/O itself. Reputation lookups, ledger
//! reads/writes and work verification go through these traits, and every call
//! is bounded by a timeout so a stuck collaborator cannot wedge an escrow.

pub mod offline;

pub use offline::{OfflineLedger, PostedVerdictVerifier, StaticReputationOracle};

use crate::chain::Chain;
use crate::error::{CollaboratorError, SettlementError, SettlementResult};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[cfg(test)]
use mockall::automock;

/// Worker trust scores in [0, 1000]
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ReputationOracle: Send + Sync {
    async fn reputation(&self, address: &str) -> Result<u32, CollaboratorError>;
}

/// Chain access: transaction submission and state reads
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Submit a transaction and return its hash
    async fn submit_transaction(
        &self,
        chain: Chain,
        payload: &LedgerPayload,
    ) -> Result<String, CollaboratorError>;

    /// Read a numeric value from chain state
    async fn read_state(&self, chain: Chain, query: &StateQuery) -> Result<f64, CollaboratorError>;
}

/// Judge that scores submitted work against criteria
#[cfg_attr(test, automock)]
#[async_trait]
pub trait WorkVerifier: Send + Sync {
    async fn verify(
        &self,
        criteria: &serde_json::Value,
        work_url: &str,
    ) -> Result<Verdict, CollaboratorError>;

    /// Identity recorded on verification results
    fn identity(&self) -> String;
}

/// Escrow contract calls submitted through the ledger client
///
/// Amounts are in USDC base units (6 decimals).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerPayload {
    CreateEscrow {
        escrow_id: u64,
        employer: String,
        worker: String,
        amount_units: u64,
        fee_units: u64,
        deadline: i64,
        criteria_hash: String,
    },
    ReleasePayment {
        escrow_id: u64,
        worker: String,
        amount_units: u64,
        fee_units: u64,
        work_fingerprint: String,
        verification_score: u8,
    },
}

impl LedgerPayload {
    pub fn escrow_id(&self) -> u64 {
        match self {
            LedgerPayload::CreateEscrow { escrow_id, .. }
            | LedgerPayload::ReleasePayment { escrow_id, .. } => *escrow_id,
        }
    }
}

/// Chain state reads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StateQuery {
    UsdcBalance { address: String },
    NativeBalance { address: String },
}

/// Verifier output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub passed: bool,
    /// Score in [0, 100]
    pub score: u8,
    pub reason: String,
}

/// Run a collaborator call under a timeout, attaching collaborator and context to failures
pub async fn call_with_timeout<T, F>(
    collaborator: &'static str,
    context: String,
    limit: Duration,
    call: F,
) -> SettlementResult<T>
where
    F: Future<Output = Result<T, CollaboratorError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(source)) => {
            warn!("{} failed ({}): {}", collaborator, context, source);
            crate::metrics::record_collaborator_failure(collaborator);
            Err(SettlementError::CollaboratorFailure {
                collaborator,
                context,
                source,
            })
        }
        Err(_) => {
            warn!(
                "{} timed out after {}ms ({})",
                collaborator,
                limit.as_millis(),
                context
            );
            crate::metrics::record_collaborator_timeout(collaborator);
            Err(SettlementError::CollaboratorTimeout {
                collaborator,
                context,
                timeout_ms: limit.as_millis() as u64,
            })
        }
    }
}
