//! Offline collaborator adapters
//!
//! Used when no live oracle, RPC gateway or judge is wired in. Each adapter is
//! deterministic so the same inputs always produce the same answers.

use super::{LedgerClient, LedgerPayload, ReputationOracle, StateQuery, Verdict, WorkVerifier};
use crate::chain::Chain;
use crate::error::CollaboratorError;
use crate::hash::keccak_hex;

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

/// Reputation scores from configuration
pub struct StaticReputationOracle {
    default_score: u32,
    overrides: HashMap<String, u32>,
}

impl StaticReputationOracle {
    pub fn new(default_score: u32, overrides: HashMap<String, u32>) -> Self {
        let overrides = overrides
            .into_iter()
            .map(|(address, score)| (address.to_lowercase(), score))
            .collect();
        Self {
            default_score,
            overrides,
        }
    }
}

#[async_trait]
impl ReputationOracle for StaticReputationOracle {
    async fn reputation(&self, address: &str) -> Result<u32, CollaboratorError> {
        Ok(self
            .overrides
            .get(&address.to_lowercase())
            .copied()
            .unwrap_or(self.default_score))
    }
}

/// Submitted transaction kept in the offline journal
#[derive(Debug, Clone, PartialEq)]
pub struct JournalEntry {
    pub chain: Chain,
    pub payload: LedgerPayload,
    pub tx_hash: String,
}

/// Ledger that journals submissions in memory and serves configured balances
pub struct OfflineLedger {
    journal: RwLock<Vec<JournalEntry>>,
    /// (chain, lowercase address) -> USDC balance
    usdc_balances: DashMap<(Chain, String), f64>,
    sequence: AtomicU64,
}

impl OfflineLedger {
    pub fn new() -> Self {
        Self {
            journal: RwLock::new(Vec::new()),
            usdc_balances: DashMap::new(),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn set_usdc_balance(&self, chain: Chain, address: &str, balance: f64) {
        self.usdc_balances
            .insert((chain, address.to_lowercase()), balance);
    }

    /// Snapshot of every submitted transaction, oldest first
    pub async fn journal(&self) -> Vec<JournalEntry> {
        self.journal.read().await.clone()
    }
}

impl Default for OfflineLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerClient for OfflineLedger {
    async fn submit_transaction(
        &self,
        chain: Chain,
        payload: &LedgerPayload,
    ) -> Result<String, CollaboratorError> {
        let encoded = serde_json::to_vec(payload)
            .map_err(|e| CollaboratorError::Unavailable(e.to_string()))?;
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let tx_hash = keccak_hex(&[
            chain.slug().as_bytes(),
            &encoded,
            &seq.to_be_bytes(),
        ]);

        self.journal.write().await.push(JournalEntry {
            chain,
            payload: payload.clone(),
            tx_hash: tx_hash.clone(),
        });

        debug!(
            "Journaled escrow {} transaction on {}: {}",
            payload.escrow_id(),
            chain,
            tx_hash
        );
        Ok(tx_hash)
    }

    async fn read_state(&self, chain: Chain, query: &StateQuery) -> Result<f64, CollaboratorError> {
        match query {
            StateQuery::UsdcBalance { address } => Ok(self
                .usdc_balances
                .get(&(chain, address.to_lowercase()))
                .map(|b| *b)
                .unwrap_or(0.0)),
            // Gas balances are not tracked offline
            StateQuery::NativeBalance { .. } => Ok(0.0),
        }
    }
}

/// Verifier whose verdicts are posted by an external judge, keyed by work URL
pub struct PostedVerdictVerifier {
    identity: String,
    verdicts: DashMap<String, Verdict>,
}

impl PostedVerdictVerifier {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            verdicts: DashMap::new(),
        }
    }

    /// Record (or replace) the verdict for a work URL
    pub fn post(&self, work_url: &str, verdict: Verdict) {
        debug!(
            "Verdict posted for {}: passed={} score={}",
            work_url, verdict.passed, verdict.score
        );
        self.verdicts.insert(work_url.to_string(), verdict);
    }
}

#[async_trait]
impl WorkVerifier for PostedVerdictVerifier {
    async fn verify(
        &self,
        _criteria: &serde_json::Value,
        work_url: &str,
    ) -> Result<Verdict, CollaboratorError> {
        self.verdicts
            .get(work_url)
            .map(|v| v.clone())
            .ok_or_else(|| {
                CollaboratorError::Unavailable(format!("no verdict posted for {}", work_url))
            })
    }

    fn identity(&self) -> String {
        self.identity.clone()
    }
}
