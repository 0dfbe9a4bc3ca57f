//! Parallel USDC balance scanning across registered chains
//!
//! One query per chain is issued concurrently. A failing chain is reported in
//! `errors` and never aborts the others.

use super::{Chain, ChainRegistry};
use crate::collaborators::{call_with_timeout, LedgerClient, StateQuery};

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Balance on one chain
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainBalance {
    pub chain: Chain,
    pub chain_name: String,
    pub usdc_address: String,
    pub usdc_balance: f64,
}

/// Balance query that failed on one chain
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainBalanceError {
    pub chain: Chain,
    pub error: String,
}

/// Aggregated balances for one address
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceReport {
    pub address: String,
    pub total_usdc: f64,
    pub balances: Vec<ChainBalance>,
    pub errors: Vec<ChainBalanceError>,
    pub chains_with_balance: usize,
}

/// Fan-out balance scanner
pub struct BalanceScanner {
    registry: Arc<ChainRegistry>,
    ledger: Arc<dyn LedgerClient>,
    timeout: Duration,
}

impl BalanceScanner {
    pub fn new(registry: Arc<ChainRegistry>, ledger: Arc<dyn LedgerClient>, timeout: Duration) -> Self {
        Self {
            registry,
            ledger,
            timeout,
        }
    }

    /// Query every registered chain concurrently
    pub async fn scan(&self, address: &str) -> BalanceReport {
        let queries = self.registry.chains().iter().map(|chain| {
            let chain = *chain;
            let query = StateQuery::UsdcBalance {
                address: address.to_string(),
            };
            async move {
                let result = call_with_timeout(
                    "ledger",
                    format!("usdc balance of {} on {}", address, chain),
                    self.timeout,
                    self.ledger.read_state(chain, &query),
                )
                .await;
                (chain, result)
            }
        });

        let results = futures::future::join_all(queries).await;

        let mut balances = Vec::new();
        let mut errors = Vec::new();
        for (chain, result) in results {
            match result {
                Ok(usdc_balance) => {
                    // Registered chains always have a config
                    if let Ok(config) = self.registry.config_for(chain) {
                        balances.push(ChainBalance {
                            chain,
                            chain_name: config.name.clone(),
                            usdc_address: config.usdc_address.clone(),
                            usdc_balance,
                        });
                    }
                }
                Err(e) => {
                    warn!("Balance check failed on {}: {}", chain, e);
                    errors.push(ChainBalanceError {
                        chain,
                        error: e.to_string(),
                    });
                }
            }
        }

        let total_usdc = balances.iter().map(|b| b.usdc_balance).sum();
        let chains_with_balance = balances.iter().filter(|b| b.usdc_balance > 0.0).count();

        debug!(
            "Balance scan for {}: {} ok, {} failed",
            address,
            balances.len(),
            errors.len()
        );

        BalanceReport {
            address: address.to_string(),
            total_usdc,
            balances,
            errors,
            chains_with_balance,
        }
    }
}
