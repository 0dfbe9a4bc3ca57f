//! Chain module - static catalog of supported networks
//!
//! This module provides:
//! - The set of supported chains and their slugs
//! - Immutable per-chain addressing metadata (USDC, bridge messenger, explorer)
//! - Parallel balance scanning across every registered chain

pub mod balance;

pub use balance::{BalanceReport, BalanceScanner, ChainBalance, ChainBalanceError};

use crate::error::{SettlementError, SettlementResult};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

/// Supported blockchain networks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Chain {
    ArbitrumSepolia,
    BaseSepolia,
    OptimismSepolia,
    PolygonAmoy,
}

impl Chain {
    /// All chains in catalog order
    pub const ALL: [Chain; 4] = [
        Chain::ArbitrumSepolia,
        Chain::BaseSepolia,
        Chain::OptimismSepolia,
        Chain::PolygonAmoy,
    ];

    pub fn slug(&self) -> &'static str {
        match self {
            Chain::ArbitrumSepolia => "arbitrum-sepolia",
            Chain::BaseSepolia => "base-sepolia",
            Chain::OptimismSepolia => "optimism-sepolia",
            Chain::PolygonAmoy => "polygon-amoy",
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for Chain {
    type Err = SettlementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Chain::ALL
            .iter()
            .copied()
            .find(|c| c.slug() == s)
            .ok_or_else(|| SettlementError::UnknownChain {
                chain: s.to_string(),
            })
    }
}

/// Addressing metadata for one network
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainConfig {
    pub chain: Chain,
    pub name: String,
    pub chain_id: u64,
    pub rpc_url: String,
    pub usdc_address: String,
    pub token_messenger: String,
    pub message_transmitter: String,
    /// Bridge domain identifier used by the attestation protocol
    pub domain_id: u32,
    pub explorer_url: String,
    pub native_token: String,
}

impl ChainConfig {
    /// Explorer link for a transaction hash
    pub fn explorer_tx_url(&self, tx_hash: &str) -> String {
        format!("{}/tx/{}", self.explorer_url.trim_end_matches('/'), tx_hash)
    }
}

/// Built-in catalog entry for a chain
pub fn default_config(chain: Chain) -> ChainConfig {
    let (name, chain_id, rpc_url, usdc, transmitter, domain_id, explorer, native) = match chain {
        Chain::ArbitrumSepolia => (
            "Arbitrum Sepolia",
            421614,
            "https://sepolia-rollup.arbitrum.io/rpc",
            "0x75faf114eafb1BDbe2F0316DF893fd58CE46AA4d",
            "0xaCF1ceeF35caAc005e15888dDb8A3515C41B4872",
            3,
            "https://sepolia.arbiscan.io",
            "ETH",
        ),
        Chain::BaseSepolia => (
            "Base Sepolia",
            84532,
            "https://sepolia.base.org",
            "0x036CbD53842c5426634e7929541eC2318f3dCF7e",
            "0x7865fAfC2db2093669d92c0F33AeEF291086BEFD",
            6,
            "https://sepolia.basescan.org",
            "ETH",
        ),
        Chain::OptimismSepolia => (
            "Optimism Sepolia",
            11155420,
            "https://sepolia.optimism.io",
            "0x5fd84259d66Cd46123540766Be93DFE6D43130D7",
            "0x7865fAfC2db2093669d92c0F33AeEF291086BEFD",
            2,
            "https://sepolia-optimism.etherscan.io",
            "ETH",
        ),
        Chain::PolygonAmoy => (
            "Polygon Amoy",
            80002,
            "https://rpc-amoy.polygon.technology",
            "0x41e94eb019c0762f9bfcf9fb1e58725bfb0e7582",
            "0x7865fAfC2db2093669d92c0F33AeEF291086BEFD",
            7,
            "https://amoy.polygonscan.com",
            "MATIC",
        ),
    };

    ChainConfig {
        chain,
        name: name.to_string(),
        chain_id,
        rpc_url: rpc_url.to_string(),
        usdc_address: usdc.to_string(),
        // Same token messenger deployment on every supported testnet
        token_messenger: "0x9f3B8679c73C2Fef8b59B4f3444d4e156fb70AA5".to_string(),
        message_transmitter: transmitter.to_string(),
        domain_id,
        explorer_url: explorer.to_string(),
        native_token: native.to_string(),
    }
}

/// Read-only registry of the chains this process serves
#[derive(Debug, Clone)]
pub struct ChainRegistry {
    /// Registration order, used for deterministic tie-breaks
    order: Vec<Chain>,
    configs: HashMap<Chain, ChainConfig>,
}

impl ChainRegistry {
    /// Registry containing the full built-in catalog
    pub fn new() -> Self {
        Self::with_chains(&Chain::ALL, &HashMap::new())
    }

    /// Registry containing a subset of the catalog, with optional RPC overrides
    pub fn with_chains(chains: &[Chain], rpc_overrides: &HashMap<Chain, String>) -> Self {
        let mut order = Vec::with_capacity(chains.len());
        let mut configs = HashMap::with_capacity(chains.len());

        for chain in chains {
            if configs.contains_key(chain) {
                continue;
            }

            let mut config = default_config(*chain);
            if let Some(rpc_url) = rpc_overrides.get(chain) {
                debug!("Overriding RPC endpoint for {}: {}", chain, rpc_url);
                config.rpc_url = rpc_url.clone();
            }

            order.push(*chain);
            configs.insert(*chain, config);
        }

        info!("Chain registry initialized with {} chains", order.len());
        Self { order, configs }
    }

    /// Get configuration for a registered chain
    pub fn config_for(&self, chain: Chain) -> SettlementResult<&ChainConfig> {
        self.configs
            .get(&chain)
            .ok_or_else(|| SettlementError::UnknownChain {
                chain: chain.to_string(),
            })
    }

    /// Parse a chain slug and check it is registered
    pub fn resolve(&self, slug: &str) -> SettlementResult<Chain> {
        let chain = Chain::from_str(slug)?;
        self.config_for(chain)?;
        Ok(chain)
    }

    pub fn contains(&self, chain: Chain) -> bool {
        self.configs.contains_key(&chain)
    }

    /// Registered chains in registration order
    pub fn chains(&self) -> &[Chain] {
        &self.order
    }

    /// Position of a chain in registration order
    pub fn position(&self, chain: Chain) -> Option<usize> {
        self.order.iter().position(|c| *c == chain)
    }
}

impl Default for ChainRegistry {
    fn default() -> Self {
        Self::new()
    }
}
