//! Configuration management for the settlement service
//!
//! Loads configuration from TOML files with environment variable substitution.

use crate::chain::Chain;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub service: ServiceConfig,
    pub api: ApiConfig,
    pub metrics: MetricsConfig,
    pub chains: ChainsConfig,
    #[serde(default)]
    pub reputation: ReputationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub instance_id: String,
    /// Address escrows are funded from
    pub employer_address: String,
    pub employer_chain: Chain,
    /// Chain with fast attestation
    pub fast_chain: Chain,
    pub collaborator_timeout_ms: u64,
    pub verification_timeout_ms: u64,
    pub verifier_identity: String,
}

impl ServiceConfig {
    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_millis(self.collaborator_timeout_ms)
    }

    pub fn verification_timeout(&self) -> Duration {
        Duration::from_millis(self.verification_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainsConfig {
    /// Registered chains, in registration order
    pub enabled: Vec<Chain>,
    /// Chain slug -> RPC endpoint
    #[serde(default)]
    pub rpc_overrides: HashMap<String, String>,
}

impl ChainsConfig {
    /// RPC overrides keyed by parsed chain
    pub fn rpc_overrides(&self) -> Result<HashMap<Chain, String>> {
        self.rpc_overrides
            .iter()
            .map(|(slug, rpc_url)| {
                let chain = slug
                    .parse::<Chain>()
                    .with_context(|| format!("Invalid chain in rpc_overrides: {}", slug))?;
                Ok((chain, rpc_url.clone()))
            })
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReputationConfig {
    pub default_score: u32,
    #[serde(default)]
    pub overrides: HashMap<String, u32>,
}

impl Default for ReputationConfig {
    fn default() -> Self {
        Self {
            default_score: 500,
            overrides: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load settings from the file named by `SETTLEMENT_CONFIG`, or `config/default.toml`
    pub fn load() -> Result<Self> {
        let config_path = env::var("SETTLEMENT_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        Self::load_from(&config_path)
    }

    /// Load settings from a specific file
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::parse(&config_str)
    }

    fn parse(config_str: &str) -> Result<Self> {
        // Substitute environment variables
        let config_str = substitute_env_vars(config_str)?;

        let settings: Settings = toml::from_str(&config_str)
            .with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.chains.enabled.is_empty() {
            anyhow::bail!("At least one chain must be enabled");
        }

        if !self.chains.enabled.contains(&self.service.employer_chain) {
            anyhow::bail!(
                "Employer chain {} is not in the enabled chain list",
                self.service.employer_chain
            );
        }

        if !self.chains.enabled.contains(&self.service.fast_chain) {
            tracing::warn!(
                "Fast chain {} is not enabled - all routes use the standard duration",
                self.service.fast_chain
            );
        }

        if self.service.employer_address.trim().is_empty() {
            anyhow::bail!("service.employer_address must be set");
        }

        if self.service.collaborator_timeout_ms == 0 || self.service.verification_timeout_ms == 0 {
            anyhow::bail!("Collaborator timeouts must be positive");
        }

        for (chain, rpc_url) in self.chains.rpc_overrides()? {
            if rpc_url.is_empty() {
                anyhow::bail!("Chain {} has an empty RPC override", chain);
            }
        }

        let reputations = std::iter::once(&self.reputation.default_score)
            .chain(self.reputation.overrides.values());
        for score in reputations {
            if *score > crate::fees::MAX_REPUTATION {
                anyhow::bail!(
                    "Reputation score {} exceeds {}",
                    score,
                    crate::fees::MAX_REPUTATION
                );
            }
        }

        Ok(())
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> Result<String> {
    let mut result = input.to_string();
    let re = regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .context("Invalid substitution pattern")?;

    for cap in re.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    Ok(result)
}
