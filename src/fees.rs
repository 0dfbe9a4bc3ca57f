//! Dynamic escrow fee computation
//!
//! The fee starts at 1% of the amount and is adjusted by task complexity,
//! volume and worker reputation, then surcharged for cross-chain settlement.
//! The result is always clamped to `[0.5%, 3%]` of the amount.

use crate::error::{SettlementError, SettlementResult};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const BASE_FEE_RATE: f64 = 0.01;
pub const CROSS_CHAIN_SURCHARGE_RATE: f64 = 0.005;
pub const MIN_FEE_RATE: f64 = 0.005;
pub const MAX_FEE_RATE: f64 = 0.03;

/// Upper bound of the reputation scale
pub const MAX_REPUTATION: u32 = 1000;

/// USDC uses 6 decimals on every supported chain
const USDC_DECIMALS: i32 = 6;

/// Volume tiers, highest first: (minimum amount, multiplier)
const VOLUME_TIERS: [(f64, f64); 3] = [(50_000.0, 0.70), (10_000.0, 0.80), (1_000.0, 0.90)];

/// Reputation tiers, highest first: (minimum score, multiplier)
const REPUTATION_TIERS: [(u32, f64); 2] = [(800, 0.90), (500, 0.95)];

/// Task complexity level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Complexity {
    Low,
    #[default]
    Medium,
    High,
}

impl Complexity {
    pub fn multiplier(&self) -> f64 {
        match self {
            Complexity::Low => 0.75,
            Complexity::Medium => 1.0,
            Complexity::High => 1.5,
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Complexity::Low => f.write_str("LOW"),
            Complexity::Medium => f.write_str("MEDIUM"),
            Complexity::High => f.write_str("HIGH"),
        }
    }
}

impl FromStr for Complexity {
    type Err = SettlementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LOW" => Ok(Complexity::Low),
            "MEDIUM" => Ok(Complexity::Medium),
            "HIGH" => Ok(Complexity::High),
            other => Err(SettlementError::InvalidRequest(format!(
                "unknown complexity {}",
                other
            ))),
        }
    }
}

/// Reject non-positive and non-finite amounts
pub fn validate_amount(amount: f64) -> SettlementResult<()> {
    if !amount.is_finite() {
        return Err(SettlementError::invalid_amount(amount, "amount must be finite"));
    }
    if amount <= 0.0 {
        return Err(SettlementError::invalid_amount(amount, "amount must be positive"));
    }
    Ok(())
}

/// Reject reputation scores outside `[0, MAX_REPUTATION]`
pub fn validate_reputation(reputation: u32) -> SettlementResult<()> {
    if reputation > MAX_REPUTATION {
        return Err(SettlementError::InvalidRequest(format!(
            "reputation {} outside [0, {}]",
            reputation, MAX_REPUTATION
        )));
    }
    Ok(())
}

/// Volume discount multiplier for an amount
pub fn volume_discount(amount: f64) -> f64 {
    VOLUME_TIERS
        .iter()
        .find(|(min, _)| amount >= *min)
        .map(|(_, m)| *m)
        .unwrap_or(1.0)
}

/// Reputation discount multiplier for a worker score
pub fn reputation_discount(reputation: u32) -> f64 {
    REPUTATION_TIERS
        .iter()
        .find(|(min, _)| reputation >= *min)
        .map(|(_, m)| *m)
        .unwrap_or(1.0)
}

/// Compute the escrow fee
///
/// The clamp is applied after the cross-chain surcharge, so the 3% ceiling can
/// absorb the surcharge entirely.
pub fn compute_fee(
    amount: f64,
    complexity: Complexity,
    worker_reputation: u32,
    cross_chain: bool,
) -> SettlementResult<f64> {
    validate_amount(amount)?;
    validate_reputation(worker_reputation)?;

    let mut fee = amount * BASE_FEE_RATE;
    fee *= complexity.multiplier();
    fee *= volume_discount(amount);
    fee *= reputation_discount(worker_reputation);

    if cross_chain {
        fee += amount * CROSS_CHAIN_SURCHARGE_RATE;
    }

    Ok(fee.clamp(amount * MIN_FEE_RATE, amount * MAX_FEE_RATE))
}

/// Simplified escrow fee used for quoting: 1% with reputation discount only
pub fn quote_escrow_fee(amount: f64, worker_reputation: u32) -> SettlementResult<f64> {
    validate_amount(amount)?;
    validate_reputation(worker_reputation)?;
    Ok(amount * BASE_FEE_RATE * reputation_discount(worker_reputation))
}

/// Convert a USDC amount to integer base units, rounding to the nearest unit
pub fn to_base_units(amount: f64) -> u64 {
    (amount * 10f64.powi(USDC_DECIMALS)).round().max(0.0) as u64
}
