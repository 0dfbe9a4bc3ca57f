//! Cross-chain escrow settlement core
//!
//! Fee quoting, bridge route selection, bridge transfer tracking and escrow
//! settlement orchestration for agent-to-agent USDC payments.

pub mod api;
pub mod bridge;
pub mod chain;
pub mod clock;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod escrow;
pub mod fees;
pub mod hash;
pub mod metrics;

pub use error::{CollaboratorError, SettlementError, SettlementResult};
