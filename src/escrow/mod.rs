//! Escrow module - settlement lifecycle for agent payments
//!
//! Handles:
//! - Escrow creation with reputation-aware fee pricing
//! - Work submission, verification and payment release
//! - Per-escrow serialization of concurrent operations

pub mod orchestrator;
pub mod types;

pub use orchestrator::{Collaborators, OrchestratorConfig, SettlementOrchestrator};
pub use types::{
    work_fingerprint, BridgeQuote, CreateEscrowRequest, Escrow, EscrowRecord, EscrowState,
    EscrowStatusView, FlowOutcome, FlowRequest, ReleaseRecord, VerificationResult, WorkSubmission,
};
