//! Escrow records and settlement artifacts

use crate::bridge::{BridgeRoute, BridgeStatusReport};
use crate::chain::Chain;
use crate::fees::Complexity;
use crate::hash::keccak_hex;

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Settlement pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EscrowState {
    Created,
    WorkSubmitted,
    VerifiedPass,
    VerifiedFail,
    Released,
}

impl EscrowState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, EscrowState::Released | EscrowState::VerifiedFail)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EscrowState::Created => "CREATED",
            EscrowState::WorkSubmitted => "WORK_SUBMITTED",
            EscrowState::VerifiedPass => "VERIFIED_PASS",
            EscrowState::VerifiedFail => "VERIFIED_FAIL",
            EscrowState::Released => "RELEASED",
        }
    }
}

impl fmt::Display for EscrowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Route attached to a cross-chain escrow for the employer's information
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BridgeQuote {
    pub route: BridgeRoute,
    pub estimated_minutes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Escrow {
    pub id: u64,
    pub employer: String,
    pub worker: String,
    pub amount: f64,
    pub fee: f64,
    pub task_description: String,
    pub criteria: serde_json::Value,
    pub deadline: i64,
    pub employer_chain: Chain,
    pub worker_chain: Chain,
    pub complexity: Complexity,
    pub worker_reputation: u32,
    pub cross_chain: bool,
    pub bridge_quote: Option<BridgeQuote>,
    pub creation_tx: String,
    pub created_at: i64,
    pub state: EscrowState,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkSubmission {
    pub escrow_id: u64,
    pub work_url: String,
    pub work_data: Option<serde_json::Value>,
    pub fingerprint: String,
    pub submitted_by: String,
    pub submitted_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationResult {
    pub escrow_id: u64,
    pub passed: bool,
    pub score: u8,
    pub reason: String,
    pub verified_by: String,
    pub verified_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReleaseRecord {
    pub escrow_id: u64,
    pub release_id: Uuid,
    pub worker: String,
    pub worker_payment: f64,
    pub protocol_fee: f64,
    pub tx_hash: String,
    pub explorer_url: String,
    pub bridge_tx: Option<String>,
    pub released_at: i64,
}

/// Escrow together with every artifact produced so far
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EscrowRecord {
    pub escrow: Escrow,
    pub submission: Option<WorkSubmission>,
    pub verification: Option<VerificationResult>,
    pub release: Option<ReleaseRecord>,
}

/// Point-in-time view of an escrow's progress
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EscrowStatusView {
    pub escrow_id: u64,
    pub state: EscrowState,
    pub time_remaining_hours: u64,
    pub bridge: Option<BridgeStatusReport>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateEscrowRequest {
    pub worker: String,
    pub amount: f64,
    pub task_description: String,
    #[serde(default)]
    pub criteria: serde_json::Value,
    #[serde(default = "default_deadline_hours")]
    pub deadline_hours: u64,
    #[serde(default)]
    pub complexity: Complexity,
    pub worker_chain: Option<Chain>,
}

fn default_deadline_hours() -> u64 {
    24
}

/// Inputs for the end-to-end settlement flow
#[derive(Debug, Clone, Deserialize)]
pub struct FlowRequest {
    #[serde(flatten)]
    pub escrow: CreateEscrowRequest,
    pub work_url: String,
    pub work_data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowOutcome {
    pub escrow: Escrow,
    pub submission: WorkSubmission,
    pub verification: VerificationResult,
    /// Absent when verification failed
    pub release: Option<ReleaseRecord>,
}

/// Fingerprint binding a work URL to its (canonically serialized) data
pub fn work_fingerprint(work_url: &str, work_data: Option<&serde_json::Value>) -> String {
    let data = work_data
        .map(|d| d.to_string())
        .unwrap_or_default();
    keccak_hex(&[work_url.as_bytes(), data.as_bytes()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fingerprint_binds_url_and_data() {
        let data = json!({"rows": 5000, "format": "CSV"});
        let a = work_fingerprint("ipfs://QmWork", Some(&data));

        assert_eq!(a, work_fingerprint("ipfs://QmWork", Some(&data)));
        assert_ne!(a, work_fingerprint("ipfs://QmOther", Some(&data)));
        assert_ne!(a, work_fingerprint("ipfs://QmWork", Some(&json!({"rows": 4999, "format": "CSV"}))));
        assert_ne!(a, work_fingerprint("ipfs://QmWork", None));
    }

    #[test]
    fn test_fingerprint_ignores_key_order() {
        let a: serde_json::Value = serde_json::from_str(r#"{"a":1,"b":2}"#).unwrap();
        let b: serde_json::Value = serde_json::from_str(r#"{"b":2,"a":1}"#).unwrap();
        assert_eq!(
            work_fingerprint("ipfs://x", Some(&a)),
            work_fingerprint("ipfs://x", Some(&b))
        );
    }

    #[test]
    fn test_terminal_states() {
        assert!(EscrowState::Released.is_terminal());
        assert!(EscrowState::VerifiedFail.is_terminal());
        assert!(!EscrowState::VerifiedPass.is_terminal());
        assert_eq!(
            serde_json::to_string(&EscrowState::WorkSubmitted).unwrap(),
            "\"WORK_SUBMITTED\""
        );
    }

    #[test]
    fn test_flow_request_defaults() {
        let request: FlowRequest = serde_json::from_value(json!({
            "worker": "0xworker",
            "amount": 100.0,
            "task_description": "Clean 5000 email records",
            "work_url": "ipfs://QmWork"
        }))
        .unwrap();

        assert_eq!(request.escrow.deadline_hours, 24);
        assert_eq!(request.escrow.complexity, Complexity::Medium);
        assert_eq!(request.escrow.worker_chain, None);
        assert!(request.escrow.criteria.is_null());
    }
}
