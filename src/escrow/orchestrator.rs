//! Escrow settlement orchestrator
//!
//! Drives each escrow through create → submit → verify → release. Every
//! mutating step holds the escrow's own lock for its whole duration (including
//! collaborator calls), and commits the transition only after all collaborator
//! calls have succeeded. A failed or timed-out step leaves the escrow in its
//! last committed state.

use super::types::{
    work_fingerprint, BridgeQuote, CreateEscrowRequest, Escrow, EscrowRecord, EscrowState,
    EscrowStatusView, FlowOutcome, FlowRequest, ReleaseRecord, VerificationResult, WorkSubmission,
};
use crate::bridge::{BridgeTracker, RouteSelector};
use crate::chain::Chain;
use crate::clock::Clock;
use crate::collaborators::{
    call_with_timeout, LedgerClient, LedgerPayload, ReputationOracle, WorkVerifier,
};
use crate::error::{CollaboratorError, SettlementError, SettlementResult};
use crate::fees::{self, MAX_REPUTATION};
use crate::hash::keccak_hex;

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Orchestrator settings
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub employer_address: String,
    pub employer_chain: Chain,
    pub collaborator_timeout: Duration,
    pub verification_timeout: Duration,
}

/// External collaborators the orchestrator depends on
#[derive(Clone)]
pub struct Collaborators {
    pub reputation: Arc<dyn ReputationOracle>,
    pub ledger: Arc<dyn LedgerClient>,
    pub verifier: Arc<dyn WorkVerifier>,
}

pub struct SettlementOrchestrator {
    config: OrchestratorConfig,
    routes: Arc<RouteSelector>,
    tracker: Arc<BridgeTracker>,
    collaborators: Collaborators,
    clock: Arc<dyn Clock>,
    escrows: DashMap<u64, Arc<Mutex<EscrowRecord>>>,
    next_id: AtomicU64,
}

impl SettlementOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        routes: Arc<RouteSelector>,
        tracker: Arc<BridgeTracker>,
        collaborators: Collaborators,
        clock: Arc<dyn Clock>,
    ) -> SettlementResult<Self> {
        routes.registry().config_for(config.employer_chain)?;
        if config.employer_address.trim().is_empty() {
            return Err(SettlementError::Config(
                "employer address is empty".to_string(),
            ));
        }

        Ok(Self {
            config,
            routes,
            tracker,
            collaborators,
            clock,
            escrows: DashMap::new(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn employer_chain(&self) -> Chain {
        self.config.employer_chain
    }

    /// Price and open a new escrow
    pub async fn create_escrow(&self, request: CreateEscrowRequest) -> SettlementResult<Escrow> {
        fees::validate_amount(request.amount)?;
        if request.worker.trim().is_empty() {
            return Err(SettlementError::InvalidRequest(
                "worker address is empty".to_string(),
            ));
        }
        if request.deadline_hours == 0 {
            return Err(SettlementError::InvalidRequest(
                "deadline_hours must be positive".to_string(),
            ));
        }

        let now = self.clock.now();
        let deadline = i64::try_from(request.deadline_hours)
            .ok()
            .and_then(|hours| hours.checked_mul(3600))
            .and_then(|secs| now.checked_add(secs))
            .ok_or_else(|| {
                SettlementError::InvalidRequest(format!(
                    "deadline_hours {} is out of range",
                    request.deadline_hours
                ))
            })?;

        let employer_chain = self.config.employer_chain;
        let worker_chain = request.worker_chain.unwrap_or(employer_chain);
        self.routes.registry().config_for(worker_chain)?;
        let cross_chain = worker_chain != employer_chain;

        let escrow_id = self.next_id.fetch_add(1, Ordering::SeqCst);

        let worker_reputation = call_with_timeout(
            "reputation_oracle",
            format!("escrow {} worker {}", escrow_id, request.worker),
            self.config.collaborator_timeout,
            self.collaborators.reputation.reputation(&request.worker),
        )
        .await?;
        if worker_reputation > MAX_REPUTATION {
            return Err(SettlementError::CollaboratorFailure {
                collaborator: "reputation_oracle",
                context: format!("escrow {} worker {}", escrow_id, request.worker),
                source: CollaboratorError::Unavailable(format!(
                    "reputation {} outside [0, {}]",
                    worker_reputation, MAX_REPUTATION
                )),
            });
        }

        let fee = fees::compute_fee(
            request.amount,
            request.complexity,
            worker_reputation,
            cross_chain,
        )?;

        let bridge_quote = if cross_chain {
            let route = self
                .routes
                .find_route(employer_chain, worker_chain, request.amount)?;
            Some(BridgeQuote {
                estimated_minutes: route.estimated_time_secs / 60,
                route,
            })
        } else {
            None
        };

        let criteria_hash = keccak_hex(&[request.criteria.to_string().as_bytes()]);

        let payload = LedgerPayload::CreateEscrow {
            escrow_id,
            employer: self.config.employer_address.clone(),
            worker: request.worker.clone(),
            amount_units: fees::to_base_units(request.amount),
            fee_units: fees::to_base_units(fee),
            deadline,
            criteria_hash,
        };
        let creation_tx = call_with_timeout(
            "ledger",
            format!("create escrow {} on {}", escrow_id, employer_chain),
            self.config.collaborator_timeout,
            self.collaborators
                .ledger
                .submit_transaction(employer_chain, &payload),
        )
        .await?;

        let escrow = Escrow {
            id: escrow_id,
            employer: self.config.employer_address.clone(),
            worker: request.worker,
            amount: request.amount,
            fee,
            task_description: request.task_description,
            criteria: request.criteria,
            deadline,
            employer_chain,
            worker_chain,
            complexity: request.complexity,
            worker_reputation,
            cross_chain,
            bridge_quote,
            creation_tx,
            created_at: now,
            state: EscrowState::Created,
        };

        self.escrows.insert(
            escrow_id,
            Arc::new(Mutex::new(EscrowRecord {
                escrow: escrow.clone(),
                submission: None,
                verification: None,
                release: None,
            })),
        );

        crate::metrics::record_escrow_created(employer_chain, cross_chain, fee);
        info!(
            "Escrow {} created: {} USDC, fee {:.4} ({:.2}%), {} -> {}",
            escrow_id,
            escrow.amount,
            fee,
            fee / escrow.amount * 100.0,
            employer_chain,
            worker_chain
        );
        Ok(escrow)
    }

    /// Record the worker's deliverable
    pub async fn submit_work(
        &self,
        escrow_id: u64,
        work_url: &str,
        work_data: Option<serde_json::Value>,
    ) -> SettlementResult<WorkSubmission> {
        if work_url.trim().is_empty() {
            return Err(SettlementError::InvalidRequest(format!(
                "escrow {}: work_url is empty",
                escrow_id
            )));
        }

        let entry = self.entry(escrow_id)?;
        let mut record = entry.lock().await;

        let state = record.escrow.state;
        if state != EscrowState::Created {
            return Err(SettlementError::InvalidState {
                escrow_id,
                operation: "submit_work",
                expected: EscrowState::Created,
                actual: state,
            });
        }

        let now = self.clock.now();
        if now > record.escrow.deadline {
            return Err(SettlementError::DeadlineExpired {
                escrow_id,
                deadline: record.escrow.deadline,
            });
        }

        let submission = WorkSubmission {
            escrow_id,
            work_url: work_url.to_string(),
            fingerprint: work_fingerprint(work_url, work_data.as_ref()),
            work_data,
            submitted_by: record.escrow.worker.clone(),
            submitted_at: now,
        };

        record.submission = Some(submission.clone());
        record.escrow.state = EscrowState::WorkSubmitted;

        info!(
            "Escrow {} work submitted: {} ({})",
            escrow_id, submission.work_url, submission.fingerprint
        );
        Ok(submission)
    }

    /// Ask the verifier to judge the submitted work
    ///
    /// A repeat call re-consults the verifier: an agreeing verdict returns the
    /// stored result unchanged, a conflicting one fails with `AlreadyVerified`.
    pub async fn verify_work(
        &self,
        escrow_id: u64,
        criteria: &serde_json::Value,
        work_url: &str,
    ) -> SettlementResult<VerificationResult> {
        let entry = self.entry(escrow_id)?;
        let mut record = entry.lock().await;

        let state = record.escrow.state;
        if state == EscrowState::Created {
            return Err(SettlementError::InvalidState {
                escrow_id,
                operation: "verify_work",
                expected: EscrowState::WorkSubmitted,
                actual: state,
            });
        }

        let submission = record
            .submission
            .as_ref()
            .ok_or_else(|| {
                SettlementError::Internal(format!(
                    "escrow {} in state {} has no submission",
                    escrow_id, state
                ))
            })?;
        if work_fingerprint(work_url, submission.work_data.as_ref()) != submission.fingerprint {
            return Err(SettlementError::WorkMismatch {
                escrow_id,
                work_url: work_url.to_string(),
                fingerprint: submission.fingerprint.clone(),
            });
        }

        let verdict = call_with_timeout(
            "verifier",
            format!("verify escrow {}", escrow_id),
            self.config.verification_timeout,
            self.collaborators.verifier.verify(criteria, work_url),
        )
        .await?;
        if verdict.score > 100 {
            return Err(SettlementError::CollaboratorFailure {
                collaborator: "verifier",
                context: format!("verify escrow {}", escrow_id),
                source: CollaboratorError::Unavailable(format!(
                    "score {} outside [0, 100]",
                    verdict.score
                )),
            });
        }

        if let Some(existing) = &record.verification {
            if existing.passed == verdict.passed {
                debug!("Escrow {} re-verified with the same verdict", escrow_id);
                return Ok(existing.clone());
            }
            warn!(
                "Escrow {} conflicting verdict rejected: stored passed={}, new passed={}",
                escrow_id, existing.passed, verdict.passed
            );
            return Err(SettlementError::AlreadyVerified {
                escrow_id,
                existing: existing.passed,
            });
        }

        let result = VerificationResult {
            escrow_id,
            passed: verdict.passed,
            score: verdict.score,
            reason: verdict.reason,
            verified_by: self.collaborators.verifier.identity(),
            verified_at: self.clock.now(),
        };

        record.verification = Some(result.clone());
        record.escrow.state = if result.passed {
            EscrowState::VerifiedPass
        } else {
            EscrowState::VerifiedFail
        };

        crate::metrics::record_verification(result.passed, result.score);
        if result.passed {
            info!(
                "Escrow {} verification passed ({}/100): {}",
                escrow_id, result.score, result.reason
            );
        } else {
            warn!(
                "Escrow {} verification failed ({}/100): {}",
                escrow_id, result.score, result.reason
            );
        }
        Ok(result)
    }

    /// Release funds to the worker
    ///
    /// Repeat calls on a released escrow return the original record without
    /// touching the ledger again.
    pub async fn release_payment(&self, escrow_id: u64) -> SettlementResult<ReleaseRecord> {
        let entry = self.entry(escrow_id)?;
        let mut record = entry.lock().await;

        match record.escrow.state {
            EscrowState::Released => {
                return record.release.clone().ok_or_else(|| {
                    SettlementError::Internal(format!(
                        "escrow {} released without a release record",
                        escrow_id
                    ))
                });
            }
            EscrowState::VerifiedPass => {}
            state => return Err(SettlementError::NotVerified { escrow_id, state }),
        }

        let verification = match &record.verification {
            Some(v) if v.passed => v.clone(),
            _ => {
                return Err(SettlementError::Internal(format!(
                    "escrow {} marked VERIFIED_PASS without a passing verification",
                    escrow_id
                )))
            }
        };
        let work_fingerprint = record
            .submission
            .as_ref()
            .map(|s| s.fingerprint.clone())
            .unwrap_or_default();

        let escrow = &record.escrow;
        let employer_chain = escrow.employer_chain;

        // Validate the bridge leg before anything is submitted
        if escrow.cross_chain {
            self.routes
                .find_route(employer_chain, escrow.worker_chain, escrow.amount)?;
        }

        let payload = LedgerPayload::ReleasePayment {
            escrow_id,
            worker: escrow.worker.clone(),
            amount_units: fees::to_base_units(escrow.amount),
            fee_units: fees::to_base_units(escrow.fee),
            work_fingerprint,
            verification_score: verification.score,
        };
        let tx_hash = call_with_timeout(
            "ledger",
            format!("release escrow {} on {}", escrow_id, employer_chain),
            self.config.collaborator_timeout,
            self.collaborators
                .ledger
                .submit_transaction(employer_chain, &payload),
        )
        .await?;

        let bridge_tx = if escrow.cross_chain {
            let transfer = self
                .tracker
                .dispatch(employer_chain, escrow.worker_chain, escrow.amount, &escrow.worker)
                .await?;
            Some(transfer.tx_ref)
        } else {
            None
        };

        let explorer_url = self
            .routes
            .registry()
            .config_for(employer_chain)?
            .explorer_tx_url(&tx_hash);

        let release = ReleaseRecord {
            escrow_id,
            release_id: Uuid::new_v4(),
            worker: escrow.worker.clone(),
            worker_payment: escrow.amount,
            protocol_fee: escrow.fee,
            tx_hash,
            explorer_url,
            bridge_tx,
            released_at: self.clock.now(),
        };

        record.release = Some(release.clone());
        record.escrow.state = EscrowState::Released;

        crate::metrics::record_payment_released(employer_chain, release.worker_payment);
        info!(
            "Escrow {} released: {} USDC to {} (fee {:.4}, tx {})",
            escrow_id, release.worker_payment, release.worker, release.protocol_fee, release.tx_hash
        );
        Ok(release)
    }

    /// Create, submit, verify and (on a passing verdict) release in one call
    pub async fn run_full_flow(&self, request: FlowRequest) -> SettlementResult<FlowOutcome> {
        let escrow = self.create_escrow(request.escrow).await?;
        let submission = self
            .submit_work(escrow.id, &request.work_url, request.work_data)
            .await?;
        let verification = self
            .verify_work(escrow.id, &escrow.criteria, &request.work_url)
            .await?;

        let release = if verification.passed {
            Some(self.release_payment(escrow.id).await?)
        } else {
            warn!(
                "Escrow {} flow stopped before release: {}",
                escrow.id, verification.reason
            );
            None
        };

        // Reflect the final state in the returned escrow
        let escrow = self.escrow(escrow.id).await?.escrow;
        Ok(FlowOutcome {
            escrow,
            submission,
            verification,
            release,
        })
    }

    /// Snapshot of an escrow and its artifacts
    pub async fn escrow(&self, escrow_id: u64) -> SettlementResult<EscrowRecord> {
        let entry = self.entry(escrow_id)?;
        let record = entry.lock().await;
        Ok(record.clone())
    }

    /// Current state, deadline headroom and bridge progress
    pub async fn escrow_status(&self, escrow_id: u64) -> SettlementResult<EscrowStatusView> {
        let record = self.escrow(escrow_id).await?;

        let bridge = match record.release.as_ref().and_then(|r| r.bridge_tx.as_ref()) {
            Some(tx_ref) => Some(self.tracker.status_of(tx_ref).await?),
            None => None,
        };
        let remaining_secs = (record.escrow.deadline - self.clock.now()).max(0);

        Ok(EscrowStatusView {
            escrow_id,
            state: record.escrow.state,
            time_remaining_hours: (remaining_secs / 3600) as u64,
            bridge,
        })
    }

    fn entry(&self, escrow_id: u64) -> SettlementResult<Arc<Mutex<EscrowRecord>>> {
        self.escrows
            .get(&escrow_id)
            .map(|e| e.value().clone())
            .ok_or(SettlementError::EscrowNotFound { escrow_id })
    }
}
