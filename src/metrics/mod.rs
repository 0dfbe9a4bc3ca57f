//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Escrow lifecycle transitions
//! - Fee levels
//! - Bridge dispatches
//! - Collaborator failures and timeouts

use crate::chain::Chain;
use crate::error::{SettlementError, SettlementResult};

use axum::{http::StatusCode, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};
use std::net::SocketAddr;
use tracing::{error, info};

lazy_static! {
    // Escrow metrics
    pub static ref ESCROWS_CREATED: CounterVec = register_counter_vec!(
        "settlement_escrows_created_total",
        "Total escrows created",
        &["chain", "cross_chain"]
    ).unwrap();

    pub static ref VERIFICATIONS: CounterVec = register_counter_vec!(
        "settlement_verifications_total",
        "Total verification results recorded",
        &["outcome"]
    ).unwrap();

    pub static ref VERIFICATION_SCORE: HistogramVec = register_histogram_vec!(
        "settlement_verification_score",
        "Verifier scores",
        &["outcome"],
        vec![10.0, 25.0, 50.0, 70.0, 80.0, 90.0, 95.0, 100.0]
    ).unwrap();

    pub static ref PAYMENTS_RELEASED: CounterVec = register_counter_vec!(
        "settlement_payments_released_total",
        "Total payments released",
        &["chain"]
    ).unwrap();

    pub static ref PAYMENT_VOLUME: CounterVec = register_counter_vec!(
        "settlement_payment_volume_usdc_total",
        "USDC released to workers",
        &["chain"]
    ).unwrap();

    // Fee metrics
    pub static ref ESCROW_FEE: HistogramVec = register_histogram_vec!(
        "settlement_escrow_fee_usdc",
        "Protocol fee charged per escrow",
        &["cross_chain"],
        vec![0.01, 0.1, 0.5, 1.0, 5.0, 10.0, 50.0, 100.0, 1000.0]
    ).unwrap();

    // Bridge metrics
    pub static ref BRIDGE_DISPATCHED: CounterVec = register_counter_vec!(
        "settlement_bridge_transfers_total",
        "Total bridge transfers dispatched",
        &["from_chain", "to_chain"]
    ).unwrap();

    // Collaborator metrics
    pub static ref COLLABORATOR_FAILURES: CounterVec = register_counter_vec!(
        "settlement_collaborator_failures_total",
        "Total failed collaborator calls",
        &["collaborator"]
    ).unwrap();

    pub static ref COLLABORATOR_TIMEOUTS: CounterVec = register_counter_vec!(
        "settlement_collaborator_timeouts_total",
        "Total timed-out collaborator calls",
        &["collaborator"]
    ).unwrap();

    // Health metrics
    pub static ref HEALTH_CHECK_SUCCESS: CounterVec = register_counter_vec!(
        "settlement_health_check_success_total",
        "Total successful health checks",
        &[]
    ).unwrap();
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn run(&self) -> SettlementResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| SettlementError::Config(format!("cannot bind metrics port {}: {}", self.port, e)))?;
        axum::serve(listener, app)
            .await
            .map_err(|e| SettlementError::Internal(format!("metrics server: {}", e)))?;

        Ok(())
    }
}

async fn metrics_handler() -> Result<String, StatusCode> {
    render().map_err(|e| {
        error!("Failed to encode metrics: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

/// Text exposition of every registered metric
pub fn render() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

// Helper functions to record metrics

pub fn record_escrow_created(chain: Chain, cross_chain: bool, fee: f64) {
    let cross_chain = if cross_chain { "true" } else { "false" };
    ESCROWS_CREATED
        .with_label_values(&[chain.slug(), cross_chain])
        .inc();
    ESCROW_FEE.with_label_values(&[cross_chain]).observe(fee);
}

pub fn record_verification(passed: bool, score: u8) {
    let outcome = if passed { "pass" } else { "fail" };
    VERIFICATIONS.with_label_values(&[outcome]).inc();
    VERIFICATION_SCORE
        .with_label_values(&[outcome])
        .observe(score as f64);
}

pub fn record_payment_released(chain: Chain, amount: f64) {
    PAYMENTS_RELEASED.with_label_values(&[chain.slug()]).inc();
    PAYMENT_VOLUME.with_label_values(&[chain.slug()]).inc_by(amount);
}

pub fn record_bridge_dispatched(from_chain: Chain, to_chain: Chain) {
    BRIDGE_DISPATCHED
        .with_label_values(&[from_chain.slug(), to_chain.slug()])
        .inc();
}

pub fn record_collaborator_failure(collaborator: &str) {
    COLLABORATOR_FAILURES
        .with_label_values(&[collaborator])
        .inc();
}

pub fn record_collaborator_timeout(collaborator: &str) {
    COLLABORATOR_TIMEOUTS
        .with_label_values(&[collaborator])
        .inc();
}

pub fn record_health_check() {
    HEALTH_CHECK_SUCCESS.with_label_values(&[]).inc();
}
