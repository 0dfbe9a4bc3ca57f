//! HTTP API for fee quotes, routing, bridge tracking and escrow settlement

use crate::bridge::{BridgeTracker, RouteSelector};
use crate::chain::{BalanceScanner, Chain, ChainConfig};
use crate::collaborators::{PostedVerdictVerifier, Verdict};
use crate::config::ApiConfig;
use crate::error::{SettlementError, SettlementResult};
use crate::escrow::{CreateEscrowRequest, FlowRequest, SettlementOrchestrator};
use crate::fees::{self, Complexity};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<SettlementOrchestrator>,
    pub routes: Arc<RouteSelector>,
    pub tracker: Arc<BridgeTracker>,
    pub balances: Arc<BalanceScanner>,
    pub verdicts: Arc<PostedVerdictVerifier>,
}

impl IntoResponse for SettlementError {
    fn into_response(self) -> Response {
        let status = match &self {
            SettlementError::EscrowNotFound { .. } | SettlementError::TransactionNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            SettlementError::InvalidState { .. }
            | SettlementError::AlreadyVerified { .. }
            | SettlementError::NotVerified { .. }
            | SettlementError::DeadlineExpired { .. } => StatusCode::CONFLICT,
            SettlementError::CollaboratorFailure { .. } => StatusCode::BAD_GATEWAY,
            SettlementError::CollaboratorTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            SettlementError::Config(_) | SettlementError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            e if e.is_validation() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        (status, Json(ErrorResponse { error: self.to_string() })).into_response()
    }
}

/// Build the API router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/chains", get(get_chains))
        .route("/fees/quote", get(quote_fee))
        .route("/routes/:from", get(compare_routes))
        .route("/routes/:from/:to", get(find_route))
        .route("/routes/:from/:to/estimate", get(estimate_cost))
        .route("/bridge/transfers", post(dispatch_transfer).get(recent_transfers))
        .route("/bridge/transfers/:tx_ref", get(transfer_status))
        .route("/balances/:address", get(get_balances))
        .route("/escrows", post(create_escrow))
        .route("/escrows/:id", get(get_escrow))
        .route("/escrows/:id/status", get(get_escrow_status))
        .route("/escrows/:id/work", post(submit_work))
        .route("/escrows/:id/verify", post(verify_work))
        .route("/escrows/:id/release", post(release_payment))
        .route("/flows", post(run_flow))
        .route("/verdicts", post(post_verdict))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Run the HTTP API server
pub async fn run_server(config: ApiConfig, state: AppState) -> SettlementResult<()> {
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| SettlementError::Config(format!("cannot bind API address {}: {}", addr, e)))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| SettlementError::Internal(format!("API server: {}", e)))?;

    Ok(())
}

/// Health check endpoint - basic liveness
async fn health_check() -> impl IntoResponse {
    crate::metrics::record_health_check();
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Registered chains in registration order
async fn get_chains(State(state): State<AppState>) -> SettlementResult<Json<ChainsResponse>> {
    let registry = state.routes.registry();
    let chains = registry
        .chains()
        .iter()
        .map(|chain| registry.config_for(*chain).cloned())
        .collect::<SettlementResult<Vec<_>>>()?;
    Ok(Json(ChainsResponse { chains }))
}

async fn quote_fee(Query(query): Query<FeeQuery>) -> SettlementResult<Json<FeeQuoteResponse>> {
    let fee = fees::compute_fee(
        query.amount,
        query.complexity,
        query.reputation,
        query.cross_chain,
    )?;
    Ok(Json(FeeQuoteResponse {
        amount: query.amount,
        fee,
        fee_percentage: fee / query.amount * 100.0,
    }))
}

async fn find_route(
    State(state): State<AppState>,
    Path((from, to)): Path<(String, String)>,
    Query(query): Query<AmountQuery>,
) -> SettlementResult<impl IntoResponse> {
    let (from, to) = resolve_pair(&state, &from, &to)?;
    Ok(Json(state.routes.find_route(from, to, query.amount)?))
}

async fn compare_routes(
    State(state): State<AppState>,
    Path(from): Path<String>,
    Query(query): Query<CompareQuery>,
) -> SettlementResult<impl IntoResponse> {
    let registry = state.routes.registry();
    let from = registry.resolve(&from)?;
    let candidates = match query.candidates.as_deref() {
        Some(list) => list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| registry.resolve(s))
            .collect::<SettlementResult<Vec<_>>>()?,
        None => registry.chains().to_vec(),
    };
    Ok(Json(state.routes.compare_routes(from, query.amount, &candidates)?))
}

async fn estimate_cost(
    State(state): State<AppState>,
    Path((from, to)): Path<(String, String)>,
    Query(query): Query<EstimateQuery>,
) -> SettlementResult<impl IntoResponse> {
    let (from, to) = resolve_pair(&state, &from, &to)?;
    Ok(Json(state.routes.estimate_total_cost(
        from,
        to,
        query.amount,
        query.include_escrow_fee,
        query.worker_reputation,
    )?))
}

async fn dispatch_transfer(
    State(state): State<AppState>,
    Json(request): Json<DispatchRequest>,
) -> SettlementResult<impl IntoResponse> {
    let transfer = state
        .tracker
        .dispatch(request.from_chain, request.to_chain, request.amount, &request.recipient)
        .await?;
    Ok((StatusCode::CREATED, Json(transfer)))
}

async fn transfer_status(
    State(state): State<AppState>,
    Path(tx_ref): Path<String>,
) -> SettlementResult<impl IntoResponse> {
    Ok(Json(state.tracker.status_of(&tx_ref).await?))
}

async fn recent_transfers(
    State(state): State<AppState>,
    Query(query): Query<RecentQuery>,
) -> impl IntoResponse {
    Json(state.tracker.recent(query.limit).await)
}

async fn get_balances(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> impl IntoResponse {
    Json(state.balances.scan(&address).await)
}

async fn create_escrow(
    State(state): State<AppState>,
    Json(request): Json<CreateEscrowRequest>,
) -> SettlementResult<impl IntoResponse> {
    let escrow = state.orchestrator.create_escrow(request).await?;
    Ok((StatusCode::CREATED, Json(escrow)))
}

async fn get_escrow(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> SettlementResult<impl IntoResponse> {
    Ok(Json(state.orchestrator.escrow(id).await?))
}

async fn get_escrow_status(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> SettlementResult<impl IntoResponse> {
    Ok(Json(state.orchestrator.escrow_status(id).await?))
}

async fn submit_work(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(request): Json<SubmitWorkRequest>,
) -> SettlementResult<impl IntoResponse> {
    Ok(Json(
        state
            .orchestrator
            .submit_work(id, &request.work_url, request.work_data)
            .await?,
    ))
}

/// Criteria and work URL default to the escrow's own
async fn verify_work(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(request): Json<VerifyRequest>,
) -> SettlementResult<impl IntoResponse> {
    let record = state.orchestrator.escrow(id).await?;
    let criteria = request.criteria.unwrap_or(record.escrow.criteria);
    let work_url = match request.work_url {
        Some(url) => url,
        None => record
            .submission
            .map(|s| s.work_url)
            .unwrap_or_default(),
    };

    Ok(Json(
        state
            .orchestrator
            .verify_work(id, &criteria, &work_url)
            .await?,
    ))
}

async fn release_payment(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> SettlementResult<impl IntoResponse> {
    Ok(Json(state.orchestrator.release_payment(id).await?))
}

async fn run_flow(
    State(state): State<AppState>,
    Json(request): Json<FlowRequest>,
) -> SettlementResult<impl IntoResponse> {
    Ok(Json(state.orchestrator.run_full_flow(request).await?))
}

async fn post_verdict(
    State(state): State<AppState>,
    Json(request): Json<PostVerdictRequest>,
) -> SettlementResult<impl IntoResponse> {
    if request.work_url.trim().is_empty() {
        return Err(SettlementError::InvalidRequest("work_url is empty".to_string()));
    }
    if request.verdict.score > 100 {
        return Err(SettlementError::InvalidRequest(format!(
            "score {} outside [0, 100]",
            request.verdict.score
        )));
    }
    state.verdicts.post(&request.work_url, request.verdict);
    Ok(StatusCode::ACCEPTED)
}

fn resolve_pair(state: &AppState, from: &str, to: &str) -> SettlementResult<(Chain, Chain)> {
    let registry = state.routes.registry();
    Ok((registry.resolve(from)?, registry.resolve(to)?))
}

// Request types

#[derive(Debug, Deserialize)]
struct FeeQuery {
    amount: f64,
    #[serde(default)]
    complexity: Complexity,
    #[serde(default)]
    reputation: u32,
    #[serde(default)]
    cross_chain: bool,
}

#[derive(Debug, Deserialize)]
struct AmountQuery {
    amount: f64,
}

#[derive(Debug, Deserialize)]
struct CompareQuery {
    amount: f64,
    /// Comma-separated chain slugs; defaults to every registered chain
    candidates: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EstimateQuery {
    amount: f64,
    #[serde(default = "default_true")]
    include_escrow_fee: bool,
    #[serde(default)]
    worker_reputation: u32,
}

#[derive(Debug, Deserialize)]
struct RecentQuery {
    #[serde(default = "default_recent_limit")]
    limit: usize,
}

#[derive(Debug, Deserialize)]
struct DispatchRequest {
    from_chain: Chain,
    to_chain: Chain,
    amount: f64,
    recipient: String,
}

#[derive(Debug, Deserialize)]
struct SubmitWorkRequest {
    work_url: String,
    work_data: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct VerifyRequest {
    criteria: Option<serde_json::Value>,
    work_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PostVerdictRequest {
    work_url: String,
    #[serde(flatten)]
    verdict: Verdict,
}

fn default_true() -> bool {
    true
}

fn default_recent_limit() -> usize {
    20
}

// Response types

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
struct ChainsResponse {
    chains: Vec<ChainConfig>,
}

#[derive(Serialize)]
struct FeeQuoteResponse {
    amount: f64,
    fee: f64,
    fee_percentage: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ChainRegistry;
    use crate::clock::{Clock, ManualClock};
    use crate::collaborators::{OfflineLedger, ReputationOracle, StaticReputationOracle};
    use crate::error::CollaboratorError;
    use crate::escrow::{Collaborators, OrchestratorConfig};

    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::time::Duration;
    use tower::ServiceExt;

    struct StalledOracle;

    #[async_trait]
    impl ReputationOracle for StalledOracle {
        async fn reputation(&self, _address: &str) -> Result<u32, CollaboratorError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Err(CollaboratorError::Unavailable("unreachable".to_string()))
        }
    }

    fn app() -> Router {
        app_with(
            Arc::new(StaticReputationOracle::new(750, HashMap::new())),
            Duration::from_secs(1),
        )
    }

    fn app_with(reputation: Arc<dyn ReputationOracle>, timeout: Duration) -> Router {
        let registry = Arc::new(ChainRegistry::new());
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(1_700_000_000));
        let routes = Arc::new(RouteSelector::new(registry.clone(), Chain::BaseSepolia));
        let tracker = Arc::new(BridgeTracker::new(routes.clone(), clock.clone()));
        let ledger = Arc::new(OfflineLedger::new());
        ledger.set_usdc_balance(Chain::BaseSepolia, "0xworker", 12.5);
        let verdicts = Arc::new(PostedVerdictVerifier::new("judge"));

        let orchestrator = SettlementOrchestrator::new(
            OrchestratorConfig {
                employer_address: "0xemployer".to_string(),
                employer_chain: Chain::ArbitrumSepolia,
                collaborator_timeout: timeout,
                verification_timeout: timeout,
            },
            routes.clone(),
            tracker.clone(),
            Collaborators {
                reputation,
                ledger: ledger.clone(),
                verifier: verdicts.clone(),
            },
            clock,
        )
        .unwrap();

        router(AppState {
            orchestrator: Arc::new(orchestrator),
            routes,
            tracker,
            balances: Arc::new(BalanceScanner::new(registry, ledger, timeout)),
            verdicts,
        })
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health_and_chains() {
        let app = app();
        let (status, body) = call(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (status, body) = call(&app, "GET", "/chains", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["chains"].as_array().unwrap().len(), 4);
        assert_eq!(body["chains"][0]["chain_id"], 421614);
    }

    #[tokio::test]
    async fn test_fee_quote() {
        let app = app();
        let (status, body) = call(&app, "GET", "/fees/quote?amount=100&reputation=750", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!((body["fee"].as_f64().unwrap() - 0.95).abs() < 1e-9);

        let (status, body) = call(&app, "GET", "/fees/quote?amount=-5", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("-5"));

        let (status, body) = call(&app, "GET", "/fees/quote?amount=100&reputation=1001", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("1001"));
    }

    #[tokio::test]
    async fn test_route_endpoints() {
        let app = app();
        let (status, body) = call(&app, "GET", "/routes/arbitrum-sepolia/base-sepolia?amount=100", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["estimated_time_secs"], 600);

        let (status, _) = call(&app, "GET", "/routes/base-sepolia/base-sepolia?amount=100", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(&app, "GET", "/routes/solana/base-sepolia?amount=100", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(&app, "GET", "/routes/arbitrum-sepolia?amount=100", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 3);
        assert_eq!(body[0]["to_chain"], "base-sepolia");

        let (status, body) = call(
            &app,
            "GET",
            "/routes/arbitrum-sepolia/base-sepolia/estimate?amount=1000&worker_reputation=850",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!((body["total_cost"].as_f64().unwrap() - 10.5).abs() < 1e-9);

        let (status, _) = call(
            &app,
            "GET",
            "/routes/arbitrum-sepolia/base-sepolia/estimate?amount=1000&worker_reputation=2000",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_bridge_transfer_lifecycle() {
        let app = app();
        let (status, body) = call(
            &app,
            "POST",
            "/bridge/transfers",
            Some(json!({
                "from_chain": "optimism-sepolia",
                "to_chain": "polygon-amoy",
                "amount": 25.0,
                "recipient": "0xrecipient"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let tx_ref = body["tx_ref"].as_str().unwrap().to_string();

        let (status, body) = call(&app, "GET", &format!("/bridge/transfers/{}", tx_ref), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "PENDING");

        let (status, _) = call(&app, "GET", "/bridge/transfers/0xmissing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, body) = call(&app, "GET", "/bridge/transfers?limit=5", None).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_balances() {
        let app = app();
        let (status, body) = call(&app, "GET", "/balances/0xworker", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!((body["total_usdc"].as_f64().unwrap() - 12.5).abs() < 1e-9);
        assert_eq!(body["chains_with_balance"], 1);
    }

    #[tokio::test]
    async fn test_stalled_collaborator_maps_to_gateway_timeout() {
        let app = app_with(Arc::new(StalledOracle), Duration::from_millis(50));
        let (status, body) = call(
            &app,
            "POST",
            "/escrows",
            Some(json!({
                "worker": "0xworker",
                "amount": 100.0,
                "task_description": "Clean 5000 email records",
                "criteria": {"min_rows": 5000}
            })),
        )
        .await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert!(body["error"].as_str().unwrap().contains("reputation_oracle"));

        let (status, _) = call(&app, "GET", "/escrows/1", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_escrow_lifecycle_over_http() {
        let app = app();
        let (status, escrow) = call(
            &app,
            "POST",
            "/escrows",
            Some(json!({
                "worker": "0xworker",
                "amount": 100.0,
                "task_description": "Clean 5000 email records",
                "criteria": {"min_rows": 5000}
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(escrow["state"], "CREATED");
        let id = escrow["id"].as_u64().unwrap();

        let (status, body) = call(&app, "POST", &format!("/escrows/{}/release", id), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("VERIFIED_PASS"));

        let (status, _) = call(
            &app,
            "POST",
            &format!("/escrows/{}/work", id),
            Some(json!({"work_url": "ipfs://QmWork"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        // No verdict posted yet: the verifier is unavailable
        let (status, _) = call(&app, "POST", &format!("/escrows/{}/verify", id), Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);

        let (status, _) = call(
            &app,
            "POST",
            "/verdicts",
            Some(json!({"work_url": "ipfs://QmWork", "passed": true, "score": 92, "reason": "complete"})),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let (status, body) = call(&app, "POST", &format!("/escrows/{}/verify", id), Some(json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["verified_by"], "judge");

        let (status, body) = call(&app, "POST", &format!("/escrows/{}/release", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["worker_payment"], 100.0);

        let (_, body) = call(&app, "GET", &format!("/escrows/{}/status", id), None).await;
        assert_eq!(body["state"], "RELEASED");

        let (status, _) = call(&app, "GET", "/escrows/404", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_full_flow_endpoint() {
        let app = app();
        call(
            &app,
            "POST",
            "/verdicts",
            Some(json!({"work_url": "ipfs://QmFlow", "passed": false, "score": 30, "reason": "incomplete"})),
        )
        .await;

        let (status, body) = call(
            &app,
            "POST",
            "/flows",
            Some(json!({
                "worker": "0xworker",
                "amount": 40.0,
                "task_description": "Summarize report",
                "worker_chain": "base-sepolia",
                "work_url": "ipfs://QmFlow"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["escrow"]["state"], "VERIFIED_FAIL");
        assert!(body["release"].is_null());
    }
}
