//! Cross-chain settlement service
//!
//! Serves fee quotes, bridge routing and escrow settlement over HTTP, backed by
//! the offline ledger, configured reputation scores and posted verdicts.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

use crosschain_settlement::api::{self, AppState};
use crosschain_settlement::bridge::{BridgeTracker, RouteSelector};
use crosschain_settlement::chain::{BalanceScanner, ChainRegistry};
use crosschain_settlement::clock::{Clock, SystemClock};
use crosschain_settlement::collaborators::{
    OfflineLedger, PostedVerdictVerifier, StaticReputationOracle,
};
use crosschain_settlement::config::Settings;
use crosschain_settlement::escrow::{Collaborators, OrchestratorConfig, SettlementOrchestrator};
use crosschain_settlement::metrics::MetricsServer;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    info!("Starting crosschain-settlement v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let settings = Settings::load()?;
    info!(
        "Loaded configuration for instance {} with {} chains",
        settings.service.instance_id,
        settings.chains.enabled.len()
    );

    // Chain catalog and bridge components
    let registry = Arc::new(ChainRegistry::with_chains(
        &settings.chains.enabled,
        &settings.chains.rpc_overrides()?,
    ));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let routes = Arc::new(RouteSelector::new(registry.clone(), settings.service.fast_chain));
    let tracker = Arc::new(BridgeTracker::new(routes.clone(), clock.clone()));

    // Offline collaborators
    let ledger = Arc::new(OfflineLedger::new());
    let verdicts = Arc::new(PostedVerdictVerifier::new(
        settings.service.verifier_identity.clone(),
    ));
    let reputation = Arc::new(StaticReputationOracle::new(
        settings.reputation.default_score,
        settings.reputation.overrides.clone(),
    ));

    let orchestrator = Arc::new(
        SettlementOrchestrator::new(
            OrchestratorConfig {
                employer_address: settings.service.employer_address.clone(),
                employer_chain: settings.service.employer_chain,
                collaborator_timeout: settings.service.collaborator_timeout(),
                verification_timeout: settings.service.verification_timeout(),
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
        .context("Failed to initialize settlement orchestrator")?,
    );
    info!(
        "Settlement orchestrator initialized (employer chain {})",
        settings.service.employer_chain
    );

    let balances = Arc::new(BalanceScanner::new(
        registry,
        ledger,
        settings.service.collaborator_timeout(),
    ));

    // Start API server
    let api_handle = tokio::spawn({
        let config = settings.api.clone();
        let state = AppState {
            orchestrator,
            routes,
            tracker,
            balances,
            verdicts,
        };
        async move {
            if let Err(e) = api::run_server(config, state).await {
                error!("API server error: {}", e);
            }
        }
    });

    // Start metrics server
    let metrics_handle = if settings.metrics.enabled {
        let server = MetricsServer::new(settings.metrics.port);
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    info!("Settlement service is running");
    info!("API server: http://{}:{}", settings.api.host, settings.api.port);
    if settings.metrics.enabled {
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
    }

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutdown signal received, stopping...");

    api_handle.abort();
    if let Some(h) = metrics_handle {
        h.abort();
    }

    info!("Settlement service stopped");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,crosschain_settlement=debug,hyper=warn")
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
