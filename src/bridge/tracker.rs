//! Append-only ledger of dispatched bridge transfers
//!
//! Status is never stored: it is projected from the clock against each
//! transfer's creation time and estimated arrival, so progress can only grow.

use super::route::RouteSelector;
use crate::chain::Chain;
use crate::clock::Clock;
use crate::error::{SettlementError, SettlementResult};
use crate::hash::keccak_hex;

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Dispatched transfer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BridgeTransaction {
    pub tx_ref: String,
    pub from_chain: Chain,
    pub to_chain: Chain,
    pub amount: f64,
    pub recipient: String,
    pub created_at: i64,
    pub estimated_arrival: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BridgeStatus {
    Pending,
    InProgress,
    Completed,
}

/// Status snapshot derived at a point in time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BridgeStatusReport {
    pub tx_ref: String,
    pub status: BridgeStatus,
    pub progress: u8,
    pub from_chain: Chain,
    pub to_chain: Chain,
    pub amount: f64,
    pub recipient: String,
    pub created_at: i64,
    pub estimated_arrival: i64,
    pub time_remaining_secs: i64,
}

impl BridgeTransaction {
    /// Derive status and progress at `now`
    pub fn status_at(&self, now: i64) -> (BridgeStatus, u8) {
        if now >= self.estimated_arrival {
            return (BridgeStatus::Completed, 100);
        }

        let total = (self.estimated_arrival - self.created_at).max(1);
        let elapsed = (now - self.created_at).max(0);
        let progress = (elapsed * 100 / total).min(99) as u8;

        if progress == 0 {
            (BridgeStatus::Pending, 0)
        } else {
            (BridgeStatus::InProgress, progress)
        }
    }

    pub fn report_at(&self, now: i64) -> BridgeStatusReport {
        let (status, progress) = self.status_at(now);
        BridgeStatusReport {
            tx_ref: self.tx_ref.clone(),
            status,
            progress,
            from_chain: self.from_chain,
            to_chain: self.to_chain,
            amount: self.amount,
            recipient: self.recipient.clone(),
            created_at: self.created_at,
            estimated_arrival: self.estimated_arrival,
            time_remaining_secs: (self.estimated_arrival - now).max(0),
        }
    }
}

#[derive(Default)]
struct History {
    entries: Vec<BridgeTransaction>,
    /// tx_ref -> index into entries
    index: HashMap<String, usize>,
}

/// Tracks dispatched transfers
pub struct BridgeTracker {
    routes: Arc<RouteSelector>,
    clock: Arc<dyn Clock>,
    history: RwLock<History>,
    sequence: AtomicU64,
}

impl BridgeTracker {
    pub fn new(routes: Arc<RouteSelector>, clock: Arc<dyn Clock>) -> Self {
        Self {
            routes,
            clock,
            history: RwLock::new(History::default()),
            sequence: AtomicU64::new(0),
        }
    }

    /// Register a new transfer and append it to the history
    pub async fn dispatch(
        &self,
        from_chain: Chain,
        to_chain: Chain,
        amount: f64,
        recipient: &str,
    ) -> SettlementResult<BridgeTransaction> {
        let route = self.routes.find_route(from_chain, to_chain, amount)?;
        if recipient.trim().is_empty() {
            return Err(SettlementError::InvalidRequest(
                "bridge recipient address is empty".to_string(),
            ));
        }

        let now = self.clock.now();
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let tx_ref = keccak_hex(&[
            from_chain.slug().as_bytes(),
            to_chain.slug().as_bytes(),
            &amount.to_be_bytes(),
            &now.to_be_bytes(),
            &seq.to_be_bytes(),
        ]);

        let transaction = BridgeTransaction {
            tx_ref: tx_ref.clone(),
            from_chain,
            to_chain,
            amount,
            recipient: recipient.to_string(),
            created_at: now,
            estimated_arrival: now + route.estimated_time_secs as i64,
        };

        {
            let mut history = self.history.write().await;
            let position = history.entries.len();
            history.entries.push(transaction.clone());
            history.index.insert(tx_ref.clone(), position);
        }

        crate::metrics::record_bridge_dispatched(from_chain, to_chain);
        info!(
            "Bridge transfer {} dispatched: {} USDC {} -> {} (eta {}s)",
            tx_ref, amount, from_chain, to_chain, route.estimated_time_secs
        );
        Ok(transaction)
    }

    /// Current status of a transfer
    pub async fn status_of(&self, tx_ref: &str) -> SettlementResult<BridgeStatusReport> {
        let transaction = {
            let history = self.history.read().await;
            history
                .index
                .get(tx_ref)
                .and_then(|i| history.entries.get(*i))
                .cloned()
        };

        transaction
            .map(|tx| tx.report_at(self.clock.now()))
            .ok_or_else(|| SettlementError::TransactionNotFound {
                tx_ref: tx_ref.to_string(),
            })
    }

    /// Most recent transfers, newest first
    pub async fn recent(&self, limit: usize) -> Vec<BridgeStatusReport> {
        let now = self.clock.now();
        self.history
            .read()
            .await
            .entries
            .iter()
            .rev()
            .take(limit)
            .map(|tx| tx.report_at(now))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.history.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.history.read().await.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ChainRegistry;
    use crate::clock::ManualClock;

    fn tracker(clock: Arc<ManualClock>) -> BridgeTracker {
        let routes = Arc::new(RouteSelector::new(
            Arc::new(ChainRegistry::new()),
            Chain::BaseSepolia,
        ));
        BridgeTracker::new(routes, clock)
    }

    #[tokio::test]
    async fn test_dispatch_then_complete() {
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let tracker = tracker(clock.clone());

        let tx = tracker
            .dispatch(Chain::ArbitrumSepolia, Chain::BaseSepolia, 100.0, "0xrecipient")
            .await
            .unwrap();
        assert_eq!(tx.estimated_arrival - tx.created_at, 600);

        let status = tracker.status_of(&tx.tx_ref).await.unwrap();
        assert_eq!(status.status, BridgeStatus::Pending);
        assert!(status.progress < 100);
        assert_eq!(status.time_remaining_secs, 600);

        clock.advance(300);
        let status = tracker.status_of(&tx.tx_ref).await.unwrap();
        assert_eq!(status.status, BridgeStatus::InProgress);
        assert_eq!(status.progress, 50);
        assert_eq!(status.time_remaining_secs, 300);

        clock.advance(301);
        let status = tracker.status_of(&tx.tx_ref).await.unwrap();
        assert_eq!(status.status, BridgeStatus::Completed);
        assert_eq!(status.progress, 100);
        assert_eq!(status.time_remaining_secs, 0);
    }

    #[tokio::test]
    async fn test_progress_never_decreases() {
        let clock = Arc::new(ManualClock::new(0));
        let tracker = tracker(clock.clone());
        let tx = tracker
            .dispatch(Chain::OptimismSepolia, Chain::PolygonAmoy, 10.0, "0xr")
            .await
            .unwrap();

        let mut last = 0;
        for _ in 0..100 {
            clock.advance(10);
            let progress = tracker.status_of(&tx.tx_ref).await.unwrap().progress;
            assert!(progress >= last);
            last = progress;
        }
        assert_eq!(last, 100);
    }

    #[tokio::test]
    async fn test_unknown_reference() {
        let tracker = tracker(Arc::new(ManualClock::new(0)));
        assert!(matches!(
            tracker.status_of("0xdeadbeef").await,
            Err(SettlementError::TransactionNotFound { tx_ref }) if tx_ref == "0xdeadbeef"
        ));
    }

    #[tokio::test]
    async fn test_identical_dispatches_get_distinct_references() {
        let tracker = tracker(Arc::new(ManualClock::new(42)));
        let a = tracker
            .dispatch(Chain::ArbitrumSepolia, Chain::BaseSepolia, 5.0, "0xr")
            .await
            .unwrap();
        let b = tracker
            .dispatch(Chain::ArbitrumSepolia, Chain::BaseSepolia, 5.0, "0xr")
            .await
            .unwrap();
        assert_ne!(a.tx_ref, b.tx_ref);
    }

    #[tokio::test]
    async fn test_recent_is_newest_first() {
        let clock = Arc::new(ManualClock::new(0));
        let tracker = tracker(clock.clone());
        let mut refs = Vec::new();
        for amount in [1.0, 2.0, 3.0] {
            refs.push(
                tracker
                    .dispatch(Chain::ArbitrumSepolia, Chain::OptimismSepolia, amount, "0xr")
                    .await
                    .unwrap()
                    .tx_ref,
            );
            clock.advance(1);
        }

        let recent = tracker.recent(2).await;
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].tx_ref, refs[2]);
        assert_eq!(recent[1].tx_ref, refs[1]);
        assert_eq!(tracker.recent(10).await.len(), 3);
    }

    #[tokio::test]
    async fn test_concurrent_dispatches_are_all_recorded() {
        let tracker = Arc::new(tracker(Arc::new(ManualClock::new(0))));
        let handles: Vec<_> = (0..32)
            .map(|i| {
                let tracker = tracker.clone();
                tokio::spawn(async move {
                    tracker
                        .dispatch(Chain::BaseSepolia, Chain::PolygonAmoy, 1.0 + i as f64, "0xr")
                        .await
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(tracker.len().await, 32);
    }

    #[tokio::test]
    async fn test_same_chain_dispatch_rejected() {
        let tracker = tracker(Arc::new(ManualClock::new(0)));
        assert!(matches!(
            tracker
                .dispatch(Chain::BaseSepolia, Chain::BaseSepolia, 1.0, "0xr")
                .await,
            Err(SettlementError::SameChain { .. })
        ));
        assert!(tracker.is_empty().await);
    }
}
