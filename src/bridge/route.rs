//! Deterministic route cost model for the attestation bridge

use crate::chain::{Chain, ChainRegistry};
use crate::error::{SettlementError, SettlementResult};
use crate::fees;

use serde::Serialize;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::debug;

/// Typical on-chain gas for burn + mint, in USD
pub const GAS_COST_USD: f64 = 0.50;
pub const BRIDGE_FEE_RATE: f64 = 0.001;
/// Historical success rate of the attestation bridge
pub const RELIABILITY: f64 = 0.95;
pub const FAST_ROUTE_SECS: u64 = 600;
pub const STANDARD_ROUTE_SECS: u64 = 900;

/// Costed, timed path between two chains
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BridgeRoute {
    pub from_chain: Chain,
    pub to_chain: Chain,
    pub estimated_time_secs: u64,
    pub gas_cost_usd: f64,
    pub bridge_fee_usd: f64,
    pub total_cost_usd: f64,
    pub reliability: f64,
}

/// Itemized quote for bridging plus optional escrow fee
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostBreakdown {
    pub bridge_gas_cost: f64,
    pub bridge_fee: f64,
    pub bridge_total: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escrow_fee: Option<f64>,
    pub total_cost: f64,
    pub percentage_of_amount: f64,
}

/// Computes and ranks bridge routes
pub struct RouteSelector {
    registry: Arc<ChainRegistry>,
    /// Chain whose attestations settle faster
    fast_chain: Chain,
}

impl RouteSelector {
    pub fn new(registry: Arc<ChainRegistry>, fast_chain: Chain) -> Self {
        Self {
            registry,
            fast_chain,
        }
    }

    pub fn registry(&self) -> &Arc<ChainRegistry> {
        &self.registry
    }

    /// Cost a transfer between two distinct registered chains
    pub fn find_route(&self, from_chain: Chain, to_chain: Chain, amount: f64) -> SettlementResult<BridgeRoute> {
        if from_chain == to_chain {
            return Err(SettlementError::SameChain { chain: from_chain });
        }
        self.registry.config_for(from_chain)?;
        self.registry.config_for(to_chain)?;
        fees::validate_amount(amount)?;

        let bridge_fee_usd = amount * BRIDGE_FEE_RATE;
        let estimated_time_secs = if from_chain == self.fast_chain || to_chain == self.fast_chain {
            FAST_ROUTE_SECS
        } else {
            STANDARD_ROUTE_SECS
        };

        Ok(BridgeRoute {
            from_chain,
            to_chain,
            estimated_time_secs,
            gas_cost_usd: GAS_COST_USD,
            bridge_fee_usd,
            total_cost_usd: GAS_COST_USD + bridge_fee_usd,
            reliability: RELIABILITY,
        })
    }

    /// Routes from `from_chain` to each candidate, cheapest first
    ///
    /// Ties break on shorter duration, then on registration order. The source
    /// chain and duplicate candidates are dropped.
    pub fn compare_routes(
        &self,
        from_chain: Chain,
        amount: f64,
        candidates: &[Chain],
    ) -> SettlementResult<Vec<BridgeRoute>> {
        let mut seen = Vec::with_capacity(candidates.len());
        for chain in candidates {
            if *chain != from_chain && !seen.contains(chain) {
                seen.push(*chain);
            }
        }

        let mut ranked = seen
            .into_iter()
            .map(|to_chain| {
                let route = self.find_route(from_chain, to_chain, amount)?;
                let rank = self.registry.position(to_chain).unwrap_or(usize::MAX);
                Ok((rank, route))
            })
            .collect::<SettlementResult<Vec<_>>>()?;

        ranked.sort_by(|(rank_a, a), (rank_b, b)| {
            a.total_cost_usd
                .partial_cmp(&b.total_cost_usd)
                .unwrap_or(Ordering::Equal)
                .then(a.estimated_time_secs.cmp(&b.estimated_time_secs))
                .then(rank_a.cmp(rank_b))
        });

        debug!(
            "Compared {} routes from {} for {} USDC",
            ranked.len(),
            from_chain,
            amount
        );
        Ok(ranked.into_iter().map(|(_, route)| route).collect())
    }

    /// Itemized cost of bridging plus the simplified escrow fee quote
    pub fn estimate_total_cost(
        &self,
        from_chain: Chain,
        to_chain: Chain,
        amount: f64,
        include_escrow_fee: bool,
        worker_reputation: u32,
    ) -> SettlementResult<CostBreakdown> {
        fees::validate_amount(amount)?;
        let route = self.find_route(from_chain, to_chain, amount)?;

        let escrow_fee = if include_escrow_fee {
            Some(fees::quote_escrow_fee(amount, worker_reputation)?)
        } else {
            None
        };
        let total_cost = route.total_cost_usd + escrow_fee.unwrap_or(0.0);

        Ok(CostBreakdown {
            bridge_gas_cost: route.gas_cost_usd,
            bridge_fee: route.bridge_fee_usd,
            bridge_total: route.total_cost_usd,
            escrow_fee,
            total_cost,
            percentage_of_amount: total_cost / amount * 100.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn selector() -> RouteSelector {
        RouteSelector::new(Arc::new(ChainRegistry::new()), Chain::BaseSepolia)
    }

    #[test]
    fn test_route_cost_model() {
        let route = selector()
            .find_route(Chain::ArbitrumSepolia, Chain::BaseSepolia, 100.0)
            .unwrap();
        assert_eq!(route.estimated_time_secs, FAST_ROUTE_SECS);
        assert!((route.bridge_fee_usd - 0.1).abs() < EPS);
        assert!((route.total_cost_usd - 0.6).abs() < EPS);
        assert_eq!(route.reliability, 0.95);

        let slow = selector()
            .find_route(Chain::ArbitrumSepolia, Chain::PolygonAmoy, 100.0)
            .unwrap();
        assert_eq!(slow.estimated_time_secs, STANDARD_ROUTE_SECS);
    }

    #[test]
    fn test_same_chain_rejected_for_every_chain() {
        for chain in Chain::ALL {
            assert!(matches!(
                selector().find_route(chain, chain, 10.0),
                Err(SettlementError::SameChain { chain: c }) if c == chain
            ));
        }
    }

    #[test]
    fn test_unregistered_and_invalid_inputs() {
        let registry = ChainRegistry::with_chains(&[Chain::ArbitrumSepolia, Chain::BaseSepolia], &Default::default());
        let selector = RouteSelector::new(Arc::new(registry), Chain::BaseSepolia);

        assert!(matches!(
            selector.find_route(Chain::ArbitrumSepolia, Chain::PolygonAmoy, 10.0),
            Err(SettlementError::UnknownChain { .. })
        ));
        assert!(matches!(
            selector.find_route(Chain::ArbitrumSepolia, Chain::BaseSepolia, 0.0),
            Err(SettlementError::InvalidAmount { .. })
        ));
    }

    #[test]
    fn test_compare_routes_sorted_and_excludes_source() {
        let routes = selector()
            .compare_routes(
                Chain::ArbitrumSepolia,
                100.0,
                &[
                    Chain::PolygonAmoy,
                    Chain::ArbitrumSepolia,
                    Chain::OptimismSepolia,
                    Chain::BaseSepolia,
                    Chain::PolygonAmoy,
                ],
            )
            .unwrap();

        let destinations: Vec<_> = routes.iter().map(|r| r.to_chain).collect();
        // Equal cost everywhere: the fast route first, then registration order
        assert_eq!(
            destinations,
            vec![Chain::BaseSepolia, Chain::OptimismSepolia, Chain::PolygonAmoy]
        );

        for pair in routes.windows(2) {
            assert!(pair[0].total_cost_usd <= pair[1].total_cost_usd);
            if pair[0].total_cost_usd == pair[1].total_cost_usd {
                assert!(pair[0].estimated_time_secs <= pair[1].estimated_time_secs);
            }
        }
    }

    #[test]
    fn test_compare_routes_is_repeatable() {
        let selector = selector();
        let candidates = Chain::ALL;
        let first = selector.compare_routes(Chain::PolygonAmoy, 250.0, &candidates).unwrap();
        let second = selector.compare_routes(Chain::PolygonAmoy, 250.0, &candidates).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn test_estimate_total_cost_with_escrow_fee() {
        let breakdown = selector()
            .estimate_total_cost(Chain::ArbitrumSepolia, Chain::BaseSepolia, 1_000.0, true, 850)
            .unwrap();

        assert!((breakdown.bridge_total - 1.5).abs() < EPS);
        assert!((breakdown.escrow_fee.unwrap() - 9.0).abs() < EPS);
        assert!((breakdown.total_cost - 10.5).abs() < EPS);
        assert!((breakdown.percentage_of_amount - 1.05).abs() < EPS);
    }

    #[test]
    fn test_estimate_total_cost_without_escrow_fee() {
        let breakdown = selector()
            .estimate_total_cost(Chain::OptimismSepolia, Chain::PolygonAmoy, 200.0, false, 0)
            .unwrap();
        assert_eq!(breakdown.escrow_fee, None);
        assert!((breakdown.total_cost - 0.7).abs() < EPS);

        assert!(matches!(
            selector().estimate_total_cost(Chain::OptimismSepolia, Chain::PolygonAmoy, -1.0, true, 0),
            Err(SettlementError::InvalidAmount { .. })
        ));
    }
}
