//! Bridge module - cross-chain route costing and transfer tracking
//!
//! Handles:
//! - Route cost/time/reliability model for the attestation bridge
//! - Ranking candidate destinations by cost
//! - Append-only history of dispatched transfers with derived progress

pub mod route;
pub mod tracker;

pub use route::{BridgeRoute, CostBreakdown, RouteSelector};
pub use tracker::{BridgeStatus, BridgeStatusReport, BridgeTracker, BridgeTransaction};
