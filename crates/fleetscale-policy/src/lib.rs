//! fleetscale-policy — metrics-driven fleet sizing.
//!
//! A policy turns a `MetricsSnapshot` into a `ScalingDecision`. The set of
//! policies is closed and modelled as a tagged enum; the decision engine
//! resolves one by registry name and evaluates it.
//!
//! # Sizing
//!
//! ```text
//! demand(h)     = floor(players / capacity * h)
//!
//! aggressive     target = max(demand(1.2),  current + 1)
//! cost-conscious target = max(demand(1.05), current)
//! cost-capped    remaining   = daily_budget - daily_cost
//!                max_servers = floor(remaining / cost_per_server_hour)
//!                target      = min(max(demand(1.1), current), max_servers)
//! ```
//!
//! Zero capacity and non-physical spend are rejected with
//! `PolicyError::InvalidMetrics` before any arithmetic runs.

pub mod engine;
pub mod error;
pub mod policy;

pub use engine::{DecisionEngine, PolicyRegistry};
pub use error::{PolicyError, PolicyResult};
pub use policy::{BudgetCap, PolicyKind, ScalingPolicy};
