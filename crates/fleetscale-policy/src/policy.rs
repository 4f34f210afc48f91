//! Scaling policies — the closed set of fleet-sizing strategies.

use serde::{Deserialize, Serialize};
use tracing::debug;

use fleetscale_core::{MetricsSnapshot, ScalingDecision};

use crate::error::{PolicyError, PolicyResult};

/// Headroom multipliers applied to raw player demand.
const AGGRESSIVE_HEADROOM: f64 = 1.2;
const COST_CONSCIOUS_HEADROOM: f64 = 1.05;
const COST_CAPPED_HEADROOM: f64 = 1.1;

/// Hourly cost assumed when a budget cap doesn't set one.
pub const DEFAULT_COST_PER_SERVER_HOUR: f64 = 1.0;

/// Registry key of a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyKind {
    Aggressive,
    CostConscious,
    CostCapped,
}

impl PolicyKind {
    pub const ALL: [PolicyKind; 3] = [
        PolicyKind::Aggressive,
        PolicyKind::CostConscious,
        PolicyKind::CostCapped,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PolicyKind::Aggressive => "aggressive",
            PolicyKind::CostConscious => "cost-conscious",
            PolicyKind::CostCapped => "cost-capped",
        }
    }

    /// Resolve a registry name. Underscore spellings are accepted too.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            "aggressive" => Some(PolicyKind::Aggressive),
            "cost-conscious" | "cost_conscious" => Some(PolicyKind::CostConscious),
            "cost-capped" | "cost_capped" => Some(PolicyKind::CostCapped),
            _ => None,
        }
    }
}

/// Parameters of the cost-capped policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BudgetCap {
    pub daily_budget: f64,
    pub cost_per_server_hour: f64,
}

impl BudgetCap {
    pub fn new(daily_budget: f64, cost_per_server_hour: f64) -> PolicyResult<Self> {
        if !(daily_budget.is_finite() && daily_budget > 0.0) {
            return Err(PolicyError::InvalidBudget(format!(
                "daily_budget must be positive, got {daily_budget}"
            )));
        }
        if !(cost_per_server_hour.is_finite() && cost_per_server_hour > 0.0) {
            return Err(PolicyError::InvalidBudget(format!(
                "cost_per_server_hour must be positive, got {cost_per_server_hour}"
            )));
        }
        Ok(Self {
            daily_budget,
            cost_per_server_hour,
        })
    }

    /// A cap at the default hourly cost.
    pub fn with_budget(daily_budget: f64) -> PolicyResult<Self> {
        Self::new(daily_budget, DEFAULT_COST_PER_SERVER_HOUR)
    }
}

/// A configured scaling strategy. Stateless apart from its parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScalingPolicy {
    /// Always grows by at least one server.
    Aggressive,
    /// Never shrinks; grows modestly above demand.
    CostConscious,
    /// Demand-driven growth bounded by the remaining daily budget.
    CostCapped(BudgetCap),
}

impl ScalingPolicy {
    pub fn kind(&self) -> PolicyKind {
        match self {
            ScalingPolicy::Aggressive => PolicyKind::Aggressive,
            ScalingPolicy::CostConscious => PolicyKind::CostConscious,
            ScalingPolicy::CostCapped(_) => PolicyKind::CostCapped,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Compute the target fleet size for `metrics`.
    pub fn decide(&self, metrics: &MetricsSnapshot) -> PolicyResult<ScalingDecision> {
        validate(metrics)?;
        let current = metrics.current_servers;

        let decision = match self {
            ScalingPolicy::Aggressive => {
                let target = demand(metrics, AGGRESSIVE_HEADROOM).max(current.saturating_add(1));
                ScalingDecision::new(self.name(), current, target)
            }
            ScalingPolicy::CostConscious => {
                let target = demand(metrics, COST_CONSCIOUS_HEADROOM).max(current);
                ScalingDecision::new(self.name(), current, target)
            }
            ScalingPolicy::CostCapped(cap) => {
                let budget = metrics.daily_budget.unwrap_or(cap.daily_budget);
                let remaining = budget - metrics.daily_cost;
                let max_servers = truncate(remaining / cap.cost_per_server_hour);
                let wanted = demand(metrics, COST_CAPPED_HEADROOM).max(current);
                let target = wanted.min(max_servers);

                let mut decision = ScalingDecision::new(self.name(), current, target);
                decision.budget_remaining = Some(remaining);
                decision.budget_limited = target < wanted;
                if decision.budget_limited {
                    debug!(
                        wanted,
                        max_servers,
                        remaining,
                        "budget cap limits fleet size"
                    );
                }
                decision
            }
        };

        Ok(decision)
    }
}

/// Reject inputs the sizing formulas can't handle.
pub fn validate(metrics: &MetricsSnapshot) -> PolicyResult<()> {
    if metrics.server_capacity == 0 {
        return Err(PolicyError::InvalidMetrics(
            "server_capacity must be positive".to_string(),
        ));
    }
    if !(metrics.daily_cost.is_finite() && metrics.daily_cost >= 0.0) {
        return Err(PolicyError::InvalidMetrics(format!(
            "daily_cost must be a non-negative number, got {}",
            metrics.daily_cost
        )));
    }
    if let Some(budget) = metrics.daily_budget
        && !(budget.is_finite() && budget > 0.0)
    {
        return Err(PolicyError::InvalidMetrics(format!(
            "daily_budget must be positive, got {budget}"
        )));
    }
    Ok(())
}

/// Servers needed for current players with `headroom` applied.
fn demand(metrics: &MetricsSnapshot, headroom: f64) -> u32 {
    truncate(metrics.current_players as f64 / metrics.server_capacity as f64 * headroom)
}

/// Truncate toward zero. The cast saturates: negatives become 0, overflow
/// becomes `u32::MAX`.
fn truncate(value: f64) -> u32 {
    value as u32
}
