//! Policy registry and the decision engine built on it.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use fleetscale_core::config::PoliciesConfig;
use fleetscale_core::{MetricsSnapshot, ScalingDecision};

use crate::error::{PolicyError, PolicyResult};
use crate::policy::{BudgetCap, PolicyKind, ScalingPolicy};

/// Name → policy lookup table.
///
/// Built once at startup and shared read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct PolicyRegistry {
    policies: BTreeMap<PolicyKind, ScalingPolicy>,
}

impl PolicyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `aggressive` and `cost-conscious`. `cost-capped` needs a budget
    /// and is only registered through [`PolicyRegistry::with_budget`] or
    /// [`PolicyRegistry::from_config`].
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(ScalingPolicy::Aggressive);
        registry.register(ScalingPolicy::CostConscious);
        registry
    }

    /// The defaults plus `cost-capped` at `cap`.
    pub fn with_budget(cap: BudgetCap) -> Self {
        let mut registry = Self::with_defaults();
        registry.register(ScalingPolicy::CostCapped(cap));
        registry
    }

    pub fn from_config(config: &PoliciesConfig) -> PolicyResult<Self> {
        let registry = match &config.cost_capped {
            Some(capped) => Self::with_budget(BudgetCap::new(
                capped.daily_budget,
                capped.cost_per_server_hour,
            )?),
            None => Self::with_defaults(),
        };
        // The configured default must resolve, or every tick would fail.
        registry.get(&config.default)?;
        Ok(registry)
    }

    /// Replaces any policy already registered under the same name.
    pub fn register(&mut self, policy: ScalingPolicy) {
        self.policies.insert(policy.kind(), policy);
    }

    pub fn get(&self, name: &str) -> PolicyResult<&ScalingPolicy> {
        PolicyKind::from_name(name)
            .and_then(|kind| self.policies.get(&kind))
            .ok_or_else(|| PolicyError::UnknownPolicy(name.to_string()))
    }

    /// Registered names in a stable order.
    pub fn names(&self) -> Vec<&'static str> {
        self.policies.keys().map(|k| k.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

/// Stateless front door: resolve a policy by name and apply it.
///
/// Cloning is cheap; every clone shares the same registry.
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    registry: Arc<PolicyRegistry>,
}

impl DecisionEngine {
    pub fn new(registry: PolicyRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub fn decide(&self, policy: &str, metrics: &MetricsSnapshot) -> PolicyResult<ScalingDecision> {
        let policy = self.resolve(policy)?;
        let decision = policy.decide(metrics)?;

        debug!(
            policy = %decision.policy,
            current = decision.current_servers,
            target = decision.target_servers,
            players = metrics.current_players,
            capacity = metrics.server_capacity,
            budget_limited = decision.budget_limited,
            "scaling decision"
        );

        Ok(decision)
    }

    pub fn resolve(&self, policy: &str) -> PolicyResult<&ScalingPolicy> {
        self.registry.get(policy)
    }

    pub fn policies(&self) -> Vec<&'static str> {
        self.registry.names()
    }

    pub fn registry(&self) -> &PolicyRegistry {
        &self.registry
    }
}
