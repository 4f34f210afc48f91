//! One-shot CLI commands.

use std::path::Path;

use anyhow::Context;

use fleetscale_core::{FleetscaleConfig, MetricsSnapshot};
use fleetscale_core::config::PoliciesConfig;
use fleetscale_policy::{BudgetCap, DecisionEngine, PolicyRegistry};

/// Registry for an offline decision: the config's policies when given,
/// otherwise the defaults plus a cost cap at the snapshot's budget.
fn offline_registry(metrics: &MetricsSnapshot, config: Option<&Path>) -> anyhow::Result<PolicyRegistry> {
    if let Some(path) = config {
        let config = FleetscaleConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?;
        return Ok(PolicyRegistry::from_config(&config.policies)?);
    }
    match metrics.daily_budget {
        Some(budget) => Ok(PolicyRegistry::with_budget(BudgetCap::with_budget(budget)?)),
        None => Ok(PolicyRegistry::from_config(&PoliciesConfig::default())?),
    }
}

pub fn decide(policy: &str, metrics: &MetricsSnapshot, config: Option<&Path>) -> anyhow::Result<()> {
    let engine = DecisionEngine::new(offline_registry(metrics, config)?);
    let decision = engine.decide(policy, metrics)?;
    println!("{}", serde_json::to_string_pretty(&decision)?);
    Ok(())
}

pub fn init(fleet: &str) -> anyhow::Result<()> {
    print!("{}", FleetscaleConfig::scaffold(fleet).to_toml_string()?);
    Ok(())
}
