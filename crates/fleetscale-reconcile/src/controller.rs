//! Per-fleet controller: decide, reconcile, report, record.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, watch};
use tracing::{error, info};

use fleetscale_core::config::FleetConfig;
use fleetscale_core::{Instance, MetricsSnapshot, ReconciliationResult, ScaleAction, ScalingDecision};
use fleetscale_policy::DecisionEngine;
use fleetscale_provider::ComputeProvider;
use fleetscale_state::{DecisionRecord, StateStore};
use fleetscale_telemetry::MetricsReporter;

use crate::error::{ControllerError, ControllerResult};
use crate::reconciler::Reconciler;

/// What one triggered cycle produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleOutcome {
    pub decision: ScalingDecision,
    pub result: ReconciliationResult,
}

/// Owns everything needed to scale one fleet.
///
/// Reconciliation cycles for the fleet are serialised by an async mutex;
/// previews and reads never take it.
pub struct FleetController {
    default_policy: String,
    engine: DecisionEngine,
    reconciler: Reconciler,
    reporter: MetricsReporter,
    store: StateStore,
    cycle: Mutex<()>,
    cancel: watch::Receiver<bool>,
}

impl FleetController {
    pub fn new(
        fleet: FleetConfig,
        engine: DecisionEngine,
        provider: Arc<dyn ComputeProvider>,
        reporter: MetricsReporter,
        store: StateStore,
    ) -> Self {
        let default_policy = fleet
            .default_policy
            .clone()
            .unwrap_or_else(|| "cost-conscious".to_string());
        Self {
            default_policy,
            engine,
            reconciler: Reconciler::new(fleet, provider),
            reporter,
            store,
            cycle: Mutex::new(()),
            cancel: watch::channel(false).1,
        }
    }

    /// Policy used by the ticker. A fleet's own `default_policy` wins over
    /// `fallback`.
    pub fn with_default_policy(mut self, fallback: &str) -> Self {
        if self.reconciler.fleet().default_policy.is_none() {
            self.default_policy = fallback.to_string();
        }
        self
    }

    /// Stop issuing provider calls once `cancel` flips to `true`.
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn name(&self) -> &str {
        &self.reconciler.fleet().name
    }

    pub fn config(&self) -> &FleetConfig {
        self.reconciler.fleet()
    }

    pub fn default_policy(&self) -> &str {
        &self.default_policy
    }

    /// Run a full cycle with `policy` against `metrics`.
    ///
    /// Invalid metrics or an unknown policy fail before anything touches
    /// the provider. Provider failures don't fail the call; they're in
    /// the returned result.
    pub async fn trigger(&self, policy: &str, metrics: &MetricsSnapshot) -> ControllerResult<CycleOutcome> {
        let decision = self.engine.decide(policy, metrics)?;

        let _cycle = self.cycle.lock().await;
        let result = self.reconciler.reconcile(&decision, &self.cancel).await;

        self.reporter.report(self.name(), metrics, result.realized_count);
        if decision.action == ScaleAction::Scale {
            self.reporter.record_scaling_event(self.name());
        }

        if let Err(e) = self.store.record_decision(self.name(), &decision, Some(&result)) {
            error!(
                fleet = %self.name(),
                error = %e,
                result = ?result,
                "failed to persist decision record"
            );
            return Err(e.into());
        }

        info!(
            fleet = %self.name(),
            policy = %decision.policy,
            current = decision.current_servers,
            target = decision.target_servers,
            realized = result.realized_count,
            complete = result.is_complete(),
            "scaling cycle complete"
        );

        Ok(CycleOutcome { decision, result })
    }

    /// [`FleetController::trigger`] on its own task.
    ///
    /// Dropping the returned future does not abandon the cycle: it still
    /// reports, records, and logs whatever it did. Only the cancellation
    /// watch stops a cycle early.
    pub async fn trigger_detached(
        self: Arc<Self>,
        policy: String,
        metrics: MetricsSnapshot,
    ) -> ControllerResult<CycleOutcome> {
        tokio::spawn(async move { self.trigger(&policy, &metrics).await })
            .await
            .map_err(|e| ControllerError::Task(e.to_string()))?
    }

    /// Compute a decision without touching the provider or telemetry.
    /// Recorded in history as a dry run.
    pub async fn preview(&self, policy: &str, metrics: &MetricsSnapshot) -> ControllerResult<ScalingDecision> {
        let decision = self.engine.decide(policy, metrics)?;
        self.store.record_decision(self.name(), &decision, None)?;
        Ok(decision)
    }

    /// Store `metrics` as the snapshot the ticker acts on.
    pub fn push_metrics(&self, metrics: &MetricsSnapshot) -> ControllerResult<()> {
        fleetscale_policy::policy::validate(metrics)?;
        self.store.put_latest_metrics(self.name(), metrics)?;
        Ok(())
    }

    pub fn latest_metrics(&self) -> ControllerResult<Option<MetricsSnapshot>> {
        Ok(self.store.get_latest_metrics(self.name())?)
    }

    /// Record the realized fleet size on the stored snapshot, unless a newer
    /// snapshot was pushed since `seen` was read.
    pub fn advance_metrics(&self, seen: &MetricsSnapshot, realized: u32) -> ControllerResult<bool> {
        Ok(self.store.advance_metrics(self.name(), seen, realized)?)
    }

    /// Current provider listing.
    pub async fn fleet_listing(&self) -> ControllerResult<Vec<Instance>> {
        Ok(self.reconciler.provider().list().await?)
    }

    /// Newest-first decision history.
    pub fn history(&self, limit: usize) -> ControllerResult<Vec<DecisionRecord>> {
        Ok(self.store.list_decisions(self.name(), limit)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetscale_policy::{BudgetCap, PolicyError, PolicyRegistry};
    use fleetscale_provider::InMemoryProvider;
    use fleetscale_telemetry::MetricsRegistry;
    use fleetscale_telemetry::reporter::{SCALING_EVENTS, SERVERS_ACTIVE};

    struct Harness {
        provider: Arc<InMemoryProvider>,
        registry: MetricsRegistry,
        controller: FleetController,
    }

    fn harness(seed: u32) -> Harness {
        let provider = Arc::new(InMemoryProvider::seeded("game-server", seed));
        let registry = MetricsRegistry::new();
        let engine = DecisionEngine::new(PolicyRegistry::with_budget(
            BudgetCap::with_budget(100.0).unwrap(),
        ));
        let controller = FleetController::new(
            FleetConfig::named("eu"),
            engine,
            provider.clone(),
            MetricsReporter::new(Arc::new(registry.clone())),
            StateStore::open_in_memory().unwrap(),
        );
        Harness {
            provider,
            registry,
            controller,
        }
    }

    fn metrics(current: u32) -> MetricsSnapshot {
        MetricsSnapshot {
            current_players: 100,
            server_capacity: 10,
            current_servers: current,
            queue_length: 5,
            daily_cost: 20.0,
            daily_budget: None,
        }
    }

    #[tokio::test]
    async fn trigger_runs_full_cycle() {
        let h = harness(1);
        let outcome = h.controller.trigger("aggressive", &metrics(1)).await.unwrap();

        assert_eq!(outcome.decision.target_servers, 12);
        assert_eq!(outcome.result.realized_count, 12);
        assert_eq!(h.provider.instances().len(), 12);

        let labels = [("fleet", "eu")];
        assert_eq!(h.registry.gauge(SERVERS_ACTIVE, &labels), Some(12.0));
        assert_eq!(h.registry.counter(SCALING_EVENTS, &labels), 1);

        let history = h.controller.history(10).unwrap();
        assert_eq!(history.len(), 1);
        assert!(!history[0].dry_run);
        assert_eq!(history[0].result.as_ref(), Some(&outcome.result));
    }

    #[tokio::test]
    async fn noop_cycle_reports_without_counting_event() {
        let h = harness(10);
        let outcome = h.controller.trigger("cost-conscious", &metrics(10)).await.unwrap();

        assert!(outcome.decision.is_noop());
        assert_eq!(h.provider.calls().total(), 0);
        let labels = [("fleet", "eu")];
        assert_eq!(h.registry.gauge(SERVERS_ACTIVE, &labels), Some(10.0));
        assert_eq!(h.registry.counter(SCALING_EVENTS, &labels), 0);
    }

    #[tokio::test]
    async fn invalid_metrics_fail_before_side_effects() {
        let h = harness(1);
        let mut m = metrics(1);
        m.server_capacity = 0;

        let err = h.controller.trigger("aggressive", &m).await.unwrap_err();
        assert!(matches!(err, ControllerError::Policy(PolicyError::InvalidMetrics(_))));
        assert_eq!(h.provider.calls().total(), 0);
        assert!(h.registry.samples().is_empty());
        assert!(h.controller.history(10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_policy_is_rejected() {
        let h = harness(1);
        let err = h.controller.trigger("lazy", &metrics(1)).await.unwrap_err();
        assert!(matches!(err, ControllerError::Policy(PolicyError::UnknownPolicy(_))));
        assert_eq!(h.provider.calls().total(), 0);
    }

    #[tokio::test]
    async fn preview_is_side_effect_free_but_recorded() {
        let h = harness(1);
        let decision = h.controller.preview("aggressive", &metrics(1)).await.unwrap();

        assert_eq!(decision.target_servers, 12);
        assert_eq!(h.provider.calls().total(), 0);
        assert!(h.registry.samples().is_empty());
        let history = h.controller.history(10).unwrap();
        assert!(history[0].dry_run);
        assert!(history[0].result.is_none());
    }

    #[tokio::test]
    async fn provider_failures_are_collected_not_raised() {
        let h = harness(1);
        h.provider.fail_create("game-server-3");

        let outcome = h.controller.trigger("cost-conscious", &metrics(1)).await.unwrap();
        assert_eq!(outcome.result.failures.len(), 1);
        assert_eq!(outcome.result.realized_count, 9);
    }

    #[tokio::test]
    async fn concurrent_triggers_are_serialised() {
        let provider = Arc::new(
            InMemoryProvider::new().with_latency(std::time::Duration::from_millis(5)),
        );
        let engine = DecisionEngine::new(PolicyRegistry::with_defaults());
        let controller = Arc::new(FleetController::new(
            FleetConfig::named("eu"),
            engine,
            provider.clone(),
            MetricsReporter::new(Arc::new(MetricsRegistry::new())),
            StateStore::open_in_memory().unwrap(),
        ));

        let a = {
            let c = controller.clone();
            tokio::spawn(async move { c.trigger("cost-conscious", &metrics(0)).await })
        };
        let b = {
            let c = controller.clone();
            tokio::spawn(async move { c.trigger("cost-conscious", &metrics(0)).await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        // Both cycles asked for slots 0..10; idempotent creates leave ten.
        assert_eq!(provider.instances().len(), 10);
        assert_eq!(controller.history(10).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn detached_cycle_survives_dropped_caller() {
        let provider = Arc::new(
            InMemoryProvider::new().with_latency(std::time::Duration::from_millis(20)),
        );
        let registry = MetricsRegistry::new();
        let controller = Arc::new(FleetController::new(
            FleetConfig::named("eu"),
            DecisionEngine::new(PolicyRegistry::with_defaults()),
            provider.clone(),
            MetricsReporter::new(Arc::new(registry.clone())),
            StateStore::open_in_memory().unwrap(),
        ));

        let caller = tokio::spawn(
            controller
                .clone()
                .trigger_detached("aggressive".to_string(), metrics(0)),
        );
        tokio::time::sleep(std::time::Duration::from_millis(90)).await;
        caller.abort();
        assert!(caller.await.unwrap_err().is_cancelled());

        // Twelve creates at 20ms each; wait for the cycle to finish.
        let history = tokio::time::timeout(std::time::Duration::from_secs(5), async {
            loop {
                let history = controller.history(10).unwrap();
                if !history.is_empty() {
                    return history;
                }
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        let result = history[0].result.as_ref().unwrap();
        assert_eq!(result.realized_count, 12);
        assert_eq!(provider.instances().len(), 12);
        assert_eq!(
            registry.gauge(SERVERS_ACTIVE, &[("fleet", "eu")]),
            Some(12.0)
        );
    }

    #[tokio::test]
    async fn push_metrics_validates_and_stores() {
        let h = harness(0);
        h.controller.push_metrics(&metrics(3)).unwrap();
        assert_eq!(h.controller.latest_metrics().unwrap(), Some(metrics(3)));

        let mut bad = metrics(3);
        bad.server_capacity = 0;
        assert!(h.controller.push_metrics(&bad).is_err());
        assert_eq!(h.controller.latest_metrics().unwrap(), Some(metrics(3)));
    }

    #[tokio::test]
    async fn default_policy_resolution() {
        let h = harness(0);
        assert_eq!(h.controller.default_policy(), "cost-conscious");
        let c = h.controller.with_default_policy("aggressive");
        assert_eq!(c.default_policy(), "aggressive");

        let mut fleet = FleetConfig::named("us");
        fleet.default_policy = Some("cost-capped".to_string());
        let c = FleetController::new(
            fleet,
            DecisionEngine::new(PolicyRegistry::with_defaults()),
            Arc::new(InMemoryProvider::new()),
            MetricsReporter::new(Arc::new(MetricsRegistry::new())),
            StateStore::open_in_memory().unwrap(),
        )
        .with_default_policy("aggressive");
        assert_eq!(c.default_policy(), "cost-capped");
    }

    #[tokio::test]
    async fn cancelled_controller_stops_issuing_calls() {
        let (tx, rx) = watch::channel(false);
        let h = harness(0);
        let controller = h.controller.with_cancellation(rx);
        tx.send(true).unwrap();

        let outcome = controller.trigger("aggressive", &metrics(0)).await.unwrap();
        assert!(outcome.result.cancelled);
        assert_eq!(h.provider.calls().total(), 0);
    }
}
