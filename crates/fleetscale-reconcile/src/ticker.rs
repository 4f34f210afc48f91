//! Periodic autoscaling from the latest pushed metrics.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::controller::FleetController;
use crate::error::ControllerResult;
use crate::fleets::Fleets;

pub struct Ticker {
    fleets: Fleets,
    interval: Duration,
}

impl Ticker {
    pub fn new(fleets: Fleets, interval: Duration) -> Self {
        Self { fleets, interval }
    }

    /// Tick until `shutdown` changes. A failing fleet is logged and the
    /// loop moves on.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            fleets = self.fleets.len(),
            "autoscale ticker started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    self.tick().await;
                }
                _ = shutdown.changed() => {
                    info!("autoscale ticker shutting down");
                    break;
                }
            }
        }
    }

    /// Scale every fleet that has a stored snapshot once.
    pub async fn tick(&self) {
        for controller in self.fleets.iter() {
            if let Err(e) = tick_fleet(controller).await {
                error!(fleet = %controller.name(), error = %e, "autoscale tick failed");
            }
        }
    }
}

async fn tick_fleet(controller: &FleetController) -> ControllerResult<()> {
    let Some(metrics) = controller.latest_metrics()? else {
        debug!(fleet = %controller.name(), "no metrics pushed yet, skipping");
        return Ok(());
    };

    let outcome = controller
        .trigger(controller.default_policy(), &metrics)
        .await?;

    // Later ticks start from what this cycle actually achieved, unless
    // fresher metrics were pushed while it ran.
    let realized = outcome.result.realized_count;
    if !controller.advance_metrics(&metrics, realized)? {
        debug!(fleet = %controller.name(), realized, "metrics pushed mid-cycle, keeping them");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use fleetscale_core::MetricsSnapshot;
    use fleetscale_core::config::FleetConfig;
    use fleetscale_policy::{DecisionEngine, PolicyRegistry};
    use fleetscale_provider::InMemoryProvider;
    use fleetscale_state::StateStore;
    use fleetscale_telemetry::{MetricsRegistry, MetricsReporter};

    fn metrics() -> MetricsSnapshot {
        MetricsSnapshot {
            current_players: 50,
            server_capacity: 10,
            current_servers: 0,
            queue_length: 0,
            daily_cost: 0.0,
            daily_budget: None,
        }
    }

    fn fleets(names: &[&str]) -> (Fleets, Vec<Arc<InMemoryProvider>>) {
        let store = StateStore::open_in_memory().unwrap();
        let engine = DecisionEngine::new(PolicyRegistry::with_defaults());
        let reporter = MetricsReporter::new(Arc::new(MetricsRegistry::new()));
        let mut fleets = Fleets::new();
        let mut providers = Vec::new();
        for name in names {
            let provider = Arc::new(InMemoryProvider::new());
            fleets.insert(FleetController::new(
                FleetConfig::named(name),
                engine.clone(),
                provider.clone(),
                reporter.clone(),
                store.clone(),
            ));
            providers.push(provider);
        }
        (fleets, providers)
    }

    #[tokio::test]
    async fn tick_skips_fleets_without_metrics() {
        let (fleets, providers) = fleets(&["eu"]);
        Ticker::new(fleets, Duration::from_secs(1)).tick().await;
        assert_eq!(providers[0].calls().total(), 0);
    }

    #[tokio::test]
    async fn tick_scales_and_advances_snapshot() {
        let (fleets, providers) = fleets(&["eu"]);
        fleets.get("eu").unwrap().push_metrics(&metrics()).unwrap();
        let ticker = Ticker::new(fleets.clone(), Duration::from_secs(1));

        ticker.tick().await;
        assert_eq!(providers[0].instances().len(), 5);
        let stored = fleets.get("eu").unwrap().latest_metrics().unwrap().unwrap();
        assert_eq!(stored.current_servers, 5);

        // Second tick: already at target.
        providers[0].reset_calls();
        ticker.tick().await;
        assert_eq!(providers[0].calls().total(), 0);
    }

    #[tokio::test]
    async fn metrics_pushed_mid_tick_are_kept() {
        let store = StateStore::open_in_memory().unwrap();
        let provider = Arc::new(InMemoryProvider::new().with_latency(Duration::from_millis(20)));
        let mut fleets = Fleets::new();
        fleets.insert(FleetController::new(
            FleetConfig::named("eu"),
            DecisionEngine::new(PolicyRegistry::with_defaults()),
            provider.clone(),
            MetricsReporter::new(Arc::new(MetricsRegistry::new())),
            store,
        ));
        let controller = fleets.get("eu").unwrap().clone();
        controller.push_metrics(&metrics()).unwrap();

        let ticker = Ticker::new(fleets, Duration::from_secs(1));
        let tick = tokio::spawn(async move { ticker.tick().await });

        // Five creates at 20ms each; push while they are in flight.
        tokio::time::sleep(Duration::from_millis(30)).await;
        let fresh = MetricsSnapshot {
            current_players: 500,
            ..metrics()
        };
        controller.push_metrics(&fresh).unwrap();
        tick.await.unwrap();

        assert_eq!(provider.instances().len(), 5);
        assert_eq!(controller.latest_metrics().unwrap(), Some(fresh));
    }

    #[tokio::test]
    async fn failing_fleet_does_not_stop_others() {
        let (mut fleets, providers) = fleets(&["us"]);
        let mut broken = FleetConfig::named("eu");
        broken.default_policy = Some("lazy".to_string());
        let eu_provider = Arc::new(InMemoryProvider::new());
        fleets.insert(FleetController::new(
            broken,
            DecisionEngine::new(PolicyRegistry::with_defaults()),
            eu_provider.clone(),
            MetricsReporter::new(Arc::new(MetricsRegistry::new())),
            StateStore::open_in_memory().unwrap(),
        ));
        fleets.get("eu").unwrap().push_metrics(&metrics()).unwrap();
        fleets.get("us").unwrap().push_metrics(&metrics()).unwrap();

        // "eu" sorts first and fails on its unknown policy.
        Ticker::new(fleets, Duration::from_secs(1)).tick().await;
        assert_eq!(eu_provider.calls().total(), 0);
        assert_eq!(providers[0].instances().len(), 5);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let (fleets, providers) = fleets(&["eu"]);
        fleets.get("eu").unwrap().push_metrics(&metrics()).unwrap();
        let ticker = Ticker::new(fleets, Duration::from_millis(10));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move { ticker.run(rx).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(providers[0].instances().len(), 5);
    }
}
