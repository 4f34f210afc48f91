//! Pushes per-fleet observations into a [`TelemetrySink`].

use std::sync::Arc;

use tracing::debug;

use fleetscale_core::MetricsSnapshot;

use crate::sink::TelemetrySink;

pub const SERVERS_ACTIVE: &str = "game_servers_active";
pub const PLAYERS_CURRENT: &str = "game_players_current";
pub const QUEUE_LENGTH: &str = "game_queue_length";
pub const COST_HOURLY: &str = "server_cost_hourly";
pub const SCALING_EVENTS: &str = "scaling_events_total";

/// Label carried by every fleet series.
pub const FLEET_LABEL: &str = "fleet";

/// HELP text for the series this crate emits.
pub fn describe(name: &str) -> Option<&'static str> {
    match name {
        SERVERS_ACTIVE => Some("Number of active game servers."),
        PLAYERS_CURRENT => Some("Current number of players."),
        QUEUE_LENGTH => Some("Players waiting in queue."),
        COST_HOURLY => Some("Current hourly server cost."),
        SCALING_EVENTS => Some("Total scaling events."),
        _ => None,
    }
}

#[derive(Clone)]
pub struct MetricsReporter {
    sink: Arc<dyn TelemetrySink>,
}

impl MetricsReporter {
    pub fn new(sink: Arc<dyn TelemetrySink>) -> Self {
        Self { sink }
    }

    /// Push the four fleet gauges. `realized_count` is the fleet size
    /// after the cycle, not the pre-cycle `current_servers`.
    pub fn report(&self, fleet: &str, metrics: &MetricsSnapshot, realized_count: u32) {
        let labels = [(FLEET_LABEL, fleet)];
        self.sink
            .set_gauge(SERVERS_ACTIVE, &labels, f64::from(realized_count));
        self.sink
            .set_gauge(PLAYERS_CURRENT, &labels, metrics.current_players as f64);
        self.sink
            .set_gauge(QUEUE_LENGTH, &labels, metrics.queue_length as f64);
        self.sink.set_gauge(COST_HOURLY, &labels, metrics.hourly_cost());

        debug!(
            %fleet,
            servers = realized_count,
            players = metrics.current_players,
            queue = metrics.queue_length,
            "reported fleet gauges"
        );
    }

    pub fn record_scaling_event(&self, fleet: &str) {
        self.sink.increment_counter(SCALING_EVENTS, &[(FLEET_LABEL, fleet)]);
    }
}
