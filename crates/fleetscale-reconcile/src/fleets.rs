//! The set of fleet controllers built from config.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::watch;

use fleetscale_core::FleetscaleConfig;
use fleetscale_policy::DecisionEngine;
use fleetscale_provider::build_provider;
use fleetscale_state::StateStore;
use fleetscale_telemetry::MetricsReporter;

use crate::controller::FleetController;
use crate::error::{ControllerError, ControllerResult};

/// Fleet name → controller. Immutable once built.
#[derive(Clone, Default)]
pub struct Fleets {
    controllers: BTreeMap<String, Arc<FleetController>>,
}

impl Fleets {
    pub fn new() -> Self {
        Self::default()
    }

    /// One controller per `[[fleet]]`, each with its own provider.
    pub fn from_config(
        config: &FleetscaleConfig,
        engine: &DecisionEngine,
        reporter: &MetricsReporter,
        store: &StateStore,
        cancel: &watch::Receiver<bool>,
    ) -> ControllerResult<Self> {
        let mut fleets = Self::new();
        for fleet in &config.fleets {
            let provider = build_provider(&config.provider, fleet, store)?;
            let controller = FleetController::new(
                fleet.clone(),
                engine.clone(),
                provider,
                reporter.clone(),
                store.clone(),
            )
            .with_default_policy(&config.policies.default)
            .with_cancellation(cancel.clone());
            fleets.insert(controller);
        }
        Ok(fleets)
    }

    pub fn insert(&mut self, controller: FleetController) {
        self.controllers
            .insert(controller.name().to_string(), Arc::new(controller));
    }

    pub fn get(&self, fleet: &str) -> ControllerResult<&Arc<FleetController>> {
        self.controllers
            .get(fleet)
            .ok_or_else(|| ControllerError::UnknownFleet(fleet.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        self.controllers.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<FleetController>> {
        self.controllers.values()
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }
}
