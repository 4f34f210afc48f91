//! Converges a fleet on a decision's target size.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use fleetscale_core::config::FleetConfig;
use fleetscale_core::{
    InstanceSpec, OperationFailure, OperationKind, ReconciliationResult, ScalingDecision,
    instance_name,
};
use fleetscale_provider::ComputeProvider;

/// Issues create/delete calls for one fleet.
///
/// Calls go out one at a time. A failed call is recorded and the cycle
/// moves on; it is never retried here (wrap the provider in a
/// `RetryingProvider` for that).
pub struct Reconciler {
    fleet: FleetConfig,
    provider: Arc<dyn ComputeProvider>,
}

impl Reconciler {
    pub fn new(fleet: FleetConfig, provider: Arc<dyn ComputeProvider>) -> Self {
        Self { fleet, provider }
    }

    pub fn fleet(&self) -> &FleetConfig {
        &self.fleet
    }

    pub fn provider(&self) -> &Arc<dyn ComputeProvider> {
        &self.provider
    }

    /// Run one cycle.
    ///
    /// Scale-up creates `{prefix}-{i}` for `i` in `current..target`.
    /// Scale-down lists the fleet, applies the eviction order, and deletes
    /// listing positions `target..current`. Once `cancel` reads `true` no
    /// further calls are issued and the partial result is returned.
    pub async fn reconcile(
        &self,
        decision: &ScalingDecision,
        cancel: &watch::Receiver<bool>,
    ) -> ReconciliationResult {
        let current = decision.current_servers;
        let target = decision.target_servers;
        let mut result = ReconciliationResult::empty(&self.fleet.name, current, target);

        if decision.is_noop() {
            debug!(fleet = %self.fleet.name, current, "fleet already at target");
            return result;
        }

        if target > current {
            self.scale_up(current, target, cancel, &mut result).await;
        } else {
            self.scale_down(current, target, cancel, &mut result).await;
        }

        info!(
            fleet = %self.fleet.name,
            from = current,
            target,
            realized = result.realized_count,
            created = result.created.len(),
            deleted = result.deleted.len(),
            failures = result.failures.len(),
            calls = result.provider_calls,
            cancelled = result.cancelled,
            "reconciliation cycle finished"
        );
        result
    }

    async fn scale_up(
        &self,
        current: u32,
        target: u32,
        cancel: &watch::Receiver<bool>,
        result: &mut ReconciliationResult,
    ) {
        for index in current..target {
            if cancelled(cancel, result) {
                return;
            }
            let spec = InstanceSpec {
                name: instance_name(&self.fleet.name_prefix, index),
                flavor: self.fleet.flavor.clone(),
                image: self.fleet.image.clone(),
            };

            result.provider_calls += 1;
            match self.provider.create(&spec).await {
                Ok(instance) => {
                    debug!(fleet = %self.fleet.name, name = %instance.name, id = %instance.id, "created instance");
                    result.realized_count = result.realized_count.saturating_add(1);
                    result.created.push(instance);
                }
                Err(e) => {
                    warn!(fleet = %self.fleet.name, name = %spec.name, error = %e, "create failed");
                    result.failures.push(OperationFailure {
                        operation: OperationKind::Create,
                        target: spec.name,
                        error: e.to_string(),
                    });
                }
            }
        }
    }

    async fn scale_down(
        &self,
        current: u32,
        target: u32,
        cancel: &watch::Receiver<bool>,
        result: &mut ReconciliationResult,
    ) {
        if cancelled(cancel, result) {
            return;
        }

        result.provider_calls += 1;
        let mut listing = match self.provider.list().await {
            Ok(listing) => listing,
            Err(e) => {
                warn!(fleet = %self.fleet.name, error = %e, "list failed, skipping scale-down");
                result.failures.push(OperationFailure {
                    operation: OperationKind::List,
                    target: self.fleet.name.clone(),
                    error: e.to_string(),
                });
                return;
            }
        };
        self.fleet
            .eviction
            .arrange(&self.fleet.name_prefix, &mut listing);

        for position in target..current {
            if cancelled(cancel, result) {
                return;
            }
            let Some(instance) = listing.get(position as usize) else {
                warn!(fleet = %self.fleet.name, position, listed = listing.len(), "listing shorter than current size");
                result.failures.push(OperationFailure {
                    operation: OperationKind::Delete,
                    target: format!("#{position}"),
                    error: format!("no instance at listing index {position}"),
                });
                continue;
            };

            result.provider_calls += 1;
            match self.provider.delete(&instance.id).await {
                Ok(()) => {
                    debug!(fleet = %self.fleet.name, id = %instance.id, name = %instance.name, "deleted instance");
                    result.realized_count = result.realized_count.saturating_sub(1);
                    result.deleted.push(instance.id.clone());
                }
                Err(e) => {
                    warn!(fleet = %self.fleet.name, id = %instance.id, error = %e, "delete failed");
                    result.failures.push(OperationFailure {
                        operation: OperationKind::Delete,
                        target: instance.id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }
    }
}

fn cancelled(cancel: &watch::Receiver<bool>, result: &mut ReconciliationResult) -> bool {
    if *cancel.borrow() {
        result.cancelled = true;
    }
    result.cancelled
}
