//! The compute-provider port and the factory that wires a configured
//! backend for one fleet.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use fleetscale_core::config::{FleetConfig, ProviderConfig, ProviderKind};
use fleetscale_core::{Instance, InstanceSpec};
use fleetscale_state::StateStore;

use crate::error::{ProviderError, ProviderResult};
use crate::local::LocalProvider;
use crate::memory::InMemoryProvider;
use crate::openstack::OpenStackProvider;
use crate::retry::{RetryPolicy, RetryingProvider};

/// Boxed future returned by provider calls.
pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = ProviderResult<T>> + Send + 'a>>;

/// Creates, deletes, and lists the instances of one fleet.
///
/// Every call is independent and may fail on its own; callers collect
/// failures rather than aborting.
pub trait ComputeProvider: Send + Sync {
    /// Short backend name for logs.
    fn kind(&self) -> &'static str;

    /// Create an instance. Creating a name that already exists returns the
    /// existing instance.
    fn create<'a>(&'a self, spec: &'a InstanceSpec) -> ProviderFuture<'a, Instance>;

    fn delete<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ()>;

    /// Instances belonging to the fleet, in provider order.
    fn list(&self) -> ProviderFuture<'_, Vec<Instance>>;
}

/// Build the configured backend for `fleet`, wrapped in retry/timeout
/// handling when the config asks for it.
pub fn build_provider(
    config: &ProviderConfig,
    fleet: &FleetConfig,
    store: &StateStore,
) -> ProviderResult<Arc<dyn ComputeProvider>> {
    let base: Arc<dyn ComputeProvider> = match config.kind {
        ProviderKind::Memory => Arc::new(InMemoryProvider::new()),
        ProviderKind::Local => Arc::new(LocalProvider::new(store.clone(), &fleet.name)),
        ProviderKind::Openstack => {
            let endpoint = config.endpoint.as_deref().ok_or_else(|| {
                ProviderError::Misconfigured("openstack provider has no endpoint".to_string())
            })?;
            let token = config.auth_token.as_deref().ok_or_else(|| {
                ProviderError::Misconfigured("openstack provider has no auth token".to_string())
            })?;
            Arc::new(OpenStackProvider::new(endpoint, token, &fleet.name_prefix)?)
        }
    };

    let policy = RetryPolicy {
        max_attempts: config.max_attempts.max(1),
        timeout: config.timeout_secs.map(Duration::from_secs),
        base_backoff: Duration::from_millis(config.base_backoff_ms),
    };

    info!(
        fleet = %fleet.name,
        provider = base.kind(),
        max_attempts = policy.max_attempts,
        timeout = ?policy.timeout,
        "compute provider ready"
    );

    if policy.is_passthrough() {
        Ok(base)
    } else {
        Ok(Arc::new(RetryingProvider::new(base, policy)))
    }
}
