//! Simulated fleet persisted in the state store.
//!
//! Lets a single node run the full control loop without a cloud account;
//! instances survive restarts of the daemon.

use tracing::debug;

use fleetscale_core::{Instance, InstanceSpec, InstanceStatus};
use fleetscale_state::StateStore;

use crate::error::{ProviderError, ProviderResult};
use crate::provider::{ComputeProvider, ProviderFuture};

pub struct LocalProvider {
    store: StateStore,
    fleet: String,
}

impl LocalProvider {
    pub fn new(store: StateStore, fleet: &str) -> Self {
        Self {
            store,
            fleet: fleet.to_string(),
        }
    }

    fn create_sync(&self, spec: &InstanceSpec) -> ProviderResult<Instance> {
        if let Some(existing) = self.store.find_instance_by_name(&self.fleet, &spec.name)? {
            return Ok(existing);
        }
        let instance = Instance {
            id: format!("local-{}", uuid::Uuid::new_v4()),
            name: spec.name.clone(),
            flavor: Some(spec.flavor.clone()),
            image: Some(spec.image.clone()),
            status: InstanceStatus::Active,
        };
        self.store.insert_instance(&self.fleet, &instance)?;
        debug!(fleet = %self.fleet, id = %instance.id, name = %instance.name, "local: created instance");
        Ok(instance)
    }

    fn delete_sync(&self, id: &str) -> ProviderResult<()> {
        if !self.store.delete_instance(&self.fleet, id)? {
            return Err(ProviderError::NotFound(id.to_string()));
        }
        debug!(fleet = %self.fleet, %id, "local: deleted instance");
        Ok(())
    }
}

impl ComputeProvider for LocalProvider {
    fn kind(&self) -> &'static str {
        "local"
    }

    fn create<'a>(&'a self, spec: &'a InstanceSpec) -> ProviderFuture<'a, Instance> {
        Box::pin(async move { self.create_sync(spec) })
    }

    fn delete<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(async move { self.delete_sync(id) })
    }

    fn list(&self) -> ProviderFuture<'_, Vec<Instance>> {
        Box::pin(async move { Ok(self.store.list_instances(&self.fleet)?) })
    }
}
