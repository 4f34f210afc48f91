//! Volatile in-process provider with failure injection.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::debug;

use fleetscale_core::{Instance, InstanceSpec, InstanceStatus};

use crate::error::{ProviderError, ProviderResult};
use crate::provider::{ComputeProvider, ProviderFuture};

/// Calls received, including the ones that failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub create: u32,
    pub delete: u32,
    pub list: u32,
}

impl CallCounts {
    pub fn total(&self) -> u32 {
        self.create + self.delete + self.list
    }
}

#[derive(Default)]
struct Inner {
    instances: Vec<Instance>,
    next_id: u64,
    fail_create: HashSet<String>,
    fail_delete: HashSet<String>,
    fail_list: bool,
    /// Fail this many upcoming calls of any kind with a transport error.
    transient_failures: u32,
    calls: CallCounts,
}

impl Inner {
    fn take_transient(&mut self) -> ProviderResult<()> {
        if self.transient_failures > 0 {
            self.transient_failures -= 1;
            return Err(ProviderError::Transport("injected transient failure".to_string()));
        }
        Ok(())
    }
}

/// A fleet held in memory. New instances are `Active` immediately and are
/// listed in creation order.
#[derive(Default)]
pub struct InMemoryProvider {
    inner: Mutex<Inner>,
    latency: Option<Duration>,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate `count` instances named `{prefix}-0..count`.
    pub fn seeded(prefix: &str, count: u32) -> Self {
        let provider = Self::new();
        {
            let mut inner = provider.lock();
            for index in 0..count {
                let name = fleetscale_core::instance_name(prefix, index);
                let instance = new_instance(&mut inner, &name, None, None);
                inner.instances.push(instance);
            }
        }
        provider
    }

    /// Delay every call by `latency` before it takes effect.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn fail_create(&self, name: &str) {
        self.lock().fail_create.insert(name.to_string());
    }

    pub fn fail_delete(&self, id: &str) {
        self.lock().fail_delete.insert(id.to_string());
    }

    pub fn fail_list(&self, fail: bool) {
        self.lock().fail_list = fail;
    }

    pub fn fail_next(&self, calls: u32) {
        self.lock().transient_failures = calls;
    }

    pub fn clear_failures(&self) {
        let mut inner = self.lock();
        inner.fail_create.clear();
        inner.fail_delete.clear();
        inner.fail_list = false;
        inner.transient_failures = 0;
    }

    pub fn calls(&self) -> CallCounts {
        self.lock().calls
    }

    pub fn reset_calls(&self) {
        self.lock().calls = CallCounts::default();
    }

    pub fn instances(&self) -> Vec<Instance> {
        self.lock().instances.clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.lock().instances.iter().map(|i| i.name.clone()).collect()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn pause(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

fn new_instance(inner: &mut Inner, name: &str, flavor: Option<&str>, image: Option<&str>) -> Instance {
    inner.next_id += 1;
    Instance {
        id: format!("mem-{}", inner.next_id),
        name: name.to_string(),
        flavor: flavor.map(str::to_string),
        image: image.map(str::to_string),
        status: InstanceStatus::Active,
    }
}

impl ComputeProvider for InMemoryProvider {
    fn kind(&self) -> &'static str {
        "memory"
    }

    fn create<'a>(&'a self, spec: &'a InstanceSpec) -> ProviderFuture<'a, Instance> {
        Box::pin(async move {
            self.pause().await;
            let mut inner = self.lock();
            inner.calls.create += 1;
            inner.take_transient()?;
            if inner.fail_create.contains(&spec.name) {
                return Err(ProviderError::Transport(format!(
                    "injected create failure for {}",
                    spec.name
                )));
            }
            if let Some(existing) = inner.instances.iter().find(|i| i.name == spec.name) {
                return Ok(existing.clone());
            }
            let instance = new_instance(&mut inner, &spec.name, Some(&spec.flavor), Some(&spec.image));
            inner.instances.push(instance.clone());
            debug!(id = %instance.id, name = %instance.name, "memory: created instance");
            Ok(instance)
        })
    }

    fn delete<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            self.pause().await;
            let mut inner = self.lock();
            inner.calls.delete += 1;
            inner.take_transient()?;
            if inner.fail_delete.contains(id) {
                return Err(ProviderError::Transport(format!("injected delete failure for {id}")));
            }
            let before = inner.instances.len();
            inner.instances.retain(|i| i.id != id);
            if inner.instances.len() == before {
                return Err(ProviderError::NotFound(id.to_string()));
            }
            debug!(%id, "memory: deleted instance");
            Ok(())
        })
    }

    fn list(&self) -> ProviderFuture<'_, Vec<Instance>> {
        Box::pin(async move {
            self.pause().await;
            let mut inner = self.lock();
            inner.calls.list += 1;
            inner.take_transient()?;
            if inner.fail_list {
                return Err(ProviderError::Transport("injected list failure".to_string()));
            }
            Ok(inner.instances.clone())
        })
    }
}
