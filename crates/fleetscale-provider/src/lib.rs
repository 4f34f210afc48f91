//! fleetscale-provider — the compute backends a fleet is reconciled
//! against.
//!
//! # Backends
//!
//! - [`InMemoryProvider`]: volatile fleet with failure injection, for tests
//!   and dry runs.
//! - [`LocalProvider`]: simulated fleet persisted in the state store.
//! - [`OpenStackProvider`]: Nova servers API over HTTP.
//!
//! Any backend can be wrapped in [`RetryingProvider`] to get a per-call
//! timeout and bounded retry with jittered exponential backoff.

pub mod error;
pub mod local;
pub mod memory;
pub mod openstack;
pub mod provider;
pub mod retry;

pub use error::{ProviderError, ProviderResult};
pub use local::LocalProvider;
pub use memory::{CallCounts, InMemoryProvider};
pub use openstack::OpenStackProvider;
pub use provider::{ComputeProvider, ProviderFuture, build_provider};
pub use retry::{RetryPolicy, RetryingProvider};
