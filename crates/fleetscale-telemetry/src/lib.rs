//! fleetscale-telemetry — observability for autoscaled fleets.
//!
//! The core never talks to a metrics backend directly. It reports through
//! the [`TelemetrySink`] port, and [`MetricsRegistry`] is the in-process
//! sink that backs the `/metrics` endpoint.
//!
//! # Architecture
//!
//! ```text
//! MetricsReporter
//!   ├── report()               → four gauges per fleet
//!   └── record_scaling_event() → scaling_events_total counter
//!          │
//!          ▼
//! dyn TelemetrySink ── MetricsRegistry ── render_prometheus() → GET /metrics
//! ```

pub mod prometheus;
pub mod registry;
pub mod reporter;
pub mod sink;

pub use prometheus::render_prometheus;
pub use registry::MetricsRegistry;
pub use reporter::MetricsReporter;
pub use sink::{Labels, TelemetrySink};
