//! fleetscale-reconcile — the autoscaling control loop.
//!
//! ```text
//! FleetController (one per fleet)
//!   ├── trigger()  decide → lock → Reconciler → MetricsReporter → history
//!   ├── preview()  decide → history (dry run)
//!   └── push_metrics() → latest snapshot
//!
//! Ticker
//!   └── run() → trigger(default policy, latest snapshot) per fleet
//! ```

pub mod controller;
pub mod error;
pub mod fleets;
pub mod reconciler;
pub mod ticker;

pub use controller::{CycleOutcome, FleetController};
pub use error::{ControllerError, ControllerResult};
pub use fleets::Fleets;
pub use reconciler::Reconciler;
pub use ticker::Ticker;
