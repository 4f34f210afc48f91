//! fleetscale-state — embedded state store for fleetscale.
//!
//! Backed by [redb](https://docs.rs/redb), keeps the decision history of
//! every fleet, the latest metrics snapshot pushed for each fleet (read by
//! the autoscale ticker), and the instances of the simulated local fleet.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Sequenced keys (`{fleet}:{seq:020}`) keep per-fleet records in insertion
//! order under redb's lexicographic key order.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
