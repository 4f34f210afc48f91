//! redb table definitions for the fleetscale state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain types).

use redb::TableDefinition;

/// Decision history keyed by `{fleet}:{seq:020}`.
pub const DECISIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("decisions");

/// Latest pushed metrics snapshot keyed by `{fleet}`.
pub const METRICS: TableDefinition<&str, &[u8]> = TableDefinition::new("metrics");

/// Local-fleet instances keyed by `{fleet}:{seq:020}`.
pub const INSTANCES: TableDefinition<&str, &[u8]> = TableDefinition::new("instances");
