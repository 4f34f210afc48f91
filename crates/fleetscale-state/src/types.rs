//! Records persisted by the state store.

use serde::{Deserialize, Serialize};

use fleetscale_core::{ReconciliationResult, ScalingDecision};

/// One entry of a fleet's decision history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub fleet: String,
    /// Monotonic per fleet, starting at 1.
    pub seq: u64,
    pub decision: ScalingDecision,
    /// Absent for dry-run previews.
    pub result: Option<ReconciliationResult>,
    pub dry_run: bool,
}

/// Composite key for sequenced per-fleet tables.
pub fn seq_key(fleet: &str, seq: u64) -> String {
    format!("{fleet}:{seq:020}")
}

/// Parse the sequence number out of a key built by [`seq_key`].
pub fn parse_seq(fleet: &str, key: &str) -> Option<u64> {
    key.strip_prefix(fleet)?.strip_prefix(':')?.parse().ok()
}
