//! Shared types used across fleetscale crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name of a configured fleet.
pub type FleetName = String;

/// Provider-assigned identifier of a running instance.
pub type InstanceId = String;

// ── Metrics ────────────────────────────────────────────────────────

/// Demand signals for one fleet at one point in time.
///
/// Produced by whatever triggers a cycle; the core only reads it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Players currently connected across the fleet.
    pub current_players: u64,
    /// Players one server can host. Must be non-zero.
    pub server_capacity: u64,
    /// Servers the fleet is running right now.
    pub current_servers: u32,
    /// Players waiting for a slot.
    #[serde(default)]
    pub queue_length: u64,
    /// Spend accumulated so far today.
    #[serde(default)]
    pub daily_cost: f64,
    /// Per-call override of the cost-capped policy's daily budget.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_budget: Option<f64>,
}

impl MetricsSnapshot {
    /// Hourly spend as exported to telemetry.
    pub fn hourly_cost(&self) -> f64 {
        self.daily_cost / 24.0
    }
}

// ── Decisions ──────────────────────────────────────────────────────

/// What a scaling decision asks the reconciler to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScaleAction {
    /// Converge the fleet to `target_servers`.
    Scale,
    /// Target equals current; nothing to do.
    NoOp,
}

/// Output of a scaling policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingDecision {
    /// Registry name of the policy that produced this decision.
    pub policy: String,
    pub action: ScaleAction,
    pub current_servers: u32,
    pub target_servers: u32,
    pub timestamp: DateTime<Utc>,
    /// Budget left for the day. Only set by the cost-capped policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_remaining: Option<f64>,
    /// The budget cap pulled the target below what demand asked for.
    #[serde(default)]
    pub budget_limited: bool,
}

impl ScalingDecision {
    /// Build a decision, classifying it as `NoOp` when nothing changes.
    pub fn new(policy: impl Into<String>, current_servers: u32, target_servers: u32) -> Self {
        let action = if current_servers == target_servers {
            ScaleAction::NoOp
        } else {
            ScaleAction::Scale
        };
        Self {
            policy: policy.into(),
            action,
            current_servers,
            target_servers,
            timestamp: Utc::now(),
            budget_remaining: None,
            budget_limited: false,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.action == ScaleAction::NoOp
    }

    /// Signed change in fleet size this decision asks for.
    pub fn delta(&self) -> i64 {
        i64::from(self.target_servers) - i64::from(self.current_servers)
    }
}

// ── Instances ──────────────────────────────────────────────────────

/// Lifecycle status reported by a compute provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    Building,
    Active,
    Error,
    #[serde(other)]
    Unknown,
}

/// One running game-server instance as listed by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub id: InstanceId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flavor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub status: InstanceStatus,
}

/// What to ask the provider for when creating an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSpec {
    pub name: String,
    pub flavor: String,
    pub image: String,
}

/// Deterministic instance name for a fleet slot.
pub fn instance_name(prefix: &str, index: u32) -> String {
    format!("{prefix}-{index}")
}

/// Recover the slot index from a name built by [`instance_name`].
pub fn instance_index(prefix: &str, name: &str) -> Option<u32> {
    name.strip_prefix(prefix)?.strip_prefix('-')?.parse().ok()
}

// ── Reconciliation ─────────────────────────────────────────────────

/// Provider call kinds issued during a reconciliation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Delete,
    List,
}

/// A provider call that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationFailure {
    pub operation: OperationKind,
    /// Instance name for creates, instance id (or listing slot) for deletes.
    pub target: String,
    pub error: String,
}

/// Everything one reconciliation cycle observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationResult {
    pub fleet: FleetName,
    pub intended_target: u32,
    /// Fleet size after the successful operations were applied.
    pub realized_count: u32,
    pub created: Vec<Instance>,
    pub deleted: Vec<InstanceId>,
    pub failures: Vec<OperationFailure>,
    /// Provider calls actually issued, including failed ones.
    pub provider_calls: u32,
    /// The cycle stopped early; operations not yet issued were skipped.
    #[serde(default)]
    pub cancelled: bool,
}

impl ReconciliationResult {
    /// A result for a cycle that has not issued anything yet.
    pub fn empty(fleet: &str, current: u32, target: u32) -> Self {
        Self {
            fleet: fleet.to_string(),
            intended_target: target,
            realized_count: current,
            created: Vec::new(),
            deleted: Vec::new(),
            failures: Vec::new(),
            provider_calls: 0,
            cancelled: false,
        }
    }

    /// At least one instance was created or deleted.
    pub fn changed(&self) -> bool {
        !self.created.is_empty() || !self.deleted.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }
}

// ── Eviction ───────────────────────────────────────────────────────

/// Order applied to the provider listing before the reconciler picks
/// instances to delete from its tail.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EvictionOrder {
    /// Keep the provider's listing order.
    #[default]
    Listing,
    /// Highest slot index is evicted first.
    NewestFirst,
    /// Lowest slot index is evicted first.
    OldestFirst,
}

impl EvictionOrder {
    /// Reorder `instances` so that the ones to evict first sit at the tail.
    ///
    /// Names that don't carry a slot index sort after indexed ones, so
    /// foreign instances are evicted before fleet-managed ones.
    pub fn arrange(self, prefix: &str, instances: &mut [Instance]) {
        match self {
            EvictionOrder::Listing => {}
            EvictionOrder::NewestFirst => {
                instances.sort_by_key(|i| instance_index(prefix, &i.name).unwrap_or(u32::MAX));
            }
            EvictionOrder::OldestFirst => {
                instances.sort_by_key(|i| {
                    std::cmp::Reverse(instance_index(prefix, &i.name).map(|n| n as i64).unwrap_or(-1))
                });
            }
        }
    }
}
