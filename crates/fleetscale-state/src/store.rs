//! StateStore — redb-backed state persistence for fleetscale.
//!
//! Provides typed operations over decision history, pushed metrics, and
//! local-fleet instances. All values are JSON-serialized into redb's
//! `&[u8]` value columns. The store supports both on-disk and in-memory
//! backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::de::DeserializeOwned;
use tracing::debug;

use fleetscale_core::{Instance, MetricsSnapshot, ReconciliationResult, ScalingDecision};

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
    /// Decision records kept per fleet. Zero means unbounded.
    history_limit: usize,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self {
            db: Arc::new(db),
            history_limit: 0,
        };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self {
            db: Arc::new(db),
            history_limit: 0,
        };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Keep at most `limit` decision records per fleet; `0` keeps all.
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(DECISIONS).map_err(map_err!(Table))?;
        txn.open_table(METRICS).map_err(map_err!(Table))?;
        txn.open_table(INSTANCES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Decisions ──────────────────────────────────────────────────

    /// Append a decision (and its reconciliation outcome) to a fleet's history,
    /// pruning records beyond the history limit in the same transaction.
    pub fn record_decision(
        &self,
        fleet: &str,
        decision: &ScalingDecision,
        result: Option<&ReconciliationResult>,
    ) -> StateResult<DecisionRecord> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let record;
        let mut pruned = 0;
        {
            let mut table = txn.open_table(DECISIONS).map_err(map_err!(Table))?;
            let seq = last_seq(&table, fleet)? + 1;
            record = DecisionRecord {
                fleet: fleet.to_string(),
                seq,
                decision: decision.clone(),
                result: result.cloned(),
                dry_run: result.is_none(),
            };
            let value = serde_json::to_vec(&record).map_err(map_err!(Serialize))?;
            let key = seq_key(fleet, seq);
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;

            let limit = self.history_limit as u64;
            if limit > 0 && seq > limit {
                let start = seq_key(fleet, 0);
                let end = seq_key(fleet, seq - limit);
                let stale: Vec<String> = table
                    .range(start.as_str()..=end.as_str())
                    .map_err(map_err!(Read))?
                    .map(|item| item.map(|(k, _)| k.value().to_string()))
                    .collect::<Result<_, _>>()
                    .map_err(map_err!(Read))?;
                for key in stale.iter().filter(|k| parse_seq(fleet, k).is_some()) {
                    table.remove(key.as_str()).map_err(map_err!(Write))?;
                    pruned += 1;
                }
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%fleet, seq = record.seq, dry_run = record.dry_run, pruned, "decision recorded");
        Ok(record)
    }

    /// Most recent decisions for a fleet, newest first.
    pub fn list_decisions(&self, fleet: &str, limit: usize) -> StateResult<Vec<DecisionRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(DECISIONS).map_err(map_err!(Table))?;
        let (start, end) = fleet_bounds(fleet);
        let mut records = Vec::new();
        for entry in table
            .range(start.as_str()..=end.as_str())
            .map_err(map_err!(Read))?
            .rev()
        {
            if records.len() >= limit {
                break;
            }
            let (key, value) = entry.map_err(map_err!(Read))?;
            if parse_seq(fleet, key.value()).is_some() {
                let record: DecisionRecord =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                records.push(record);
            }
        }
        Ok(records)
    }

    // ── Metrics ────────────────────────────────────────────────────

    /// Replace the latest metrics snapshot pushed for a fleet.
    pub fn put_latest_metrics(&self, fleet: &str, snapshot: &MetricsSnapshot) -> StateResult<()> {
        let value = serde_json::to_vec(snapshot).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(METRICS).map_err(map_err!(Table))?;
            table
                .insert(fleet, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// The latest metrics snapshot pushed for a fleet, if any.
    pub fn get_latest_metrics(&self, fleet: &str) -> StateResult<Option<MetricsSnapshot>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(METRICS).map_err(map_err!(Table))?;
        match table.get(fleet).map_err(map_err!(Read))? {
            Some(guard) => {
                let snapshot: MetricsSnapshot =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }

    /// Set `current_servers` on the stored snapshot, but only if the stored
    /// snapshot still equals `expected`. Returns false (and writes nothing)
    /// when a newer snapshot was pushed in the meantime.
    pub fn advance_metrics(
        &self,
        fleet: &str,
        expected: &MetricsSnapshot,
        current_servers: u32,
    ) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let advanced;
        {
            let mut table = txn.open_table(METRICS).map_err(map_err!(Table))?;
            let stored: Option<MetricsSnapshot> = match table.get(fleet).map_err(map_err!(Read))? {
                Some(guard) => Some(serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?),
                None => None,
            };
            advanced = stored.as_ref() == Some(expected);
            if advanced {
                let next = MetricsSnapshot {
                    current_servers,
                    ..*expected
                };
                let value = serde_json::to_vec(&next).map_err(map_err!(Serialize))?;
                table
                    .insert(fleet, value.as_slice())
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%fleet, current_servers, advanced, "metrics advance");
        Ok(advanced)
    }

    // ── Instances ──────────────────────────────────────────────────

    /// Append an instance to a fleet. Listing order is insertion order.
    pub fn insert_instance(&self, fleet: &str, instance: &Instance) -> StateResult<()> {
        let value = serde_json::to_vec(instance).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
            let key = seq_key(fleet, last_seq(&table, fleet)? + 1);
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// All instances of a fleet in insertion order.
    pub fn list_instances(&self, fleet: &str) -> StateResult<Vec<Instance>> {
        self.scan_fleet(INSTANCES, fleet)
    }

    /// Find an instance by name within a fleet.
    pub fn find_instance_by_name(&self, fleet: &str, name: &str) -> StateResult<Option<Instance>> {
        Ok(self
            .list_instances(fleet)?
            .into_iter()
            .find(|i| i.name == name))
    }

    /// Delete an instance by id. Returns true if it existed.
    pub fn delete_instance(&self, fleet: &str, id: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
            let (start, end) = fleet_bounds(fleet);
            let mut found = None;
            for entry in table
                .range(start.as_str()..=end.as_str())
                .map_err(map_err!(Read))?
            {
                let (key, value) = entry.map_err(map_err!(Read))?;
                if parse_seq(fleet, key.value()).is_none() {
                    continue;
                }
                let instance: Instance =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                if instance.id == id {
                    found = Some(key.value().to_string());
                    break;
                }
            }
            existed = match found {
                Some(key) => table.remove(key.as_str()).map_err(map_err!(Write))?.is_some(),
                None => false,
            };
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%fleet, %id, existed, "instance deleted");
        Ok(existed)
    }

    // ── Internal helpers ───────────────────────────────────────────

    /// Deserialize every value keyed under `{fleet}:` in key order.
    fn scan_fleet<T: DeserializeOwned>(
        &self,
        definition: TableDefinition<'static, &'static str, &'static [u8]>,
        fleet: &str,
    ) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(definition).map_err(map_err!(Table))?;
        let (start, end) = fleet_bounds(fleet);
        let mut results = Vec::new();
        for entry in table
            .range(start.as_str()..=end.as_str())
            .map_err(map_err!(Read))?
        {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if parse_seq(fleet, key.value()).is_some() {
                let item: T =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(item);
            }
        }
        Ok(results)
    }
}

/// First and last possible key of a fleet in a sequenced table.
fn fleet_bounds(fleet: &str) -> (String, String) {
    (seq_key(fleet, 0), seq_key(fleet, u64::MAX))
}

/// Highest sequence number used by a fleet, or 0 if it has none.
fn last_seq(table: &impl ReadableTable<&'static str, &'static [u8]>, fleet: &str) -> StateResult<u64> {
    let (start, end) = fleet_bounds(fleet);
    for entry in table
        .range(start.as_str()..=end.as_str())
        .map_err(map_err!(Read))?
        .rev()
    {
        let (key, _) = entry.map_err(map_err!(Read))?;
        if let Some(seq) = parse_seq(fleet, key.value()) {
            return Ok(seq);
        }
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetscale_core::InstanceStatus;

    fn test_instance(id: &str, name: &str) -> Instance {
        Instance {
            id: id.to_string(),
            name: name.to_string(),
            flavor: Some("m1.medium".to_string()),
            image: Some("game-server-image".to_string()),
            status: InstanceStatus::Active,
        }
    }

    fn test_metrics(players: u64) -> MetricsSnapshot {
        MetricsSnapshot {
            current_players: players,
            server_capacity: 10,
            current_servers: 1,
            queue_length: 5,
            daily_cost: 12.0,
            daily_budget: None,
        }
    }

    // ── Decision history ───────────────────────────────────────────

    #[test]
    fn decisions_are_sequenced_per_fleet() {
        let store = StateStore::open_in_memory().unwrap();
        let decision = ScalingDecision::new("aggressive", 1, 2);

        let first = store.record_decision("eu", &decision, None).unwrap();
        let second = store.record_decision("eu", &decision, None).unwrap();
        let other = store.record_decision("us", &decision, None).unwrap();

        assert_eq!(first.seq, 1);
        assert_eq!(second.seq, 2);
        assert_eq!(other.seq, 1);
        assert!(first.dry_run);
    }

    #[test]
    fn list_decisions_newest_first_with_limit() {
        let store = StateStore::open_in_memory().unwrap();
        for target in 1..=5 {
            let decision = ScalingDecision::new("cost-conscious", 1, target);
            let result = ReconciliationResult::empty("eu", 1, target);
            store.record_decision("eu", &decision, Some(&result)).unwrap();
        }

        let recent = store.list_decisions("eu", 2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].seq, 5);
        assert_eq!(recent[0].decision.target_servers, 5);
        assert_eq!(recent[1].seq, 4);
        assert!(!recent[0].dry_run);
        assert!(recent[0].result.is_some());
    }

    #[test]
    fn history_does_not_leak_between_prefixed_fleets() {
        let store = StateStore::open_in_memory().unwrap();
        let decision = ScalingDecision::new("aggressive", 0, 1);
        store.record_decision("eu", &decision, None).unwrap();
        store.record_decision("eu-west", &decision, None).unwrap();

        assert_eq!(store.list_decisions("eu", 10).unwrap().len(), 1);
        assert_eq!(store.list_decisions("eu-west", 10).unwrap().len(), 1);
    }

    #[test]
    fn history_limit_prunes_oldest_records() {
        let store = StateStore::open_in_memory().unwrap().with_history_limit(3);
        let decision = ScalingDecision::new("aggressive", 1, 2);
        for _ in 0..5 {
            store.record_decision("eu", &decision, None).unwrap();
        }
        store.record_decision("eu-west", &decision, None).unwrap();

        let seqs: Vec<u64> = store
            .list_decisions("eu", 10)
            .unwrap()
            .iter()
            .map(|r| r.seq)
            .collect();
        assert_eq!(seqs, vec![5, 4, 3]);

        // Sequence numbers keep climbing after a prune.
        let next = store.record_decision("eu", &decision, None).unwrap();
        assert_eq!(next.seq, 6);
        assert_eq!(store.list_decisions("eu", 10).unwrap().len(), 3);
        assert_eq!(store.list_decisions("eu-west", 10).unwrap().len(), 1);
    }

    #[test]
    fn zero_history_limit_keeps_everything() {
        let store = StateStore::open_in_memory().unwrap().with_history_limit(0);
        let decision = ScalingDecision::new("aggressive", 1, 2);
        for _ in 0..25 {
            store.record_decision("eu", &decision, None).unwrap();
        }
        assert_eq!(store.list_decisions("eu", 100).unwrap().len(), 25);
    }

    #[test]
    fn sequence_survives_reopen_with_pruning() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("history.redb");
        let decision = ScalingDecision::new("cost-conscious", 2, 2);
        {
            let store = StateStore::open(&db_path).unwrap().with_history_limit(2);
            for _ in 0..4 {
                store.record_decision("eu", &decision, None).unwrap();
            }
        }
        let store = StateStore::open(&db_path).unwrap().with_history_limit(2);
        assert_eq!(store.record_decision("eu", &decision, None).unwrap().seq, 5);
        let seqs: Vec<u64> = store
            .list_decisions("eu", 10)
            .unwrap()
            .iter()
            .map(|r| r.seq)
            .collect();
        assert_eq!(seqs, vec![5, 4]);
    }

    // ── Metrics ────────────────────────────────────────────────────

    #[test]
    fn latest_metrics_replaced_in_place() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.get_latest_metrics("eu").unwrap().is_none());

        store.put_latest_metrics("eu", &test_metrics(10)).unwrap();
        store.put_latest_metrics("eu", &test_metrics(20)).unwrap();

        let latest = store.get_latest_metrics("eu").unwrap().unwrap();
        assert_eq!(latest.current_players, 20);
    }

    #[test]
    fn advance_metrics_only_when_unchanged() {
        let store = StateStore::open_in_memory().unwrap();
        let seen = test_metrics(50);
        store.put_latest_metrics("eu", &seen).unwrap();

        assert!(store.advance_metrics("eu", &seen, 5).unwrap());
        let stored = store.get_latest_metrics("eu").unwrap().unwrap();
        assert_eq!(stored.current_servers, 5);
        assert_eq!(stored.current_players, 50);

        // A newer push wins over an advance based on an older read.
        store.put_latest_metrics("eu", &test_metrics(500)).unwrap();
        assert!(!store.advance_metrics("eu", &stored, 9).unwrap());
        let stored = store.get_latest_metrics("eu").unwrap().unwrap();
        assert_eq!(stored.current_players, 500);
        assert_eq!(stored.current_servers, 1);

        assert!(!store.advance_metrics("us", &seen, 5).unwrap());
        assert!(store.get_latest_metrics("us").unwrap().is_none());
    }

    // ── Instances ──────────────────────────────────────────────────

    #[test]
    fn instances_list_in_insertion_order() {
        let store = StateStore::open_in_memory().unwrap();
        for i in 0..12 {
            store
                .insert_instance("eu", &test_instance(&format!("id-{i}"), &format!("gs-{i}")))
                .unwrap();
        }
        let names: Vec<_> = store
            .list_instances("eu")
            .unwrap()
            .into_iter()
            .map(|i| i.name)
            .collect();
        let expected: Vec<_> = (0..12).map(|i| format!("gs-{i}")).collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn instance_find_and_delete() {
        let store = StateStore::open_in_memory().unwrap();
        store.insert_instance("eu", &test_instance("a", "gs-0")).unwrap();
        store.insert_instance("eu", &test_instance("b", "gs-1")).unwrap();

        let found = store.find_instance_by_name("eu", "gs-1").unwrap().unwrap();
        assert_eq!(found.id, "b");

        assert!(store.delete_instance("eu", "a").unwrap());
        assert!(!store.delete_instance("eu", "a").unwrap());
        assert_eq!(store.list_instances("eu").unwrap().len(), 1);
    }

    #[test]
    fn delete_is_scoped_to_fleet() {
        let store = StateStore::open_in_memory().unwrap();
        store.insert_instance("eu", &test_instance("a", "gs-0")).unwrap();
        assert!(!store.delete_instance("us", "a").unwrap());
        assert_eq!(store.list_instances("eu").unwrap().len(), 1);
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");

        {
            let store = StateStore::open(&db_path).unwrap();
            store.insert_instance("eu", &test_instance("a", "gs-0")).unwrap();
            store.put_latest_metrics("eu", &test_metrics(42)).unwrap();
        }

        // Reopen the same database file.
        let store = StateStore::open(&db_path).unwrap();
        assert_eq!(store.list_instances("eu").unwrap().len(), 1);
        assert_eq!(
            store.get_latest_metrics("eu").unwrap().unwrap().current_players,
            42
        );
    }

    #[test]
    fn empty_store_operations() {
        let store = StateStore::open_in_memory().unwrap();

        assert!(store.list_decisions("any", 10).unwrap().is_empty());
        assert!(store.list_instances("any").unwrap().is_empty());
        assert!(store.find_instance_by_name("any", "gs-0").unwrap().is_none());
        assert!(!store.delete_instance("any", "nope").unwrap());
    }
}
