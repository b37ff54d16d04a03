//! Decides which open orders to emit after a poll.
//!
//! The reconciler is a pure function of the previous snapshot, the freshly
//! fetched order set and the configured `Mode`. It never persists anything;
//! the caller stores `next_snapshot` when one is returned.
//!
//! In `EmitChangesOnly` mode the diff is on id presence only: an order whose
//! fields change but whose id stays the same is not re-emitted, and an order
//! that disappears (filled, cancelled) produces no event at all.

pub mod snapshot;

use krakenwatch_core::{CorruptSnapshotPolicy, Mode, OpenOrder, OrderSet, Snapshot};
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("Stored snapshot is not parseable: {0}")]
    SnapshotParse(#[source] serde_json::Error),
    #[error("Failed to serialize open orders: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Outcome of a reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    /// Orders to emit, in id order.
    pub to_emit: Vec<OpenOrder>,
    /// Snapshot to persist. `None` means the stored snapshot stays as it is.
    pub next_snapshot: Option<Snapshot>,
}

impl Reconciliation {
    pub fn snapshot_changed(&self) -> bool {
        self.next_snapshot.is_some()
    }

    fn emit_all(orders: OrderSet, next: Snapshot) -> Self {
        Self {
            to_emit: orders.into_orders(),
            next_snapshot: Some(next),
        }
    }

    fn unchanged() -> Self {
        Self {
            to_emit: Vec::new(),
            next_snapshot: None,
        }
    }
}

/// Applies a `Mode` to successive order sets.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reconciler {
    mode: Mode,
    on_corrupt: CorruptSnapshotPolicy,
}

impl Reconciler {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            on_corrupt: CorruptSnapshotPolicy::default(),
        }
    }

    pub fn with_corrupt_snapshot_policy(mut self, policy: CorruptSnapshotPolicy) -> Self {
        self.on_corrupt = policy;
        self
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Compare `new_orders` against the previous snapshot.
    ///
    /// `previous` may be `None` or empty on a cold start.
    pub fn reconcile(
        &self,
        previous: Option<&Snapshot>,
        new_orders: OrderSet,
    ) -> Result<Reconciliation, ReconcileError> {
        let next = snapshot::serialize(&new_orders).map_err(ReconcileError::Serialize)?;

        if self.mode == Mode::EmitAll {
            return Ok(Reconciliation::emit_all(new_orders, next));
        }

        let previous = match previous.filter(|s| !s.is_empty()) {
            Some(previous) if *previous == next => {
                debug!("Open orders unchanged since last poll");
                return Ok(Reconciliation::unchanged());
            }
            Some(previous) => previous,
            None => {
                debug!(orders = new_orders.len(), "No previous snapshot, emitting all open orders");
                return Ok(Reconciliation::emit_all(new_orders, next));
            }
        };

        let known = match snapshot::parse(previous) {
            Ok(known) => known,
            Err(e) => match self.on_corrupt {
                CorruptSnapshotPolicy::Fail => return Err(ReconcileError::SnapshotParse(e)),
                CorruptSnapshotPolicy::ColdStart => {
                    warn!(error = %e, "Stored snapshot is corrupt, treating poll as a cold start");
                    return Ok(Reconciliation::emit_all(new_orders, next));
                }
            },
        };

        let to_emit = new_orders
            .into_orders()
            .into_iter()
            .filter(|order| {
                let found = known.contains(&order.id);
                debug!(order_id = %order.id, found, "Compared against previous snapshot");
                !found
            })
            .collect();

        Ok(Reconciliation {
            to_emit,
            next_snapshot: Some(next),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn order(status: &str) -> serde_json::Value {
        json!({
            "refid": null,
            "userref": 0,
            "status": status,
            "descr": {"pair": "XBTEUR", "type": "buy", "ordertype": "limit", "price": "1.0"},
            "vol": "1000000",
            "vol_exec": "0.00000000",
        })
    }

    fn set(ids: &[&str]) -> OrderSet {
        ids.iter().map(|id| (id.to_string(), order("open"))).collect()
    }

    fn ids(orders: &[OpenOrder]) -> Vec<&str> {
        orders.iter().map(|o| o.id.as_str()).collect()
    }

    #[test]
    fn test_emit_all_emits_every_order() {
        let reconciler = Reconciler::new(Mode::EmitAll);
        let previous = snapshot::serialize(&set(&["OA", "OB"])).unwrap();

        let result = reconciler.reconcile(Some(&previous), set(&["OA", "OB"])).unwrap();
        assert_eq!(ids(&result.to_emit), vec!["OA", "OB"]);
        assert_eq!(result.next_snapshot, Some(previous));
    }

    #[test]
    fn test_emit_all_overwrites_snapshot() {
        let reconciler = Reconciler::new(Mode::EmitAll);
        let result = reconciler.reconcile(None, set(&["OA", "OB", "OC"])).unwrap();

        assert_eq!(result.to_emit.len(), 3);
        assert_eq!(
            result.next_snapshot,
            Some(snapshot::serialize(&set(&["OA", "OB", "OC"])).unwrap())
        );
    }

    #[test]
    fn test_cold_start_emits_everything() {
        let reconciler = Reconciler::new(Mode::EmitChangesOnly);
        let result = reconciler
            .reconcile(Some(&Snapshot::default()), set(&["OA", "OB"]))
            .unwrap();

        assert_eq!(ids(&result.to_emit), vec!["OA", "OB"]);
        assert_eq!(
            result.next_snapshot,
            Some(snapshot::serialize(&set(&["OA", "OB"])).unwrap())
        );

        let result = reconciler.reconcile(None, set(&["OA"])).unwrap();
        assert_eq!(ids(&result.to_emit), vec!["OA"]);
    }

    #[test]
    fn test_unchanged_emits_nothing() {
        let reconciler = Reconciler::new(Mode::EmitChangesOnly);
        let previous = snapshot::serialize(&set(&["OA", "OB"])).unwrap();

        let result = reconciler.reconcile(Some(&previous), set(&["OA", "OB"])).unwrap();
        assert!(result.to_emit.is_empty());
        assert!(!result.snapshot_changed());
    }

    #[test]
    fn test_new_order_emitted_alone() {
        let reconciler = Reconciler::new(Mode::EmitChangesOnly);
        let previous = snapshot::serialize(&set(&["OA"])).unwrap();

        let result = reconciler.reconcile(Some(&previous), set(&["OA", "OB"])).unwrap();
        assert_eq!(ids(&result.to_emit), vec!["OB"]);
        assert_eq!(result.to_emit[0].payload, order("open"));
        assert_eq!(
            result.next_snapshot,
            Some(snapshot::serialize(&set(&["OA", "OB"])).unwrap())
        );
    }

    #[test]
    fn test_closed_order_produces_no_event() {
        let reconciler = Reconciler::new(Mode::EmitChangesOnly);
        let previous = snapshot::serialize(&set(&["OA", "OB"])).unwrap();

        let result = reconciler.reconcile(Some(&previous), set(&["OA"])).unwrap();
        assert!(result.to_emit.is_empty());
        assert_eq!(
            result.next_snapshot,
            Some(snapshot::serialize(&set(&["OA"])).unwrap())
        );
    }

    #[test]
    fn test_changed_fields_on_known_id_are_suppressed() {
        let reconciler = Reconciler::new(Mode::EmitChangesOnly);
        let previous = snapshot::serialize(&set(&["OA"])).unwrap();

        let mut next = OrderSet::new();
        next.insert("OA", order("partially_filled"));

        let result = reconciler.reconcile(Some(&previous), next.clone()).unwrap();
        assert!(result.to_emit.is_empty());
        assert_eq!(result.next_snapshot, Some(snapshot::serialize(&next).unwrap()));
    }

    #[test]
    fn test_corrupt_snapshot_fails_by_default() {
        let reconciler = Reconciler::new(Mode::EmitChangesOnly);
        let corrupt = Snapshot::new(r#"{"OA"=>{"status"=>"open"}}"#);

        let err = reconciler.reconcile(Some(&corrupt), set(&["OA"])).unwrap_err();
        assert!(matches!(err, ReconcileError::SnapshotParse(_)));
    }

    #[test]
    fn test_corrupt_snapshot_cold_start_policy() {
        let reconciler = Reconciler::new(Mode::EmitChangesOnly)
            .with_corrupt_snapshot_policy(CorruptSnapshotPolicy::ColdStart);
        let corrupt = Snapshot::new("not json");

        let result = reconciler.reconcile(Some(&corrupt), set(&["OA", "OB"])).unwrap();
        assert_eq!(ids(&result.to_emit), vec!["OA", "OB"]);
        assert!(result.snapshot_changed());
    }
}
