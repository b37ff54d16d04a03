//! Canonical text form of an `OrderSet`.
//!
//! A snapshot is compact JSON of the id-keyed map. Keys are sorted at every
//! level, so two equal order sets always produce the same text and the fast
//! path in the reconciler can compare snapshots as strings.

use krakenwatch_core::{OrderSet, Snapshot};

/// Serialize an order set to its snapshot text.
pub fn serialize(orders: &OrderSet) -> Result<Snapshot, serde_json::Error> {
    serde_json::to_string(orders).map(Snapshot::from)
}

/// Parse snapshot text back into an id-keyed order set.
pub fn parse(snapshot: &Snapshot) -> Result<OrderSet, serde_json::Error> {
    serde_json::from_str(snapshot.as_str())
}
