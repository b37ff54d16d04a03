use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

/// An open order as reported by the exchange.
///
/// The payload is whatever the exchange sent for this order (status, volume,
/// descriptor, timestamps...). Nothing in the agent looks inside it; only
/// `id` is used as the diff key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenOrder {
    /// Exchange-assigned order identifier (Kraken "txid").
    pub id: String,
    pub payload: Value,
}

impl OpenOrder {
    pub fn new(id: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            payload,
        }
    }
}

/// The set of currently open orders at one point in time, keyed by order id.
///
/// Backed by a `BTreeMap` so iteration and serialization order is stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderSet(BTreeMap<String, Value>);

impl OrderSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, payload: Value) -> Option<Value> {
        self.0.insert(id.into(), payload)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Value> {
        self.0.get(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Order ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Consume the set, yielding one `OpenOrder` per entry in id order.
    pub fn into_orders(self) -> Vec<OpenOrder> {
        self.0
            .into_iter()
            .map(|(id, payload)| OpenOrder { id, payload })
            .collect()
    }
}

impl From<BTreeMap<String, Value>> for OrderSet {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Value)> for OrderSet {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl FromIterator<OpenOrder> for OrderSet {
    fn from_iter<I: IntoIterator<Item = OpenOrder>>(iter: I) -> Self {
        Self(iter.into_iter().map(|o| (o.id, o.payload)).collect())
    }
}

// ---------------------------------------------------------------------------
// Snapshot & Mode
// ---------------------------------------------------------------------------

/// Serialized form of the previous poll's `OrderSet`.
///
/// Opaque text to everything except the snapshot codec in
/// `krakenwatch-reconcile`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(String);

impl Snapshot {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<String> for Snapshot {
    fn from(text: String) -> Self {
        Self(text)
    }
}

/// Emission policy for a poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Emit every open order on every poll.
    EmitAll,
    /// Emit only orders whose id was not present in the previous snapshot.
    #[default]
    EmitChangesOnly,
}

impl Mode {
    /// Map the `changes_only` option onto a mode.
    pub fn from_changes_only(changes_only: bool) -> Self {
        if changes_only {
            Mode::EmitChangesOnly
        } else {
            Mode::EmitAll
        }
    }
}

/// What to do when a stored snapshot cannot be parsed back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorruptSnapshotPolicy {
    /// Abort the poll with a snapshot parse error.
    #[default]
    Fail,
    /// Treat the poll as a cold start and emit every order.
    ColdStart,
}

// ---------------------------------------------------------------------------
// Agent Memory
// ---------------------------------------------------------------------------

/// State that outlives a single poll.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentMemory {
    /// The snapshot slot: serialized open orders from the last poll that changed it.
    pub last_status: Option<Snapshot>,
    /// When the agent last emitted an event.
    pub last_event_at: Option<DateTime<Utc>>,
    /// When a poll last failed.
    pub last_error_at: Option<DateTime<Utc>>,
    /// When a poll last completed.
    pub last_success_at: Option<DateTime<Utc>>,
}

impl AgentMemory {
    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.last_status.as_ref()
    }

    /// Whether an event was created no longer than `period` before `now`.
    pub fn event_created_within(&self, period: Duration, now: DateTime<Utc>) -> bool {
        match self.last_event_at {
            Some(at) => now - at <= period,
            None => false,
        }
    }

    /// Whether the most recent poll outcome on record is a failure.
    pub fn has_recent_error(&self) -> bool {
        match (self.last_error_at, self.last_success_at) {
            (Some(err), Some(ok)) => err > ok,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}
