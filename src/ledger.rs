use std::sync::Mutex;

use serde::Serialize;

use crate::order::Zone;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Place,
    Move,
    Pickup,
    Discard,
}

#[derive(Debug, Clone, Serialize)]
pub struct Action {
    pub timestamp_s: f64,
    pub order_id: String,
    pub action: ActionKind,
    pub target: ZoneWire,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

// serializes as the lowercase wire name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneWire(pub Zone);

impl Serialize for ZoneWire {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.0.as_str())
    }
}

struct LedgerInner {
    actions: Vec<Action>,
    last_timestamp_s: f64,
}

// append order is authoritative, timestamps only need to be non-decreasing
pub struct Ledger {
    inner: Mutex<LedgerInner>,
}

impl Ledger {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LedgerInner {
                actions: Vec::new(),
                last_timestamp_s: f64::NEG_INFINITY,
            }),
        }
    }

    // clamps to the last recorded timestamp so the ledger never goes backwards
    // if two ops race slightly out of clock order. returns the timestamp recorded.
    pub fn append(
        &self,
        timestamp_s: f64,
        order_id: impl Into<String>,
        kind: ActionKind,
        zone: Zone,
        detail: Option<String>,
    ) -> f64 {
        let mut inner = self.inner.lock().unwrap();
        let ts = timestamp_s.max(inner.last_timestamp_s);
        inner.last_timestamp_s = ts;
        inner.actions.push(Action {
            timestamp_s: ts,
            order_id: order_id.into(),
            action: kind,
            target: ZoneWire(zone),
            detail,
        });
        ts
    }

    pub fn snapshot(&self) -> Vec<Action> {
        self.inner.lock().unwrap().actions.clone()
    }
}

// scans a snapshot rather than tracking counters separately, so the ledger
// stays the single source of truth
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerSummary {
    pub placed: u64,
    pub moved: u64,
    pub picked_up: u64,
    pub discarded: u64,
}

pub fn summarize(actions: &[Action]) -> LedgerSummary {
    let mut summary = LedgerSummary::default();
    for action in actions {
        match action.action {
            ActionKind::Place => summary.placed += 1,
            ActionKind::Move => summary.moved += 1,
            ActionKind::Pickup => summary.picked_up += 1,
            ActionKind::Discard => summary.discarded += 1,
        }
    }
    summary
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}
