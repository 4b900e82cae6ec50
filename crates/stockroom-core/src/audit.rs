//! The hash-linked audit chain.
//!
//! Each event stores the hash of its predecessor and its own hash
//! `sha256(prev_hash ‖ canonical_body)`, hex-encoded. The canonical body is
//! the compact JSON of the event fields with object keys sorted at every
//! depth, so the hash depends only on content, never on map insertion order.
//! Verification is a pure function over stored events: see [`verify_chain`].

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// `prev_hash` of the first event in the chain.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Event type names written by the stores.
pub mod event {
  pub const ARTICLE_CREATED: &str = "article.created";
  pub const ARTICLE_UPDATED: &str = "article.updated";
  pub const STOCK_MOVEMENT: &str = "stock.movement";
  pub const STOCK_TRANSFER: &str = "stock.transfer";
  pub const THRESHOLD_SET: &str = "threshold.set";
  pub const ALERT_ACKNOWLEDGED: &str = "alert.acknowledged";
  pub const CART_LINE_ADDED: &str = "cart.line_added";
  pub const CART_LINE_UPDATED: &str = "cart.line_updated";
  pub const CART_LINE_REMOVED: &str = "cart.line_removed";
  pub const CART_CLEARED: &str = "cart.cleared";
  pub const DEMAND_SUBMITTED: &str = "demand.submitted";
  pub const DEMAND_APPROVED: &str = "demand.approved";
  pub const DEMAND_REFUSED: &str = "demand.refused";
  pub const DEMAND_PREPARED: &str = "demand.prepared";
  pub const DEMAND_PIN_ISSUED: &str = "demand.pin_issued";
  pub const DEMAND_HANDED_OVER: &str = "demand.handed_over";
  pub const RESERVATION_CREATED: &str = "reservation.created";
  pub const RESERVATION_APPROVED: &str = "reservation.approved";
  pub const RESERVATION_CANCELLED: &str = "reservation.cancelled";
  pub const RESERVATION_CONSUMED: &str = "reservation.consumed";
}

// ─── Events ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
  /// Position in the chain, starting at 1.
  pub seq:         i64,
  pub event_id:    Uuid,
  pub prev_hash:   String,
  pub this_hash:   String,
  pub actor_id:    Uuid,
  pub event_type:  String,
  pub entity_type: String,
  pub entity_id:   String,
  pub payload:     Value,
  pub recorded_at: DateTime<Utc>,
}

impl AuditEvent {
  /// Recompute this event's hash from its stored content.
  pub fn expected_hash(&self) -> String {
    chain_hash(
      &self.prev_hash,
      &canonical_body(
        self.actor_id,
        &self.event_type,
        &self.entity_type,
        &self.entity_id,
        &self.payload,
        self.recorded_at,
      ),
    )
  }
}

/// An event about to be appended; the store fills in the chain fields.
#[derive(Debug, Clone)]
pub struct NewAuditEvent {
  pub actor_id:    Uuid,
  pub event_type:  &'static str,
  pub entity_type: &'static str,
  pub entity_id:   String,
  pub payload:     Value,
}

impl NewAuditEvent {
  pub fn new(
    actor_id: Uuid,
    event_type: &'static str,
    entity_type: &'static str,
    entity_id: impl ToString,
    payload: Value,
  ) -> Self {
    Self { actor_id, event_type, entity_type, entity_id: entity_id.to_string(), payload }
  }

  /// Seal this event onto a chain whose head is `prev_hash`.
  pub fn seal(self, seq: i64, prev_hash: &str, recorded_at: DateTime<Utc>) -> AuditEvent {
    let body = canonical_body(
      self.actor_id,
      self.event_type,
      self.entity_type,
      &self.entity_id,
      &self.payload,
      recorded_at,
    );
    AuditEvent {
      seq,
      event_id: Uuid::new_v4(),
      prev_hash: prev_hash.to_string(),
      this_hash: chain_hash(prev_hash, &body),
      actor_id: self.actor_id,
      event_type: self.event_type.to_string(),
      entity_type: self.entity_type.to_string(),
      entity_id: self.entity_id,
      payload: self.payload,
      recorded_at,
    }
  }
}

#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
  pub entity_type:  Option<String>,
  pub entity_id:    Option<String>,
  /// Only events recorded on behalf of this user.
  pub actor_id:     Option<Uuid>,
  /// Most recent first; with `limit`, a user's latest activity.
  pub newest_first: bool,
  pub limit:        Option<usize>,
}

// ─── Hashing ─────────────────────────────────────────────────────────────────

/// Sort object keys recursively.
pub fn canonicalize(value: &Value) -> Value {
  match value {
    Value::Object(map) => {
      let mut keys: Vec<&String> = map.keys().collect();
      keys.sort();
      let mut out = Map::new();
      for k in keys {
        out.insert(k.clone(), canonicalize(&map[k]));
      }
      Value::Object(out)
    }
    Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
    other => other.clone(),
  }
}

pub fn canonical_body(
  actor_id: Uuid,
  event_type: &str,
  entity_type: &str,
  entity_id: &str,
  payload: &Value,
  recorded_at: DateTime<Utc>,
) -> String {
  let body = json!({
    "actor_id":    actor_id,
    "entity_id":   entity_id,
    "entity_type": entity_type,
    "event_type":  event_type,
    "payload":     canonicalize(payload),
    "recorded_at": recorded_at.to_rfc3339_opts(SecondsFormat::Micros, true),
  });
  canonicalize(&body).to_string()
}

pub fn chain_hash(prev_hash: &str, body: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(prev_hash.as_bytes());
  hasher.update(body.as_bytes());
  hex::encode(hasher.finalize())
}

// ─── Verification ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakKind {
  /// The stored hash does not match the event's content.
  HashMismatch,
  /// `prev_hash` does not point at the preceding event (or genesis).
  LinkMismatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainBreak {
  pub seq:  i64,
  pub kind: BreakKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainReport {
  pub total:    usize,
  /// Events before the first break.
  pub verified: usize,
  pub breaks:   Vec<ChainBreak>,
}

impl ChainReport {
  pub fn is_intact(&self) -> bool { self.breaks.is_empty() }
}

/// Verify `events`, which must be the whole chain in `seq` order.
pub fn verify_chain(events: &[AuditEvent]) -> ChainReport {
  let mut report = ChainReport { total: events.len(), ..Default::default() };
  let mut expected_prev = GENESIS_HASH;
  for event in events {
    if event.prev_hash != expected_prev {
      report.breaks.push(ChainBreak { seq: event.seq, kind: BreakKind::LinkMismatch });
    }
    if event.expected_hash() != event.this_hash {
      report.breaks.push(ChainBreak { seq: event.seq, kind: BreakKind::HashMismatch });
    }
    if report.breaks.is_empty() {
      report.verified += 1;
    }
    expected_prev = &event.this_hash;
  }
  report
}
