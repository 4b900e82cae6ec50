//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! UUIDs are hyphenated lowercase strings, quantities are decimal strings,
//! timestamps are RFC 3339 UTC with microsecond precision. Each `Raw*` struct
//! mirrors one table's columns in the order of its `*_COLUMNS` constant.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Row;
use rust_decimal::Decimal;
use stockroom_core::{
  article::{Article, Unit},
  audit::AuditEvent,
  cart::{CartLine, CartStatus},
  demand::{Demand, DemandLine, DemandStatus, HandoverMethod},
  reservation::{Reservation, ReservationStatus},
  stock::{Movement, MovementReason, StockLevel, Threshold, ThresholdAlert},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn decode_opt_uuid(s: Option<String>) -> Result<Option<Uuid>> {
  s.as_deref().map(decode_uuid).transpose()
}

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339_opts(SecondsFormat::Micros, true) }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::Decode(format!("timestamp {s:?}: {e}")))
}

pub fn decode_opt_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
  s.as_deref().map(decode_dt).transpose()
}

pub fn encode_qty(q: Decimal) -> String { q.normalize().to_string() }

pub fn decode_qty(s: &str) -> Result<Decimal> { Ok(s.parse::<Decimal>()?) }

fn unknown(what: &str, s: &str) -> Error { Error::Decode(format!("unknown {what}: {s:?}")) }

// ─── Articles ────────────────────────────────────────────────────────────────

pub const ARTICLE_COLUMNS: &str = "article_id, reference, name, description, unit, category, \
                                   manufacturer, model_number, safety_stock, cost_price, \
                                   is_active, created_at, updated_at";

pub struct RawArticle {
  pub article_id:   String,
  pub reference:    String,
  pub name:         String,
  pub description:  String,
  pub unit:         String,
  pub category:     String,
  pub manufacturer: String,
  pub model_number: String,
  pub safety_stock: String,
  pub cost_price:   Option<String>,
  pub is_active:    bool,
  pub created_at:   String,
  pub updated_at:   String,
}

impl RawArticle {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      article_id:   row.get(0)?,
      reference:    row.get(1)?,
      name:         row.get(2)?,
      description:  row.get(3)?,
      unit:         row.get(4)?,
      category:     row.get(5)?,
      manufacturer: row.get(6)?,
      model_number: row.get(7)?,
      safety_stock: row.get(8)?,
      cost_price:   row.get(9)?,
      is_active:    row.get(10)?,
      created_at:   row.get(11)?,
      updated_at:   row.get(12)?,
    })
  }

  pub fn into_article(self) -> Result<Article> {
    Ok(Article {
      article_id:   decode_uuid(&self.article_id)?,
      reference:    self.reference,
      name:         self.name,
      description:  self.description,
      unit:         Unit::parse(&self.unit).ok_or_else(|| unknown("unit", &self.unit))?,
      category:     self.category,
      manufacturer: self.manufacturer,
      model_number: self.model_number,
      safety_stock: decode_qty(&self.safety_stock)?,
      cost_price:   self.cost_price.as_deref().map(decode_qty).transpose()?,
      is_active:    self.is_active,
      created_at:   decode_dt(&self.created_at)?,
      updated_at:   decode_dt(&self.updated_at)?,
    })
  }
}

// ─── Stock ───────────────────────────────────────────────────────────────────

pub const STOCK_COLUMNS: &str = "technician_id, article_id, balance, reserved_qty, updated_at";

pub struct RawStockLevel {
  pub technician_id: String,
  pub article_id:    String,
  pub balance:       String,
  pub reserved_qty:  String,
  pub updated_at:    String,
}

impl RawStockLevel {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      technician_id: row.get(0)?,
      article_id:    row.get(1)?,
      balance:       row.get(2)?,
      reserved_qty:  row.get(3)?,
      updated_at:    row.get(4)?,
    })
  }

  pub fn into_level(self) -> Result<StockLevel> {
    Ok(StockLevel {
      technician_id: decode_uuid(&self.technician_id)?,
      article_id:    decode_uuid(&self.article_id)?,
      balance:       decode_qty(&self.balance)?,
      reserved_qty:  decode_qty(&self.reserved_qty)?,
      updated_at:    decode_dt(&self.updated_at)?,
    })
  }
}

pub const MOVEMENT_COLUMNS: &str = "movement_id, technician_id, article_id, delta, reason, \
                                    actor_id, recorded_at, balance_after, linked_movement_id, \
                                    demand_id, reservation_id, location_text, notes";

pub struct RawMovement {
  pub movement_id:        String,
  pub technician_id:      String,
  pub article_id:         String,
  pub delta:              String,
  pub reason:             String,
  pub actor_id:           String,
  pub recorded_at:        String,
  pub balance_after:      String,
  pub linked_movement_id: Option<String>,
  pub demand_id:          Option<String>,
  pub reservation_id:     Option<String>,
  pub location_text:      String,
  pub notes:              String,
}

impl RawMovement {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      movement_id:        row.get(0)?,
      technician_id:      row.get(1)?,
      article_id:         row.get(2)?,
      delta:              row.get(3)?,
      reason:             row.get(4)?,
      actor_id:           row.get(5)?,
      recorded_at:        row.get(6)?,
      balance_after:      row.get(7)?,
      linked_movement_id: row.get(8)?,
      demand_id:          row.get(9)?,
      reservation_id:     row.get(10)?,
      location_text:      row.get(11)?,
      notes:              row.get(12)?,
    })
  }

  pub fn into_movement(self) -> Result<Movement> {
    Ok(Movement {
      movement_id:        decode_uuid(&self.movement_id)?,
      technician_id:      decode_uuid(&self.technician_id)?,
      article_id:         decode_uuid(&self.article_id)?,
      delta:              decode_qty(&self.delta)?,
      reason:             MovementReason::parse(&self.reason)
        .ok_or_else(|| unknown("movement reason", &self.reason))?,
      actor_id:           decode_uuid(&self.actor_id)?,
      recorded_at:        decode_dt(&self.recorded_at)?,
      balance_after:      decode_qty(&self.balance_after)?,
      linked_movement_id: decode_opt_uuid(self.linked_movement_id)?,
      demand_id:          decode_opt_uuid(self.demand_id)?,
      reservation_id:     decode_opt_uuid(self.reservation_id)?,
      location_text:      self.location_text,
      notes:              self.notes,
    })
  }
}

// ─── Thresholds ──────────────────────────────────────────────────────────────

pub const THRESHOLD_COLUMNS: &str =
  "technician_id, article_id, min_qty, is_active, last_alert_at";

pub struct RawThreshold {
  pub technician_id: String,
  pub article_id:    String,
  pub min_qty:       String,
  pub is_active:     bool,
  pub last_alert_at: Option<String>,
}

impl RawThreshold {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      technician_id: row.get(0)?,
      article_id:    row.get(1)?,
      min_qty:       row.get(2)?,
      is_active:     row.get(3)?,
      last_alert_at: row.get(4)?,
    })
  }

  pub fn into_threshold(self) -> Result<Threshold> {
    Ok(Threshold {
      technician_id: decode_uuid(&self.technician_id)?,
      article_id:    decode_uuid(&self.article_id)?,
      min_qty:       decode_qty(&self.min_qty)?,
      is_active:     self.is_active,
      last_alert_at: decode_opt_dt(self.last_alert_at)?,
    })
  }
}

pub const ALERT_COLUMNS: &str = "alert_id, technician_id, article_id, balance, min_qty, \
                                 raised_at, acknowledged_at, acknowledged_by";

pub struct RawAlert {
  pub alert_id:        String,
  pub technician_id:   String,
  pub article_id:      String,
  pub balance:         String,
  pub min_qty:         String,
  pub raised_at:       String,
  pub acknowledged_at: Option<String>,
  pub acknowledged_by: Option<String>,
}

impl RawAlert {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      alert_id:        row.get(0)?,
      technician_id:   row.get(1)?,
      article_id:      row.get(2)?,
      balance:         row.get(3)?,
      min_qty:         row.get(4)?,
      raised_at:       row.get(5)?,
      acknowledged_at: row.get(6)?,
      acknowledged_by: row.get(7)?,
    })
  }

  pub fn into_alert(self) -> Result<ThresholdAlert> {
    Ok(ThresholdAlert {
      alert_id:        decode_uuid(&self.alert_id)?,
      technician_id:   decode_uuid(&self.technician_id)?,
      article_id:      decode_uuid(&self.article_id)?,
      balance:         decode_qty(&self.balance)?,
      min_qty:         decode_qty(&self.min_qty)?,
      raised_at:       decode_dt(&self.raised_at)?,
      acknowledged_at: decode_opt_dt(self.acknowledged_at)?,
      acknowledged_by: decode_opt_uuid(self.acknowledged_by)?,
    })
  }
}

// ─── Carts ───────────────────────────────────────────────────────────────────

pub fn decode_cart_status(s: &str) -> Result<CartStatus> {
  CartStatus::parse(s).ok_or_else(|| unknown("cart status", s))
}

pub const CART_LINE_COLUMNS: &str = "line_id, article_id, quantity, notes";

pub struct RawCartLine {
  pub line_id:    String,
  pub article_id: String,
  pub quantity:   String,
  pub notes:      String,
}

impl RawCartLine {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      line_id:    row.get(0)?,
      article_id: row.get(1)?,
      quantity:   row.get(2)?,
      notes:      row.get(3)?,
    })
  }

  pub fn into_line(self) -> Result<CartLine> {
    Ok(CartLine {
      line_id:    decode_uuid(&self.line_id)?,
      article_id: decode_uuid(&self.article_id)?,
      quantity:   decode_qty(&self.quantity)?,
      notes:      self.notes,
    })
  }
}

// ─── Demands ─────────────────────────────────────────────────────────────────

pub const DEMAND_COLUMNS: &str = "demand_id, technician_id, status, notes, refusal_reason, \
                                  approval_notes, approved_by, approved_at, prepared_by, \
                                  prepared_at, handover_method, handover_data, \
                                  handed_over_at, created_at, updated_at";

pub struct RawDemand {
  pub demand_id:       String,
  pub technician_id:   String,
  pub status:          String,
  pub notes:           String,
  pub refusal_reason:  Option<String>,
  pub approval_notes:  Option<String>,
  pub approved_by:     Option<String>,
  pub approved_at:     Option<String>,
  pub prepared_by:     Option<String>,
  pub prepared_at:     Option<String>,
  pub handover_method: Option<String>,
  pub handover_data:   Option<String>,
  pub handed_over_at:  Option<String>,
  pub created_at:      String,
  pub updated_at:      String,
}

impl RawDemand {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      demand_id:       row.get(0)?,
      technician_id:   row.get(1)?,
      status:          row.get(2)?,
      notes:           row.get(3)?,
      refusal_reason:  row.get(4)?,
      approval_notes:  row.get(5)?,
      approved_by:     row.get(6)?,
      approved_at:     row.get(7)?,
      prepared_by:     row.get(8)?,
      prepared_at:     row.get(9)?,
      handover_method: row.get(10)?,
      handover_data:   row.get(11)?,
      handed_over_at:  row.get(12)?,
      created_at:      row.get(13)?,
      updated_at:      row.get(14)?,
    })
  }

  pub fn into_demand(self, lines: Vec<DemandLine>) -> Result<Demand> {
    let handover_method = self
      .handover_method
      .as_deref()
      .map(|m| HandoverMethod::parse(m).ok_or_else(|| unknown("handover method", m)))
      .transpose()?;
    let handover_data = self
      .handover_data
      .as_deref()
      .map(serde_json::from_str)
      .transpose()?;

    Ok(Demand {
      demand_id: decode_uuid(&self.demand_id)?,
      technician_id: decode_uuid(&self.technician_id)?,
      status: DemandStatus::parse(&self.status)
        .ok_or_else(|| unknown("demand status", &self.status))?,
      notes: self.notes,
      refusal_reason: self.refusal_reason,
      approval_notes: self.approval_notes,
      approved_by: decode_opt_uuid(self.approved_by)?,
      approved_at: decode_opt_dt(self.approved_at)?,
      prepared_by: decode_opt_uuid(self.prepared_by)?,
      prepared_at: decode_opt_dt(self.prepared_at)?,
      handover_method,
      handover_data,
      handed_over_at: decode_opt_dt(self.handed_over_at)?,
      lines,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

pub const DEMAND_LINE_COLUMNS: &str =
  "line_id, article_id, requested_qty, approved_qty, prepared_qty, notes";

pub struct RawDemandLine {
  pub line_id:       String,
  pub article_id:    String,
  pub requested_qty: String,
  pub approved_qty:  String,
  pub prepared_qty:  String,
  pub notes:         String,
}

impl RawDemandLine {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      line_id:       row.get(0)?,
      article_id:    row.get(1)?,
      requested_qty: row.get(2)?,
      approved_qty:  row.get(3)?,
      prepared_qty:  row.get(4)?,
      notes:         row.get(5)?,
    })
  }

  pub fn into_line(self) -> Result<DemandLine> {
    Ok(DemandLine {
      line_id:       decode_uuid(&self.line_id)?,
      article_id:    decode_uuid(&self.article_id)?,
      requested_qty: decode_qty(&self.requested_qty)?,
      approved_qty:  decode_qty(&self.approved_qty)?,
      prepared_qty:  decode_qty(&self.prepared_qty)?,
      notes:         self.notes,
    })
  }
}

// ─── Reservations ────────────────────────────────────────────────────────────

pub const RESERVATION_COLUMNS: &str = "reservation_id, technician_id, article_id, qty_reserved, \
                                       scheduled_for, status, notes, created_by, approved_by, \
                                       approved_at, cancelled_at, consumed_at, created_at";

pub struct RawReservation {
  pub reservation_id: String,
  pub technician_id:  String,
  pub article_id:     String,
  pub qty_reserved:   String,
  pub scheduled_for:  Option<String>,
  pub status:         String,
  pub notes:          String,
  pub created_by:     String,
  pub approved_by:    Option<String>,
  pub approved_at:    Option<String>,
  pub cancelled_at:   Option<String>,
  pub consumed_at:    Option<String>,
  pub created_at:     String,
}

impl RawReservation {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      reservation_id: row.get(0)?,
      technician_id:  row.get(1)?,
      article_id:     row.get(2)?,
      qty_reserved:   row.get(3)?,
      scheduled_for:  row.get(4)?,
      status:         row.get(5)?,
      notes:          row.get(6)?,
      created_by:     row.get(7)?,
      approved_by:    row.get(8)?,
      approved_at:    row.get(9)?,
      cancelled_at:   row.get(10)?,
      consumed_at:    row.get(11)?,
      created_at:     row.get(12)?,
    })
  }

  pub fn into_reservation(self) -> Result<Reservation> {
    Ok(Reservation {
      reservation_id: decode_uuid(&self.reservation_id)?,
      technician_id:  decode_uuid(&self.technician_id)?,
      article_id:     decode_uuid(&self.article_id)?,
      qty_reserved:   decode_qty(&self.qty_reserved)?,
      scheduled_for:  decode_opt_dt(self.scheduled_for)?,
      status:         ReservationStatus::parse(&self.status)
        .ok_or_else(|| unknown("reservation status", &self.status))?,
      notes:          self.notes,
      created_by:     decode_uuid(&self.created_by)?,
      approved_by:    decode_opt_uuid(self.approved_by)?,
      approved_at:    decode_opt_dt(self.approved_at)?,
      cancelled_at:   decode_opt_dt(self.cancelled_at)?,
      consumed_at:    decode_opt_dt(self.consumed_at)?,
      created_at:     decode_dt(&self.created_at)?,
    })
  }
}

// ─── Audit ───────────────────────────────────────────────────────────────────

pub const AUDIT_COLUMNS: &str = "seq, event_id, prev_hash, this_hash, actor_id, event_type, \
                                 entity_type, entity_id, payload, recorded_at";

pub struct RawAuditEvent {
  pub seq:         i64,
  pub event_id:    String,
  pub prev_hash:   String,
  pub this_hash:   String,
  pub actor_id:    String,
  pub event_type:  String,
  pub entity_type: String,
  pub entity_id:   String,
  pub payload:     String,
  pub recorded_at: String,
}

impl RawAuditEvent {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      seq:         row.get(0)?,
      event_id:    row.get(1)?,
      prev_hash:   row.get(2)?,
      this_hash:   row.get(3)?,
      actor_id:    row.get(4)?,
      event_type:  row.get(5)?,
      entity_type: row.get(6)?,
      entity_id:   row.get(7)?,
      payload:     row.get(8)?,
      recorded_at: row.get(9)?,
    })
  }

  pub fn into_event(self) -> Result<AuditEvent> {
    Ok(AuditEvent {
      seq:         self.seq,
      event_id:    decode_uuid(&self.event_id)?,
      prev_hash:   self.prev_hash,
      this_hash:   self.this_hash,
      actor_id:    decode_uuid(&self.actor_id)?,
      event_type:  self.event_type,
      entity_type: self.entity_type,
      entity_id:   self.entity_id,
      payload:     serde_json::from_str(&self.payload)?,
      recorded_at: decode_dt(&self.recorded_at)?,
    })
  }
}
