//! Demand approval, preparation, and handover.
//!
//! Every transition re-reads the demand inside the immediate transaction and
//! checks the transition table there, so of two admins racing on the same
//! demand the second sees the first one's status and is rejected.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rusqlite::{Connection, OptionalExtension as _};
use serde_json::json;
use stockroom_core::{
  actor::Actor,
  audit::{event, NewAuditEvent},
  cart::Cart,
  demand::{
    clean_reason, resolve_partial, Demand, DemandAction, DemandLine, DemandQuery, DemandStatus,
    Handover, HandoverMethod, HandoverReceipt, IssuedPin, LineApproval,
  },
  stock::{MovementOutcome, MovementReason, NewMovement, StockKey},
  store::DemandStore,
  Error as CoreError,
};
use tracing::info;
use uuid::Uuid;

use crate::{
  audit::append,
  credential::{check_signature, generate_pin, hash_pin, verify_pin},
  encode::{
    decode_dt, decode_uuid, encode_dt, encode_qty, encode_uuid, RawDemand, RawDemandLine,
    DEMAND_COLUMNS, DEMAND_LINE_COLUMNS,
  },
  ledger::{lock_stock, movement_event, post, Posting},
  store::now,
  Result, SqliteStore,
};

// ─── Rows ────────────────────────────────────────────────────────────────────

/// Snapshot `cart` into a new `SUBMITTED` demand. The only writer of demands.
pub(crate) fn insert_demand(
  conn: &Connection,
  cart: &Cart,
  notes: String,
  at: DateTime<Utc>,
) -> Result<Uuid> {
  let demand_id = Uuid::new_v4();
  conn.execute(
    "INSERT INTO demands (demand_id, technician_id, status, notes, created_at, updated_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
    rusqlite::params![
      encode_uuid(demand_id),
      encode_uuid(cart.technician_id),
      DemandStatus::Submitted.as_str(),
      notes.trim(),
      encode_dt(at),
    ],
  )?;
  for line in &cart.lines {
    conn.execute(
      "INSERT INTO demand_lines (
         line_id, demand_id, article_id, requested_qty, approved_qty, prepared_qty, notes
       ) VALUES (?1, ?2, ?3, ?4, ?4, '0', ?5)",
      rusqlite::params![
        encode_uuid(Uuid::new_v4()),
        encode_uuid(demand_id),
        encode_uuid(line.article_id),
        encode_qty(line.quantity),
        line.notes,
      ],
    )?;
  }
  Ok(demand_id)
}

fn load_lines(conn: &Connection, demand_id: Uuid) -> Result<Vec<DemandLine>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {DEMAND_LINE_COLUMNS} FROM demand_lines WHERE demand_id = ?1 ORDER BY rowid"
  ))?;
  stmt
    .query_map(rusqlite::params![encode_uuid(demand_id)], RawDemandLine::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?
    .into_iter()
    .map(RawDemandLine::into_line)
    .collect()
}

fn find_demand(conn: &Connection, demand_id: Uuid) -> Result<Option<Demand>> {
  let raw = conn
    .query_row(
      &format!("SELECT {DEMAND_COLUMNS} FROM demands WHERE demand_id = ?1"),
      rusqlite::params![encode_uuid(demand_id)],
      RawDemand::from_row,
    )
    .optional()?;
  match raw {
    Some(raw) => Ok(Some(raw.into_demand(load_lines(conn, demand_id)?)?)),
    None => Ok(None),
  }
}

/// Fetch a demand with its lines or fail with `NotFound`.
pub(crate) fn load_demand(conn: &Connection, demand_id: Uuid) -> Result<Demand> {
  find_demand(conn, demand_id)?.ok_or_else(|| CoreError::not_found("demand", demand_id).into())
}

fn set_approved_qty(conn: &Connection, line_id: Uuid, qty: Decimal) -> Result<()> {
  conn.execute(
    "UPDATE demand_lines SET approved_qty = ?2 WHERE line_id = ?1",
    rusqlite::params![encode_uuid(line_id), encode_qty(qty)],
  )?;
  Ok(())
}

/// Record an approval decision: status, notes and who decided.
fn record_decision(
  conn: &Connection,
  demand_id: Uuid,
  status: DemandStatus,
  approval_notes: Option<String>,
  refusal_reason: Option<String>,
  actor: Actor,
  at: DateTime<Utc>,
) -> Result<()> {
  conn.execute(
    "UPDATE demands SET status = ?2, approval_notes = ?3, refusal_reason = ?4,
       approved_by = ?5, approved_at = ?6, updated_at = ?6
     WHERE demand_id = ?1",
    rusqlite::params![
      encode_uuid(demand_id),
      status.as_str(),
      approval_notes,
      refusal_reason,
      encode_uuid(actor.user_id),
      encode_dt(at),
    ],
  )?;
  Ok(())
}

fn demand_event(
  actor: Actor,
  event_type: &'static str,
  demand_id: Uuid,
  payload: serde_json::Value,
) -> NewAuditEvent {
  NewAuditEvent::new(actor.user_id, event_type, "demand", demand_id, payload)
}

// ─── DemandStore impl ────────────────────────────────────────────────────────

impl DemandStore for SqliteStore {
  async fn get_demand(&self, demand_id: Uuid) -> Result<Option<Demand>> {
    self.read(move |conn| find_demand(conn, demand_id)).await
  }

  async fn list_demands(&self, query: DemandQuery) -> Result<Vec<Demand>> {
    self
      .read(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {DEMAND_COLUMNS} FROM demands
           WHERE (?1 IS NULL OR technician_id = ?1)
             AND (?2 IS NULL OR status = ?2)
           ORDER BY created_at, rowid"
        ))?;
        let raws = stmt
          .query_map(
            rusqlite::params![
              query.technician_id.map(encode_uuid),
              query.status.map(DemandStatus::as_str),
            ],
            RawDemand::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        raws
          .into_iter()
          .map(|raw| {
            let demand_id = decode_uuid(&raw.demand_id)?;
            raw.into_demand(load_lines(conn, demand_id)?)
          })
          .collect()
      })
      .await
  }

  async fn approve_all(
    &self,
    actor: Actor,
    demand_id: Uuid,
    notes: Option<String>,
  ) -> Result<Demand> {
    actor.require_admin("approve a demand")?;

    let demand = self
      .write(move |tx| {
        let at = now();
        let demand = load_demand(tx, demand_id)?;
        let next = demand.status.transition(DemandAction::ApproveAll)?;
        for line in &demand.lines {
          set_approved_qty(tx, line.line_id, line.requested_qty)?;
        }
        record_decision(tx, demand_id, next, clean_reason(notes.as_deref()), None, actor, at)?;
        append(
          tx,
          demand_event(
            actor,
            event::DEMAND_APPROVED,
            demand_id,
            json!({ "status": next.as_str() }),
          ),
          at,
        )?;
        load_demand(tx, demand_id)
      })
      .await?;

    info!(demand_id = %demand_id, "demand approved in full");
    Ok(demand)
  }

  async fn approve_partial(
    &self,
    actor: Actor,
    demand_id: Uuid,
    approvals: Vec<LineApproval>,
    reason: Option<String>,
  ) -> Result<Demand> {
    actor.require_admin("approve a demand")?;
    let reason_policy = self.policy.partial_reason;

    let demand = self
      .write(move |tx| {
        let at = now();
        let demand = load_demand(tx, demand_id)?;
        let resolution = resolve_partial(&demand, &approvals, reason.as_deref(), reason_policy)?;
        let next = resolution.next_status();

        let mut lines = Vec::with_capacity(demand.lines.len());
        for line in &demand.lines {
          let qty = resolution.approved.get(&line.line_id).copied().unwrap_or_default();
          set_approved_qty(tx, line.line_id, qty)?;
          lines.push(json!({ "line_id": line.line_id, "approved_qty": qty }));
        }

        let reason = clean_reason(reason.as_deref());
        let (event_type, notes, refusal) = match next {
          DemandStatus::Refused => (event::DEMAND_REFUSED, None, reason),
          _ => (event::DEMAND_APPROVED, reason, None),
        };
        record_decision(tx, demand_id, next, notes, refusal, actor, at)?;
        append(
          tx,
          demand_event(
            actor,
            event_type,
            demand_id,
            json!({ "status": next.as_str(), "lines": lines }),
          ),
          at,
        )?;
        load_demand(tx, demand_id)
      })
      .await?;

    info!(demand_id = %demand_id, status = demand.status.as_str(), "demand partially approved");
    Ok(demand)
  }

  async fn refuse(&self, actor: Actor, demand_id: Uuid, reason: String) -> Result<Demand> {
    actor.require_admin("refuse a demand")?;

    self
      .write(move |tx| {
        let at = now();
        let demand = load_demand(tx, demand_id)?;
        let next = demand.status.transition(DemandAction::Refuse)?;
        let reason = clean_reason(Some(reason.as_str()))
          .ok_or(CoreError::ReasonRequired("refusing a demand"))?;
        for line in &demand.lines {
          set_approved_qty(tx, line.line_id, Decimal::ZERO)?;
        }
        record_decision(tx, demand_id, next, None, Some(reason.clone()), actor, at)?;
        append(
          tx,
          demand_event(actor, event::DEMAND_REFUSED, demand_id, json!({ "reason": reason })),
          at,
        )?;
        load_demand(tx, demand_id)
      })
      .await
  }

  async fn prepare(&self, actor: Actor, demand_id: Uuid) -> Result<Demand> {
    actor.require_admin("prepare a demand")?;

    self
      .write(move |tx| {
        let at = now();
        let demand = load_demand(tx, demand_id)?;
        let ready = demand
          .status
          .transition(DemandAction::Prepare)?
          .transition(DemandAction::MarkReady)?;
        tx.execute(
          "UPDATE demand_lines SET prepared_qty = approved_qty WHERE demand_id = ?1",
          rusqlite::params![encode_uuid(demand_id)],
        )?;
        tx.execute(
          "UPDATE demands SET status = ?2, prepared_by = ?3, prepared_at = ?4, updated_at = ?4
           WHERE demand_id = ?1",
          rusqlite::params![
            encode_uuid(demand_id),
            ready.as_str(),
            encode_uuid(actor.user_id),
            encode_dt(at),
          ],
        )?;
        append(
          tx,
          demand_event(
            actor,
            event::DEMAND_PREPARED,
            demand_id,
            json!({ "status": ready.as_str() }),
          ),
          at,
        )?;
        load_demand(tx, demand_id)
      })
      .await
  }

  async fn issue_handover_pin(&self, actor: Actor, demand_id: Uuid) -> Result<IssuedPin> {
    actor.require_admin("issue a handover PIN")?;
    let pin_length = self.policy.pin_length.max(4);
    let ttl = self.policy.pin_ttl();

    let issued = self
      .write(move |tx| {
        let at = now();
        let demand = load_demand(tx, demand_id)?;
        demand.status.transition(DemandAction::IssuePin)?;

        // A new PIN supersedes any outstanding one.
        tx.execute(
          "UPDATE handover_pins SET expires_at = ?2
           WHERE demand_id = ?1 AND used_at IS NULL AND expires_at > ?2",
          rusqlite::params![encode_uuid(demand_id), encode_dt(at)],
        )?;

        let pin = generate_pin(pin_length);
        let expires_at = at + ttl;
        tx.execute(
          "INSERT INTO handover_pins (pin_id, demand_id, pin_hash, expires_at, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![
            encode_uuid(Uuid::new_v4()),
            encode_uuid(demand_id),
            hash_pin(&pin)?,
            encode_dt(expires_at),
            encode_dt(at),
          ],
        )?;
        append(
          tx,
          demand_event(
            actor,
            event::DEMAND_PIN_ISSUED,
            demand_id,
            json!({ "expires_at": encode_dt(expires_at) }),
          ),
          at,
        )?;
        Ok(IssuedPin { demand_id, pin, expires_at })
      })
      .await?;

    info!(demand_id = %demand_id, expires_at = %issued.expires_at, "handover PIN issued");
    Ok(issued)
  }

  async fn handover(
    &self,
    actor: Actor,
    demand_id: Uuid,
    confirmation: Handover,
  ) -> Result<HandoverReceipt> {
    actor.require_admin("hand over a demand")?;
    let signature_max = self.policy.signature_max_bytes;

    let (receipt, changes) = self
      .write(move |tx| {
        let at = now();
        let demand = load_demand(tx, demand_id)?;
        let next = demand.status.transition(DemandAction::HandOver)?;

        let verification = match confirmation.method {
          HandoverMethod::Pin => {
            let pin = confirmation.pin.as_deref().ok_or(CoreError::InvalidCredential)?;
            let (pin_id, pin_hash, expires_at): (String, String, String) = tx
              .query_row(
                "SELECT pin_id, pin_hash, expires_at FROM handover_pins
                 WHERE demand_id = ?1 AND used_at IS NULL
                 ORDER BY rowid DESC LIMIT 1",
                rusqlite::params![encode_uuid(demand_id)],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
              )
              .optional()?
              .ok_or(CoreError::InvalidCredential)?;
            if decode_dt(&expires_at)? <= at {
              return Err(CoreError::InvalidCredential.into());
            }
            verify_pin(pin, &pin_hash)?;
            tx.execute(
              "UPDATE handover_pins SET used_at = ?2 WHERE pin_id = ?1",
              rusqlite::params![pin_id, encode_dt(at)],
            )?;
            json!({ "pin_verified": true })
          }
          HandoverMethod::Signature => {
            let size = check_signature(confirmation.signature_data.as_deref(), signature_max)?;
            json!({ "signature_bytes": size })
          }
        };

        // Deduct in lock order; report in line order.
        let mut lines: Vec<(usize, &DemandLine)> = demand
          .lines
          .iter()
          .enumerate()
          .filter(|(_, l)| l.approved_qty > Decimal::ZERO)
          .collect();
        lines.sort_by_key(|(_, l)| StockKey::new(demand.technician_id, l.article_id));

        let mut outcomes = Vec::with_capacity(lines.len());
        let mut changes = Vec::with_capacity(lines.len());
        for (index, line) in lines {
          let key = StockKey::new(demand.technician_id, line.article_id);
          let (mut level, _) = lock_stock(tx, key, at)?;
          let mut movement = NewMovement::new(key, -line.approved_qty, MovementReason::Handover);
          movement.demand_id = Some(demand_id);
          let posted = post(tx, &mut level, movement, Posting::new(actor.user_id, at))?;
          append(tx, movement_event(&posted.movement), at)?;
          outcomes.push((index, MovementOutcome::from(&posted.movement)));
          changes.push(posted.change);
        }
        outcomes.sort_by_key(|(index, _)| *index);
        let movements: Vec<MovementOutcome> = outcomes.into_iter().map(|(_, o)| o).collect();

        let handover_data = json!({
          "method":       confirmation.method.as_str(),
          "device_info":  confirmation.device_info,
          "verified":     true,
          "verification": verification,
        });
        tx.execute(
          "UPDATE demands SET status = ?2, handover_method = ?3, handover_data = ?4,
             handed_over_at = ?5, updated_at = ?5
           WHERE demand_id = ?1",
          rusqlite::params![
            encode_uuid(demand_id),
            next.as_str(),
            confirmation.method.as_str(),
            handover_data.to_string(),
            encode_dt(at),
          ],
        )?;
        append(
          tx,
          demand_event(
            actor,
            event::DEMAND_HANDED_OVER,
            demand_id,
            json!({
              "method":    confirmation.method.as_str(),
              "movements": movements.iter().map(|m| m.movement_id).collect::<Vec<_>>(),
            }),
          ),
          at,
        )?;
        Ok((HandoverReceipt { demand_id, movements }, changes))
      })
      .await?;

    info!(demand_id = %demand_id, movements = receipt.movements.len(), "demand handed over");
    self.check_thresholds(changes).await;
    Ok(receipt)
  }
}
