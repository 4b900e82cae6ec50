//! The movement ledger and balance store.
//!
//! Every balance change in the crate goes through [`post`]: it checks the
//! delta against the locked [`StockLevel`], writes the movement row, and
//! updates the balance row. Callers add the audit event and own the
//! transaction.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rusqlite::{Connection, OptionalExtension as _};
use serde_json::json;
use stockroom_core::{
  actor::Actor,
  audit::{event, NewAuditEvent},
  reservation::ReservationAction,
  stock::{
    ensure_positive, AdjustStock, AlertQuery, BalanceChange, DeclareUsage, Movement,
    MovementOutcome, MovementQuery, MovementReason, NewMovement, StockKey, StockLevel, Threshold,
    ThresholdAlert,
  },
  store::LedgerStore,
  Error as CoreError,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
  audit::append,
  catalog::load_article,
  encode::{
    encode_dt, encode_qty, encode_uuid, RawAlert, RawMovement, RawStockLevel, RawThreshold,
    ALERT_COLUMNS, MOVEMENT_COLUMNS, STOCK_COLUMNS, THRESHOLD_COLUMNS,
  },
  reservation::{load_reservation, mark_consumed},
  store::now,
  Result, SqliteStore,
};

// ─── Balance rows ────────────────────────────────────────────────────────────

/// Read the balance row for `key`, creating a zero row if absent.
///
/// Only call this inside an immediate transaction: the writer lock is what
/// makes the returned level safe to check and write back. Returns whether the
/// row was created by this call.
pub(crate) fn lock_stock(
  conn: &Connection,
  key: StockKey,
  at: DateTime<Utc>,
) -> Result<(StockLevel, bool)> {
  let created = conn.execute(
    "INSERT OR IGNORE INTO stock_tech
       (technician_id, article_id, balance, reserved_qty, updated_at)
     VALUES (?1, ?2, '0', '0', ?3)",
    rusqlite::params![
      encode_uuid(key.technician_id),
      encode_uuid(key.article_id),
      encode_dt(at)
    ],
  )? == 1;

  let level = conn
    .query_row(
      &format!(
        "SELECT {STOCK_COLUMNS} FROM stock_tech WHERE technician_id = ?1 AND article_id = ?2"
      ),
      rusqlite::params![encode_uuid(key.technician_id), encode_uuid(key.article_id)],
      RawStockLevel::from_row,
    )?
    .into_level()?;
  Ok((level, created))
}

/// Write `level` back after an in-memory change.
pub(crate) fn save_level(conn: &Connection, level: &StockLevel) -> Result<()> {
  conn.execute(
    "UPDATE stock_tech SET balance = ?3, reserved_qty = ?4, updated_at = ?5
     WHERE technician_id = ?1 AND article_id = ?2",
    rusqlite::params![
      encode_uuid(level.technician_id),
      encode_uuid(level.article_id),
      encode_qty(level.balance),
      encode_qty(level.reserved_qty),
      encode_dt(level.updated_at),
    ],
  )?;
  Ok(())
}

// ─── Posting ─────────────────────────────────────────────────────────────────

/// Identity and timing of one movement about to be posted.
pub(crate) struct Posting {
  pub movement_id:        Uuid,
  pub linked_movement_id: Option<Uuid>,
  pub actor_id:           Uuid,
  pub at:                 DateTime<Utc>,
}

impl Posting {
  pub fn new(actor_id: Uuid, at: DateTime<Utc>) -> Self {
    Self { movement_id: Uuid::new_v4(), linked_movement_id: None, actor_id, at }
  }
}

pub(crate) struct Posted {
  pub movement: Movement,
  pub change:   BalanceChange,
}

/// Apply `input` to the locked `level` and record the movement.
///
/// Rejects with `InsufficientStock` when a removal would dig into reserved or
/// missing stock; nothing is written in that case.
pub(crate) fn post(
  conn: &Connection,
  level: &mut StockLevel,
  input: NewMovement,
  posting: Posting,
) -> Result<Posted> {
  let before = level.balance;
  let after = level.balance_after(input.delta)?;
  level.balance = after;
  level.updated_at = posting.at;
  save_level(conn, level)?;

  let movement = Movement {
    movement_id:        posting.movement_id,
    technician_id:      input.technician_id,
    article_id:         input.article_id,
    delta:              input.delta,
    reason:             input.reason,
    actor_id:           posting.actor_id,
    recorded_at:        posting.at,
    balance_after:      after,
    linked_movement_id: posting.linked_movement_id,
    demand_id:          input.demand_id,
    reservation_id:     input.reservation_id,
    location_text:      input.location_text,
    notes:              input.notes,
  };

  conn.execute(
    "INSERT INTO stock_movements (
       movement_id, technician_id, article_id, delta, reason, actor_id,
       recorded_at, balance_after, linked_movement_id, demand_id,
       reservation_id, location_text, notes
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
    rusqlite::params![
      encode_uuid(movement.movement_id),
      encode_uuid(movement.technician_id),
      encode_uuid(movement.article_id),
      encode_qty(movement.delta),
      movement.reason.as_str(),
      encode_uuid(movement.actor_id),
      encode_dt(movement.recorded_at),
      encode_qty(movement.balance_after),
      movement.linked_movement_id.map(encode_uuid),
      movement.demand_id.map(encode_uuid),
      movement.reservation_id.map(encode_uuid),
      movement.location_text,
      movement.notes,
    ],
  )?;

  let change = BalanceChange { key: level.key(), before, after };
  Ok(Posted { movement, change })
}

/// The audit event recording one posted movement.
pub(crate) fn movement_event(m: &Movement) -> NewAuditEvent {
  NewAuditEvent::new(
    m.actor_id,
    event::STOCK_MOVEMENT,
    "stock_movement",
    m.movement_id,
    json!({
      "technician_id":      m.technician_id,
      "article_id":         m.article_id,
      "delta":              m.delta,
      "reason":             m.reason.as_str(),
      "balance_after":      m.balance_after,
      "linked_movement_id": m.linked_movement_id,
      "demand_id":          m.demand_id,
      "reservation_id":     m.reservation_id,
    }),
  )
}

/// Lock, post, and audit a single movement.
pub(crate) fn apply_locked(
  conn: &Connection,
  input: NewMovement,
  actor_id: Uuid,
) -> Result<Posted> {
  let at = now();
  load_article(conn, input.article_id)?;
  let (mut level, _) = lock_stock(conn, input.key(), at)?;
  let posted = post(conn, &mut level, input, Posting::new(actor_id, at))?;
  append(conn, movement_event(&posted.movement), at)?;
  Ok(posted)
}

// ─── Thresholds ──────────────────────────────────────────────────────────────

fn load_threshold(conn: &Connection, key: StockKey) -> Result<Option<Threshold>> {
  conn
    .query_row(
      &format!(
        "SELECT {THRESHOLD_COLUMNS} FROM thresholds WHERE technician_id = ?1 AND article_id = ?2"
      ),
      rusqlite::params![encode_uuid(key.technician_id), encode_uuid(key.article_id)],
      RawThreshold::from_row,
    )
    .optional()?
    .map(RawThreshold::into_threshold)
    .transpose()
}

fn load_alert(conn: &Connection, alert_id: Uuid) -> Result<ThresholdAlert> {
  conn
    .query_row(
      &format!("SELECT {ALERT_COLUMNS} FROM threshold_alerts WHERE alert_id = ?1"),
      rusqlite::params![encode_uuid(alert_id)],
      RawAlert::from_row,
    )
    .optional()?
    .ok_or_else(|| CoreError::not_found("alert", alert_id))?
    .into_alert()
}

/// Record an alert for every change that crossed its threshold downward,
/// outside the cooldown window.
fn record_alerts(
  conn: &Connection,
  changes: &[BalanceChange],
  cooldown: chrono::Duration,
) -> Result<Vec<ThresholdAlert>> {
  let at = now();
  let mut raised = Vec::new();
  for change in changes {
    let Some(threshold) = load_threshold(conn, change.key)? else { continue };
    if !threshold.crossed_downward(change.before, change.after) {
      continue;
    }
    if !threshold.cooled_down(at, cooldown) {
      debug!(
        technician_id = %change.key.technician_id,
        article_id = %change.key.article_id,
        "threshold alert suppressed by cooldown"
      );
      continue;
    }

    let alert = ThresholdAlert {
      alert_id:        Uuid::new_v4(),
      technician_id:   change.key.technician_id,
      article_id:      change.key.article_id,
      balance:         change.after,
      min_qty:         threshold.min_qty,
      raised_at:       at,
      acknowledged_at: None,
      acknowledged_by: None,
    };
    conn.execute(
      "INSERT INTO threshold_alerts (
         alert_id, technician_id, article_id, balance, min_qty, raised_at
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
      rusqlite::params![
        encode_uuid(alert.alert_id),
        encode_uuid(alert.technician_id),
        encode_uuid(alert.article_id),
        encode_qty(alert.balance),
        encode_qty(alert.min_qty),
        encode_dt(at),
      ],
    )?;
    conn.execute(
      "UPDATE thresholds SET last_alert_at = ?3 WHERE technician_id = ?1 AND article_id = ?2",
      rusqlite::params![
        encode_uuid(alert.technician_id),
        encode_uuid(alert.article_id),
        encode_dt(at)
      ],
    )?;
    raised.push(alert);
  }
  Ok(raised)
}

impl SqliteStore {
  /// Check committed balance changes against thresholds and dispatch alerts.
  ///
  /// Runs after the movement has committed. A failure here is logged and
  /// never reaches the caller of the movement.
  pub(crate) async fn check_thresholds(&self, changes: Vec<BalanceChange>) {
    let changes: Vec<BalanceChange> =
      changes.into_iter().filter(|c| c.after < c.before).collect();
    if changes.is_empty() {
      return;
    }
    let cooldown = self.policy.alert_cooldown();
    match self.write(move |tx| record_alerts(tx, &changes, cooldown)).await {
      Ok(alerts) => {
        for alert in &alerts {
          self.alerts.raise(alert);
        }
      }
      Err(e) => warn!(error = %e, "failed to record threshold alerts"),
    }
  }
}

// ─── LedgerStore impl ────────────────────────────────────────────────────────

impl LedgerStore for SqliteStore {
  async fn apply_movement(&self, actor: Actor, movement: NewMovement) -> Result<MovementOutcome> {
    actor.require_admin("apply a movement")?;
    self.require_technician(movement.technician_id)?;

    let posted = self.write(move |tx| apply_locked(tx, movement, actor.user_id)).await?;
    info!(
      movement_id = %posted.movement.movement_id,
      reason = posted.movement.reason.as_str(),
      balance_after = %posted.movement.balance_after,
      "movement applied"
    );
    self.check_thresholds(vec![posted.change]).await;
    Ok(MovementOutcome::from(&posted.movement))
  }

  async fn adjust_stock(&self, actor: Actor, input: AdjustStock) -> Result<MovementOutcome> {
    actor.require_admin("adjust stock")?;
    self.require_technician(input.technician_id)?;

    let posted = self
      .write(move |tx| {
        let at = now();
        load_article(tx, input.article_id)?;
        let key = StockKey::new(input.technician_id, input.article_id);
        let (mut level, created) = lock_stock(tx, key, at)?;
        // `set` is computed against the balance read under the lock.
        let delta = input.operation.delta(input.quantity, level.balance)?;
        let reason = if created && delta.is_sign_positive() {
          MovementReason::Initial
        } else {
          MovementReason::Adjust
        };

        let mut movement = NewMovement::new(key, delta, reason);
        movement.notes = input.reason.unwrap_or_default();
        let posted = post(tx, &mut level, movement, Posting::new(actor.user_id, at))?;
        append(tx, movement_event(&posted.movement), at)?;
        Ok(posted)
      })
      .await?;

    info!(
      movement_id = %posted.movement.movement_id,
      delta = %posted.movement.delta,
      balance_after = %posted.movement.balance_after,
      "stock adjusted"
    );
    self.check_thresholds(vec![posted.change]).await;
    Ok(MovementOutcome::from(&posted.movement))
  }

  async fn declare_usage(&self, actor: Actor, input: DeclareUsage) -> Result<MovementOutcome> {
    actor.require_self_or_admin(input.technician_id, "declare usage")?;
    self.require_technician(input.technician_id)?;
    ensure_positive(input.quantity)?;

    let posted = self
      .write(move |tx| {
        let at = now();
        load_article(tx, input.article_id)?;
        let key = StockKey::new(input.technician_id, input.article_id);
        let (mut level, _) = lock_stock(tx, key, at)?;

        // A referenced reservation gives up its hold in the same step.
        let consumed = match input.reservation_id {
          Some(reservation_id) => {
            let reservation = load_reservation(tx, reservation_id)?;
            if reservation.technician_id != input.technician_id
              || reservation.article_id != input.article_id
            {
              return Err(
                CoreError::validation(
                  "reservation_id",
                  "reservation is for a different technician or article",
                )
                .into(),
              );
            }
            reservation.status.transition(ReservationAction::Consume)?;
            level.release(reservation.qty_reserved)?;
            Some(reservation)
          }
          None => None,
        };

        let mut movement = NewMovement::new(key, -input.quantity, MovementReason::Issue);
        movement.reservation_id = input.reservation_id;
        movement.location_text = input.location_text;
        movement.notes = input.notes.unwrap_or_default();
        let posted = post(tx, &mut level, movement, Posting::new(actor.user_id, at))?;
        append(tx, movement_event(&posted.movement), at)?;

        if let Some(reservation) = consumed {
          mark_consumed(tx, &reservation, actor.user_id, posted.movement.movement_id, at)?;
        }
        Ok(posted)
      })
      .await?;

    info!(
      movement_id = %posted.movement.movement_id,
      technician_id = %posted.movement.technician_id,
      balance_after = %posted.movement.balance_after,
      "usage declared"
    );
    self.check_thresholds(vec![posted.change]).await;
    Ok(MovementOutcome::from(&posted.movement))
  }

  async fn stock_level(&self, technician_id: Uuid, article_id: Uuid) -> Result<StockLevel> {
    let key = StockKey::new(technician_id, article_id);
    let raw: Option<RawStockLevel> = self
      .read(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {STOCK_COLUMNS} FROM stock_tech
                 WHERE technician_id = ?1 AND article_id = ?2"
              ),
              rusqlite::params![encode_uuid(technician_id), encode_uuid(article_id)],
              RawStockLevel::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    match raw {
      Some(raw) => raw.into_level(),
      None => Ok(StockLevel::empty(key, now())),
    }
  }

  async fn list_stock(&self, technician_id: Uuid) -> Result<Vec<StockLevel>> {
    let raws: Vec<RawStockLevel> = self
      .read(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {STOCK_COLUMNS} FROM stock_tech WHERE technician_id = ?1 ORDER BY article_id"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![encode_uuid(technician_id)], RawStockLevel::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawStockLevel::into_level).collect()
  }

  async fn movements(&self, query: MovementQuery) -> Result<Vec<Movement>> {
    let raws: Vec<RawMovement> = self
      .read(move |conn| {
        let mut sql = format!(
          "SELECT {MOVEMENT_COLUMNS} FROM stock_movements
           WHERE (?1 IS NULL OR technician_id = ?1)
             AND (?2 IS NULL OR article_id = ?2)
             AND (?3 IS NULL OR demand_id = ?3)
           ORDER BY rowid"
        );
        if let Some(limit) = query.limit {
          sql.push_str(&format!(" LIMIT {limit}"));
        }
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(
            rusqlite::params![
              query.technician_id.map(encode_uuid),
              query.article_id.map(encode_uuid),
              query.demand_id.map(encode_uuid),
            ],
            RawMovement::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawMovement::into_movement).collect()
  }

  async fn set_threshold(
    &self,
    actor: Actor,
    technician_id: Uuid,
    article_id: Uuid,
    min_qty: Decimal,
  ) -> Result<Threshold> {
    actor.require_admin("set a threshold")?;
    self.require_technician(technician_id)?;
    if min_qty.is_sign_negative() {
      return Err(CoreError::InvalidQuantity(min_qty).into());
    }

    self
      .write(move |tx| {
        let at = now();
        load_article(tx, article_id)?;
        let key = StockKey::new(technician_id, article_id);
        tx.execute(
          "INSERT INTO thresholds (technician_id, article_id, min_qty, is_active)
           VALUES (?1, ?2, ?3, 1)
           ON CONFLICT (technician_id, article_id)
           DO UPDATE SET min_qty = excluded.min_qty, is_active = 1",
          rusqlite::params![
            encode_uuid(technician_id),
            encode_uuid(article_id),
            encode_qty(min_qty)
          ],
        )?;
        append(
          tx,
          NewAuditEvent::new(
            actor.user_id,
            event::THRESHOLD_SET,
            "threshold",
            format!("{technician_id}:{article_id}"),
            json!({
              "technician_id": technician_id,
              "article_id":    article_id,
              "min_qty":       min_qty,
            }),
          ),
          at,
        )?;
        load_threshold(tx, key)?
          .ok_or_else(|| CoreError::not_found("threshold", article_id).into())
      })
      .await
  }

  async fn list_alerts(&self, query: AlertQuery) -> Result<Vec<ThresholdAlert>> {
    let raws: Vec<RawAlert> = self
      .read(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {ALERT_COLUMNS} FROM threshold_alerts
           WHERE (?1 IS NULL OR technician_id = ?1)
             AND (?2 = 0 OR acknowledged_at IS NULL)
           ORDER BY raised_at, rowid"
        ))?;
        let rows = stmt
          .query_map(
            rusqlite::params![query.technician_id.map(encode_uuid), query.unacknowledged],
            RawAlert::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAlert::into_alert).collect()
  }

  async fn acknowledge_alert(&self, actor: Actor, alert_id: Uuid) -> Result<ThresholdAlert> {
    actor.require_admin("acknowledge an alert")?;

    self
      .write(move |tx| {
        let at = now();
        let alert = load_alert(tx, alert_id)?;
        if alert.acknowledged_at.is_some() {
          return Ok(alert);
        }
        tx.execute(
          "UPDATE threshold_alerts SET acknowledged_at = ?2, acknowledged_by = ?3
           WHERE alert_id = ?1",
          rusqlite::params![encode_uuid(alert_id), encode_dt(at), encode_uuid(actor.user_id)],
        )?;
        append(
          tx,
          NewAuditEvent::new(
            actor.user_id,
            event::ALERT_ACKNOWLEDGED,
            "alert",
            alert_id,
            json!({ "technician_id": alert.technician_id, "article_id": alert.article_id }),
          ),
          at,
        )?;
        load_alert(tx, alert_id)
      })
      .await
  }
}
