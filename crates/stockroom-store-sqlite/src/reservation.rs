//! Reservations: holds against future availability.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension as _};
use serde_json::json;
use stockroom_core::{
  actor::Actor,
  audit::{event, NewAuditEvent},
  reservation::{NewReservation, Reservation, ReservationAction, ReservationStatus},
  stock::StockKey,
  store::ReservationStore,
  Error as CoreError,
};
use tracing::info;
use uuid::Uuid;

use crate::{
  audit::append,
  catalog::load_article,
  encode::{encode_dt, encode_qty, encode_uuid, RawReservation, RESERVATION_COLUMNS},
  ledger::{lock_stock, save_level},
  store::now,
  Result, SqliteStore,
};

fn find_reservation(conn: &Connection, reservation_id: Uuid) -> Result<Option<Reservation>> {
  conn
    .query_row(
      &format!("SELECT {RESERVATION_COLUMNS} FROM reservations WHERE reservation_id = ?1"),
      rusqlite::params![encode_uuid(reservation_id)],
      RawReservation::from_row,
    )
    .optional()?
    .map(RawReservation::into_reservation)
    .transpose()
}

/// Fetch a reservation or fail with `NotFound`.
pub(crate) fn load_reservation(conn: &Connection, reservation_id: Uuid) -> Result<Reservation> {
  find_reservation(conn, reservation_id)?
    .ok_or_else(|| CoreError::not_found("reservation", reservation_id).into())
}

/// Close a reservation whose hold has just been released by a usage
/// movement. The caller has already checked the transition.
pub(crate) fn mark_consumed(
  conn: &Connection,
  reservation: &Reservation,
  actor_id: Uuid,
  movement_id: Uuid,
  at: DateTime<Utc>,
) -> Result<()> {
  conn.execute(
    "UPDATE reservations SET status = ?2, consumed_at = ?3 WHERE reservation_id = ?1",
    rusqlite::params![
      encode_uuid(reservation.reservation_id),
      ReservationStatus::Consumed.as_str(),
      encode_dt(at),
    ],
  )?;
  append(
    conn,
    NewAuditEvent::new(
      actor_id,
      event::RESERVATION_CONSUMED,
      "reservation",
      reservation.reservation_id,
      json!({ "movement_id": movement_id, "qty_reserved": reservation.qty_reserved }),
    ),
    at,
  )?;
  Ok(())
}

// ─── ReservationStore impl ───────────────────────────────────────────────────

impl ReservationStore for SqliteStore {
  async fn create_reservation(&self, actor: Actor, input: NewReservation) -> Result<Reservation> {
    actor.require_self_or_admin(input.technician_id, "create a reservation")?;
    self.require_technician(input.technician_id)?;
    input.validate()?;

    let reservation = self
      .write(move |tx| {
        let at = now();
        load_article(tx, input.article_id)?;
        let reservation = Reservation {
          reservation_id: Uuid::new_v4(),
          technician_id:  input.technician_id,
          article_id:     input.article_id,
          qty_reserved:   input.qty_reserved,
          scheduled_for:  input.scheduled_for,
          status:         ReservationStatus::Pending,
          notes:          input.notes.unwrap_or_default(),
          created_by:     actor.user_id,
          approved_by:    None,
          approved_at:    None,
          cancelled_at:   None,
          consumed_at:    None,
          created_at:     at,
        };
        tx.execute(
          "INSERT INTO reservations (
             reservation_id, technician_id, article_id, qty_reserved, scheduled_for,
             status, notes, created_by, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
          rusqlite::params![
            encode_uuid(reservation.reservation_id),
            encode_uuid(reservation.technician_id),
            encode_uuid(reservation.article_id),
            encode_qty(reservation.qty_reserved),
            reservation.scheduled_for.map(encode_dt),
            reservation.status.as_str(),
            reservation.notes,
            encode_uuid(reservation.created_by),
            encode_dt(at),
          ],
        )?;
        append(
          tx,
          NewAuditEvent::new(
            actor.user_id,
            event::RESERVATION_CREATED,
            "reservation",
            reservation.reservation_id,
            json!({
              "technician_id": reservation.technician_id,
              "article_id":    reservation.article_id,
              "qty_reserved":  reservation.qty_reserved,
            }),
          ),
          at,
        )?;
        Ok(reservation)
      })
      .await?;

    info!(reservation_id = %reservation.reservation_id, "reservation created");
    Ok(reservation)
  }

  async fn approve_reservation(&self, actor: Actor, reservation_id: Uuid) -> Result<Reservation> {
    actor.require_admin("approve a reservation")?;

    let reservation = self
      .write(move |tx| {
        let at = now();
        let reservation = load_reservation(tx, reservation_id)?;
        let next = reservation.status.transition(ReservationAction::Approve)?;

        let key = StockKey::new(reservation.technician_id, reservation.article_id);
        let (mut level, _) = lock_stock(tx, key, at)?;
        level.reserve(reservation.qty_reserved)?;
        level.updated_at = at;
        save_level(tx, &level)?;

        tx.execute(
          "UPDATE reservations SET status = ?2, approved_by = ?3, approved_at = ?4
           WHERE reservation_id = ?1",
          rusqlite::params![
            encode_uuid(reservation_id),
            next.as_str(),
            encode_uuid(actor.user_id),
            encode_dt(at),
          ],
        )?;
        append(
          tx,
          NewAuditEvent::new(
            actor.user_id,
            event::RESERVATION_APPROVED,
            "reservation",
            reservation_id,
            json!({
              "qty_reserved": reservation.qty_reserved,
              "reserved_qty": level.reserved_qty,
            }),
          ),
          at,
        )?;
        load_reservation(tx, reservation_id)
      })
      .await?;

    info!(
      reservation_id = %reservation_id,
      qty = %reservation.qty_reserved,
      "reservation approved"
    );
    Ok(reservation)
  }

  async fn cancel_reservation(&self, actor: Actor, reservation_id: Uuid) -> Result<Reservation> {
    self
      .write(move |tx| {
        let at = now();
        let reservation = load_reservation(tx, reservation_id)?;
        actor.require_self_or_admin(reservation.technician_id, "cancel a reservation")?;
        let next = reservation.status.transition(ReservationAction::Cancel)?;

        if reservation.status.holds_stock() {
          let key = StockKey::new(reservation.technician_id, reservation.article_id);
          let (mut level, _) = lock_stock(tx, key, at)?;
          level.release(reservation.qty_reserved)?;
          level.updated_at = at;
          save_level(tx, &level)?;
        }

        tx.execute(
          "UPDATE reservations SET status = ?2, cancelled_at = ?3 WHERE reservation_id = ?1",
          rusqlite::params![encode_uuid(reservation_id), next.as_str(), encode_dt(at)],
        )?;
        append(
          tx,
          NewAuditEvent::new(
            actor.user_id,
            event::RESERVATION_CANCELLED,
            "reservation",
            reservation_id,
            json!({ "from": reservation.status.as_str() }),
          ),
          at,
        )?;
        load_reservation(tx, reservation_id)
      })
      .await
  }

  async fn get_reservation(&self, reservation_id: Uuid) -> Result<Option<Reservation>> {
    self.read(move |conn| find_reservation(conn, reservation_id)).await
  }

  async fn list_reservations(&self, technician_id: Option<Uuid>) -> Result<Vec<Reservation>> {
    let raws: Vec<RawReservation> = self
      .read(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {RESERVATION_COLUMNS} FROM reservations
           WHERE (?1 IS NULL OR technician_id = ?1)
           ORDER BY created_at, rowid"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![technician_id.map(encode_uuid)], RawReservation::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawReservation::into_reservation).collect()
  }
}
