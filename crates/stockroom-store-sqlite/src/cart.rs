//! Carts and their submission into demands.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rusqlite::{Connection, OptionalExtension as _};
use serde_json::json;
use stockroom_core::{
  actor::Actor,
  audit::{event, NewAuditEvent},
  cart::{merge_notes, AddToCart, Cart, CartStatus},
  demand::Demand,
  stock::{checked_sum, ensure_positive},
  store::CartStore,
  Error as CoreError,
};
use tracing::info;
use uuid::Uuid;

use crate::{
  audit::append,
  catalog::load_article,
  demand::{insert_demand, load_demand},
  encode::{
    decode_cart_status, decode_dt, decode_uuid, encode_dt, encode_qty, encode_uuid, RawCartLine,
    CART_LINE_COLUMNS,
  },
  store::now,
  Result, SqliteStore,
};

/// The id of `technician_id`'s open cart, creating one if none exists.
fn open_cart(conn: &Connection, technician_id: Uuid, at: DateTime<Utc>) -> Result<Uuid> {
  let existing: Option<String> = conn
    .query_row(
      "SELECT cart_id FROM carts WHERE technician_id = ?1 AND status = 'open'",
      rusqlite::params![encode_uuid(technician_id)],
      |r| r.get(0),
    )
    .optional()?;
  if let Some(id) = existing {
    return decode_uuid(&id);
  }

  let cart_id = Uuid::new_v4();
  conn.execute(
    "INSERT INTO carts (cart_id, technician_id, status, created_at, updated_at)
     VALUES (?1, ?2, ?3, ?4, ?4)",
    rusqlite::params![
      encode_uuid(cart_id),
      encode_uuid(technician_id),
      CartStatus::Open.as_str(),
      encode_dt(at)
    ],
  )?;
  Ok(cart_id)
}

fn load_cart(conn: &Connection, cart_id: Uuid) -> Result<Cart> {
  let (technician_id, status, created_at, updated_at): (String, String, String, String) = conn
    .query_row(
      "SELECT technician_id, status, created_at, updated_at FROM carts WHERE cart_id = ?1",
      rusqlite::params![encode_uuid(cart_id)],
      |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
    )
    .optional()?
    .ok_or_else(|| CoreError::not_found("cart", cart_id))?;

  let mut stmt = conn.prepare(&format!(
    "SELECT {CART_LINE_COLUMNS} FROM cart_lines WHERE cart_id = ?1 ORDER BY rowid"
  ))?;
  let lines = stmt
    .query_map(rusqlite::params![encode_uuid(cart_id)], RawCartLine::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?
    .into_iter()
    .map(RawCartLine::into_line)
    .collect::<Result<Vec<_>>>()?;

  Ok(Cart {
    cart_id,
    technician_id: decode_uuid(&technician_id)?,
    status: decode_cart_status(&status)?,
    lines,
    created_at: decode_dt(&created_at)?,
    updated_at: decode_dt(&updated_at)?,
  })
}

fn touch(conn: &Connection, cart_id: Uuid, at: DateTime<Utc>) -> Result<()> {
  conn.execute(
    "UPDATE carts SET updated_at = ?2 WHERE cart_id = ?1",
    rusqlite::params![encode_uuid(cart_id), encode_dt(at)],
  )?;
  Ok(())
}

fn cart_event(
  actor: Actor,
  event_type: &'static str,
  cart: Uuid,
  payload: serde_json::Value,
) -> NewAuditEvent {
  NewAuditEvent::new(actor.user_id, event_type, "cart", cart, payload)
}

// ─── CartStore impl ──────────────────────────────────────────────────────────

impl CartStore for SqliteStore {
  async fn cart(&self, actor: Actor, technician_id: Uuid) -> Result<Cart> {
    actor.require_self_or_admin(technician_id, "view a cart")?;
    self.require_technician(technician_id)?;

    self
      .write(move |tx| {
        let cart_id = open_cart(tx, technician_id, now())?;
        load_cart(tx, cart_id)
      })
      .await
  }

  async fn add_to_cart(&self, actor: Actor, input: AddToCart) -> Result<Cart> {
    actor.require_self_or_admin(input.technician_id, "add to a cart")?;
    self.require_technician(input.technician_id)?;
    ensure_positive(input.quantity)?;

    self
      .write(move |tx| {
        let at = now();
        let article = load_article(tx, input.article_id)?;
        if !article.is_active {
          return Err(CoreError::InactiveArticle(article.article_id).into());
        }

        let cart_id = open_cart(tx, input.technician_id, at)?;
        let cart = load_cart(tx, cart_id)?;
        let line_id = match cart.line_for_article(input.article_id) {
          Some(line) => {
            let quantity = checked_sum("quantity", line.quantity, input.quantity)?;
            let notes = merge_notes(&line.notes, input.notes.as_deref());
            tx.execute(
              "UPDATE cart_lines SET quantity = ?2, notes = ?3 WHERE line_id = ?1",
              rusqlite::params![encode_uuid(line.line_id), encode_qty(quantity), notes],
            )?;
            line.line_id
          }
          None => {
            let line_id = Uuid::new_v4();
            tx.execute(
              "INSERT INTO cart_lines (line_id, cart_id, article_id, quantity, notes)
               VALUES (?1, ?2, ?3, ?4, ?5)",
              rusqlite::params![
                encode_uuid(line_id),
                encode_uuid(cart_id),
                encode_uuid(input.article_id),
                encode_qty(input.quantity),
                merge_notes("", input.notes.as_deref()),
              ],
            )?;
            line_id
          }
        };
        touch(tx, cart_id, at)?;
        append(
          tx,
          cart_event(
            actor,
            event::CART_LINE_ADDED,
            cart_id,
            json!({
              "line_id":    line_id,
              "article_id": input.article_id,
              "quantity":   input.quantity,
            }),
          ),
          at,
        )?;
        load_cart(tx, cart_id)
      })
      .await
  }

  async fn update_cart_line(
    &self,
    actor: Actor,
    technician_id: Uuid,
    line_id: Uuid,
    quantity: Decimal,
  ) -> Result<Cart> {
    actor.require_self_or_admin(technician_id, "change a cart")?;
    self.require_technician(technician_id)?;

    self
      .write(move |tx| {
        let at = now();
        let cart_id = open_cart(tx, technician_id, at)?;
        let cart = load_cart(tx, cart_id)?;
        if cart.line(line_id).is_none() {
          return Err(CoreError::not_found("cart line", line_id).into());
        }

        let (event_type, payload) = if quantity <= Decimal::ZERO {
          tx.execute(
            "DELETE FROM cart_lines WHERE line_id = ?1",
            rusqlite::params![encode_uuid(line_id)],
          )?;
          (event::CART_LINE_REMOVED, json!({ "line_id": line_id }))
        } else {
          tx.execute(
            "UPDATE cart_lines SET quantity = ?2 WHERE line_id = ?1",
            rusqlite::params![encode_uuid(line_id), encode_qty(quantity)],
          )?;
          (event::CART_LINE_UPDATED, json!({ "line_id": line_id, "quantity": quantity }))
        };
        touch(tx, cart_id, at)?;
        append(tx, cart_event(actor, event_type, cart_id, payload), at)?;
        load_cart(tx, cart_id)
      })
      .await
  }

  async fn remove_cart_line(
    &self,
    actor: Actor,
    technician_id: Uuid,
    line_id: Uuid,
  ) -> Result<Cart> {
    self.update_cart_line(actor, technician_id, line_id, Decimal::ZERO).await
  }

  async fn clear_cart(&self, actor: Actor, technician_id: Uuid) -> Result<Cart> {
    actor.require_self_or_admin(technician_id, "clear a cart")?;
    self.require_technician(technician_id)?;

    self
      .write(move |tx| {
        let at = now();
        let cart_id = open_cart(tx, technician_id, at)?;
        let removed = tx.execute(
          "DELETE FROM cart_lines WHERE cart_id = ?1",
          rusqlite::params![encode_uuid(cart_id)],
        )?;
        if removed > 0 {
          touch(tx, cart_id, at)?;
          let payload = json!({ "lines": removed });
          append(tx, cart_event(actor, event::CART_CLEARED, cart_id, payload), at)?;
        }
        load_cart(tx, cart_id)
      })
      .await
  }

  async fn submit_cart(
    &self,
    actor: Actor,
    technician_id: Uuid,
    notes: Option<String>,
  ) -> Result<Demand> {
    actor.require_self_or_admin(technician_id, "submit a cart")?;
    self.require_technician(technician_id)?;

    let demand = self
      .write(move |tx| {
        let at = now();
        let cart_id = open_cart(tx, technician_id, at)?;
        let cart = load_cart(tx, cart_id)?;
        if cart.is_empty() {
          return Err(CoreError::EmptyCart.into());
        }

        let demand_id = insert_demand(tx, &cart, notes.unwrap_or_default(), at)?;
        tx.execute(
          "UPDATE carts SET status = ?2, demand_id = ?3, updated_at = ?4 WHERE cart_id = ?1",
          rusqlite::params![
            encode_uuid(cart_id),
            CartStatus::Submitted.as_str(),
            encode_uuid(demand_id),
            encode_dt(at)
          ],
        )?;
        append(
          tx,
          NewAuditEvent::new(
            actor.user_id,
            event::DEMAND_SUBMITTED,
            "demand",
            demand_id,
            json!({
              "cart_id":       cart_id,
              "technician_id": technician_id,
              "lines":         cart.lines.len(),
            }),
          ),
          at,
        )?;
        load_demand(tx, demand_id)
      })
      .await?;

    info!(demand_id = %demand.demand_id, lines = demand.lines.len(), "cart submitted");
    Ok(demand)
  }
}
