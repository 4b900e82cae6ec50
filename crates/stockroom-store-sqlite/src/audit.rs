//! Appending to and reading the audit chain.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension as _};
use stockroom_core::{
  audit::{self, AuditEvent, AuditQuery, ChainReport, GENESIS_HASH, NewAuditEvent},
  store::AuditStore,
};

use crate::{
  encode::{AUDIT_COLUMNS, RawAuditEvent, encode_dt, encode_uuid},
  Result, SqliteStore,
};

/// Seal `event` onto the current head and insert it.
///
/// Must run inside the caller's immediate transaction so the head cannot move
/// between the read and the insert, and so the event commits or rolls back
/// together with the change it records.
pub(crate) fn append(
  conn: &Connection,
  event: NewAuditEvent,
  at: DateTime<Utc>,
) -> Result<AuditEvent> {
  let (seq, prev_hash) = head(conn)?.unwrap_or((0, GENESIS_HASH.to_string()));
  let sealed = event.seal(seq + 1, &prev_hash, at);

  conn.execute(
    "INSERT INTO audit_events (
       seq, event_id, prev_hash, this_hash, actor_id, event_type,
       entity_type, entity_id, payload, recorded_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
    rusqlite::params![
      sealed.seq,
      encode_uuid(sealed.event_id),
      sealed.prev_hash,
      sealed.this_hash,
      encode_uuid(sealed.actor_id),
      sealed.event_type,
      sealed.entity_type,
      sealed.entity_id,
      sealed.payload.to_string(),
      encode_dt(sealed.recorded_at),
    ],
  )?;
  Ok(sealed)
}

fn head(conn: &Connection) -> Result<Option<(i64, String)>> {
  Ok(
    conn
      .query_row(
        "SELECT seq, this_hash FROM audit_events ORDER BY seq DESC LIMIT 1",
        [],
        |r| Ok((r.get(0)?, r.get(1)?)),
      )
      .optional()?,
  )
}

// ─── AuditStore impl ─────────────────────────────────────────────────────────

impl AuditStore for SqliteStore {
  async fn audit_events(&self, query: AuditQuery) -> Result<Vec<AuditEvent>> {
    let raws: Vec<RawAuditEvent> = self
      .read(move |conn| {
        let order = if query.newest_first { "DESC" } else { "ASC" };
        let mut sql = format!(
          "SELECT {AUDIT_COLUMNS} FROM audit_events
           WHERE (?1 IS NULL OR entity_type = ?1)
             AND (?2 IS NULL OR entity_id = ?2)
             AND (?3 IS NULL OR actor_id = ?3)
           ORDER BY seq {order}"
        );
        if let Some(limit) = query.limit {
          sql.push_str(&format!(" LIMIT {limit}"));
        }
        let actor_id = query.actor_id.map(encode_uuid);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(
            rusqlite::params![query.entity_type, query.entity_id, actor_id],
            RawAuditEvent::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAuditEvent::into_event).collect()
  }

  async fn chain_head(&self) -> Result<String> {
    let head = self.read(|conn| head(conn)).await?;
    Ok(head.map_or_else(|| GENESIS_HASH.to_string(), |(_, hash)| hash))
  }

  async fn verify_chain(&self) -> Result<ChainReport> {
    let events = self.audit_events(AuditQuery::default()).await?;
    let report = audit::verify_chain(&events);
    if !report.is_intact() {
      tracing::error!(breaks = report.breaks.len(), "audit chain verification failed");
    }
    Ok(report)
  }
}
