//! [`SqliteStore`]: construction, collaborators, and the transaction helpers
//! every backend trait impl goes through.

use std::{path::Path, sync::Arc};

use chrono::{DateTime, SubsecRound as _, Utc};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use stockroom_core::{
  actor::Role,
  collab::{AlertSink, Directory, DocumentRenderer, InMemoryDirectory},
  policy::Policy,
  store::StoreBackend,
};
use uuid::Uuid;

use crate::{hooks::TracingAlerts, schema::SCHEMA, Error, Result};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Stockroom ledger backed by a single SQLite file.
///
/// Cloning is cheap; clones share the connection and collaborators. Two
/// stores opened on the same file coordinate through SQLite's locks, which
/// is how several processes share one ledger.
#[derive(Clone)]
pub struct SqliteStore {
  conn:                tokio_rusqlite::Connection,
  pub(crate) policy:   Arc<Policy>,
  directory:           Arc<dyn Directory>,
  pub(crate) alerts:   Arc<dyn AlertSink>,
  pub(crate) renderer: Option<Arc<dyn DocumentRenderer>>,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>, policy: Policy) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn, policy).await
  }

  /// Open an in-memory store with default policy; useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    Self::open_in_memory_with(Policy::default()).await
  }

  pub async fn open_in_memory_with(policy: Policy) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn, policy).await
  }

  async fn init(conn: tokio_rusqlite::Connection, policy: Policy) -> Result<Self> {
    let timeout = policy.lock_timeout();
    conn
      .call(move |conn| {
        conn.busy_timeout(timeout)?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(Self {
      conn,
      policy: Arc::new(policy),
      directory: Arc::new(InMemoryDirectory::new()),
      alerts: Arc::new(TracingAlerts),
      renderer: None,
    })
  }

  /// Resolve technician ids through `directory`. Without one, every
  /// technician id is unknown.
  pub fn with_directory(mut self, directory: impl Directory + 'static) -> Self {
    self.directory = Arc::new(directory);
    self
  }

  pub fn with_alert_sink(mut self, alerts: impl AlertSink + 'static) -> Self {
    self.alerts = Arc::new(alerts);
    self
  }

  pub fn with_renderer(mut self, renderer: impl DocumentRenderer + 'static) -> Self {
    self.renderer = Some(Arc::new(renderer));
    self
  }

  pub fn policy(&self) -> &Policy { &self.policy }

  // ── Transactions ──────────────────────────────────────────────────────

  /// Run `f` inside one `BEGIN IMMEDIATE` transaction.
  ///
  /// The writer lock is taken before `f` reads anything, so a
  /// read-check-write inside `f` cannot interleave with another writer. Any
  /// error rolls the whole transaction back.
  pub(crate) async fn write<R, F>(&self, f: F) -> Result<R>
  where
    F: FnOnce(&Transaction<'_>) -> Result<R> + Send + 'static,
    R: Send + 'static,
  {
    self.conn.call(move |conn| Ok(run_immediate(conn, f))).await?
  }

  /// Run a read-only query outside any explicit transaction.
  pub(crate) async fn read<R, F>(&self, f: F) -> Result<R>
  where
    F: FnOnce(&Connection) -> Result<R> + Send + 'static,
    R: Send + 'static,
  {
    self.conn.call(move |conn| Ok(f(conn))).await?
  }

  // ── Collaborators ─────────────────────────────────────────────────────

  /// Fail unless the directory knows `technician_id` as a technician.
  /// Only technicians hold stock, carts and reservations.
  pub(crate) fn require_technician(&self, technician_id: Uuid) -> Result<()> {
    match self.directory.role_of(technician_id) {
      Some(Role::Technician) => Ok(()),
      Some(Role::Admin) => {
        let reason = format!("{technician_id} is not a technician");
        Err(stockroom_core::Error::validation("technician_id", reason).into())
      }
      None => Err(stockroom_core::Error::not_found("technician", technician_id).into()),
    }
  }
}

impl StoreBackend for SqliteStore {
  type Error = Error;
}

fn run_immediate<R>(
  conn: &mut Connection,
  f: impl FnOnce(&Transaction<'_>) -> Result<R>,
) -> Result<R> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
  let out = f(&tx)?;
  tx.commit()?;
  Ok(out)
}

/// The store's clock, truncated to what a stored timestamp can hold.
pub(crate) fn now() -> DateTime<Utc> { Utc::now().trunc_subsecs(6) }
