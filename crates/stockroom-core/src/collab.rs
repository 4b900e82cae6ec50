//! External collaborators the core consumes but does not implement:
//! identity lookup, threshold alert delivery, and transfer document
//! rendering.

use std::{
  collections::HashMap,
  sync::{Arc, RwLock},
};

use uuid::Uuid;

use crate::{actor::Role, stock::ThresholdAlert, transfer::TransferNote};

/// Identity and role lookup.
pub trait Directory: Send + Sync {
  /// The role of `user_id`, or `None` if the user is unknown.
  fn role_of(&self, user_id: Uuid) -> Option<Role>;
}

/// Receives threshold alerts after the triggering movement has committed.
///
/// Implementations must not block for long; delivery failures stay inside
/// the sink.
pub trait AlertSink: Send + Sync {
  fn raise(&self, alert: &ThresholdAlert);
}

/// Renders a transfer note (e.g. to PDF) and returns the document bytes.
pub trait DocumentRenderer: Send + Sync {
  fn render_transfer(
    &self,
    note: &TransferNote,
  ) -> Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>>;
}

// ─── In-memory directory ─────────────────────────────────────────────────────

/// A [`Directory`] backed by a map, for tests and the operator binary.
///
/// Cloning is cheap; clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDirectory {
  users: Arc<RwLock<HashMap<Uuid, Role>>>,
}

impl InMemoryDirectory {
  pub fn new() -> Self { Self::default() }

  pub fn insert(&self, user_id: Uuid, role: Role) {
    let mut users = self.users.write().unwrap_or_else(|e| e.into_inner());
    users.insert(user_id, role);
  }
}

impl FromIterator<(Uuid, Role)> for InMemoryDirectory {
  fn from_iter<I: IntoIterator<Item = (Uuid, Role)>>(iter: I) -> Self {
    Self { users: Arc::new(RwLock::new(iter.into_iter().collect())) }
  }
}

impl Directory for InMemoryDirectory {
  fn role_of(&self, user_id: Uuid) -> Option<Role> {
    let users = self.users.read().unwrap_or_else(|e| e.into_inner());
    users.get(&user_id).copied()
  }
}
