//! The caller identity passed into every mutating operation.
//!
//! Authentication happens outside the core. Callers resolve the user first
//! and hand in an [`Actor`]; the core only enforces role rules.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  Technician,
  Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
  pub user_id: Uuid,
  pub role:    Role,
}

impl Actor {
  pub fn technician(user_id: Uuid) -> Self { Self { user_id, role: Role::Technician } }

  pub fn admin(user_id: Uuid) -> Self { Self { user_id, role: Role::Admin } }

  pub fn is_admin(&self) -> bool { self.role == Role::Admin }

  pub fn require_admin(&self, action: &'static str) -> Result<()> {
    if self.is_admin() { Ok(()) } else { Err(Error::Forbidden(action)) }
  }

  /// Technicians may act on their own resources; admins on anyone's.
  pub fn require_self_or_admin(&self, technician_id: Uuid, action: &'static str) -> Result<()> {
    if self.is_admin() || self.user_id == technician_id {
      Ok(())
    } else {
      Err(Error::Forbidden(action))
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn technician_cannot_act_for_someone_else() {
    let me = Uuid::new_v4();
    let actor = Actor::technician(me);
    assert!(actor.require_self_or_admin(me, "add to cart").is_ok());
    assert!(matches!(
      actor.require_self_or_admin(Uuid::new_v4(), "add to cart"),
      Err(Error::Forbidden(_))
    ));
    assert!(actor.require_admin("approve").is_err());
  }

  #[test]
  fn admin_acts_for_anyone() {
    let actor = Actor::admin(Uuid::new_v4());
    assert!(actor.require_self_or_admin(Uuid::new_v4(), "reserve").is_ok());
    assert!(actor.require_admin("approve").is_ok());
  }
}
