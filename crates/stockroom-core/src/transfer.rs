//! Technician-to-technician transfers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  stock::{ensure_positive, MovementOutcome, StockKey},
  Error, Result,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransfer {
  pub from_technician_id: Uuid,
  pub to_technician_id:   Uuid,
  pub article_id:         Uuid,
  pub quantity:           Decimal,
  #[serde(default)]
  pub notes:              Option<String>,
}

impl NewTransfer {
  pub fn validate(&self) -> Result<()> {
    ensure_positive(self.quantity)?;
    if self.from_technician_id == self.to_technician_id {
      return Err(Error::SameTechnician);
    }
    Ok(())
  }

  pub fn source(&self) -> StockKey { StockKey::new(self.from_technician_id, self.article_id) }

  pub fn destination(&self) -> StockKey { StockKey::new(self.to_technician_id, self.article_id) }
}

/// Both halves of a committed transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferReceipt {
  pub transfer_id: Uuid,
  /// The negative movement at the source.
  pub issue:       MovementOutcome,
  /// The positive movement at the destination.
  pub receipt:     MovementOutcome,
}

/// Data handed to a [`DocumentRenderer`](crate::collab::DocumentRenderer)
/// once a transfer has committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferNote {
  pub transfer_id:         Uuid,
  pub from_technician_id:  Uuid,
  pub to_technician_id:    Uuid,
  pub article_id:          Uuid,
  pub article_reference:   String,
  pub article_name:        String,
  pub quantity:            Decimal,
  pub notes:               String,
  pub actor_id:            Uuid,
  pub recorded_at:         DateTime<Utc>,
  pub issue_movement_id:   Uuid,
  pub receipt_movement_id: Uuid,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn transfer(from: Uuid, to: Uuid, qty: i64) -> NewTransfer {
    NewTransfer {
      from_technician_id: from,
      to_technician_id:   to,
      article_id:         Uuid::new_v4(),
      quantity:           Decimal::from(qty),
      notes:              None,
    }
  }

  #[test]
  fn rejects_self_transfer_and_bad_quantity() {
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    assert!(matches!(transfer(a, a, 1).validate(), Err(Error::SameTechnician)));
    assert!(matches!(transfer(a, b, 0).validate(), Err(Error::InvalidQuantity(_))));
    assert!(matches!(transfer(a, b, -2).validate(), Err(Error::InvalidQuantity(_))));
    assert!(transfer(a, b, 2).validate().is_ok());
  }
}
