//! Holds against a technician's future availability.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{stock::ensure_positive, Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
  Pending,
  Approved,
  Consumed,
  Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReservationAction {
  Approve,
  Cancel,
  Consume,
}

impl ReservationAction {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Approve => "approve",
      Self::Cancel => "cancel",
      Self::Consume => "consume",
    }
  }
}

impl ReservationStatus {
  pub const ALL: [Self; 4] = [Self::Pending, Self::Approved, Self::Consumed, Self::Cancelled];

  pub fn next(self, action: ReservationAction) -> Option<Self> {
    use ReservationAction as A;
    use ReservationStatus as S;
    match (self, action) {
      (S::Pending, A::Approve) => Some(S::Approved),
      (S::Pending | S::Approved, A::Cancel) => Some(S::Cancelled),
      (S::Approved, A::Consume) => Some(S::Consumed),
      _ => None,
    }
  }

  pub fn transition(self, action: ReservationAction) -> Result<Self> {
    self.next(action).ok_or(Error::InvalidTransition {
      entity: "reservation",
      from:   self.as_str(),
      action: action.as_str(),
    })
  }

  /// Whether a reservation in this status holds quantity on the balance row.
  pub fn holds_stock(self) -> bool { self == Self::Approved }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Pending => "PENDING",
      Self::Approved => "APPROVED",
      Self::Consumed => "CONSUMED",
      Self::Cancelled => "CANCELLED",
    }
  }

  pub fn parse(s: &str) -> Option<Self> { Self::ALL.into_iter().find(|st| st.as_str() == s) }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
  pub reservation_id: Uuid,
  pub technician_id:  Uuid,
  pub article_id:     Uuid,
  pub qty_reserved:   Decimal,
  pub scheduled_for:  Option<DateTime<Utc>>,
  pub status:         ReservationStatus,
  pub notes:          String,
  pub created_by:     Uuid,
  pub approved_by:    Option<Uuid>,
  pub approved_at:    Option<DateTime<Utc>>,
  pub cancelled_at:   Option<DateTime<Utc>>,
  pub consumed_at:    Option<DateTime<Utc>>,
  pub created_at:     DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReservation {
  pub technician_id: Uuid,
  pub article_id:    Uuid,
  pub qty_reserved:  Decimal,
  #[serde(default)]
  pub scheduled_for: Option<DateTime<Utc>>,
  #[serde(default)]
  pub notes:         Option<String>,
}

impl NewReservation {
  pub fn validate(&self) -> Result<()> { ensure_positive(self.qty_reserved) }
}
