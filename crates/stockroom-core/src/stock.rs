//! Stock balances, the movement ledger, and threshold alerts.
//!
//! Movements are immutable. A technician's balance for an article is always
//! the sum of that pair's movement deltas; [`StockLevel`] is the materialised
//! form of that sum plus the quantity held by approved reservations.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Reject zero and negative quantities.
pub fn ensure_positive(quantity: Decimal) -> Result<()> {
  if quantity > Decimal::ZERO { Ok(()) } else { Err(Error::InvalidQuantity(quantity)) }
}

/// `a + b`, or a validation error when the sum leaves `Decimal`'s range.
pub fn checked_sum(field: &'static str, a: Decimal, b: Decimal) -> Result<Decimal> {
  a.checked_add(b).ok_or_else(|| Error::validation(field, "quantity overflow"))
}

// ─── Keys and levels ─────────────────────────────────────────────────────────

/// Identifies one balance row. Ordering is the lock-acquisition order for
/// operations that touch more than one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StockKey {
  pub technician_id: Uuid,
  pub article_id:    Uuid,
}

impl StockKey {
  pub fn new(technician_id: Uuid, article_id: Uuid) -> Self { Self { technician_id, article_id } }
}

/// Current balance of one technician for one article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockLevel {
  pub technician_id: Uuid,
  pub article_id:    Uuid,
  pub balance:       Decimal,
  pub reserved_qty:  Decimal,
  pub updated_at:    DateTime<Utc>,
}

impl StockLevel {
  /// An untouched row: what the store creates lazily on first access.
  pub fn empty(key: StockKey, at: DateTime<Utc>) -> Self {
    Self {
      technician_id: key.technician_id,
      article_id:    key.article_id,
      balance:       Decimal::ZERO,
      reserved_qty:  Decimal::ZERO,
      updated_at:    at,
    }
  }

  pub fn key(&self) -> StockKey { StockKey::new(self.technician_id, self.article_id) }

  pub fn available(&self) -> Decimal { self.balance - self.reserved_qty }

  /// The balance after applying `delta`, or the reason it may not be applied.
  ///
  /// Removing stock may never dig into the reserved quantity.
  pub fn balance_after(&self, delta: Decimal) -> Result<Decimal> {
    if delta.is_zero() {
      return Err(Error::validation("delta", "must not be zero"));
    }
    let after = checked_sum("quantity", self.balance, delta)?;
    if delta.is_sign_negative() && after < self.reserved_qty {
      return Err(Error::InsufficientStock {
        requested: -delta,
        available: self.available(),
      });
    }
    Ok(after)
  }

  /// Hold `quantity` against future use.
  pub fn reserve(&mut self, quantity: Decimal) -> Result<()> {
    if quantity > self.available() {
      return Err(Error::InsufficientAvailable {
        requested: quantity,
        available: self.available(),
      });
    }
    self.reserved_qty = checked_sum("quantity", self.reserved_qty, quantity)?;
    Ok(())
  }

  /// Release a previously reserved hold.
  pub fn release(&mut self, quantity: Decimal) -> Result<()> {
    if quantity > self.reserved_qty {
      return Err(Error::validation(
        "qty_reserved",
        format!("cannot release {quantity}, only {} reserved", self.reserved_qty),
      ));
    }
    self.reserved_qty -= quantity;
    Ok(())
  }
}

// ─── Movements ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementReason {
  Initial,
  Adjust,
  /// Declared usage in the field.
  Issue,
  Handover,
  TransferOut,
  TransferIn,
}

impl MovementReason {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Initial => "INITIAL",
      Self::Adjust => "ADJUST",
      Self::Issue => "ISSUE",
      Self::Handover => "HANDOVER",
      Self::TransferOut => "TRANSFER_OUT",
      Self::TransferIn => "TRANSFER_IN",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    Some(match s {
      "INITIAL" => Self::Initial,
      "ADJUST" => Self::Adjust,
      "ISSUE" => Self::Issue,
      "HANDOVER" => Self::Handover,
      "TRANSFER_OUT" => Self::TransferOut,
      "TRANSFER_IN" => Self::TransferIn,
      _ => return None,
    })
  }
}

/// One immutable ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Movement {
  pub movement_id:        Uuid,
  pub technician_id:      Uuid,
  pub article_id:         Uuid,
  /// Signed quantity change.
  pub delta:              Decimal,
  pub reason:             MovementReason,
  pub actor_id:           Uuid,
  pub recorded_at:        DateTime<Utc>,
  pub balance_after:      Decimal,
  /// The other half of a transfer pair.
  pub linked_movement_id: Option<Uuid>,
  pub demand_id:          Option<Uuid>,
  pub reservation_id:     Option<Uuid>,
  pub location_text:      String,
  pub notes:              String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementOutcome {
  pub movement_id:   Uuid,
  pub balance_after: Decimal,
}

impl From<&Movement> for MovementOutcome {
  fn from(m: &Movement) -> Self {
    Self { movement_id: m.movement_id, balance_after: m.balance_after }
  }
}

/// Filter for [`LedgerStore::movements`](crate::store::LedgerStore::movements).
#[derive(Debug, Clone, Default)]
pub struct MovementQuery {
  pub technician_id: Option<Uuid>,
  pub article_id:    Option<Uuid>,
  pub demand_id:     Option<Uuid>,
  pub limit:         Option<usize>,
}

/// A raw ledger write. Workflow operations build these; callers outside the
/// store normally use [`AdjustStock`] or [`DeclareUsage`] instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMovement {
  pub technician_id:  Uuid,
  pub article_id:     Uuid,
  pub delta:          Decimal,
  pub reason:         MovementReason,
  #[serde(default)]
  pub demand_id:      Option<Uuid>,
  #[serde(default)]
  pub reservation_id: Option<Uuid>,
  #[serde(default)]
  pub location_text:  String,
  #[serde(default)]
  pub notes:          String,
}

impl NewMovement {
  pub fn new(key: StockKey, delta: Decimal, reason: MovementReason) -> Self {
    Self {
      technician_id: key.technician_id,
      article_id: key.article_id,
      delta,
      reason,
      demand_id: None,
      reservation_id: None,
      location_text: String::new(),
      notes: String::new(),
    }
  }

  pub fn key(&self) -> StockKey { StockKey::new(self.technician_id, self.article_id) }
}

// ─── Adjustments and usage ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustOperation {
  Add,
  Remove,
  /// Bring the balance to exactly `quantity`.
  Set,
}

impl AdjustOperation {
  /// The signed delta this operation produces against `current` balance.
  ///
  /// For `Set` the current balance must be read under the same lock that
  /// applies the delta.
  pub fn delta(self, quantity: Decimal, current: Decimal) -> Result<Decimal> {
    match self {
      Self::Add => ensure_positive(quantity).map(|_| quantity),
      Self::Remove => ensure_positive(quantity).map(|_| -quantity),
      Self::Set => {
        if quantity.is_sign_negative() {
          return Err(Error::InvalidQuantity(quantity));
        }
        let delta = quantity - current;
        if delta.is_zero() {
          return Err(Error::validation("quantity", "no change in quantity"));
        }
        Ok(delta)
      }
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustStock {
  pub technician_id: Uuid,
  pub article_id:    Uuid,
  pub operation:     AdjustOperation,
  pub quantity:      Decimal,
  pub reason:        Option<String>,
}

/// A technician reporting material used in the field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeclareUsage {
  pub technician_id:  Uuid,
  pub article_id:     Uuid,
  pub quantity:       Decimal,
  pub location_text:  String,
  pub notes:          Option<String>,
  /// An approved reservation this usage draws down.
  pub reservation_id: Option<Uuid>,
}

// ─── Thresholds ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Threshold {
  pub technician_id: Uuid,
  pub article_id:    Uuid,
  pub min_qty:       Decimal,
  pub is_active:     bool,
  pub last_alert_at: Option<DateTime<Utc>>,
}

impl Threshold {
  /// True when a movement took the balance from above `min_qty` to at or
  /// below it.
  pub fn crossed_downward(&self, before: Decimal, after: Decimal) -> bool {
    self.is_active && before > self.min_qty && after <= self.min_qty
  }

  pub fn cooled_down(&self, now: DateTime<Utc>, cooldown: chrono::Duration) -> bool {
    self.last_alert_at.is_none_or(|at| now - at >= cooldown)
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdAlert {
  pub alert_id:        Uuid,
  pub technician_id:   Uuid,
  pub article_id:      Uuid,
  pub balance:         Decimal,
  pub min_qty:         Decimal,
  pub raised_at:       DateTime<Utc>,
  pub acknowledged_at: Option<DateTime<Utc>>,
  pub acknowledged_by: Option<Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct AlertQuery {
  pub technician_id:  Option<Uuid>,
  pub unacknowledged: bool,
}

/// A committed balance change, handed to post-commit threshold checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceChange {
  pub key:    StockKey,
  pub before: Decimal,
  pub after:  Decimal,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn level(balance: i64, reserved: i64) -> StockLevel {
    StockLevel {
      technician_id: Uuid::nil(),
      article_id:    Uuid::nil(),
      balance:       Decimal::from(balance),
      reserved_qty:  Decimal::from(reserved),
      updated_at:    Utc::now(),
    }
  }

  #[test]
  fn removal_cannot_exceed_balance() {
    let l = level(10, 0);
    assert!(matches!(
      l.balance_after(Decimal::from(-15)),
      Err(Error::InsufficientStock { .. })
    ));
    assert_eq!(l.balance_after(Decimal::from(-4)).unwrap(), Decimal::from(6));
  }

  #[test]
  fn removal_cannot_cannibalize_reservations() {
    let l = level(10, 7);
    assert!(l.balance_after(Decimal::from(-4)).is_err());
    assert_eq!(l.balance_after(Decimal::from(-3)).unwrap(), Decimal::from(7));
    // Adding is always allowed.
    assert_eq!(l.balance_after(Decimal::from(2)).unwrap(), Decimal::from(12));
  }

  #[test]
  fn overflowing_balance_is_rejected() {
    let l = StockLevel { balance: Decimal::MAX, ..level(0, 0) };
    assert!(matches!(l.balance_after(Decimal::ONE), Err(Error::Validation { .. })));
    assert_eq!(l.balance_after(Decimal::NEGATIVE_ONE).unwrap(), Decimal::MAX - Decimal::ONE);
  }

  #[test]
  fn reserve_is_bounded_by_available() {
    let mut l = level(10, 4);
    assert!(matches!(
      l.reserve(Decimal::from(7)),
      Err(Error::InsufficientAvailable { .. })
    ));
    l.reserve(Decimal::from(6)).unwrap();
    assert_eq!(l.available(), Decimal::ZERO);
    l.release(Decimal::from(10)).unwrap();
    assert!(l.release(Decimal::ONE).is_err());
  }

  #[test]
  fn set_computes_delta_from_current_balance() {
    let op = AdjustOperation::Set;
    assert_eq!(op.delta(Decimal::from(3), Decimal::from(10)).unwrap(), Decimal::from(-7));
    assert_eq!(op.delta(Decimal::from(12), Decimal::from(10)).unwrap(), Decimal::from(2));
    assert!(op.delta(Decimal::from(10), Decimal::from(10)).is_err());
    assert!(matches!(
      AdjustOperation::Remove.delta(Decimal::ZERO, Decimal::from(10)),
      Err(Error::InvalidQuantity(_))
    ));
  }

  #[test]
  fn lock_order_is_deterministic() {
    let a = StockKey::new(Uuid::from_u128(2), Uuid::from_u128(9));
    let b = StockKey::new(Uuid::from_u128(1), Uuid::from_u128(9));
    let mut keys = vec![a, b];
    keys.sort();
    assert_eq!(keys, vec![b, a]);
  }

  #[test]
  fn threshold_fires_only_on_downward_crossing() {
    let t = Threshold {
      technician_id: Uuid::nil(),
      article_id:    Uuid::nil(),
      min_qty:       Decimal::from(5),
      is_active:     true,
      last_alert_at: None,
    };
    assert!(t.crossed_downward(Decimal::from(6), Decimal::from(5)));
    assert!(!t.crossed_downward(Decimal::from(5), Decimal::from(4)));
    assert!(!t.crossed_downward(Decimal::from(3), Decimal::from(8)));
  }
}
