//! Demands: submitted carts moving through admin approval to handover.
//!
//! The lifecycle is a closed transition table, [`DemandStatus::next`]. Every
//! store operation looks up its action there before touching anything, so an
//! illegal action is rejected with the current status and attempted action.
//!
//! ```text
//! SUBMITTED ─┬─ approve all ──▶ APPROVED_ALL ─────┐
//!            ├─ approve part ─▶ APPROVED_PARTIAL ─┼─ prepare ─▶ PREPARING ─ mark ready ─▶ READY_FOR_HANDOVER ─ hand over ─▶ HANDED_OVER
//!            └─ refuse ───────▶ REFUSED           │
//! ```

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{policy::ReasonPolicy, stock::MovementOutcome, Error, Result};

// ─── Status machine ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DemandStatus {
  Submitted,
  ApprovedAll,
  ApprovedPartial,
  Refused,
  Preparing,
  ReadyForHandover,
  HandedOver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DemandAction {
  ApproveAll,
  ApprovePartial,
  Refuse,
  Prepare,
  MarkReady,
  IssuePin,
  HandOver,
}

impl DemandAction {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::ApproveAll => "approve all of",
      Self::ApprovePartial => "partially approve",
      Self::Refuse => "refuse",
      Self::Prepare => "prepare",
      Self::MarkReady => "mark ready",
      Self::IssuePin => "issue a handover PIN for",
      Self::HandOver => "hand over",
    }
  }
}

impl DemandStatus {
  pub const ALL: [Self; 7] = [
    Self::Submitted,
    Self::ApprovedAll,
    Self::ApprovedPartial,
    Self::Refused,
    Self::Preparing,
    Self::ReadyForHandover,
    Self::HandedOver,
  ];

  /// The transition table. `None` means the action is illegal from `self`.
  pub fn next(self, action: DemandAction) -> Option<Self> {
    use DemandAction as A;
    use DemandStatus as S;
    match (self, action) {
      (S::Submitted, A::ApproveAll) => Some(S::ApprovedAll),
      (S::Submitted, A::ApprovePartial) => Some(S::ApprovedPartial),
      (S::Submitted, A::Refuse) => Some(S::Refused),
      (S::ApprovedAll | S::ApprovedPartial, A::Prepare) => Some(S::Preparing),
      (S::Preparing, A::MarkReady) => Some(S::ReadyForHandover),
      (S::ReadyForHandover, A::IssuePin) => Some(S::ReadyForHandover),
      (S::ReadyForHandover, A::HandOver) => Some(S::HandedOver),
      _ => None,
    }
  }

  pub fn transition(self, action: DemandAction) -> Result<Self> {
    self.next(action).ok_or(Error::InvalidTransition {
      entity: "demand",
      from:   self.as_str(),
      action: action.as_str(),
    })
  }

  pub fn is_terminal(self) -> bool { matches!(self, Self::Refused | Self::HandedOver) }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Submitted => "SUBMITTED",
      Self::ApprovedAll => "APPROVED_ALL",
      Self::ApprovedPartial => "APPROVED_PARTIAL",
      Self::Refused => "REFUSED",
      Self::Preparing => "PREPARING",
      Self::ReadyForHandover => "READY_FOR_HANDOVER",
      Self::HandedOver => "HANDED_OVER",
    }
  }

  pub fn parse(s: &str) -> Option<Self> { Self::ALL.into_iter().find(|st| st.as_str() == s) }
}

// ─── Records ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemandLine {
  pub line_id:       Uuid,
  pub article_id:    Uuid,
  pub requested_qty: Decimal,
  pub approved_qty:  Decimal,
  pub prepared_qty:  Decimal,
  pub notes:         String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Demand {
  pub demand_id:       Uuid,
  pub technician_id:   Uuid,
  pub status:          DemandStatus,
  pub notes:           String,
  pub refusal_reason:  Option<String>,
  pub approval_notes:  Option<String>,
  pub approved_by:     Option<Uuid>,
  pub approved_at:     Option<DateTime<Utc>>,
  pub prepared_by:     Option<Uuid>,
  pub prepared_at:     Option<DateTime<Utc>>,
  pub handover_method: Option<HandoverMethod>,
  /// Device info and verification outcome; never the credential itself.
  pub handover_data:   Option<serde_json::Value>,
  pub handed_over_at:  Option<DateTime<Utc>>,
  pub lines:           Vec<DemandLine>,
  pub created_at:      DateTime<Utc>,
  pub updated_at:      DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct DemandQuery {
  pub technician_id: Option<Uuid>,
  pub status:        Option<DemandStatus>,
}

// ─── Partial approval ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LineApproval {
  pub line_id:      Uuid,
  pub approved_qty: Decimal,
}

/// The outcome of checking a partial approval against a demand.
#[derive(Debug, Clone)]
pub struct PartialResolution {
  /// [`DemandAction::ApprovePartial`], or [`DemandAction::Refuse`] when every
  /// line ends at zero.
  pub action:   DemandAction,
  pub approved: HashMap<Uuid, Decimal>,
  /// True when at least one line is below its requested quantity.
  pub reduced:  bool,
}

impl PartialResolution {
  pub fn next_status(&self) -> DemandStatus {
    match self.action {
      DemandAction::Refuse => DemandStatus::Refused,
      _ => DemandStatus::ApprovedPartial,
    }
  }
}

/// Trimmed, non-empty reason text, or `None`.
pub fn clean_reason(reason: Option<&str>) -> Option<String> {
  reason.map(str::trim).filter(|r| !r.is_empty()).map(str::to_string)
}

/// Check `approvals` against `demand` and decide the resulting action.
///
/// Lines not listed are approved at zero. A reason is required by
/// [`ReasonPolicy::Required`] whenever any line is reduced, and always when
/// the whole demand ends up refused.
pub fn resolve_partial(
  demand: &Demand,
  approvals: &[LineApproval],
  reason: Option<&str>,
  policy: ReasonPolicy,
) -> Result<PartialResolution> {
  demand.status.transition(DemandAction::ApprovePartial)?;

  let mut approved: HashMap<Uuid, Decimal> =
    demand.lines.iter().map(|l| (l.line_id, Decimal::ZERO)).collect();
  for a in approvals {
    let Some(line) = demand.lines.iter().find(|l| l.line_id == a.line_id) else {
      return Err(Error::not_found("demand line", a.line_id));
    };
    if a.approved_qty.is_sign_negative() || a.approved_qty > line.requested_qty {
      return Err(Error::validation(
        "approved_qty",
        format!(
          "must be between 0 and {} for line {}, got {}",
          line.requested_qty, line.line_id, a.approved_qty
        ),
      ));
    }
    approved.insert(line.line_id, a.approved_qty);
  }

  let reduced = demand.lines.iter().any(|l| approved[&l.line_id] < l.requested_qty);
  let all_zero = approved.values().all(|q| q.is_zero());
  let action = if all_zero { DemandAction::Refuse } else { DemandAction::ApprovePartial };

  let has_reason = clean_reason(reason).is_some();
  if !has_reason && (all_zero || (reduced && policy == ReasonPolicy::Required)) {
    return Err(Error::ReasonRequired("a line was approved below its requested quantity"));
  }

  Ok(PartialResolution { action, approved, reduced })
}

// ─── Handover ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandoverMethod {
  Pin,
  Signature,
}

impl HandoverMethod {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Pin => "pin",
      Self::Signature => "signature",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "pin" => Some(Self::Pin),
      "signature" => Some(Self::Signature),
      _ => None,
    }
  }
}

/// Confirmation presented at handover.
#[derive(Clone, Serialize, Deserialize)]
pub struct Handover {
  pub method:         HandoverMethod,
  #[serde(default)]
  pub device_info:    serde_json::Value,
  pub pin:            Option<String>,
  /// Base64-encoded signature image.
  pub signature_data: Option<String>,
}

// Credentials stay out of debug output.
impl std::fmt::Debug for Handover {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Handover")
      .field("method", &self.method)
      .field("device_info", &self.device_info)
      .field("pin", &self.pin.as_ref().map(|_| "<redacted>"))
      .field("signature_data", &self.signature_data.as_ref().map(String::len))
      .finish()
  }
}

impl Handover {
  pub fn with_pin(pin: impl Into<String>) -> Self {
    Self {
      method:         HandoverMethod::Pin,
      device_info:    serde_json::Value::Null,
      pin:            Some(pin.into()),
      signature_data: None,
    }
  }

  pub fn with_signature(signature_data: impl Into<String>) -> Self {
    Self {
      method:         HandoverMethod::Signature,
      device_info:    serde_json::Value::Null,
      pin:            None,
      signature_data: Some(signature_data.into()),
    }
  }
}

/// A freshly issued handover PIN. The plaintext exists only here.
#[derive(Clone, Serialize)]
pub struct IssuedPin {
  pub demand_id:  Uuid,
  pub pin:        String,
  pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for IssuedPin {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("IssuedPin")
      .field("demand_id", &self.demand_id)
      .field("expires_at", &self.expires_at)
      .finish_non_exhaustive()
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoverReceipt {
  pub demand_id: Uuid,
  /// One entry per line with a positive approved quantity, in line order.
  pub movements: Vec<MovementOutcome>,
}
