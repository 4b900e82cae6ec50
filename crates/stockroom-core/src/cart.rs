//! The technician-side shopping cart that feeds demand submission.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CartStatus {
  Open,
  /// Turned into a demand; never reopened.
  Submitted,
}

impl CartStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Open => "open",
      Self::Submitted => "submitted",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "open" => Some(Self::Open),
      "submitted" => Some(Self::Submitted),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartLine {
  pub line_id:    Uuid,
  pub article_id: Uuid,
  pub quantity:   Decimal,
  pub notes:      String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cart {
  pub cart_id:       Uuid,
  pub technician_id: Uuid,
  pub status:        CartStatus,
  pub lines:         Vec<CartLine>,
  pub created_at:    DateTime<Utc>,
  pub updated_at:    DateTime<Utc>,
}

impl Cart {
  pub fn is_empty(&self) -> bool { self.lines.is_empty() }

  pub fn line(&self, line_id: Uuid) -> Option<&CartLine> {
    self.lines.iter().find(|l| l.line_id == line_id)
  }

  pub fn line_for_article(&self, article_id: Uuid) -> Option<&CartLine> {
    self.lines.iter().find(|l| l.article_id == article_id)
  }
}

/// Input for [`CartStore::add_to_cart`](crate::store::CartStore::add_to_cart).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddToCart {
  pub technician_id: Uuid,
  pub article_id:    Uuid,
  pub quantity:      Decimal,
  #[serde(default)]
  pub notes:         Option<String>,
}

/// Merge a new note into an existing line's notes.
pub fn merge_notes(existing: &str, added: Option<&str>) -> String {
  match added.map(str::trim).filter(|s| !s.is_empty()) {
    None => existing.to_string(),
    Some(n) if existing.is_empty() => n.to_string(),
    Some(n) => format!("{existing}\n{n}"),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn notes_are_appended() {
    assert_eq!(merge_notes("", Some("urgent")), "urgent");
    assert_eq!(merge_notes("urgent", Some(" van 3 ")), "urgent\nvan 3");
    assert_eq!(merge_notes("urgent", Some("  ")), "urgent");
    assert_eq!(merge_notes("urgent", None), "urgent");
  }
}
