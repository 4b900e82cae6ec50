//! The article catalog: tools and materials technicians carry.
//!
//! The `reference` is the stable identity of an article and never changes
//! once written; descriptive fields may be edited at any time.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unit of measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Unit {
  #[default]
  Pcs,
  M,
  Kg,
  L,
  Box,
  Roll,
  Set,
}

impl Unit {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Pcs => "PCS",
      Self::M => "M",
      Self::Kg => "KG",
      Self::L => "L",
      Self::Box => "BOX",
      Self::Roll => "ROLL",
      Self::Set => "SET",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    Some(match s {
      "PCS" => Self::Pcs,
      "M" => Self::M,
      "KG" => Self::Kg,
      "L" => Self::L,
      "BOX" => Self::Box,
      "ROLL" => Self::Roll,
      "SET" => Self::Set,
      _ => return None,
    })
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
  pub article_id:   Uuid,
  pub reference:    String,
  pub name:         String,
  pub description:  String,
  pub unit:         Unit,
  pub category:     String,
  pub manufacturer: String,
  pub model_number: String,
  /// Recommended minimum level; informational only.
  pub safety_stock: Decimal,
  pub cost_price:   Option<Decimal>,
  pub is_active:    bool,
  pub created_at:   DateTime<Utc>,
  pub updated_at:   DateTime<Utc>,
}

/// Input for creating an article. The store assigns id and timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewArticle {
  pub reference:    String,
  pub name:         String,
  #[serde(default)]
  pub description:  String,
  #[serde(default)]
  pub unit:         Unit,
  #[serde(default)]
  pub category:     String,
  #[serde(default)]
  pub manufacturer: String,
  #[serde(default)]
  pub model_number: String,
  #[serde(default)]
  pub safety_stock: Decimal,
  #[serde(default)]
  pub cost_price:   Option<Decimal>,
}

impl NewArticle {
  pub fn new(reference: impl Into<String>, name: impl Into<String>) -> Self {
    Self {
      reference:    reference.into(),
      name:         name.into(),
      description:  String::new(),
      unit:         Unit::default(),
      category:     String::new(),
      manufacturer: String::new(),
      model_number: String::new(),
      safety_stock: Decimal::ZERO,
      cost_price:   None,
    }
  }

  pub fn validate(&self) -> crate::Result<()> {
    if self.reference.trim().is_empty() {
      return Err(crate::Error::validation("reference", "must not be empty"));
    }
    if self.name.trim().is_empty() {
      return Err(crate::Error::validation("name", "must not be empty"));
    }
    if self.safety_stock.is_sign_negative() {
      return Err(crate::Error::validation("safety_stock", "must not be negative"));
    }
    if self.cost_price.is_some_and(|p| p.is_sign_negative()) {
      return Err(crate::Error::validation("cost_price", "must not be negative"));
    }
    Ok(())
  }
}

/// Descriptive fields that may change after creation. `None` leaves the
/// field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArticlePatch {
  pub name:         Option<String>,
  pub description:  Option<String>,
  pub unit:         Option<Unit>,
  pub category:     Option<String>,
  pub manufacturer: Option<String>,
  pub model_number: Option<String>,
  pub safety_stock: Option<Decimal>,
  pub cost_price:   Option<Decimal>,
}

impl ArticlePatch {
  pub fn apply(self, article: &mut Article) {
    if let Some(v) = self.name { article.name = v; }
    if let Some(v) = self.description { article.description = v; }
    if let Some(v) = self.unit { article.unit = v; }
    if let Some(v) = self.category { article.category = v; }
    if let Some(v) = self.manufacturer { article.manufacturer = v; }
    if let Some(v) = self.model_number { article.model_number = v; }
    if let Some(v) = self.safety_stock { article.safety_stock = v; }
    if let Some(v) = self.cost_price { article.cost_price = Some(v); }
  }
}
