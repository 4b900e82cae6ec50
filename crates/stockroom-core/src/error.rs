//! Error types for `stockroom-core`.
//!
//! Every rejected operation maps onto one [`ErrorKind`], which tells the
//! caller how to surface it: a field-level validation message, a business
//! rule conflict, a retryable concurrency failure, a missing resource, or a
//! credential failure that must not reveal which part was wrong.

use rust_decimal::Decimal;
use thiserror::Error;

/// Coarse classification of [`Error`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  Validation,
  StateConflict,
  Concurrency,
  NotFound,
  Credential,
  Authorization,
  Internal,
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid {field}: {reason}")]
  Validation { field: &'static str, reason: String },

  #[error("quantity must be positive, got {0}")]
  InvalidQuantity(Decimal),

  #[error("cannot {action} a {entity} that is {from}")]
  InvalidTransition {
    entity: &'static str,
    from:   &'static str,
    action: &'static str,
  },

  #[error("insufficient stock: requested {requested}, available {available}")]
  InsufficientStock { requested: Decimal, available: Decimal },

  #[error("insufficient available quantity: requested {requested}, available {available}")]
  InsufficientAvailable { requested: Decimal, available: Decimal },

  #[error("cart has no lines")]
  EmptyCart,

  #[error("source and destination technician are the same")]
  SameTechnician,

  #[error("article {0} is inactive")]
  InactiveArticle(uuid::Uuid),

  #[error("a reason is required: {0}")]
  ReasonRequired(&'static str),

  #[error("article reference {0:?} already exists")]
  DuplicateReference(String),

  #[error("timed out waiting for a lock")]
  LockTimeout,

  #[error("{entity} not found: {id}")]
  NotFound { entity: &'static str, id: String },

  #[error("invalid credential")]
  InvalidCredential,

  #[error("forbidden: {0}")]
  Forbidden(&'static str),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
    Self::NotFound { entity, id: id.to_string() }
  }

  pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
    Self::Validation { field, reason: reason.into() }
  }

  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::Validation { .. }
      | Self::InvalidQuantity(_)
      | Self::EmptyCart
      | Self::SameTechnician
      | Self::InactiveArticle(_)
      | Self::ReasonRequired(_)
      | Self::DuplicateReference(_) => ErrorKind::Validation,
      Self::InvalidTransition { .. }
      | Self::InsufficientStock { .. }
      | Self::InsufficientAvailable { .. } => ErrorKind::StateConflict,
      Self::LockTimeout => ErrorKind::Concurrency,
      Self::NotFound { .. } => ErrorKind::NotFound,
      Self::InvalidCredential => ErrorKind::Credential,
      Self::Forbidden(_) => ErrorKind::Authorization,
      Self::Serialization(_) => ErrorKind::Internal,
    }
  }

  /// Only lock timeouts are worth retrying unchanged.
  pub fn is_retryable(&self) -> bool { matches!(self, Self::LockTimeout) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn only_lock_timeout_is_retryable() {
    assert!(Error::LockTimeout.is_retryable());
    assert!(!Error::InvalidCredential.is_retryable());
    assert!(!Error::EmptyCart.is_retryable());
  }

  #[test]
  fn business_rejections_are_state_conflicts() {
    let err = Error::InsufficientStock {
      requested: Decimal::from(15),
      available: Decimal::from(10),
    };
    assert_eq!(err.kind(), ErrorKind::StateConflict);
    assert_eq!(Error::InvalidQuantity(Decimal::ZERO).kind(), ErrorKind::Validation);
    assert_eq!(Error::not_found("demand", "x").kind(), ErrorKind::NotFound);
  }
}
