//! Error type for `stockroom-store-sqlite`.

use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A business rule rejected the operation. Nothing was written.
  #[error(transparent)]
  Domain(#[from] stockroom_core::Error),

  #[error("database error: {0}")]
  Database(tokio_rusqlite::Error),

  #[error("sqlite error: {0}")]
  Sqlite(rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("decimal parse error: {0}")]
  Decimal(#[from] rust_decimal::Error),

  #[error("decode error: {0}")]
  Decode(String),

  #[error("password hash error: {0}")]
  PasswordHash(String),
}

impl Error {
  /// The domain error underneath, if this is a business rejection.
  pub fn domain(&self) -> Option<&stockroom_core::Error> {
    match self {
      Self::Domain(e) => Some(e),
      _ => None,
    }
  }

  pub fn kind(&self) -> stockroom_core::ErrorKind {
    self.domain().map_or(stockroom_core::ErrorKind::Internal, stockroom_core::Error::kind)
  }

  pub fn is_retryable(&self) -> bool {
    self.domain().is_some_and(stockroom_core::Error::is_retryable)
  }
}

// Busy and locked mean the bounded wait for the writer lock ran out.
impl From<rusqlite::Error> for Error {
  fn from(e: rusqlite::Error) -> Self {
    match e.sqlite_error_code() {
      Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
        Self::Domain(stockroom_core::Error::LockTimeout)
      }
      _ => Self::Sqlite(e),
    }
  }
}

impl From<tokio_rusqlite::Error> for Error {
  fn from(e: tokio_rusqlite::Error) -> Self {
    match e {
      tokio_rusqlite::Error::Rusqlite(e) => e.into(),
      other => Self::Database(other),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
