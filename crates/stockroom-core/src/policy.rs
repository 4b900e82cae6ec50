//! Tunable business and runtime policy.
//!
//! Deserialised from the `[policy]` table of the operator configuration;
//! every field has a default so an empty table is valid.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Whether a partial approval that reduces any line must carry a reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasonPolicy {
  #[default]
  Required,
  Optional,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
  /// Upper bound on waiting for the store's write lock.
  pub lock_timeout_ms:      u64,
  pub pin_length:           usize,
  pub pin_ttl_minutes:      i64,
  /// Maximum decoded size of a handover signature.
  pub signature_max_bytes:  usize,
  pub partial_reason:       ReasonPolicy,
  /// Minimum spacing between two alerts for the same threshold.
  pub alert_cooldown_hours: i64,
}

impl Default for Policy {
  fn default() -> Self {
    Self {
      lock_timeout_ms:      5_000,
      pin_length:           6,
      pin_ttl_minutes:      15,
      signature_max_bytes:  50_000,
      partial_reason:       ReasonPolicy::Required,
      alert_cooldown_hours: 24,
    }
  }
}

impl Policy {
  pub fn lock_timeout(&self) -> Duration { Duration::from_millis(self.lock_timeout_ms) }

  pub fn pin_ttl(&self) -> chrono::Duration { chrono::Duration::minutes(self.pin_ttl_minutes) }

  pub fn alert_cooldown(&self) -> chrono::Duration {
    chrono::Duration::hours(self.alert_cooldown_hours)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn partial_table_keeps_defaults() {
    let policy: Policy =
      serde_json::from_str(r#"{"partial_reason":"optional","pin_length":4}"#).unwrap();
    assert_eq!(policy.partial_reason, ReasonPolicy::Optional);
    assert_eq!(policy.pin_length, 4);
    assert_eq!(policy.pin_ttl_minutes, 15);
    assert_eq!(policy.lock_timeout(), Duration::from_secs(5));
  }
}
