//! Default collaborators shipped with the store.

use stockroom_core::{collab::AlertSink, stock::ThresholdAlert};
use tracing::warn;

/// Emits each threshold alert as a `WARN` log line.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAlerts;

impl AlertSink for TracingAlerts {
  fn raise(&self, alert: &ThresholdAlert) {
    warn!(
      alert_id = %alert.alert_id,
      technician_id = %alert.technician_id,
      article_id = %alert.article_id,
      balance = %alert.balance,
      min_qty = %alert.min_qty,
      "stock fell to or below threshold"
    );
  }
}
