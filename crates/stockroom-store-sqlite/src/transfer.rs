//! Technician-to-technician transfers.

use serde_json::json;
use stockroom_core::{
  actor::Actor,
  audit::{event, NewAuditEvent},
  stock::{MovementOutcome, MovementReason, NewMovement},
  store::TransferStore,
  transfer::{NewTransfer, TransferNote, TransferReceipt},
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
  audit::append,
  catalog::load_article,
  ledger::{lock_stock, post, Posting},
  store::now,
  Result, SqliteStore,
};

impl TransferStore for SqliteStore {
  async fn transfer(&self, actor: Actor, input: NewTransfer) -> Result<TransferReceipt> {
    actor.require_self_or_admin(input.from_technician_id, "transfer stock")?;
    input.validate()?;
    self.require_technician(input.from_technician_id)?;
    self.require_technician(input.to_technician_id)?;

    let (receipt, note, changes) = self
      .write(move |tx| {
        let at = now();
        let article = load_article(tx, input.article_id)?;
        let source = input.source();
        let destination = input.destination();

        // Both rows are locked in key order before either is checked.
        let (mut source_level, mut destination_level) = if source < destination {
          let (s, _) = lock_stock(tx, source, at)?;
          let (d, _) = lock_stock(tx, destination, at)?;
          (s, d)
        } else {
          let (d, _) = lock_stock(tx, destination, at)?;
          let (s, _) = lock_stock(tx, source, at)?;
          (s, d)
        };

        let transfer_id = Uuid::new_v4();
        let issue_id = Uuid::new_v4();
        let receipt_id = Uuid::new_v4();
        let notes = input.notes.clone().unwrap_or_default();

        let mut issue = NewMovement::new(source, -input.quantity, MovementReason::TransferOut);
        issue.notes = notes.clone();
        let issue = post(tx, &mut source_level, issue, Posting {
          movement_id:        issue_id,
          linked_movement_id: Some(receipt_id),
          actor_id:           actor.user_id,
          at,
        })?;

        let mut receipt =
          NewMovement::new(destination, input.quantity, MovementReason::TransferIn);
        receipt.notes = notes.clone();
        let receipt = post(tx, &mut destination_level, receipt, Posting {
          movement_id:        receipt_id,
          linked_movement_id: Some(issue_id),
          actor_id:           actor.user_id,
          at,
        })?;

        append(
          tx,
          NewAuditEvent::new(
            actor.user_id,
            event::STOCK_TRANSFER,
            "transfer",
            transfer_id,
            json!({
              "from_technician_id":    input.from_technician_id,
              "to_technician_id":      input.to_technician_id,
              "article_id":            input.article_id,
              "quantity":              input.quantity,
              "issue_movement_id":     issue_id,
              "receipt_movement_id":   receipt_id,
              "issue_balance_after":   issue.movement.balance_after,
              "receipt_balance_after": receipt.movement.balance_after,
            }),
          ),
          at,
        )?;

        let note = TransferNote {
          transfer_id,
          from_technician_id: input.from_technician_id,
          to_technician_id: input.to_technician_id,
          article_id: article.article_id,
          article_reference: article.reference,
          article_name: article.name,
          quantity: input.quantity,
          notes,
          actor_id: actor.user_id,
          recorded_at: at,
          issue_movement_id: issue_id,
          receipt_movement_id: receipt_id,
        };
        let result = TransferReceipt {
          transfer_id,
          issue: MovementOutcome::from(&issue.movement),
          receipt: MovementOutcome::from(&receipt.movement),
        };
        Ok((result, note, vec![issue.change, receipt.change]))
      })
      .await?;

    info!(
      transfer_id = %receipt.transfer_id,
      quantity = %note.quantity,
      from_balance = %receipt.issue.balance_after,
      to_balance = %receipt.receipt.balance_after,
      "stock transferred"
    );
    self.check_thresholds(changes).await;
    self.render_transfer(&note);
    Ok(receipt)
  }
}

impl SqliteStore {
  /// Hand a committed transfer to the document renderer, if one is set.
  fn render_transfer(&self, note: &TransferNote) {
    let Some(renderer) = &self.renderer else { return };
    match renderer.render_transfer(note) {
      Ok(bytes) => {
        info!(transfer_id = %note.transfer_id, size = bytes.len(), "transfer note rendered");
      }
      Err(e) => {
        warn!(transfer_id = %note.transfer_id, error = %e, "transfer note rendering failed");
      }
    }
  }
}
