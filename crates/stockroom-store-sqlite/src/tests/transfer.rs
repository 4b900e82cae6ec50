use std::sync::{Arc, Mutex};

use stockroom_core::{
  Error as CoreError,
  collab::DocumentRenderer,
  stock::{MovementQuery, MovementReason},
  store::{LedgerStore, TransferStore},
  transfer::{NewTransfer, TransferNote},
};

use super::{Fixture, People, q};
use crate::{Error, SqliteStore};

fn transfer(f: &Fixture, article_id: uuid::Uuid, n: i64) -> NewTransfer {
  NewTransfer {
    from_technician_id: f.tech1.user_id,
    to_technician_id: f.tech2.user_id,
    article_id,
    quantity: q(n),
    notes: Some("van swap".into()),
  }
}

#[tokio::test]
async fn transfer_produces_a_linked_pair() {
  let f = Fixture::new().await;
  let a = f.article("TRF-001").await;
  f.stock(f.tech1, a.article_id, 6).await;

  let receipt = f.store.transfer(f.admin, transfer(&f, a.article_id, 6)).await.unwrap();
  assert_eq!(receipt.issue.balance_after, q(0));
  assert_eq!(receipt.receipt.balance_after, q(6));
  assert_eq!(f.balance(f.tech1, a.article_id).await, q(0));
  assert_eq!(f.balance(f.tech2, a.article_id).await, q(6));

  let movements = f.store.movements(MovementQuery::default()).await.unwrap();
  let issue = movements.iter().find(|m| m.movement_id == receipt.issue.movement_id).unwrap();
  let incoming = movements.iter().find(|m| m.movement_id == receipt.receipt.movement_id).unwrap();
  assert_eq!(issue.delta, q(-6));
  assert_eq!(incoming.delta, q(6));
  assert_eq!(issue.reason, MovementReason::TransferOut);
  assert_eq!(incoming.reason, MovementReason::TransferIn);
  assert_eq!(issue.linked_movement_id, Some(incoming.movement_id));
  assert_eq!(incoming.linked_movement_id, Some(issue.movement_id));
}

#[tokio::test]
async fn failed_transfer_writes_nothing() {
  let f = Fixture::new().await;
  let a = f.article("TRF-002").await;
  f.stock(f.tech1, a.article_id, 2).await;

  let err = f.store.transfer(f.admin, transfer(&f, a.article_id, 3)).await.unwrap_err();
  assert!(matches!(err, Error::Domain(CoreError::InsufficientStock { .. })));
  assert_eq!(f.store.movements(MovementQuery::default()).await.unwrap().len(), 1);
  assert_eq!(f.balance(f.tech2, a.article_id).await, q(0));

  let mut same = transfer(&f, a.article_id, 1);
  same.to_technician_id = f.tech1.user_id;
  let err = f.store.transfer(f.admin, same).await.unwrap_err();
  assert!(matches!(err, Error::Domain(CoreError::SameTechnician)));
}

#[tokio::test]
async fn transfers_to_an_admin_are_rejected() {
  let f = Fixture::new().await;
  let a = f.article("TRF-004").await;
  f.stock(f.tech1, a.article_id, 5).await;

  let mut to_admin = transfer(&f, a.article_id, 3);
  to_admin.to_technician_id = f.admin.user_id;
  let err = f.store.transfer(f.admin, to_admin).await.unwrap_err();
  assert!(matches!(err, Error::Domain(CoreError::Validation { field: "technician_id", .. })));
  assert_eq!(f.balance(f.tech1, a.article_id).await, q(5));
  assert_eq!(f.store.movements(MovementQuery::default()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn source_technician_may_transfer_but_not_others() {
  let f = Fixture::new().await;
  let a = f.article("TRF-003").await;
  f.stock(f.tech1, a.article_id, 2).await;

  let err = f.store.transfer(f.tech2, transfer(&f, a.article_id, 1)).await.unwrap_err();
  assert!(matches!(err, Error::Domain(CoreError::Forbidden(_))));
  assert!(f.store.transfer(f.tech1, transfer(&f, a.article_id, 1)).await.is_ok());
}

#[derive(Clone, Default)]
struct CapturingRenderer(Arc<Mutex<Vec<TransferNote>>>);

impl DocumentRenderer for CapturingRenderer {
  fn render_transfer(
    &self,
    note: &TransferNote,
  ) -> Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>> {
    self.0.lock().unwrap().push(note.clone());
    Ok(format!("{} x{}", note.article_reference, note.quantity).into_bytes())
  }
}

struct FailingRenderer;

impl DocumentRenderer for FailingRenderer {
  fn render_transfer(
    &self,
    _: &TransferNote,
  ) -> Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>> {
    Err("printer on fire".into())
  }
}

#[tokio::test]
async fn committed_transfer_is_handed_to_the_renderer() {
  let renderer = CapturingRenderer::default();
  let store = SqliteStore::open_in_memory().await.expect("in-memory store");
  let f = Fixture::around(store.with_renderer(renderer.clone()), People::new());
  let a = f.article("TRF-004").await;
  f.stock(f.tech1, a.article_id, 4).await;

  let receipt = f.store.transfer(f.admin, transfer(&f, a.article_id, 3)).await.unwrap();
  let notes = renderer.0.lock().unwrap().clone();
  assert_eq!(notes.len(), 1);
  assert_eq!(notes[0].transfer_id, receipt.transfer_id);
  assert_eq!(notes[0].article_reference, "TRF-004");
  assert_eq!(notes[0].issue_movement_id, receipt.issue.movement_id);
}

#[tokio::test]
async fn renderer_failure_does_not_undo_the_transfer() {
  let store = SqliteStore::open_in_memory().await.expect("in-memory store");
  let f = Fixture::around(store.with_renderer(FailingRenderer), People::new());
  let a = f.article("TRF-005").await;
  f.stock(f.tech1, a.article_id, 4).await;

  assert!(f.store.transfer(f.admin, transfer(&f, a.article_id, 4)).await.is_ok());
  assert_eq!(f.balance(f.tech2, a.article_id).await, q(4));
}
