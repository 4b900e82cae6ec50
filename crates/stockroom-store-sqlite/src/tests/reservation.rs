use stockroom_core::{
  Error as CoreError,
  reservation::{NewReservation, ReservationStatus},
  stock::{AdjustOperation, AdjustStock, DeclareUsage, MovementReason},
  store::{LedgerStore, ReservationStore},
};
use uuid::Uuid;

use super::{Fixture, q};
use crate::Error;

fn reservation(tech: Uuid, article_id: Uuid, n: i64) -> NewReservation {
  NewReservation {
    technician_id: tech,
    article_id,
    qty_reserved: q(n),
    scheduled_for: None,
    notes: Some("Tuesday install".into()),
  }
}

#[tokio::test]
async fn approval_holds_stock_and_cancel_releases_it() {
  let f = Fixture::new().await;
  let a = f.article("RSV-001").await;
  f.stock(f.tech1, a.article_id, 10).await;

  let r = f
    .store
    .create_reservation(f.tech1, reservation(f.tech1.user_id, a.article_id, 4))
    .await
    .unwrap();
  assert_eq!(r.status, ReservationStatus::Pending);
  let level = f.store.stock_level(f.tech1.user_id, a.article_id).await.unwrap();
  assert_eq!(level.reserved_qty, q(0));

  let r = f.store.approve_reservation(f.admin, r.reservation_id).await.unwrap();
  assert_eq!(r.status, ReservationStatus::Approved);
  let level = f.store.stock_level(f.tech1.user_id, a.article_id).await.unwrap();
  assert_eq!(level.reserved_qty, q(4));
  assert_eq!(level.available(), q(6));

  let r = f.store.cancel_reservation(f.tech1, r.reservation_id).await.unwrap();
  assert_eq!(r.status, ReservationStatus::Cancelled);
  assert!(r.cancelled_at.is_some());
  let level = f.store.stock_level(f.tech1.user_id, a.article_id).await.unwrap();
  assert_eq!(level.reserved_qty, q(0));

  let err = f.store.approve_reservation(f.admin, r.reservation_id).await.unwrap_err();
  assert!(matches!(err, Error::Domain(CoreError::InvalidTransition { .. })));
}

#[tokio::test]
async fn approval_beyond_available_fails() {
  let f = Fixture::new().await;
  let a = f.article("RSV-002").await;
  f.stock(f.tech1, a.article_id, 5).await;

  let first = f
    .store
    .create_reservation(f.admin, reservation(f.tech1.user_id, a.article_id, 3))
    .await
    .unwrap();
  let second = f
    .store
    .create_reservation(f.admin, reservation(f.tech1.user_id, a.article_id, 3))
    .await
    .unwrap();
  f.store.approve_reservation(f.admin, first.reservation_id).await.unwrap();

  let err = f.store.approve_reservation(f.admin, second.reservation_id).await.unwrap_err();
  assert!(matches!(err, Error::Domain(CoreError::InsufficientAvailable { .. })));
  let second = f.store.get_reservation(second.reservation_id).await.unwrap().unwrap();
  assert_eq!(second.status, ReservationStatus::Pending);
}

#[tokio::test]
async fn removal_cannot_eat_into_reserved_stock() {
  let f = Fixture::new().await;
  let a = f.article("RSV-003").await;
  f.stock(f.tech1, a.article_id, 10).await;
  let r = f
    .store
    .create_reservation(f.admin, reservation(f.tech1.user_id, a.article_id, 8))
    .await
    .unwrap();
  f.store.approve_reservation(f.admin, r.reservation_id).await.unwrap();

  let err = f
    .store
    .adjust_stock(f.admin, AdjustStock {
      technician_id: f.tech1.user_id,
      article_id:    a.article_id,
      operation:     AdjustOperation::Remove,
      quantity:      q(3),
      reason:        None,
    })
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Domain(CoreError::InsufficientStock { .. })));
  assert_eq!(f.balance(f.tech1, a.article_id).await, q(10));
}

#[tokio::test]
async fn usage_against_a_reservation_consumes_it() {
  let f = Fixture::new().await;
  let a = f.article("RSV-004").await;
  f.stock(f.tech1, a.article_id, 10).await;
  let r = f
    .store
    .create_reservation(f.tech1, reservation(f.tech1.user_id, a.article_id, 4))
    .await
    .unwrap();
  f.store.approve_reservation(f.admin, r.reservation_id).await.unwrap();

  let out = f
    .store
    .declare_usage(f.tech1, DeclareUsage {
      technician_id:  f.tech1.user_id,
      article_id:     a.article_id,
      quantity:       q(4),
      location_text:  "Plant room".into(),
      notes:          None,
      reservation_id: Some(r.reservation_id),
    })
    .await
    .unwrap();
  assert_eq!(out.balance_after, q(6));

  let level = f.store.stock_level(f.tech1.user_id, a.article_id).await.unwrap();
  assert_eq!(level.reserved_qty, q(0));
  let r = f.store.get_reservation(r.reservation_id).await.unwrap().unwrap();
  assert_eq!(r.status, ReservationStatus::Consumed);
  assert!(r.consumed_at.is_some());

  let movements = f.store.movements(Default::default()).await.unwrap();
  let usage = movements.last().unwrap();
  assert_eq!(usage.reason, MovementReason::Issue);
  assert_eq!(usage.reservation_id, Some(r.reservation_id));
}

#[tokio::test]
async fn pending_reservation_cannot_be_consumed() {
  let f = Fixture::new().await;
  let a = f.article("RSV-005").await;
  f.stock(f.tech1, a.article_id, 10).await;
  let r = f
    .store
    .create_reservation(f.tech1, reservation(f.tech1.user_id, a.article_id, 2))
    .await
    .unwrap();

  let err = f
    .store
    .declare_usage(f.tech1, DeclareUsage {
      technician_id:  f.tech1.user_id,
      article_id:     a.article_id,
      quantity:       q(2),
      location_text:  "Roof".into(),
      notes:          None,
      reservation_id: Some(r.reservation_id),
    })
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Domain(CoreError::InvalidTransition { .. })));
  assert_eq!(f.balance(f.tech1, a.article_id).await, q(10));
}

#[tokio::test]
async fn only_the_owner_or_an_admin_cancels() {
  let f = Fixture::new().await;
  let a = f.article("RSV-006").await;
  let r = f
    .store
    .create_reservation(f.tech1, reservation(f.tech1.user_id, a.article_id, 1))
    .await
    .unwrap();

  let err = f.store.cancel_reservation(f.tech2, r.reservation_id).await.unwrap_err();
  assert!(matches!(err, Error::Domain(CoreError::Forbidden(_))));
  assert_eq!(f.store.list_reservations(Some(f.tech1.user_id)).await.unwrap().len(), 1);
  assert!(f.store.list_reservations(Some(f.tech2.user_id)).await.unwrap().is_empty());
}

#[tokio::test]
async fn reservations_are_held_by_technicians_only() {
  let f = Fixture::new().await;
  let a = f.article("RSV-007").await;
  let err = f
    .store
    .create_reservation(f.admin, reservation(f.admin.user_id, a.article_id, 1))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Domain(CoreError::Validation { field: "technician_id", .. })));
}
