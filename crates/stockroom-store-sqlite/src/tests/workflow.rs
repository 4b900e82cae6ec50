use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use stockroom_core::{
  Error as CoreError,
  cart::{AddToCart, CartStatus},
  demand::{Demand, DemandQuery, DemandStatus, Handover, LineApproval},
  policy::{Policy, ReasonPolicy},
  stock::{MovementQuery, MovementReason},
  store::{CartStore, DemandStore, LedgerStore},
};
use uuid::Uuid;

use super::{Fixture, People, q};
use crate::{Error, SqliteStore};

fn add(f: &Fixture, article_id: Uuid, n: i64) -> AddToCart {
  AddToCart { technician_id: f.tech1.user_id, article_id, quantity: q(n), notes: None }
}

/// Tech1 requests 4 of one article and 2 of another, both in stock.
async fn submitted(f: &Fixture) -> (Demand, Uuid, Uuid) {
  let a = f.article("WF-A").await;
  let b = f.article("WF-B").await;
  f.stock(f.tech1, a.article_id, 10).await;
  f.stock(f.tech1, b.article_id, 5).await;

  f.store.add_to_cart(f.tech1, add(f, a.article_id, 4)).await.unwrap();
  f.store.add_to_cart(f.tech1, add(f, b.article_id, 2)).await.unwrap();
  let demand = f
    .store
    .submit_cart(f.tech1, f.tech1.user_id, Some("job 42".into()))
    .await
    .unwrap();
  (demand, a.article_id, b.article_id)
}

fn line_for(demand: &Demand, article_id: Uuid) -> Uuid {
  demand.lines.iter().find(|l| l.article_id == article_id).unwrap().line_id
}

// ─── Cart ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn adding_the_same_article_merges_lines() {
  let f = Fixture::new().await;
  let a = f.article("WF-C").await;

  f.store.add_to_cart(f.tech1, add(&f, a.article_id, 2)).await.unwrap();
  let cart = f.store.add_to_cart(f.tech1, add(&f, a.article_id, 3)).await.unwrap();
  assert_eq!(cart.lines.len(), 1);
  assert_eq!(cart.lines[0].quantity, q(5));
  assert_eq!(cart.status, CartStatus::Open);
}

#[tokio::test]
async fn zero_quantity_update_removes_the_line() {
  let f = Fixture::new().await;
  let a = f.article("WF-D").await;
  let cart = f.store.add_to_cart(f.tech1, add(&f, a.article_id, 2)).await.unwrap();
  let line_id = cart.lines[0].line_id;

  let cart = f
    .store
    .update_cart_line(f.tech1, f.tech1.user_id, line_id, q(7))
    .await
    .unwrap();
  assert_eq!(cart.lines[0].quantity, q(7));

  let cart = f
    .store
    .update_cart_line(f.tech1, f.tech1.user_id, line_id, q(0))
    .await
    .unwrap();
  assert!(cart.is_empty());
}

#[tokio::test]
async fn technicians_cannot_touch_each_others_carts() {
  let f = Fixture::new().await;
  let a = f.article("WF-E").await;
  let mut input = add(&f, a.article_id, 1);
  input.technician_id = f.tech2.user_id;
  let err = f.store.add_to_cart(f.tech1, input).await.unwrap_err();
  assert!(matches!(err, Error::Domain(CoreError::Forbidden(_))));
}

#[tokio::test]
async fn admins_have_no_cart() {
  let f = Fixture::new().await;
  let err = f.store.cart(f.admin, f.admin.user_id).await.unwrap_err();
  assert!(matches!(err, Error::Domain(CoreError::Validation { field: "technician_id", .. })));
}

#[tokio::test]
async fn submitting_an_empty_cart_fails() {
  let f = Fixture::new().await;
  let err = f.store.submit_cart(f.tech1, f.tech1.user_id, None).await.unwrap_err();
  assert!(matches!(err, Error::Domain(CoreError::EmptyCart)));
}

#[tokio::test]
async fn submit_snapshots_the_cart_and_opens_a_new_one() {
  let f = Fixture::new().await;
  let (demand, a, _) = submitted(&f).await;
  assert_eq!(demand.status, DemandStatus::Submitted);
  assert_eq!(demand.technician_id, f.tech1.user_id);
  assert_eq!(demand.notes, "job 42");
  assert_eq!(demand.lines.len(), 2);
  let line = demand.lines.iter().find(|l| l.article_id == a).unwrap();
  assert_eq!(line.requested_qty, q(4));
  assert_eq!(line.approved_qty, q(4));

  let cart = f.store.cart(f.tech1, f.tech1.user_id).await.unwrap();
  assert!(cart.is_empty());
  assert_eq!(cart.status, CartStatus::Open);

  let listed = f
    .store
    .list_demands(DemandQuery {
      technician_id: Some(f.tech1.user_id),
      status:        Some(DemandStatus::Submitted),
    })
    .await
    .unwrap();
  assert_eq!(listed.len(), 1);
}

// ─── Approval ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn approve_all_copies_requested_quantities() {
  let f = Fixture::new().await;
  let (demand, _, _) = submitted(&f).await;
  let approved = f.store.approve_all(f.admin, demand.demand_id, None).await.unwrap();
  assert_eq!(approved.status, DemandStatus::ApprovedAll);
  assert_eq!(approved.approved_by, Some(f.admin.user_id));
  assert!(approved.lines.iter().all(|l| l.approved_qty == l.requested_qty));

  let err = f.store.approve_all(f.admin, demand.demand_id, None).await.unwrap_err();
  assert!(matches!(err, Error::Domain(CoreError::InvalidTransition { .. })));
}

#[tokio::test]
async fn partial_approval_defaults_unlisted_lines_to_zero() {
  let f = Fixture::new().await;
  let (demand, a, b) = submitted(&f).await;
  let approvals = vec![LineApproval { line_id: line_for(&demand, a), approved_qty: q(2) }];

  let err = f
    .store
    .approve_partial(f.admin, demand.demand_id, approvals.clone(), None)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Domain(CoreError::ReasonRequired(_))));

  let approved = f
    .store
    .approve_partial(f.admin, demand.demand_id, approvals, Some("short on stock".into()))
    .await
    .unwrap();
  assert_eq!(approved.status, DemandStatus::ApprovedPartial);
  let by_article = |id| approved.lines.iter().find(|l| l.article_id == id).unwrap().approved_qty;
  assert_eq!(by_article(a), q(2));
  assert_eq!(by_article(b), q(0));
}

#[tokio::test]
async fn partial_approval_reason_can_be_optional() {
  let policy = Policy { partial_reason: ReasonPolicy::Optional, ..Policy::default() };
  let store = SqliteStore::open_in_memory_with(policy).await.expect("in-memory store");
  let f = Fixture::around(store, People::new());
  let (demand, a, _) = submitted(&f).await;

  let approvals = vec![LineApproval { line_id: line_for(&demand, a), approved_qty: q(1) }];
  let approved = f.store.approve_partial(f.admin, demand.demand_id, approvals, None).await.unwrap();
  assert_eq!(approved.status, DemandStatus::ApprovedPartial);
}

#[tokio::test]
async fn approving_above_the_request_is_rejected() {
  let f = Fixture::new().await;
  let (demand, a, _) = submitted(&f).await;
  let approvals = vec![LineApproval { line_id: line_for(&demand, a), approved_qty: q(9) }];
  let err = f
    .store
    .approve_partial(f.admin, demand.demand_id, approvals, Some("x".into()))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Domain(CoreError::Validation { .. })));
}

#[tokio::test]
async fn zero_partial_approval_is_a_refusal() {
  let f = Fixture::new().await;
  let (demand, _, _) = submitted(&f).await;
  let refused = f
    .store
    .approve_partial(f.admin, demand.demand_id, Vec::new(), Some("nothing to give".into()))
    .await
    .unwrap();
  assert_eq!(refused.status, DemandStatus::Refused);
  assert_eq!(refused.refusal_reason.as_deref(), Some("nothing to give"));
}

#[tokio::test]
async fn refusal_needs_a_reason_and_is_terminal() {
  let f = Fixture::new().await;
  let (demand, _, _) = submitted(&f).await;

  let err = f.store.refuse(f.admin, demand.demand_id, "   ".into()).await.unwrap_err();
  assert!(matches!(err, Error::Domain(CoreError::ReasonRequired(_))));

  let refused = f.store.refuse(f.admin, demand.demand_id, "duplicate".into()).await.unwrap();
  assert_eq!(refused.status, DemandStatus::Refused);

  let err = f.store.prepare(f.admin, demand.demand_id).await.unwrap_err();
  assert!(matches!(err, Error::Domain(CoreError::InvalidTransition { .. })));
}

#[tokio::test]
async fn technicians_cannot_approve() {
  let f = Fixture::new().await;
  let (demand, _, _) = submitted(&f).await;
  let err = f.store.approve_all(f.tech1, demand.demand_id, None).await.unwrap_err();
  assert!(matches!(err, Error::Domain(CoreError::Forbidden(_))));
}

// ─── Preparation and handover ────────────────────────────────────────────────

#[tokio::test]
async fn prepare_stages_without_moving_stock() {
  let f = Fixture::new().await;
  let (demand, a, _) = submitted(&f).await;

  let err = f.store.prepare(f.admin, demand.demand_id).await.unwrap_err();
  assert!(matches!(err, Error::Domain(CoreError::InvalidTransition { .. })));

  f.store.approve_all(f.admin, demand.demand_id, None).await.unwrap();
  let ready = f.store.prepare(f.admin, demand.demand_id).await.unwrap();
  assert_eq!(ready.status, DemandStatus::ReadyForHandover);
  assert!(ready.lines.iter().all(|l| l.prepared_qty == l.approved_qty));
  assert_eq!(f.balance(f.tech1, a).await, q(10));
}

#[tokio::test]
async fn pin_handover_deducts_every_approved_line() {
  let f = Fixture::new().await;
  let (demand, a, b) = submitted(&f).await;
  let approvals = vec![LineApproval { line_id: line_for(&demand, a), approved_qty: q(3) }];
  f.store
    .approve_partial(f.admin, demand.demand_id, approvals, Some("partial".into()))
    .await
    .unwrap();
  f.store.prepare(f.admin, demand.demand_id).await.unwrap();

  let err = f.store.issue_handover_pin(f.tech1, demand.demand_id).await;
  assert!(err.is_err());
  let issued = f.store.issue_handover_pin(f.admin, demand.demand_id).await.unwrap();
  assert_eq!(issued.pin.len(), 6);

  let receipt = f
    .store
    .handover(f.admin, demand.demand_id, Handover::with_pin(issued.pin.clone()))
    .await
    .unwrap();
  assert_eq!(receipt.movements.len(), 1);
  assert_eq!(receipt.movements[0].balance_after, q(7));
  assert_eq!(f.balance(f.tech1, a).await, q(7));
  assert_eq!(f.balance(f.tech1, b).await, q(5));

  let movements = f
    .store
    .movements(MovementQuery { demand_id: Some(demand.demand_id), ..Default::default() })
    .await
    .unwrap();
  assert_eq!(movements.len(), 1);
  assert_eq!(movements[0].reason, MovementReason::Handover);
  assert_eq!(movements[0].delta, q(-3));

  let done = f.store.get_demand(demand.demand_id).await.unwrap().unwrap();
  assert_eq!(done.status, DemandStatus::HandedOver);
  assert!(done.handed_over_at.is_some());
  let data = done.handover_data.unwrap();
  assert_eq!(data["verified"], true);
  assert!(!data.to_string().contains(&issued.pin));

  // The PIN is single-use and the demand is now terminal.
  let again = f.store.handover(f.admin, demand.demand_id, Handover::with_pin(issued.pin)).await;
  assert!(matches!(again, Err(Error::Domain(CoreError::InvalidTransition { .. }))));
}

#[tokio::test]
async fn wrong_pin_changes_nothing() {
  let f = Fixture::new().await;
  let (demand, a, _) = submitted(&f).await;
  f.store.approve_all(f.admin, demand.demand_id, None).await.unwrap();
  f.store.prepare(f.admin, demand.demand_id).await.unwrap();
  let issued = f.store.issue_handover_pin(f.admin, demand.demand_id).await.unwrap();

  let err = f
    .store
    .handover(f.admin, demand.demand_id, Handover::with_pin("not-the-pin"))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Domain(CoreError::InvalidCredential)));
  assert_eq!(f.balance(f.tech1, a).await, q(10));
  let still = f.store.get_demand(demand.demand_id).await.unwrap().unwrap();
  assert_eq!(still.status, DemandStatus::ReadyForHandover);

  // The failed attempt did not burn the PIN.
  f.store
    .handover(f.admin, demand.demand_id, Handover::with_pin(issued.pin))
    .await
    .unwrap();
  assert_eq!(f.balance(f.tech1, a).await, q(6));
}

#[tokio::test]
async fn expired_pin_is_an_invalid_credential() {
  let policy = Policy { pin_ttl_minutes: 0, ..Policy::default() };
  let store = SqliteStore::open_in_memory_with(policy).await.expect("in-memory store");
  let f = Fixture::around(store, People::new());
  let (demand, a, _) = submitted(&f).await;
  f.store.approve_all(f.admin, demand.demand_id, None).await.unwrap();
  f.store.prepare(f.admin, demand.demand_id).await.unwrap();
  let issued = f.store.issue_handover_pin(f.admin, demand.demand_id).await.unwrap();

  let err = f
    .store
    .handover(f.admin, demand.demand_id, Handover::with_pin(issued.pin))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Domain(CoreError::InvalidCredential)));
  assert_eq!(f.balance(f.tech1, a).await, q(10));
  let still = f.store.get_demand(demand.demand_id).await.unwrap().unwrap();
  assert_eq!(still.status, DemandStatus::ReadyForHandover);
}

#[tokio::test]
async fn reissuing_a_pin_supersedes_the_old_one() {
  let f = Fixture::new().await;
  let (demand, _, _) = submitted(&f).await;
  f.store.approve_all(f.admin, demand.demand_id, None).await.unwrap();
  f.store.prepare(f.admin, demand.demand_id).await.unwrap();
  let first = f.store.issue_handover_pin(f.admin, demand.demand_id).await.unwrap();
  let second = f.store.issue_handover_pin(f.admin, demand.demand_id).await.unwrap();

  if first.pin != second.pin {
    let err = f
      .store
      .handover(f.admin, demand.demand_id, Handover::with_pin(first.pin))
      .await
      .unwrap_err();
    assert!(matches!(err, Error::Domain(CoreError::InvalidCredential)));
  }
  assert!(
    f.store
      .handover(f.admin, demand.demand_id, Handover::with_pin(second.pin))
      .await
      .is_ok()
  );
}

#[tokio::test]
async fn signature_handover_enforces_size_limit() {
  let policy = Policy { signature_max_bytes: 16, ..Policy::default() };
  let store = SqliteStore::open_in_memory_with(policy).await.expect("in-memory store");
  let f = Fixture::around(store, People::new());
  let (demand, a, b) = submitted(&f).await;
  f.store.approve_all(f.admin, demand.demand_id, None).await.unwrap();
  f.store.prepare(f.admin, demand.demand_id).await.unwrap();

  let too_big = B64.encode([7u8; 17]);
  let err = f
    .store
    .handover(f.admin, demand.demand_id, Handover::with_signature(too_big))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Domain(CoreError::InvalidCredential)));

  let signature = format!("data:image/png;base64,{}", B64.encode([7u8; 12]));
  let receipt = f
    .store
    .handover(f.admin, demand.demand_id, Handover::with_signature(signature))
    .await
    .unwrap();
  assert_eq!(receipt.movements.len(), 2);
  assert_eq!(f.balance(f.tech1, a).await, q(6));
  assert_eq!(f.balance(f.tech1, b).await, q(3));
}

#[tokio::test]
async fn handover_fails_whole_when_a_line_is_short() {
  let f = Fixture::new().await;
  let (demand, a, b) = submitted(&f).await;
  f.store.approve_all(f.admin, demand.demand_id, None).await.unwrap();
  f.store.prepare(f.admin, demand.demand_id).await.unwrap();

  // Tech1 uses most of article B before the handover.
  f.store
    .declare_usage(f.tech1, stockroom_core::stock::DeclareUsage {
      technician_id:  f.tech1.user_id,
      article_id:     b,
      quantity:       q(4),
      location_text:  "Site 9".into(),
      notes:          None,
      reservation_id: None,
    })
    .await
    .unwrap();

  let signature = B64.encode([1u8; 8]);
  let err = f
    .store
    .handover(f.admin, demand.demand_id, Handover::with_signature(signature))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Domain(CoreError::InsufficientStock { .. })));
  assert_eq!(f.balance(f.tech1, a).await, q(10));
  assert_eq!(f.balance(f.tech1, b).await, q(1));
}
