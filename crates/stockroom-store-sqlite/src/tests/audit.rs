use stockroom_core::{
  audit::{AuditQuery, BreakKind, GENESIS_HASH, event},
  stock::{AdjustOperation, AdjustStock},
  store::{AuditStore, LedgerStore, TransferStore},
  transfer::NewTransfer,
};

use super::{Fixture, q};

/// An article, two adjustments and a transfer: four events.
async fn busy(f: &Fixture) -> uuid::Uuid {
  let a = f.article("AUD-001").await;
  f.stock(f.tech1, a.article_id, 5).await;
  f.store
    .adjust_stock(f.admin, AdjustStock {
      technician_id: f.tech1.user_id,
      article_id:    a.article_id,
      operation:     AdjustOperation::Remove,
      quantity:      q(1),
      reason:        Some("damaged".into()),
    })
    .await
    .unwrap();
  f.store
    .transfer(f.admin, NewTransfer {
      from_technician_id: f.tech1.user_id,
      to_technician_id:   f.tech2.user_id,
      article_id:         a.article_id,
      quantity:           q(2),
      notes:              None,
    })
    .await
    .unwrap();
  a.article_id
}

#[tokio::test]
async fn empty_chain_starts_at_genesis() {
  let f = Fixture::new().await;
  assert_eq!(f.store.chain_head().await.unwrap(), GENESIS_HASH);
  let report = f.store.verify_chain().await.unwrap();
  assert!(report.is_intact());
  assert_eq!(report.total, 0);
}

#[tokio::test]
async fn every_change_extends_the_chain() {
  let f = Fixture::new().await;
  busy(&f).await;

  let events = f.store.audit_events(AuditQuery::default()).await.unwrap();
  assert_eq!(events.len(), 4);
  assert_eq!(events[0].prev_hash, GENESIS_HASH);
  assert_eq!(events[0].event_type, event::ARTICLE_CREATED);
  assert_eq!(events[3].event_type, event::STOCK_TRANSFER);
  for pair in events.windows(2) {
    assert_eq!(pair[1].prev_hash, pair[0].this_hash);
    assert_eq!(pair[1].seq, pair[0].seq + 1);
  }
  assert_eq!(f.store.chain_head().await.unwrap(), events[3].this_hash);

  let report = f.store.verify_chain().await.unwrap();
  assert!(report.is_intact());
  assert_eq!(report.verified, 4);
}

#[tokio::test]
async fn events_filter_by_entity() {
  let f = Fixture::new().await;
  let article_id = busy(&f).await;

  let for_article = f
    .store
    .audit_events(AuditQuery {
      entity_type: Some("article".into()),
      entity_id: Some(article_id.to_string()),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(for_article.len(), 1);
  assert_eq!(for_article[0].actor_id, f.admin.user_id);

  let limited = f
    .store
    .audit_events(AuditQuery { limit: Some(2), ..Default::default() })
    .await
    .unwrap();
  assert_eq!(limited.len(), 2);
}

#[tokio::test]
async fn activity_filters_by_actor_newest_first() {
  let f = Fixture::new().await;
  let article_id = busy(&f).await;
  f.store
    .transfer(f.tech1, NewTransfer {
      from_technician_id: f.tech1.user_id,
      to_technician_id:   f.tech2.user_id,
      article_id,
      quantity:           q(1),
      notes:              None,
    })
    .await
    .unwrap();

  let by_tech = f
    .store
    .audit_events(AuditQuery { actor_id: Some(f.tech1.user_id), ..Default::default() })
    .await
    .unwrap();
  assert_eq!(by_tech.len(), 1);
  assert_eq!(by_tech[0].event_type, event::STOCK_TRANSFER);
  assert_eq!(by_tech[0].seq, 5);

  let recent = f
    .store
    .audit_events(AuditQuery {
      actor_id: Some(f.admin.user_id),
      newest_first: true,
      limit: Some(2),
      ..Default::default()
    })
    .await
    .unwrap();
  let seqs: Vec<_> = recent.iter().map(|e| e.seq).collect();
  assert_eq!(seqs, vec![4, 3]);
  assert!(recent.iter().all(|e| e.actor_id == f.admin.user_id));
}

#[tokio::test]
async fn tampering_is_detected() {
  let f = Fixture::new().await;
  busy(&f).await;

  // Only someone bypassing the store can do this.
  f.store
    .read(|conn| {
      conn.execute_batch(
        "DROP TRIGGER audit_events_no_update;
         UPDATE audit_events SET payload = '{\"quantity\":\"999\"}' WHERE seq = 2;",
      )?;
      Ok(())
    })
    .await
    .unwrap();

  let report = f.store.verify_chain().await.unwrap();
  assert!(!report.is_intact());
  assert_eq!(report.verified, 1);
  assert_eq!(report.breaks[0].seq, 2);
  assert_eq!(report.breaks[0].kind, BreakKind::HashMismatch);
}
