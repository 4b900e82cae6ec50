//! Integration tests for `SqliteStore`.
//!
//! Most tests run against an in-memory database; the concurrency tests open
//! two stores on one file so they contend through SQLite's locks.

use rust_decimal::Decimal;
use stockroom_core::{
  actor::{Actor, Role},
  article::{Article, NewArticle},
  collab::InMemoryDirectory,
  stock::{AdjustOperation, AdjustStock, MovementQuery},
  store::{CatalogStore, LedgerStore},
};
use uuid::Uuid;

use crate::SqliteStore;

mod audit;
mod reservation;
mod transfer;
mod workflow;

pub(crate) fn q(n: i64) -> Decimal { Decimal::from(n) }

/// The users every test works with.
#[derive(Clone, Copy)]
pub(crate) struct People {
  pub admin: Actor,
  pub tech1: Actor,
  pub tech2: Actor,
}

impl People {
  pub fn new() -> Self {
    Self {
      admin: Actor::admin(Uuid::new_v4()),
      tech1: Actor::technician(Uuid::new_v4()),
      tech2: Actor::technician(Uuid::new_v4()),
    }
  }

  pub fn directory(&self) -> InMemoryDirectory {
    [
      (self.admin.user_id, Role::Admin),
      (self.tech1.user_id, Role::Technician),
      (self.tech2.user_id, Role::Technician),
    ]
    .into_iter()
    .collect()
  }
}

pub(crate) struct Fixture {
  pub store: SqliteStore,
  pub admin: Actor,
  pub tech1: Actor,
  pub tech2: Actor,
}

impl Fixture {
  pub async fn new() -> Self {
    let store = SqliteStore::open_in_memory().await.expect("in-memory store");
    Self::around(store, People::new())
  }

  pub fn around(store: SqliteStore, people: People) -> Self {
    Self {
      store: store.with_directory(people.directory()),
      admin: people.admin,
      tech1: people.tech1,
      tech2: people.tech2,
    }
  }

  pub async fn article(&self, reference: &str) -> Article {
    self
      .store
      .create_article(self.admin, NewArticle::new(reference, format!("Article {reference}")))
      .await
      .expect("create article")
  }

  /// Give `tech` `qty` more of `article_id`.
  pub async fn stock(&self, tech: Actor, article_id: Uuid, qty: i64) {
    self
      .store
      .adjust_stock(self.admin, AdjustStock {
        technician_id: tech.user_id,
        article_id,
        operation: AdjustOperation::Add,
        quantity: q(qty),
        reason: Some("stocktake".into()),
      })
      .await
      .expect("seed stock");
  }

  pub async fn balance(&self, tech: Actor, article_id: Uuid) -> Decimal {
    self.store.stock_level(tech.user_id, article_id).await.expect("stock level").balance
  }

  /// Sum of every movement delta for the pair.
  pub async fn ledger_sum(&self, tech: Actor, article_id: Uuid) -> Decimal {
    self
      .store
      .movements(MovementQuery {
        technician_id: Some(tech.user_id),
        article_id: Some(article_id),
        ..Default::default()
      })
      .await
      .expect("movements")
      .iter()
      .map(|m| m.delta)
      .sum()
  }
}
