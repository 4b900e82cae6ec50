//! Backend traits and the operations they expose.
//!
//! The traits are implemented by storage backends (e.g.
//! `stockroom-store-sqlite`). Every mutating method takes the calling
//! [`Actor`] and commits as one atomic unit: the balance change, its movement
//! rows, and its audit event are all written or none are.
//!
//! All methods return `Send` futures so the traits can be used in
//! multi-threaded async runtimes.

use std::future::Future;

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
  actor::Actor,
  article::{Article, ArticlePatch, NewArticle},
  audit::{AuditEvent, AuditQuery, ChainReport},
  cart::{AddToCart, Cart},
  demand::{Demand, DemandQuery, Handover, HandoverReceipt, IssuedPin, LineApproval},
  reservation::{NewReservation, Reservation},
  stock::{
    AdjustStock, AlertQuery, DeclareUsage, Movement, MovementOutcome, MovementQuery, NewMovement,
    StockLevel, Threshold, ThresholdAlert,
  },
  transfer::{NewTransfer, TransferReceipt},
};

/// Shared error type of a backend. Domain rejections convert into it, so
/// callers can recover the [`crate::Error`] underneath.
pub trait StoreBackend: Send + Sync {
  type Error: std::error::Error + From<crate::Error> + Send + Sync + 'static;
}

// ─── Catalog ─────────────────────────────────────────────────────────────────

pub trait CatalogStore: StoreBackend {
  /// Admin only. Fails with `DuplicateReference` if the reference is taken.
  fn create_article(
    &self,
    actor: Actor,
    input: NewArticle,
  ) -> impl Future<Output = Result<Article, Self::Error>> + Send + '_;

  fn get_article(
    &self,
    article_id: Uuid,
  ) -> impl Future<Output = Result<Option<Article>, Self::Error>> + Send + '_;

  fn find_article(
    &self,
    reference: String,
  ) -> impl Future<Output = Result<Option<Article>, Self::Error>> + Send + '_;

  fn list_articles(
    &self,
    include_inactive: bool,
  ) -> impl Future<Output = Result<Vec<Article>, Self::Error>> + Send + '_;

  /// Admin only. Changes descriptive fields; the reference never changes.
  fn update_article(
    &self,
    actor: Actor,
    article_id: Uuid,
    patch: ArticlePatch,
  ) -> impl Future<Output = Result<Article, Self::Error>> + Send + '_;

  fn set_article_active(
    &self,
    actor: Actor,
    article_id: Uuid,
    active: bool,
  ) -> impl Future<Output = Result<Article, Self::Error>> + Send + '_;
}

// ─── Ledger ──────────────────────────────────────────────────────────────────

pub trait LedgerStore: StoreBackend {
  /// Lock the balance row, check the delta, write the movement and its audit
  /// event. Admin only; workflow operations reach the same path internally.
  fn apply_movement(
    &self,
    actor: Actor,
    movement: NewMovement,
  ) -> impl Future<Output = Result<MovementOutcome, Self::Error>> + Send + '_;

  /// Admin only.
  fn adjust_stock(
    &self,
    actor: Actor,
    input: AdjustStock,
  ) -> impl Future<Output = Result<MovementOutcome, Self::Error>> + Send + '_;

  /// The technician themself, or an admin on their behalf.
  fn declare_usage(
    &self,
    actor: Actor,
    input: DeclareUsage,
  ) -> impl Future<Output = Result<MovementOutcome, Self::Error>> + Send + '_;

  /// The current level, or a zero level if the pair has never moved.
  fn stock_level(
    &self,
    technician_id: Uuid,
    article_id: Uuid,
  ) -> impl Future<Output = Result<StockLevel, Self::Error>> + Send + '_;

  fn list_stock(
    &self,
    technician_id: Uuid,
  ) -> impl Future<Output = Result<Vec<StockLevel>, Self::Error>> + Send + '_;

  /// Movements in commit order.
  fn movements(
    &self,
    query: MovementQuery,
  ) -> impl Future<Output = Result<Vec<Movement>, Self::Error>> + Send + '_;

  /// Admin only. Replaces any existing threshold for the pair.
  fn set_threshold(
    &self,
    actor: Actor,
    technician_id: Uuid,
    article_id: Uuid,
    min_qty: Decimal,
  ) -> impl Future<Output = Result<Threshold, Self::Error>> + Send + '_;

  fn list_alerts(
    &self,
    query: AlertQuery,
  ) -> impl Future<Output = Result<Vec<ThresholdAlert>, Self::Error>> + Send + '_;

  fn acknowledge_alert(
    &self,
    actor: Actor,
    alert_id: Uuid,
  ) -> impl Future<Output = Result<ThresholdAlert, Self::Error>> + Send + '_;
}

// ─── Cart ────────────────────────────────────────────────────────────────────

/// Cart operations. Technicians act on their own cart only.
pub trait CartStore: StoreBackend {
  /// The technician's open cart, created if none exists.
  fn cart(
    &self,
    actor: Actor,
    technician_id: Uuid,
  ) -> impl Future<Output = Result<Cart, Self::Error>> + Send + '_;

  /// Adds to an existing line for the same article rather than duplicating it.
  fn add_to_cart(
    &self,
    actor: Actor,
    input: AddToCart,
  ) -> impl Future<Output = Result<Cart, Self::Error>> + Send + '_;

  /// A quantity of zero or less removes the line.
  fn update_cart_line(
    &self,
    actor: Actor,
    technician_id: Uuid,
    line_id: Uuid,
    quantity: Decimal,
  ) -> impl Future<Output = Result<Cart, Self::Error>> + Send + '_;

  fn remove_cart_line(
    &self,
    actor: Actor,
    technician_id: Uuid,
    line_id: Uuid,
  ) -> impl Future<Output = Result<Cart, Self::Error>> + Send + '_;

  fn clear_cart(
    &self,
    actor: Actor,
    technician_id: Uuid,
  ) -> impl Future<Output = Result<Cart, Self::Error>> + Send + '_;

  /// Snapshot the open cart into a new `SUBMITTED` demand and close it.
  /// Fails with `EmptyCart` if it has no lines.
  fn submit_cart(
    &self,
    actor: Actor,
    technician_id: Uuid,
    notes: Option<String>,
  ) -> impl Future<Output = Result<Demand, Self::Error>> + Send + '_;
}

// ─── Demands ─────────────────────────────────────────────────────────────────

pub trait DemandStore: StoreBackend {
  fn get_demand(
    &self,
    demand_id: Uuid,
  ) -> impl Future<Output = Result<Option<Demand>, Self::Error>> + Send + '_;

  fn list_demands(
    &self,
    query: DemandQuery,
  ) -> impl Future<Output = Result<Vec<Demand>, Self::Error>> + Send + '_;

  fn approve_all(
    &self,
    actor: Actor,
    demand_id: Uuid,
    notes: Option<String>,
  ) -> impl Future<Output = Result<Demand, Self::Error>> + Send + '_;

  /// Unlisted lines are approved at zero. Resolves to `REFUSED` when every
  /// line ends at zero.
  fn approve_partial(
    &self,
    actor: Actor,
    demand_id: Uuid,
    approvals: Vec<LineApproval>,
    reason: Option<String>,
  ) -> impl Future<Output = Result<Demand, Self::Error>> + Send + '_;

  fn refuse(
    &self,
    actor: Actor,
    demand_id: Uuid,
    reason: String,
  ) -> impl Future<Output = Result<Demand, Self::Error>> + Send + '_;

  /// Stage the approved quantities and mark the demand ready for handover.
  /// Moves no stock.
  fn prepare(
    &self,
    actor: Actor,
    demand_id: Uuid,
  ) -> impl Future<Output = Result<Demand, Self::Error>> + Send + '_;

  /// Issue a single-use PIN for a demand that is ready for handover.
  fn issue_handover_pin(
    &self,
    actor: Actor,
    demand_id: Uuid,
  ) -> impl Future<Output = Result<IssuedPin, Self::Error>> + Send + '_;

  /// Verify the confirmation and deduct every approved line in one batch.
  fn handover(
    &self,
    actor: Actor,
    demand_id: Uuid,
    confirmation: Handover,
  ) -> impl Future<Output = Result<HandoverReceipt, Self::Error>> + Send + '_;
}

// ─── Reservations ────────────────────────────────────────────────────────────

pub trait ReservationStore: StoreBackend {
  fn create_reservation(
    &self,
    actor: Actor,
    input: NewReservation,
  ) -> impl Future<Output = Result<Reservation, Self::Error>> + Send + '_;

  /// Admin only. Fails with `InsufficientAvailable` when the hold does not
  /// fit in the technician's available quantity.
  fn approve_reservation(
    &self,
    actor: Actor,
    reservation_id: Uuid,
  ) -> impl Future<Output = Result<Reservation, Self::Error>> + Send + '_;

  fn cancel_reservation(
    &self,
    actor: Actor,
    reservation_id: Uuid,
  ) -> impl Future<Output = Result<Reservation, Self::Error>> + Send + '_;

  fn get_reservation(
    &self,
    reservation_id: Uuid,
  ) -> impl Future<Output = Result<Option<Reservation>, Self::Error>> + Send + '_;

  fn list_reservations(
    &self,
    technician_id: Option<Uuid>,
  ) -> impl Future<Output = Result<Vec<Reservation>, Self::Error>> + Send + '_;
}

// ─── Transfers ───────────────────────────────────────────────────────────────

pub trait TransferStore: StoreBackend {
  /// Move stock between two technicians as one linked movement pair.
  fn transfer(
    &self,
    actor: Actor,
    input: NewTransfer,
  ) -> impl Future<Output = Result<TransferReceipt, Self::Error>> + Send + '_;
}

// ─── Audit ───────────────────────────────────────────────────────────────────

pub trait AuditStore: StoreBackend {
  /// Events in chain order, optionally filtered.
  fn audit_events(
    &self,
    query: AuditQuery,
  ) -> impl Future<Output = Result<Vec<AuditEvent>, Self::Error>> + Send + '_;

  /// The latest `this_hash`, or the genesis hash for an empty chain.
  fn chain_head(&self) -> impl Future<Output = Result<String, Self::Error>> + Send + '_;

  /// Re-hash every stored event in order.
  fn verify_chain(&self) -> impl Future<Output = Result<ChainReport, Self::Error>> + Send + '_;
}
