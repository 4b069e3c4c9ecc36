// core/src/pipelines/contexts.rs

//! Request types and the context structs each pipeline runs over.
//! Handlers receive these wrapped in `Shared`.

use crate::engine::Services;
use crate::gateway::{PaymentSession, ProviderEvent};
use crate::inventory::{PaymentConfirmation, StockMovement};
use crate::model::{AddOn, FulfillmentStage, OrderRecord, OrderStatus, Product};
use crate::pricing::Quote;
use crate::voucher::ValidVoucher;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

// --- Add to cart ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddToCart {
  pub user_id: Uuid,
  pub product_id: Uuid,
  pub quantity: i64,
  #[serde(default)]
  pub addons: Vec<AddOn>,
}

pub struct AddToCartCtx {
  pub services: Services,
  pub request: AddToCart,
  pub product: Option<Product>,
  pub line: Option<OrderRecord>,
}

// --- Checkout ---

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckoutRequest {
  pub user_id: Uuid,
  pub cart_line_ids: Vec<Uuid>,
  #[serde(default)]
  pub voucher_code: Option<String>,
  /// Add-on selections per cart line; lines not listed keep the add-ons they were added with.
  #[serde(default)]
  pub addons: HashMap<Uuid, Vec<AddOn>>,
  #[serde(default)]
  pub idempotency_key: Option<String>,
  #[serde(default)]
  pub payment_method: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutReceipt {
  pub checkout_id: Uuid,
  pub order_ids: Vec<Uuid>,
  pub subtotal: i64,
  pub discount: i64,
  pub total: i64,
  pub checkout_url: String,
  pub session_id: String,
  /// True when the records already existed and only a new payment session was created.
  pub resumed: bool,
}

pub struct CheckoutCtx {
  pub services: Services,
  pub request: CheckoutRequest,
  pub checkout_id: Option<Uuid>,
  /// Set when the checkout's records already exist.
  pub resumed: bool,
  pub lines: Vec<OrderRecord>,
  pub voucher: Option<ValidVoucher>,
  pub quote: Option<Quote>,
  pub orders: Vec<OrderRecord>,
  pub session: Option<PaymentSession>,
}

impl CheckoutCtx {
  pub fn new(services: Services, request: CheckoutRequest) -> Self {
    Self {
      services,
      request,
      checkout_id: None,
      resumed: false,
      lines: Vec::new(),
      voucher: None,
      quote: None,
      orders: Vec::new(),
      session: None,
    }
  }

  /// Summed totals of the orders this run covers.
  pub fn amount_due(&self) -> i64 {
    self.orders.iter().map(|o| o.total_amount).sum()
  }

  pub fn receipt(&self) -> Option<CheckoutReceipt> {
    let session = self.session.as_ref()?;
    let subtotal = self.orders.iter().map(OrderRecord::line_subtotal).sum();
    let discount = self.orders.iter().map(|o| o.meta.discount_share()).sum();
    Some(CheckoutReceipt {
      checkout_id: self.checkout_id?,
      order_ids: self.orders.iter().map(|o| o.id).collect(),
      subtotal,
      discount,
      total: self.amount_due(),
      checkout_url: session.checkout_url.clone(),
      session_id: session.session_id.clone(),
      resumed: self.resumed,
    })
  }
}

// --- Reconcile ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementSource {
  Webhook { payload: Vec<u8>, signature: Option<String> },
  Capture { provider_order_id: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SettlementReport {
  pub applied: Vec<Uuid>,
  pub already_applied: Vec<Uuid>,
  /// Lines that can never take this payment (cancelled, unknown). Redelivery will not change
  /// them; they are flagged for a manual refund.
  pub rejected: Vec<(Uuid, String)>,
  /// Lines that failed for a transient reason and may succeed on redelivery.
  pub failed: Vec<(Uuid, String)>,
}

impl SettlementReport {
  /// No line is waiting on a retry.
  pub fn is_clean(&self) -> bool {
    self.failed.is_empty()
  }

  /// Turns a report with retryable failures into `PartialFailure`. Rejected lines alone do not
  /// fail the settlement.
  pub fn into_result(self) -> Result<SettlementReport, crate::error::EngineError> {
    if self.is_clean() {
      return Ok(self);
    }
    Err(crate::error::EngineError::PartialFailure {
      applied: self.applied,
      failed: self.failed,
    })
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
  /// Not a confirmation event; acknowledged and dropped.
  Ignored { event_type: String },
  Settled(SettlementReport),
}

pub struct ReconcileCtx {
  pub services: Services,
  pub source: SettlementSource,
  pub event: Option<ProviderEvent>,
  pub reference: Option<String>,
  pub confirmation: Option<PaymentConfirmation>,
  pub order_ids: Vec<Uuid>,
  pub report: SettlementReport,
  /// Records this settlement moved to `reserved`.
  pub reserved: Vec<OrderRecord>,
  pub ignored: bool,
}

impl ReconcileCtx {
  pub fn new(services: Services, source: SettlementSource) -> Self {
    Self {
      services,
      source,
      event: None,
      reference: None,
      confirmation: None,
      order_ids: Vec::new(),
      report: SettlementReport::default(),
      reserved: Vec::new(),
      ignored: false,
    }
  }
}

// --- Cancellation ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelRequest {
  pub order_id: Uuid,
  pub user_id: Uuid,
  #[serde(default)]
  pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CancelOutcome {
  Cancelled {
    order: OrderRecord,
    /// Reserved stock went back to the product.
    compensated_inventory: bool,
    restocked: Option<StockMovement>,
  },
  /// The order is in production; an admin has to approve the request.
  PendingApproval { order: OrderRecord },
}

impl CancelOutcome {
  pub fn order(&self) -> &OrderRecord {
    match self {
      CancelOutcome::Cancelled { order, .. } | CancelOutcome::PendingApproval { order } => order,
    }
  }
}

pub struct CancelCtx {
  pub services: Services,
  pub request: CancelRequest,
  pub outcome: Option<CancelOutcome>,
}

// --- Fulfillment transitions ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
  Admin,
  Customer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
  pub name: String,
  pub role: Role,
}

impl Actor {
  pub fn admin(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      role: Role::Admin,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdate {
  pub order_id: Uuid,
  /// Customer-facing stage or storage status.
  pub status: String,
  pub actor: Actor,
  #[serde(default)]
  pub notes: Option<String>,
  #[serde(default)]
  pub estimated_delivery: Option<NaiveDate>,
  /// Storage was already updated elsewhere; only notify.
  #[serde(default)]
  pub skip_write: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionOutcome {
  pub order: OrderRecord,
  pub restocked: Option<StockMovement>,
  pub notified_in_app: bool,
  pub emailed: bool,
}

pub struct TransitionCtx {
  pub services: Services,
  pub request: StatusUpdate,
  pub target: Option<(FulfillmentStage, OrderStatus)>,
  pub order: Option<OrderRecord>,
  pub restocked: Option<StockMovement>,
  pub notified_in_app: bool,
  pub emailed: bool,
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::EngineError;

  #[test]
  fn only_retryable_failures_fail_a_settlement() {
    let applied = Uuid::new_v4();
    let cancelled = Uuid::new_v4();
    let mut report = SettlementReport {
      applied: vec![applied],
      rejected: vec![(cancelled, "order is cancelled".into())],
      ..Default::default()
    };
    assert!(report.clone().into_result().is_ok());

    let flaky = Uuid::new_v4();
    report.failed.push((flaky, "connection reset".into()));
    match report.into_result() {
      Err(EngineError::PartialFailure { applied: ok, failed }) => {
        assert_eq!(ok, vec![applied]);
        assert_eq!(failed, vec![(flaky, "connection reset".to_string())]);
      }
      other => panic!("expected partial failure, got {:?}", other),
    }
  }
}
