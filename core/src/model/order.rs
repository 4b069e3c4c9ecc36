// core/src/model/order.rs

use crate::error::EngineError;
use crate::model::status::{FulfillmentStage, OrderStatus};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
  Cart,
  Order,
  Reservation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
  Pending,
  Completed,
  RefundPending,
}

impl ItemType {
  pub fn as_str(self) -> &'static str {
    match self {
      ItemType::Cart => "cart",
      ItemType::Order => "order",
      ItemType::Reservation => "reservation",
    }
  }
}

impl PaymentStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      PaymentStatus::Pending => "pending",
      PaymentStatus::Completed => "completed",
      PaymentStatus::RefundPending => "refund_pending",
    }
  }
}

/// A selected add-on. `fee` is per unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddOn {
  pub key: String,
  pub label: String,
  pub fee: i64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub value: Option<String>,
}

/// The voucher outcome recorded on each line of a discounted checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedVoucher {
  pub code: String,
  /// This line's share of the checkout discount.
  pub discount_share: i64,
  /// Discount over the whole checkout.
  pub checkout_discount: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
  pub inventory_reserved: bool,
  /// Units actually taken from stock, and the amount a cancellation gives back.
  pub reserved_quantity: i64,
  /// Units paid for that stock could not cover at confirmation.
  #[serde(default)]
  pub shortfall: i64,
  pub stock_before: i64,
  pub stock_after: i64,
  pub provider_transaction_id: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub provider_order_id: Option<String>,
  pub confirmed_at: DateTime<Utc>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub restocked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationState {
  Requested,
  Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cancellation {
  pub cancellation_state: CancellationState,
  pub cancelled_at: DateTime<Utc>,
  pub cancelled_by: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub reason: Option<String>,
  /// Status the record was in when the customer asked; set for pending-approval requests.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub requested_from: Option<OrderStatus>,
}

/// Stage-dependent part of `meta`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StageMeta {
  Cart,
  AwaitingPayment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    provider_order_id: Option<String>,
  },
  Reserved(Reservation),
  Cancelled {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reservation: Option<Reservation>,
    cancellation: Cancellation,
  },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderMeta {
  #[serde(default)]
  pub addons: Vec<AddOn>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub voucher: Option<AppliedVoucher>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub checkout_id: Option<Uuid>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub admin_notes: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub estimated_delivery: Option<NaiveDate>,
  /// An open customer request waiting for admin approval.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub cancellation_request: Option<Cancellation>,
  #[serde(flatten)]
  pub stage: StageMeta,
}

impl OrderMeta {
  pub fn cart(addons: Vec<AddOn>) -> Self {
    Self {
      addons,
      voucher: None,
      checkout_id: None,
      admin_notes: None,
      estimated_delivery: None,
      cancellation_request: None,
      stage: StageMeta::Cart,
    }
  }

  pub fn reservation(&self) -> Option<&Reservation> {
    match &self.stage {
      StageMeta::Reserved(reservation) => Some(reservation),
      StageMeta::Cancelled { reservation, .. } => reservation.as_ref(),
      _ => None,
    }
  }

  pub fn inventory_reserved(&self) -> bool {
    self.reservation().map_or(false, |r| r.inventory_reserved)
  }

  pub fn addon_fees(&self) -> i64 {
    self.addons.iter().fold(0i64, |acc, a| acc.saturating_add(a.fee))
  }

  pub fn discount_share(&self) -> i64 {
    self.voucher.as_ref().map_or(0, |v| v.discount_share)
  }
}

/// `(price + fees) * quantity`, or a validation error when the amount does not fit.
pub fn priced_total(price: i64, addons: &[AddOn], quantity: i64) -> Result<i64, EngineError> {
  addons
    .iter()
    .try_fold(price, |acc, a| acc.checked_add(a.fee))
    .and_then(|unit| unit.checked_mul(quantity))
    .ok_or_else(amount_too_large)
}

fn amount_too_large() -> EngineError {
  EngineError::Validation("Order amount is too large.".to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
  pub status: FulfillmentStage,
  pub at: DateTime<Utc>,
  pub actor: String,
}

/// One product line: a cart row, an order awaiting payment, or a paid reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
  pub id: Uuid,
  pub user_id: Uuid,
  pub product_id: Uuid,
  pub item_type: ItemType,
  pub status: OrderStatus,
  pub order_status: FulfillmentStage,
  pub order_progress: String,
  pub quantity: i64,
  /// Unit price captured when the line was added.
  pub price: i64,
  pub total_amount: i64,
  pub payment_status: PaymentStatus,
  pub meta: OrderMeta,
  pub progress_history: Vec<HistoryEntry>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl OrderRecord {
  pub fn new_cart_line(
    user_id: Uuid,
    product_id: Uuid,
    quantity: i64,
    price: i64,
    addons: Vec<AddOn>,
  ) -> Result<Self, EngineError> {
    let now = Utc::now();
    let total_amount = priced_total(price, &addons, quantity)?.max(0);
    let meta = OrderMeta::cart(addons);
    Ok(Self {
      id: Uuid::new_v4(),
      user_id,
      product_id,
      item_type: ItemType::Cart,
      status: OrderStatus::PendingPayment,
      order_status: FulfillmentStage::PendingPayment,
      order_progress: OrderStatus::PendingPayment.progress_label().to_string(),
      quantity,
      price,
      total_amount,
      payment_status: PaymentStatus::Pending,
      meta,
      progress_history: Vec::new(),
      created_at: now,
      updated_at: now,
    })
  }

  /// Unit price plus add-on fees.
  pub fn unit_total(&self) -> i64 {
    self.price.saturating_add(self.meta.addon_fees())
  }

  /// Saturating; lines are checked with `checked_subtotal` whenever they are priced.
  pub fn line_subtotal(&self) -> i64 {
    self.unit_total().saturating_mul(self.quantity)
  }

  pub fn checked_subtotal(&self) -> Result<i64, EngineError> {
    priced_total(self.price, &self.meta.addons, self.quantity)
  }

  /// Adds `quantity` to a cart line and replaces its add-ons, repricing the line.
  pub fn merge_into_cart_line(&mut self, quantity: i64, addons: Vec<AddOn>) -> Result<(), EngineError> {
    let merged = self.quantity.checked_add(quantity).ok_or_else(amount_too_large)?;
    self.total_amount = priced_total(self.price, &addons, merged)?.max(0);
    self.quantity = merged;
    self.meta.addons = addons;
    Ok(())
  }

  /// Sets both status fields and the progress label from one stage.
  pub fn set_stage(&mut self, stage: FulfillmentStage) {
    self.status = stage.canonical();
    self.order_status = stage;
    self.order_progress = self.status.progress_label().to_string();
  }

  pub fn push_history(&mut self, status: FulfillmentStage, actor: &str, at: DateTime<Utc>) {
    self.progress_history.push(HistoryEntry {
      status,
      at,
      actor: actor.to_string(),
    });
  }

  pub fn touch(&mut self, at: DateTime<Utc>) {
    self.updated_at = at;
  }

  pub fn ensure_owned_by(&self, user_id: Uuid) -> Result<(), EngineError> {
    if self.user_id != user_id {
      return Err(EngineError::Forbidden(format!(
        "order {} does not belong to user {}",
        self.id, user_id
      )));
    }
    Ok(())
  }

  pub fn is_cart_line(&self) -> bool {
    self.item_type == ItemType::Cart
  }
}
