// core/src/inventory.rs

//! Inventory ledger rules. These run inside `OrderStore::mutate_order`, which holds the order row
//! and its product's stock for the duration, so the reservation flag and the stock move together.

use crate::error::EngineError;
use crate::model::{
  Cancellation, ItemType, OrderRecord, OrderStatus, PaymentStatus, Reservation, StageMeta,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StockMovement {
  pub before: i64,
  pub after: i64,
}

/// Provider details recorded with a reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentConfirmation {
  pub transaction_id: String,
  pub provider_order_id: Option<String>,
}

pub fn decrement(stock: &mut i64, quantity: i64) -> StockMovement {
  let before = *stock;
  *stock = (before - quantity.max(0)).max(0);
  StockMovement { before, after: *stock }
}

pub fn increment(stock: &mut i64, quantity: i64) -> StockMovement {
  let before = *stock;
  *stock = before + quantity.max(0);
  StockMovement { before, after: *stock }
}

/// Marks an unpaid order as paid and reserves its stock.
///
/// Returns `Ok(None)` when the record is already paid, which makes redelivery a no-op. An order an
/// admin already moved past `pending_payment` keeps its status; only `pending_payment` advances to
/// `reserved`. Cancelled or completed records are a conflict: the payment was taken for an order
/// that can no longer be fulfilled.
///
/// Only the units actually in stock are recorded as reserved. The rest is kept as `shortfall` so
/// a later cancellation gives back exactly what was taken.
pub fn reserve(
  record: &mut OrderRecord,
  stock: &mut i64,
  confirmation: &PaymentConfirmation,
  now: DateTime<Utc>,
) -> Result<Option<StockMovement>, EngineError> {
  if record.payment_status == PaymentStatus::Completed {
    return Ok(None);
  }
  if record.item_type == ItemType::Cart
    || record.payment_status != PaymentStatus::Pending
    || record.status.is_terminal()
  {
    return Err(EngineError::Conflict(format!(
      "order {} is {} and cannot take a payment confirmation",
      record.id, record.status
    )));
  }

  let provider_order_id = match &record.meta.stage {
    StageMeta::AwaitingPayment { provider_order_id, .. } => provider_order_id.clone(),
    _ => None,
  };
  let (movement, reserved_quantity) = match record.meta.reservation().filter(|r| r.inventory_reserved) {
    Some(existing) => (
      StockMovement {
        before: *stock,
        after: *stock,
      },
      existing.reserved_quantity,
    ),
    None => {
      let movement = decrement(stock, record.quantity);
      (movement, movement.before - movement.after)
    }
  };
  let shortfall = (record.quantity - reserved_quantity).max(0);

  record.meta.stage = StageMeta::Reserved(Reservation {
    inventory_reserved: true,
    reserved_quantity,
    shortfall,
    stock_before: movement.before,
    stock_after: movement.after,
    provider_transaction_id: confirmation.transaction_id.clone(),
    provider_order_id: confirmation.provider_order_id.clone().or(provider_order_id),
    confirmed_at: now,
    restocked_at: None,
  });
  record.item_type = ItemType::Reservation;
  if record.status == OrderStatus::PendingPayment {
    record.set_stage(OrderStatus::Reserved.default_stage());
  }
  record.payment_status = PaymentStatus::Completed;
  record.touch(now);
  Ok(Some(movement))
}

/// Cancels `record`, restoring any reserved stock. Used for both customer cancellations and
/// admin-approved ones. Payment moves to `refund_pending` only if it had been taken.
pub fn compensate(
  record: &mut OrderRecord,
  stock: &mut i64,
  mut cancellation: Cancellation,
  now: DateTime<Utc>,
) -> Option<StockMovement> {
  let mut reservation = record.meta.reservation().cloned();
  let movement = match reservation.as_mut() {
    Some(r) if r.inventory_reserved => {
      let movement = increment(stock, r.reserved_quantity);
      r.inventory_reserved = false;
      r.restocked_at = Some(now);
      Some(movement)
    }
    _ => None,
  };

  if let Some(request) = record.meta.cancellation_request.take() {
    cancellation.requested_from = request.requested_from;
    if cancellation.reason.is_none() {
      cancellation.reason = request.reason;
    }
  }
  record.meta.stage = StageMeta::Cancelled {
    reservation,
    cancellation,
  };
  record.set_stage(OrderStatus::Cancelled.default_stage());
  if record.payment_status == PaymentStatus::Completed {
    record.payment_status = PaymentStatus::RefundPending;
  }
  record.touch(now);
  movement
}
