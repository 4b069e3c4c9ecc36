// tests/fulfillment_tests.rs
mod common;

use chrono::NaiveDate;
use common::*;
use orderflow::model::{FulfillmentStage, OrderStatus, ORDER_STATUS_EMAIL, ORDER_STATUS_IN_APP};
use orderflow::{Actor, EngineError, Recipient, Role, StatusUpdate};
use uuid::Uuid;

fn update(order_id: Uuid, status: &str) -> StatusUpdate {
  StatusUpdate {
    order_id,
    status: status.to_string(),
    actor: Actor::admin("ops"),
    notes: None,
    estimated_delivery: None,
    skip_write: false,
  }
}

#[tokio::test]
async fn test_packaging_is_stored_as_start_packaging() {
  let h = Harness::new();
  let user = Uuid::new_v4();
  let (_, order) = h.reserved_order(user, 1, 5).await;
  assert_eq!(order.order_progress, "payment_confirmed");
  let history_before = order.progress_history.len();
  let in_app_before = h.notifier.in_app_count();

  let outcome = h.engine.update_status(update(order.id, "packaging")).await.unwrap();

  assert_eq!(outcome.order.status, OrderStatus::StartPackaging);
  assert_eq!(outcome.order.order_status, FulfillmentStage::Packaging);
  assert_eq!(outcome.order.order_progress, "packaging");
  assert_eq!(outcome.order.progress_history.len(), history_before + 1);
  let entry = outcome.order.progress_history.last().unwrap();
  assert_eq!(entry.status, FulfillmentStage::Packaging);
  assert_eq!(entry.actor, "ops");
  assert!(outcome.notified_in_app);
  assert_eq!(h.notifier.in_app_count(), in_app_before + 1);

  let note = h.notifier.in_app.lock().last().cloned().unwrap();
  assert_eq!(note.recipient, Recipient::User(user));
  assert_eq!(note.title, "Order update: Packaging");
  assert_eq!(note.order_ids, vec![order.id]);

  let stored = h.engine.order(order.id).await.unwrap();
  assert_eq!(stored.status, OrderStatus::StartPackaging);
}

#[tokio::test]
async fn test_preferences_gate_each_channel() {
  let h = Harness::new();
  let user = Uuid::new_v4();
  let (_, order) = h.reserved_order(user, 1, 5).await;
  h.preferences(user, &[(ORDER_STATUS_IN_APP, false)]);
  let (in_app, emails) = (h.notifier.in_app_count(), h.notifier.email_count());

  let outcome = h.engine.update_status(update(order.id, "approved")).await.unwrap();
  assert!(!outcome.notified_in_app);
  assert!(outcome.emailed);
  assert_eq!(h.notifier.in_app_count(), in_app);
  assert_eq!(h.notifier.email_count(), emails + 1);

  h.preferences(user, &[(ORDER_STATUS_IN_APP, true), (ORDER_STATUS_EMAIL, false)]);
  let outcome = h.engine.update_status(update(order.id, "in_production")).await.unwrap();
  assert!(outcome.notified_in_app);
  assert!(!outcome.emailed);
  assert_eq!(h.notifier.in_app_count(), in_app + 1);
  assert_eq!(h.notifier.email_count(), emails + 1);
}

#[tokio::test]
async fn test_notes_and_delivery_date_are_recorded_and_sent() {
  let h = Harness::new();
  let user = Uuid::new_v4();
  let (_, order) = h.reserved_order(user, 1, 5).await;
  let date = NaiveDate::from_ymd_opt(2026, 11, 2).unwrap();

  let mut request = update(order.id, "Out for delivery");
  request.notes = Some("Leave at the front desk".to_string());
  request.estimated_delivery = Some(date);
  let outcome = h.engine.update_status(request).await.unwrap();

  assert_eq!(outcome.order.status, OrderStatus::OutForDelivery);
  assert_eq!(outcome.order.meta.admin_notes.as_deref(), Some("Leave at the front desk"));
  assert_eq!(outcome.order.meta.estimated_delivery, Some(date));
  let note = h.notifier.in_app.lock().last().cloned().unwrap();
  assert!(note.message.contains("Estimated delivery: 2026-11-02."));
  assert!(note.message.ends_with("Note: Leave at the front desk"));
}

#[tokio::test]
async fn test_skip_write_only_notifies() {
  let h = Harness::new();
  let user = Uuid::new_v4();
  let (_, order) = h.reserved_order(user, 1, 5).await;
  let in_app_before = h.notifier.in_app_count();

  let mut request = update(order.id, "approved");
  request.skip_write = true;
  let outcome = h.engine.update_status(request).await.unwrap();

  assert_eq!(outcome.order.status, OrderStatus::Reserved);
  assert_eq!(outcome.order.progress_history.len(), order.progress_history.len());
  assert_eq!(h.notifier.in_app_count(), in_app_before + 1);
  let stored = h.engine.order(order.id).await.unwrap();
  assert_eq!(stored, order);
}

#[tokio::test]
async fn test_rejected_updates_leave_the_order_alone() {
  let h = Harness::new();
  let user = Uuid::new_v4();
  let (_, order) = h.reserved_order(user, 1, 5).await;

  let mut customer = update(order.id, "approved");
  customer.actor = Actor {
    name: "mallory".to_string(),
    role: Role::Customer,
  };
  let err = h.engine.update_status(customer).await.unwrap_err();
  assert!(matches!(err, EngineError::Forbidden(_)));

  let err = h.engine.update_status(update(order.id, "teleported")).await.unwrap_err();
  assert!(matches!(err, EngineError::Validation(_)));

  let err = h.engine.update_status(update(Uuid::new_v4(), "approved")).await.unwrap_err();
  assert!(matches!(err, EngineError::NotFound { .. }));

  h.engine.update_status(update(order.id, "ready_for_delivery")).await.unwrap();
  let err = h.engine.update_status(update(order.id, "in_production")).await.unwrap_err();
  assert!(matches!(err, EngineError::Conflict(_)));

  let stored = h.engine.order(order.id).await.unwrap();
  assert_eq!(stored.status, OrderStatus::ReadyForDelivery);
}

#[tokio::test]
async fn test_full_fulfillment_run_keeps_history_monotonic() {
  let h = Harness::new();
  let user = Uuid::new_v4();
  let (_, order) = h.reserved_order(user, 1, 5).await;

  for status in [
    "approved",
    "in_production",
    "quality_check",
    "packaging",
    "ready_for_delivery",
    "out_for_delivery",
    "completed",
  ] {
    h.engine.update_status(update(order.id, status)).await.unwrap();
  }

  let stored = h.engine.order(order.id).await.unwrap();
  assert_eq!(stored.status, OrderStatus::Completed);
  let stages: Vec<_> = stored.progress_history.iter().map(|e| e.status).collect();
  assert_eq!(stages.last(), Some(&FulfillmentStage::Completed));
  assert!(stored.progress_history.windows(2).all(|w| w[0].at <= w[1].at));
  assert!(stages.contains(&FulfillmentStage::QualityCheck));

  // Completed is terminal, even for a relabel of itself
  let err = h.engine.update_status(update(order.id, "completed")).await.unwrap_err();
  assert!(matches!(err, EngineError::Conflict(_)));
}

#[tokio::test]
async fn test_admin_cancel_of_unpaid_order_has_nothing_to_restock() {
  let h = Harness::new();
  let user = Uuid::new_v4();
  let product = h.product(1500, 3);
  let line = h.add_to_cart(user, &product, 2, Vec::new()).await;
  let receipt = h.checkout(user, &[&line], None).await.unwrap();

  let outcome = h.engine.update_status(update(receipt.order_ids[0], "cancelled")).await.unwrap();
  assert_eq!(outcome.order.status, OrderStatus::Cancelled);
  assert!(outcome.restocked.is_none());
  assert_eq!(h.stock(&product), 3);
}
