// tests/reconcile_tests.rs
mod common;

use common::*;
use futures_util::future::join_all;
use orderflow::model::{DiscountKind, ItemType, OrderStatus, PaymentStatus};
use orderflow::{CancelRequest, CaptureResult, CaptureStatus, EngineError, NotificationCategory, WebhookOutcome};
use serial_test::serial;
use uuid::Uuid;

fn settled(outcome: WebhookOutcome) -> orderflow::SettlementReport {
  match outcome {
    WebhookOutcome::Settled(report) => report,
    other => panic!("expected a settlement, got {:?}", other),
  }
}

#[tokio::test]
async fn test_confirmation_reserves_inventory_and_notifies_once() {
  let h = Harness::new();
  let user = Uuid::new_v4();
  let product = h.product(5000, 10);
  h.voucher("TENOFF", DiscountKind::Percent, 10);
  let line = h.add_to_cart(user, &product, 2, vec![addon("gift_wrap", 300)]).await;
  let receipt = h.checkout(user, &[&line], Some("TENOFF")).await.unwrap();

  let report = settled(h.confirm(&receipt).await.unwrap());
  assert_eq!(report.applied, receipt.order_ids);
  assert!(report.already_applied.is_empty() && report.failed.is_empty() && report.rejected.is_empty());

  assert_eq!(h.stock(&product), 8);
  let order = h.engine.order(receipt.order_ids[0]).await.unwrap();
  assert_eq!(order.status, OrderStatus::Reserved);
  assert_eq!(order.item_type, ItemType::Reservation);
  assert_eq!(order.order_progress, "payment_confirmed");
  assert_eq!(order.payment_status, PaymentStatus::Completed);
  let reservation = order.meta.reservation().unwrap();
  assert!(reservation.inventory_reserved);
  assert_eq!((reservation.stock_before, reservation.stock_after), (10, 8));
  assert_eq!(reservation.provider_transaction_id, "tx_test");

  let notes = h.notifier.in_app.lock().clone();
  assert_eq!(notes.len(), 1);
  assert_eq!(notes[0].category, NotificationCategory::OrderPlaced);
  assert!(notes[0].message.contains("USD 106.00"));
  assert!(notes[0].message.contains("USD 10.60"));
  assert!(notes[0].message.contains("USD 95.40"));
}

#[tokio::test]
async fn test_redelivered_confirmation_is_a_no_op() {
  let h = Harness::new();
  let user = Uuid::new_v4();
  let product = h.product(1000, 5);
  let line = h.add_to_cart(user, &product, 3, Vec::new()).await;
  let receipt = h.checkout(user, &[&line], None).await.unwrap();

  h.confirm(&receipt).await.unwrap();
  let after_first = h.engine.order(receipt.order_ids[0]).await.unwrap();

  let report = settled(h.confirm(&receipt).await.unwrap());
  assert!(report.applied.is_empty());
  assert_eq!(report.already_applied, receipt.order_ids);

  assert_eq!(h.engine.order(receipt.order_ids[0]).await.unwrap(), after_first);
  assert_eq!(h.stock(&product), 2);
  assert_eq!(h.notifier.in_app_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn test_concurrent_duplicate_confirmations_decrement_once() {
  let h = Harness::new();
  let user = Uuid::new_v4();
  let product = h.product(1000, 20);
  let line = h.add_to_cart(user, &product, 4, Vec::new()).await;
  let receipt = h.checkout(user, &[&line], None).await.unwrap();
  let payload = event_payload("payment_intent.succeeded", &receipt.order_ids, "tx_dup");

  let deliveries = (0..8).map(|_| {
    let engine = h.engine.clone();
    let payload = payload.clone();
    tokio::spawn(async move { engine.handle_webhook(&payload, Some(WEBHOOK_SECRET)).await })
  });
  let reports: Vec<_> = join_all(deliveries)
    .await
    .into_iter()
    .map(|joined| settled(joined.unwrap().unwrap()))
    .collect();

  let applied: usize = reports.iter().map(|r| r.applied.len()).sum();
  let replays: usize = reports.iter().map(|r| r.already_applied.len()).sum();
  assert_eq!(applied, 1);
  assert_eq!(replays, 7);
  assert_eq!(h.stock(&product), 16);
  assert_eq!(h.notifier.in_app_count(), 1);
}

#[tokio::test]
async fn test_one_failing_line_does_not_block_siblings() {
  let h = Harness::new();
  let user = Uuid::new_v4();
  let a = h.product(1000, 5);
  let b = h.product(2000, 5);
  let line_a = h.add_to_cart(user, &a, 1, Vec::new()).await;
  let line_b = h.add_to_cart(user, &b, 1, Vec::new()).await;
  let receipt = h.checkout(user, &[&line_a, &line_b], None).await.unwrap();

  // The customer cancels one line before the provider reports back
  let cancelled = receipt.order_ids[0];
  h.engine
    .cancel_order(CancelRequest {
      order_id: cancelled,
      user_id: user,
      reason: None,
    })
    .await
    .unwrap();

  let report = settled(h.confirm(&receipt).await.unwrap());
  assert_eq!(report.applied, vec![receipt.order_ids[1]]);
  assert_eq!(report.rejected.len(), 1);
  assert_eq!(report.rejected[0].0, cancelled);
  assert!(report.failed.is_empty());
  assert_eq!(h.stock(&a), 5);
  assert_eq!(h.stock(&b), 4);

  let cancelled_order = h.engine.order(cancelled).await.unwrap();
  assert_eq!(cancelled_order.status, OrderStatus::Cancelled);
  assert_ne!(cancelled_order.payment_status, PaymentStatus::Completed);

  // A line that can never settle is acknowledged, so the provider stops redelivering
  let acknowledged = report.into_result().unwrap();
  assert_eq!(acknowledged.applied.len(), 1);

  let again = settled(h.confirm(&receipt).await.unwrap());
  assert_eq!(again.already_applied, vec![receipt.order_ids[1]]);
  assert_eq!(again.rejected.len(), 1);
  assert!(again.into_result().is_ok());
  assert_eq!(h.stock(&a), 5);
  assert_eq!(h.stock(&b), 4);
}

#[tokio::test]
async fn test_unknown_order_in_reference_is_reported_per_line() {
  let h = Harness::new();
  let user = Uuid::new_v4();
  let product = h.product(1000, 5);
  let line = h.add_to_cart(user, &product, 1, Vec::new()).await;
  let receipt = h.checkout(user, &[&line], None).await.unwrap();

  let ghost = Uuid::new_v4();
  let mut ids = receipt.order_ids.clone();
  ids.push(ghost);
  let payload = event_payload("checkout.session.completed", &ids, "tx_ghost");
  let report = settled(h.engine.handle_webhook(&payload, Some(WEBHOOK_SECRET)).await.unwrap());

  assert_eq!(report.applied, receipt.order_ids);
  assert_eq!(report.rejected.len(), 1);
  assert_eq!(report.rejected[0].0, ghost);
  assert!(report.is_clean());
}

#[tokio::test]
async fn test_non_confirmation_events_are_acknowledged_and_ignored() {
  let h = Harness::new();
  let user = Uuid::new_v4();
  let product = h.product(1000, 5);
  let line = h.add_to_cart(user, &product, 1, Vec::new()).await;
  let receipt = h.checkout(user, &[&line], None).await.unwrap();

  let payload = event_payload("charge.refund.updated", &receipt.order_ids, "tx_other");
  let outcome = h.engine.handle_webhook(&payload, Some(WEBHOOK_SECRET)).await.unwrap();
  assert_eq!(
    outcome,
    WebhookOutcome::Ignored {
      event_type: "charge.refund.updated".to_string()
    }
  );
  assert_eq!(h.stock(&product), 5);
  assert_eq!(
    h.engine.order(receipt.order_ids[0]).await.unwrap().status,
    OrderStatus::PendingPayment
  );
}

#[tokio::test]
async fn test_bad_signature_and_malformed_payloads_are_rejected() {
  let h = Harness::new();
  let payload = event_payload("checkout.session.completed", &[Uuid::new_v4()], "tx");

  let err = h.engine.handle_webhook(&payload, Some("forged")).await.unwrap_err();
  assert!(matches!(err, EngineError::Forbidden(_)));
  let err = h.engine.handle_webhook(&payload, None).await.unwrap_err();
  assert!(matches!(err, EngineError::Forbidden(_)));
  let err = h.engine.handle_webhook(b"{not json", Some(WEBHOOK_SECRET)).await.unwrap_err();
  assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn test_direct_capture_converges_with_webhook() {
  let h = Harness::new();
  let user = Uuid::new_v4();
  let product = h.product(1000, 5);
  let line = h.add_to_cart(user, &product, 2, Vec::new()).await;
  let receipt = h.checkout(user, &[&line], None).await.unwrap();

  h.gateway
    .captures
    .lock()
    .insert("po_cap".to_string(), completed_capture("po_cap", &receipt.order_ids));
  let report = h.engine.capture_payment("po_cap").await.unwrap();
  assert_eq!(report.applied, receipt.order_ids);
  assert_eq!(h.stock(&product), 3);

  let order = h.engine.order(receipt.order_ids[0]).await.unwrap();
  let reservation = order.meta.reservation().unwrap();
  assert_eq!(reservation.provider_order_id.as_deref(), Some("po_cap"));
  assert_eq!(reservation.provider_transaction_id, "cap_po_cap");

  // The provider's webhook for the same payment arrives afterwards
  let report = settled(h.confirm(&receipt).await.unwrap());
  assert_eq!(report.already_applied, receipt.order_ids);
  assert_eq!(h.stock(&product), 3);
}

#[tokio::test]
async fn test_incomplete_capture_is_an_upstream_error() {
  let h = Harness::new();
  let user = Uuid::new_v4();
  let product = h.product(1000, 5);
  let line = h.add_to_cart(user, &product, 1, Vec::new()).await;
  let receipt = h.checkout(user, &[&line], None).await.unwrap();

  h.gateway.captures.lock().insert(
    "po_declined".to_string(),
    CaptureResult {
      status: CaptureStatus::Declined,
      ..completed_capture("po_declined", &receipt.order_ids)
    },
  );
  let err = h.engine.capture_payment("po_declined").await.unwrap_err();
  assert!(matches!(err, EngineError::Upstream(_)));
  assert_eq!(h.stock(&product), 5);
}

#[tokio::test]
async fn test_notification_failure_does_not_undo_settlement() {
  let h = Harness::new();
  let user = Uuid::new_v4();
  let product = h.product(1000, 5);
  let line = h.add_to_cart(user, &product, 1, Vec::new()).await;
  let receipt = h.checkout(user, &[&line], None).await.unwrap();

  h.notifier.fail_in_app.store(true, std::sync::atomic::Ordering::SeqCst);
  let report = settled(h.confirm(&receipt).await.unwrap());
  assert_eq!(report.applied.len(), 1);
  assert_eq!(h.stock(&product), 4);
  assert_eq!(h.notifier.in_app_count(), 0);
  assert_eq!(h.notifier.email_count(), 1);
}

#[tokio::test]
async fn test_payment_settles_an_order_an_admin_already_advanced() {
  let h = Harness::new();
  let user = Uuid::new_v4();
  let product = h.product(1000, 10);
  let line = h.add_to_cart(user, &product, 2, Vec::new()).await;
  let receipt = h.checkout(user, &[&line], None).await.unwrap();
  let order_id = receipt.order_ids[0];

  h.engine
    .update_status(orderflow::StatusUpdate {
      order_id,
      status: "pending_acceptance".to_string(),
      actor: orderflow::Actor::admin("ops"),
      notes: None,
      estimated_delivery: None,
      skip_write: false,
    })
    .await
    .unwrap();

  let report = settled(h.confirm(&receipt).await.unwrap());
  assert_eq!(report.applied, vec![order_id]);
  assert!(report.rejected.is_empty() && report.failed.is_empty());

  let order = h.engine.order(order_id).await.unwrap();
  assert_eq!(order.status, OrderStatus::PendingAcceptance);
  assert_eq!(order.payment_status, PaymentStatus::Completed);
  assert!(order.meta.inventory_reserved());
  assert_eq!(h.stock(&product), 8);

  // Redelivery is still a no-op
  let again = settled(h.confirm(&receipt).await.unwrap());
  assert_eq!(again.already_applied, vec![order_id]);
  assert_eq!(h.stock(&product), 8);
}
