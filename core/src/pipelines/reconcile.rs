// core/src/pipelines/reconcile.rs

//! Applies a payment confirmation, from a webhook or a direct capture, to every order it
//! references. Each order is reserved in its own atomic mutation, so one failing line does not
//! block its siblings and a repeated confirmation changes nothing.

use crate::error::EngineError;
use crate::gateway::{reference, CaptureStatus};
use crate::inventory::{self, PaymentConfirmation, StockMovement};
use crate::model::OrderRecord;
use crate::notifier::{Notification, NotificationCategory, Recipient};
use crate::pipelines::contexts::{ReconcileCtx, SettlementSource};
use crate::pipelines::notify::{format_amount, notify_user};
use crate::store::Commit;
use crate::workflow::{Flow, Pipeline, Registry, Shared};
use chrono::Utc;
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub fn register_reconcile_pipeline(registry: &Registry<EngineError>) {
  let mut p = Pipeline::<ReconcileCtx, EngineError>::new(
    "reconcile_payment",
    &[
      ("receive_confirmation", false),
      ("resolve_orders", false),
      ("reserve_orders", false),
      ("notify_order_placed", true),
    ],
  );

  // Step 1: Verify the webhook or perform the capture
  p.on("receive_confirmation", |ctx: Shared<ReconcileCtx>| async move {
    let (services, source) = ctx.snapshot(|c| (c.services.clone(), c.source.clone()));

    match source {
      SettlementSource::Webhook { payload, signature } => {
        let event = services.gateway.verify_event(&payload, signature.as_deref())?;
        if !services.config.is_confirmation_event(&event.event_type) {
          info!(event_type = %event.event_type, event_id = %event.event_id, "Webhook event ignored.");
          ctx.update(|c| {
            c.ignored = true;
            c.event = Some(event);
          });
          return Ok(Flow::Stop);
        }
        let reference = event
          .reference
          .clone()
          .ok_or_else(|| EngineError::Validation("payment event carries no order reference".to_string()))?;
        let confirmation = PaymentConfirmation {
          transaction_id: event.transaction_id.clone().unwrap_or_else(|| event.event_id.clone()),
          provider_order_id: event.provider_order_id.clone(),
        };
        info!(event_type = %event.event_type, event_id = %event.event_id, "Payment confirmation received.");
        ctx.update(|c| {
          c.reference = Some(reference);
          c.confirmation = Some(confirmation);
          c.event = Some(event);
        });
      }
      SettlementSource::Capture { provider_order_id } => {
        let capture = services.gateway.capture(&provider_order_id).await?;
        if capture.status != CaptureStatus::Completed {
          warn!(%provider_order_id, status = ?capture.status, "Capture did not complete.");
          return Err(EngineError::Upstream(format!(
            "capture of provider order {} did not complete ({:?})",
            provider_order_id, capture.status
          )));
        }
        info!(%provider_order_id, transaction_id = %capture.transaction_id, "Payment captured.");
        ctx.update(|c| {
          c.reference = Some(capture.reference);
          c.confirmation = Some(PaymentConfirmation {
            transaction_id: capture.transaction_id,
            provider_order_id: Some(capture.provider_order_id),
          });
        });
      }
    }
    Ok::<_, EngineError>(Flow::Continue)
  });

  // Step 2: Turn the reference into order ids
  p.on("resolve_orders", |ctx: Shared<ReconcileCtx>| async move {
    let raw = ctx.snapshot(|c| c.reference.clone()).unwrap_or_default();
    let order_ids = reference::decode(&raw)?;
    debug!(orders = order_ids.len(), "Settlement references resolved.");
    ctx.write().order_ids = order_ids;
    Ok::<_, EngineError>(Flow::Continue)
  });

  // Step 3: Reserve each order; failures are collected per line
  p.on("reserve_orders", |ctx: Shared<ReconcileCtx>| async move {
    let (store, order_ids, confirmation) = ctx.snapshot(|c| {
      (
        c.services.store.clone(),
        c.order_ids.clone(),
        c.confirmation.clone(),
      )
    });
    let confirmation =
      confirmation.ok_or_else(|| EngineError::Validation("settlement has no payment confirmation".to_string()))?;

    for order_id in order_ids {
      let mut movement: Option<StockMovement> = None;
      let result = store
        .mutate_order(
          order_id,
          Box::new(|record: &mut OrderRecord, stock: &mut i64| {
            match inventory::reserve(record, stock, &confirmation, Utc::now())? {
              Some(m) => {
                movement = Some(m);
                Ok(Commit::Write)
              }
              None => Ok(Commit::Unchanged),
            }
          }),
        )
        .await;

      match result {
        Ok(record) if movement.is_some() => {
          info!(%order_id, movement = ?movement, "Order reserved.");
          ctx.update(|c| {
            c.report.applied.push(order_id);
            c.reserved.push(record);
          });
        }
        Ok(_) => {
          debug!(%order_id, "Confirmation already applied.");
          ctx.write().report.already_applied.push(order_id);
        }
        Err(e @ (EngineError::Conflict(_) | EngineError::NotFound { .. })) => {
          warn!(
            %order_id,
            transaction_id = %confirmation.transaction_id,
            reason = %e,
            "Payment confirmed for an order that cannot take it; flag for manual refund."
          );
          ctx.write().report.rejected.push((order_id, e.to_string()));
        }
        Err(e) => {
          error!(%order_id, error = %e, "Failed to apply payment confirmation.");
          ctx.write().report.failed.push((order_id, e.to_string()));
        }
      }
    }
    Ok::<_, EngineError>(Flow::Continue)
  });

  // Step 4: One order-placed notification per owner for the lines newly reserved
  p.skip_if("notify_order_placed", |c: &ReconcileCtx| c.reserved.is_empty());
  p.on("notify_order_placed", |ctx: Shared<ReconcileCtx>| async move {
    let (services, reserved) = ctx.snapshot(|c| (c.services.clone(), c.reserved.clone()));

    let mut by_owner: BTreeMap<Uuid, Vec<OrderRecord>> = BTreeMap::new();
    for record in reserved {
      by_owner.entry(record.user_id).or_default().push(record);
    }

    for (user_id, lines) in by_owner {
      // A reference may span checkouts, so these sums saturate
      let sum = |f: fn(&OrderRecord) -> i64| lines.iter().map(f).fold(0i64, i64::saturating_add);
      let subtotal = sum(OrderRecord::line_subtotal);
      let discount = sum(|l| l.meta.discount_share());
      let total = sum(|l| l.total_amount);
      let currency = services.config.currency.as_str();
      let items = lines.iter().map(|l| l.quantity).sum::<i64>();

      let notification = Notification {
        recipient: Recipient::User(user_id),
        title: "Order placed".to_string(),
        message: format!(
          "Payment received for {} item(s) across {} order line(s). Subtotal {}, discount {}, total {}.",
          items,
          lines.len(),
          format_amount(subtotal, currency),
          format_amount(discount, currency),
          format_amount(total, currency)
        ),
        category: NotificationCategory::OrderPlaced,
        order_ids: lines.iter().map(|l| l.id).collect(),
      };
      let delivery = notify_user(&services, user_id, notification).await?;
      debug!(%user_id, in_app = delivery.in_app, email = delivery.email, "Order-placed notification handled.");
    }
    Ok::<_, EngineError>(Flow::Continue)
  });

  registry.register(p);
  info!("Payment reconciliation pipeline registered.");
}
