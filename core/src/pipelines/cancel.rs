// core/src/pipelines/cancel.rs

use crate::error::EngineError;
use crate::inventory::{self, StockMovement};
use crate::model::{Cancellation, CancellationState, FulfillmentStage, OrderRecord};
use crate::notifier::{Notification, NotificationCategory, Recipient};
use crate::pipelines::contexts::{CancelCtx, CancelOutcome};
use crate::pipelines::notify::{notify_admins, notify_user, status_message};
use crate::store::Commit;
use crate::workflow::{Flow, Pipeline, Registry, Shared};
use chrono::Utc;
use tracing::{debug, info, warn};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Decision {
  Compensated,
  Requested,
}

pub fn register_cancel_pipeline(registry: &Registry<EngineError>) {
  let mut p = Pipeline::<CancelCtx, EngineError>::new(
    "cancel_order",
    &[
      ("load_order", false),
      ("apply_cancellation", false),
      ("notify_cancellation", true),
    ],
  );

  // Step 1: Existence and ownership, before taking any lock
  p.on("load_order", |ctx: Shared<CancelCtx>| async move {
    let (store, order_id, user_id) = ctx.snapshot(|c| (c.services.store.clone(), c.request.order_id, c.request.user_id));
    let record = store.order(order_id).await?;
    if record.is_cart_line() {
      return Err(EngineError::not_found("order", order_id));
    }
    if let Err(e) = record.ensure_owned_by(user_id) {
      warn!(%order_id, %user_id, "Cancellation refused: not the owner.");
      return Err(e);
    }
    Ok::<_, EngineError>(Flow::Continue)
  });

  // Step 2: Check the status and cancel or file a request, atomically
  p.on("apply_cancellation", |ctx: Shared<CancelCtx>| async move {
    let (store, request) = ctx.snapshot(|c| (c.services.store.clone(), c.request.clone()));
    let actor = request.user_id.to_string();

    let mut decision = None;
    let mut restocked: Option<StockMovement> = None;
    let record = store
      .mutate_order(
        request.order_id,
        Box::new(|record: &mut OrderRecord, stock: &mut i64| {
          record.ensure_owned_by(request.user_id)?;
          let now = Utc::now();
          let status = record.status;

          if status.is_customer_cancellable() {
            let cancellation = Cancellation {
              cancellation_state: CancellationState::Completed,
              cancelled_at: now,
              cancelled_by: actor.clone(),
              reason: request.reason.clone(),
              requested_from: None,
            };
            restocked = inventory::compensate(record, stock, cancellation, now);
            record.push_history(FulfillmentStage::Cancelled, &actor, now);
            decision = Some(Decision::Compensated);
            return Ok(Commit::Write);
          }

          if status.is_in_production() {
            record.meta.cancellation_request = Some(Cancellation {
              cancellation_state: CancellationState::Requested,
              cancelled_at: now,
              cancelled_by: actor.clone(),
              reason: request.reason.clone(),
              requested_from: Some(status),
            });
            record.set_stage(FulfillmentStage::PendingCancellation);
            record.push_history(FulfillmentStage::PendingCancellation, &actor, now);
            record.touch(now);
            decision = Some(Decision::Requested);
            return Ok(Commit::Write);
          }

          Err(EngineError::Conflict(format!(
            "order {} is {} and is no longer cancellable",
            record.id, status
          )))
        }),
      )
      .await?;

    let outcome = match decision {
      Some(Decision::Compensated) => {
        info!(order_id = %record.id, restocked = ?restocked, payment_status = record.payment_status.as_str(), "Order cancelled.");
        CancelOutcome::Cancelled {
          order: record,
          compensated_inventory: restocked.is_some(),
          restocked,
        }
      }
      _ => {
        info!(order_id = %record.id, "Cancellation requested; awaiting admin approval.");
        CancelOutcome::PendingApproval { order: record }
      }
    };
    ctx.write().outcome = Some(outcome);
    Ok::<_, EngineError>(Flow::Continue)
  });

  // Step 3: Tell the customer, or the admins for a pending request
  p.on("notify_cancellation", |ctx: Shared<CancelCtx>| async move {
    let (services, outcome, reason) = ctx.snapshot(|c| (c.services.clone(), c.outcome.clone(), c.request.reason.clone()));
    let Some(outcome) = outcome else {
      return Ok(Flow::Continue);
    };

    match outcome {
      CancelOutcome::Cancelled { order, .. } => {
        let notification = Notification {
          recipient: Recipient::User(order.user_id),
          title: format!("Order update: {}", FulfillmentStage::Cancelled.display_name()),
          message: status_message(FulfillmentStage::Cancelled, None, None),
          category: NotificationCategory::OrderStatus,
          order_ids: vec![order.id],
        };
        let delivery = notify_user(&services, order.user_id, notification).await?;
        debug!(order_id = %order.id, in_app = delivery.in_app, email = delivery.email, "Cancellation notice handled.");
      }
      CancelOutcome::PendingApproval { order } => {
        let from = order
          .meta
          .cancellation_request
          .as_ref()
          .and_then(|r| r.requested_from)
          .map(|s| s.as_str())
          .unwrap_or("unknown");
        let notification = Notification {
          recipient: Recipient::Broadcast,
          title: "Cancellation requested".to_string(),
          message: format!(
            "Customer {} asked to cancel order {} while it is {}. Reason: {}",
            order.user_id,
            order.id,
            from,
            reason.as_deref().unwrap_or("none given")
          ),
          category: NotificationCategory::CancellationRequest,
          order_ids: vec![order.id],
        };
        notify_admins(&services, notification).await?;
      }
    }
    Ok::<_, EngineError>(Flow::Continue)
  });

  registry.register(p);
  info!("Cancellation pipeline registered.");
}
