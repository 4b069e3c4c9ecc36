// core/src/pipelines/transition.rs

//! Admin-driven fulfillment transitions.

use crate::error::EngineError;
use crate::inventory;
use crate::model::{resolve_target, Cancellation, CancellationState, OrderRecord, OrderStatus};
use crate::notifier::{Notification, NotificationCategory, Recipient};
use crate::pipelines::contexts::{Role, TransitionCtx};
use crate::pipelines::notify::{notify_user, status_message};
use crate::store::Commit;
use crate::workflow::{Flow, Pipeline, Registry, Shared};
use chrono::Utc;
use tracing::{info, warn};

pub fn register_transition_pipeline(registry: &Registry<EngineError>) {
  let mut p = Pipeline::<TransitionCtx, EngineError>::new(
    "fulfillment_transition",
    &[
      ("authorize_actor", false),
      ("resolve_target_status", false),
      ("load_current_order", false),
      ("apply_transition", false),
      ("notify_customer", true),
    ],
  );

  // Step 1: Only admins move orders through fulfillment
  p.on("authorize_actor", |ctx: Shared<TransitionCtx>| async move {
    let actor = ctx.snapshot(|c| c.request.actor.clone());
    if actor.role != Role::Admin {
      warn!(actor = %actor.name, "Status update refused: not an admin.");
      return Err(EngineError::Forbidden(format!("{} may not update order status", actor.name)));
    }
    Ok(Flow::Continue)
  });

  // Step 2: Canonicalize the requested status
  p.on("resolve_target_status", |ctx: Shared<TransitionCtx>| async move {
    let requested = ctx.snapshot(|c| c.request.status.clone());
    let target = resolve_target(&requested)?;
    ctx.write().target = Some(target);
    Ok::<_, EngineError>(Flow::Continue)
  });

  // Step 3 (skip_write only): storage was updated elsewhere, read it for the notification
  p.skip_if("load_current_order", |c: &TransitionCtx| !c.request.skip_write);
  p.on("load_current_order", |ctx: Shared<TransitionCtx>| async move {
    let (store, order_id) = ctx.snapshot(|c| (c.services.store.clone(), c.request.order_id));
    let order = store.order(order_id).await?;
    info!(%order_id, status = %order.status, "Storage already updated; notifying only.");
    ctx.write().order = Some(order);
    Ok::<_, EngineError>(Flow::Continue)
  });

  // Step 4: Check the table and write the transition with its history entry
  p.skip_if("apply_transition", |c: &TransitionCtx| c.request.skip_write);
  p.on("apply_transition", |ctx: Shared<TransitionCtx>| async move {
    let (store, request, target) = ctx.snapshot(|c| (c.services.store.clone(), c.request.clone(), c.target));
    let (stage, status) = target.ok_or_else(|| EngineError::Validation("target status was not resolved".to_string()))?;

    let mut restocked = None;
    let mut previous = None;
    let order = store
      .mutate_order(
        request.order_id,
        Box::new(|record: &mut OrderRecord, stock: &mut i64| {
          if record.is_cart_line() {
            return Err(EngineError::not_found("order", record.id));
          }
          if !record.status.can_transition_to(status) {
            return Err(EngineError::Conflict(format!(
              "order {} cannot move from {} to {}",
              record.id, record.status, status
            )));
          }
          let now = Utc::now();
          previous = Some(record.status);

          if status == OrderStatus::Cancelled {
            let cancellation = Cancellation {
              cancellation_state: CancellationState::Completed,
              cancelled_at: now,
              cancelled_by: request.actor.name.clone(),
              reason: request.notes.clone(),
              requested_from: None,
            };
            restocked = inventory::compensate(record, stock, cancellation, now);
          } else {
            if record.status == OrderStatus::PendingCancellation {
              record.meta.cancellation_request = None;
            }
            record.set_stage(stage);
          }

          if let Some(notes) = request.notes.as_ref().filter(|n| !n.trim().is_empty()) {
            record.meta.admin_notes = Some(notes.clone());
          }
          if let Some(date) = request.estimated_delivery {
            record.meta.estimated_delivery = Some(date);
          }
          record.push_history(stage, &request.actor.name, now);
          record.touch(now);
          Ok(Commit::Write)
        }),
      )
      .await?;

    info!(
      order_id = %order.id,
      from = ?previous,
      to = %order.status,
      stage = %order.order_status,
      actor = %request.actor.name,
      "Order status updated."
    );
    ctx.update(|c| {
      c.order = Some(order);
      c.restocked = restocked;
    });
    Ok::<_, EngineError>(Flow::Continue)
  });

  // Step 5: Tell the customer, as far as their preferences allow
  p.on("notify_customer", |ctx: Shared<TransitionCtx>| async move {
    let (services, request, target, order) =
      ctx.snapshot(|c| (c.services.clone(), c.request.clone(), c.target, c.order.clone()));
    let (Some((stage, _)), Some(order)) = (target, order) else {
      return Ok(Flow::Continue);
    };

    let notification = Notification {
      recipient: Recipient::User(order.user_id),
      title: format!("Order update: {}", stage.display_name()),
      message: status_message(stage, request.notes.as_deref(), request.estimated_delivery),
      category: NotificationCategory::OrderStatus,
      order_ids: vec![order.id],
    };
    let delivery = notify_user(&services, order.user_id, notification).await?;
    ctx.update(|c| {
      c.notified_in_app = delivery.in_app;
      c.emailed = delivery.email;
    });
    Ok::<_, EngineError>(Flow::Continue)
  });

  registry.register(p);
  info!("Fulfillment transition pipeline registered.");
}
