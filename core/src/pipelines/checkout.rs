// core/src/pipelines/checkout.rs

//! Cart selection to priced `pending_payment` orders plus a payment session. The same pipeline
//! resumes payment for an existing checkout: the creation steps are skipped when its records
//! are already stored.

use crate::error::EngineError;
use crate::gateway::{reference, SessionRequest};
use crate::model::{
  AppliedVoucher, DiscountCode, FulfillmentStage, HistoryEntry, ItemType, OrderMeta, OrderRecord, OrderStatus,
  PaymentStatus, Redemption, StageMeta,
};
use crate::pipelines::contexts::CheckoutCtx;
use crate::pricing;
use crate::store::Commit;
use crate::voucher::{self, VoucherRejection};
use crate::workflow::{Flow, Pipeline, Registry, Shared};
use chrono::Utc;
use std::collections::HashSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Checkout id for a request. A client idempotency key makes it stable per user.
pub fn checkout_id_for(user_id: Uuid, idempotency_key: Option<&str>) -> Uuid {
  match idempotency_key.map(str::trim).filter(|k| !k.is_empty()) {
    Some(key) => Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("{}:{}", user_id, key).as_bytes()),
    None => Uuid::new_v4(),
  }
}

pub fn register_checkout_pipeline(registry: &Registry<EngineError>) {
  let mut p = Pipeline::<CheckoutCtx, EngineError>::new(
    "checkout",
    &[
      ("resolve_checkout", false),
      ("load_cart_lines", false),
      ("price_checkout", false),
      ("create_order_records", false),
      ("consume_voucher", true),
      ("request_payment_session", false),
      ("record_payment_session", true),
    ],
  );

  for step in ["load_cart_lines", "price_checkout", "create_order_records", "consume_voucher"] {
    p.skip_if(step, |c: &CheckoutCtx| c.resumed);
  }

  // Step 1: Work out the checkout id and whether its records already exist
  p.on("resolve_checkout", |ctx: Shared<CheckoutCtx>| async move {
    let (store, user_id, line_ids, key, preset) = ctx.snapshot(|c| {
      (
        c.services.store.clone(),
        c.request.user_id,
        c.request.cart_line_ids.clone(),
        c.request.idempotency_key.clone(),
        c.checkout_id,
      )
    });

    if preset.is_none() && line_ids.is_empty() {
      warn!(%user_id, "Checkout rejected: empty selection.");
      return Err(EngineError::Validation(
        "Select at least one cart item to check out.".to_string(),
      ));
    }

    let checkout_id = preset.unwrap_or_else(|| checkout_id_for(user_id, key.as_deref()));
    let existing = store.orders_for_checkout(user_id, checkout_id).await?;

    if existing.is_empty() {
      if preset.is_some() {
        return Err(EngineError::not_found("checkout", checkout_id));
      }
      ctx.write().checkout_id = Some(checkout_id);
      return Ok(Flow::Continue);
    }

    let payable: Vec<OrderRecord> = existing
      .into_iter()
      .filter(|o| o.status == OrderStatus::PendingPayment && o.payment_status == PaymentStatus::Pending)
      .collect();
    if payable.is_empty() {
      return Err(EngineError::Conflict(format!(
        "checkout {} has nothing left to pay",
        checkout_id
      )));
    }

    info!(%checkout_id, orders = payable.len(), "Resuming payment for existing checkout.");
    ctx.update(|c| {
      c.checkout_id = Some(checkout_id);
      c.resumed = true;
      c.orders = payable;
    });
    Ok::<_, EngineError>(Flow::Continue)
  });

  // Step 2: Load the selected cart lines and apply add-on selections
  p.on("load_cart_lines", |ctx: Shared<CheckoutCtx>| async move {
    let (store, request) = ctx.snapshot(|c| (c.services.store.clone(), c.request.clone()));

    let mut seen = HashSet::new();
    let line_ids: Vec<Uuid> = request
      .cart_line_ids
      .iter()
      .copied()
      .filter(|id| seen.insert(*id))
      .collect();

    let mut lines = store.cart_lines(request.user_id, &line_ids).await?;
    if let Some(missing) = line_ids.iter().find(|id| !lines.iter().any(|l| l.id == **id)) {
      warn!(user_id = %request.user_id, line_id = %missing, "Checkout rejected: cart line not found.");
      return Err(EngineError::not_found("cart line", missing));
    }
    lines.sort_by_key(|l| line_ids.iter().position(|id| *id == l.id));

    let mut running_total: i64 = 0;
    for line in lines.iter_mut() {
      if line.quantity <= 0 {
        return Err(EngineError::Validation(format!(
          "Cart line {} has a non-positive quantity.",
          line.id
        )));
      }
      if let Some(addons) = request.addons.get(&line.id) {
        if addons.iter().any(|a| a.fee < 0) {
          return Err(EngineError::Validation("Add-on fees cannot be negative.".to_string()));
        }
        line.meta.addons = addons.clone();
      }
      running_total = running_total
        .checked_add(line.checked_subtotal()?)
        .ok_or_else(|| EngineError::Validation("Order amount is too large.".to_string()))?;
    }

    let product_ids: HashSet<Uuid> = lines.iter().map(|l| l.product_id).collect();
    for product_id in product_ids {
      store.product(product_id).await?;
    }

    debug!(lines = lines.len(), subtotal = running_total, "Cart lines loaded for checkout.");
    ctx.write().lines = lines;
    Ok::<_, EngineError>(Flow::Continue)
  });

  // Step 3: Price the selection and validate the voucher against the subtotal
  p.on("price_checkout", |ctx: Shared<CheckoutCtx>| async move {
    let (store, code, lines) = ctx.snapshot(|c| {
      (
        c.services.store.clone(),
        c.request.voucher_code.clone(),
        c.lines.clone(),
      )
    });
    let subtotal = pricing::subtotal(&lines);

    let mut valid = None;
    if let Some(code) = code.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
      let discount_code = store
        .voucher(code)
        .await?
        .ok_or_else(|| EngineError::Validation(VoucherRejection::Unknown(code.to_string()).to_string()))?;
      match voucher::validate(&discount_code, subtotal, Utc::now()) {
        Ok(v) => valid = Some(v),
        Err(rejection) => {
          info!(code, subtotal, %rejection, "Voucher rejected at checkout.");
          return Err(EngineError::Validation(rejection.to_string()));
        }
      }
    }

    let quote = pricing::quote(&lines, valid.as_ref().map_or(0, |v| v.discount));
    info!(
      subtotal = quote.subtotal,
      discount = quote.discount,
      total = quote.total,
      "Checkout priced."
    );
    ctx.update(|c| {
      c.voucher = valid;
      c.quote = Some(quote);
    });
    Ok::<_, EngineError>(Flow::Continue)
  });

  // Step 4: Create the order records and drop the consumed cart lines in one unit
  p.on("create_order_records", |ctx: Shared<CheckoutCtx>| async move {
    let (store, user_id, checkout_id, lines, quote, applied) = ctx.snapshot(|c| {
      (
        c.services.store.clone(),
        c.request.user_id,
        c.checkout_id,
        c.lines.clone(),
        c.quote.clone(),
        c.voucher.clone(),
      )
    });
    let checkout_id = checkout_id.ok_or_else(|| EngineError::Validation("checkout id was not resolved".to_string()))?;
    let quote = quote.ok_or_else(|| EngineError::Validation("checkout was not priced".to_string()))?;

    let now = Utc::now();
    let records: Vec<OrderRecord> = lines
      .iter()
      .zip(quote.lines.iter())
      .map(|(line, priced)| OrderRecord {
        id: Uuid::new_v4(),
        user_id,
        product_id: line.product_id,
        item_type: ItemType::Order,
        status: OrderStatus::PendingPayment,
        order_status: FulfillmentStage::PendingPayment,
        order_progress: OrderStatus::PendingPayment.progress_label().to_string(),
        quantity: line.quantity,
        price: line.price,
        total_amount: priced.total,
        payment_status: PaymentStatus::Pending,
        meta: OrderMeta {
          addons: line.meta.addons.clone(),
          voucher: applied.as_ref().map(|v| AppliedVoucher {
            code: DiscountCode::normalize(&v.code),
            discount_share: priced.discount_share,
            checkout_discount: quote.discount,
          }),
          checkout_id: Some(checkout_id),
          stage: StageMeta::AwaitingPayment {
            session_id: None,
            provider_order_id: None,
          },
          ..OrderMeta::cart(Vec::new())
        },
        progress_history: vec![HistoryEntry {
          status: FulfillmentStage::PendingPayment,
          at: now,
          actor: user_id.to_string(),
        }],
        created_at: now,
        updated_at: now,
      })
      .collect();

    let consumed: Vec<Uuid> = lines.iter().map(|l| l.id).collect();
    store.create_orders(&records, &consumed).await?;
    info!(%checkout_id, orders = records.len(), "Order records created.");
    ctx.write().orders = records;
    Ok::<_, EngineError>(Flow::Continue)
  });

  // Step 5: Consume the voucher now that the orders exist
  p.skip_if("consume_voucher", |c: &CheckoutCtx| c.resumed || c.voucher.is_none());
  p.on("consume_voucher", |ctx: Shared<CheckoutCtx>| async move {
    let (store, code, checkout_id) = ctx.snapshot(|c| {
      (
        c.services.store.clone(),
        c.voucher.as_ref().map(|v| v.code.clone()),
        c.checkout_id,
      )
    });
    let (Some(code), Some(checkout_id)) = (code, checkout_id) else {
      return Ok(Flow::Continue);
    };
    match store.redeem_voucher(&code, checkout_id).await? {
      Redemption::Consumed { used_count } => info!(%code, %checkout_id, used_count, "Voucher consumed."),
      Redemption::AlreadyRedeemed => debug!(%code, %checkout_id, "Voucher already consumed by this checkout."),
    }
    Ok::<_, EngineError>(Flow::Continue)
  });

  // Step 6: Ask the gateway for a payment session covering every order
  p.on("request_payment_session", |ctx: Shared<CheckoutCtx>| async move {
    let (gateway, config, user_id, checkout_id, orders, method, amount) = ctx.snapshot(|c| {
      (
        c.services.gateway.clone(),
        c.services.config.clone(),
        c.request.user_id,
        c.checkout_id,
        c.orders.iter().map(|o| o.id).collect::<Vec<_>>(),
        c.request.payment_method.clone(),
        c.amount_due(),
      )
    });
    let checkout_id = checkout_id.ok_or_else(|| EngineError::Validation("checkout id was not resolved".to_string()))?;

    let request = SessionRequest {
      user_id,
      checkout_id,
      amount,
      currency: config.currency.clone(),
      reference: reference::encode(&orders),
      success_url: config.success_url.clone(),
      cancel_url: config.cancel_url.clone(),
      payment_method: method.unwrap_or_else(|| config.default_payment_method.clone()),
    };

    match gateway.create_session(&request).await {
      Ok(session) => {
        info!(%checkout_id, session_id = %session.session_id, amount, "Payment session created.");
        ctx.write().session = Some(session);
        Ok::<_, EngineError>(Flow::Continue)
      }
      Err(e) => {
        error!(%checkout_id, error = %e, "Payment session failed; orders stay pending_payment.");
        Err(EngineError::Upstream(format!(
          "could not start payment for checkout {}: {}",
          checkout_id, e
        )))
      }
    }
  });

  // Step 7: Remember the session on each order
  p.on("record_payment_session", |ctx: Shared<CheckoutCtx>| async move {
    let (store, session, order_ids) = ctx.snapshot(|c| {
      (
        c.services.store.clone(),
        c.session.clone(),
        c.orders.iter().map(|o| o.id).collect::<Vec<_>>(),
      )
    });
    let Some(session) = session else {
      return Ok(Flow::Continue);
    };

    let mut updated = Vec::with_capacity(order_ids.len());
    for order_id in order_ids {
      let session = session.clone();
      let record = store
        .mutate_order(
          order_id,
          Box::new(move |record: &mut OrderRecord, _stock: &mut i64| match &mut record.meta.stage {
            StageMeta::AwaitingPayment {
              session_id,
              provider_order_id,
            } => {
              *session_id = Some(session.session_id);
              *provider_order_id = session.provider_order_id;
              record.touch(Utc::now());
              Ok(Commit::Write)
            }
            _ => Ok(Commit::Unchanged),
          }),
        )
        .await?;
      updated.push(record);
    }
    ctx.write().orders = updated;
    Ok::<_, EngineError>(Flow::Continue)
  });

  registry.register(p);
  info!("Checkout pipeline registered.");
}
