// core/src/engine.rs

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::gateway::PaymentGateway;
use crate::model::{OrderRecord, OrderStatus};
use crate::notifier::Notifier;
use crate::pipelines::contexts::{
  AddToCart, AddToCartCtx, CancelCtx, CancelOutcome, CancelRequest, CheckoutCtx, CheckoutReceipt, CheckoutRequest,
  ReconcileCtx, SettlementReport, SettlementSource, StatusUpdate, TransitionCtx, TransitionOutcome, WebhookOutcome,
};
use crate::pipelines::register_all_pipelines;
use crate::store::OrderStore;
use crate::voucher::{self, VoucherRejection, VoucherVerdict};
use crate::workflow::{Registry, Shared};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Handles to the collaborators every pipeline context carries.
#[derive(Clone)]
pub struct Services {
  pub store: Arc<dyn OrderStore>,
  pub gateway: Arc<dyn PaymentGateway>,
  pub notifier: Arc<dyn Notifier>,
  pub config: Arc<EngineConfig>,
}

/// Entry point for every order operation.
pub struct OrderEngine {
  services: Services,
  registry: Registry<EngineError>,
}

impl OrderEngine {
  pub fn new(
    store: Arc<dyn OrderStore>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
    config: EngineConfig,
  ) -> Self {
    let registry = Registry::new();
    register_all_pipelines(&registry);
    Self {
      services: Services {
        store,
        gateway,
        notifier,
        config: Arc::new(config),
      },
      registry,
    }
  }

  pub fn services(&self) -> &Services {
    &self.services
  }

  pub fn config(&self) -> &EngineConfig {
    &self.services.config
  }

  #[instrument(name = "OrderEngine::add_to_cart", skip_all, fields(user_id = %request.user_id, product_id = %request.product_id))]
  pub async fn add_to_cart(&self, request: AddToCart) -> Result<OrderRecord, EngineError> {
    let ctx = Shared::new(AddToCartCtx {
      services: self.services.clone(),
      request,
      product: None,
      line: None,
    });
    self.registry.run(ctx.clone()).await?;
    ctx
      .snapshot(|c| c.line.clone())
      .ok_or_else(|| EngineError::Storage("cart line was not written".to_string()))
  }

  #[instrument(name = "OrderEngine::checkout", skip_all, fields(user_id = %request.user_id, lines = request.cart_line_ids.len()))]
  pub async fn checkout(&self, request: CheckoutRequest) -> Result<CheckoutReceipt, EngineError> {
    let ctx = Shared::new(CheckoutCtx::new(self.services.clone(), request));
    self.run_checkout(ctx).await
  }

  /// Requests a new payment session for the still-unpaid orders of an earlier checkout.
  #[instrument(name = "OrderEngine::resume_payment", skip(self))]
  pub async fn resume_payment(&self, user_id: Uuid, checkout_id: Uuid) -> Result<CheckoutReceipt, EngineError> {
    let request = CheckoutRequest {
      user_id,
      ..Default::default()
    };
    let mut data = CheckoutCtx::new(self.services.clone(), request);
    data.checkout_id = Some(checkout_id);
    self.run_checkout(Shared::new(data)).await
  }

  async fn run_checkout(&self, ctx: Shared<CheckoutCtx>) -> Result<CheckoutReceipt, EngineError> {
    self.registry.run(ctx.clone()).await?;
    let receipt = ctx
      .snapshot(CheckoutCtx::receipt)
      .ok_or_else(|| EngineError::Upstream("checkout finished without a payment session".to_string()))?;
    info!(checkout_id = %receipt.checkout_id, total = receipt.total, resumed = receipt.resumed, "Checkout ready for payment.");
    Ok(receipt)
  }

  /// Previews a code against a subtotal without consuming it.
  pub async fn validate_voucher(&self, code: &str, subtotal: i64) -> Result<VoucherVerdict, EngineError> {
    let verdict = match self.services.store.voucher(code).await? {
      Some(discount_code) => voucher::validate(&discount_code, subtotal, Utc::now()).into(),
      None => Err(VoucherRejection::Unknown(code.trim().to_string())).into(),
    };
    Ok(verdict)
  }

  /// Verifies and applies a provider webhook. Non-confirmation events are acknowledged and ignored.
  #[instrument(name = "OrderEngine::handle_webhook", skip_all, fields(bytes = payload.len()))]
  pub async fn handle_webhook(&self, payload: &[u8], signature: Option<&str>) -> Result<WebhookOutcome, EngineError> {
    let source = SettlementSource::Webhook {
      payload: payload.to_vec(),
      signature: signature.map(str::to_string),
    };
    let ctx = Shared::new(ReconcileCtx::new(self.services.clone(), source));
    self.registry.run(ctx.clone()).await?;
    Ok(ctx.snapshot(|c| {
      if c.ignored {
        WebhookOutcome::Ignored {
          event_type: c.event.as_ref().map(|e| e.event_type.clone()).unwrap_or_default(),
        }
      } else {
        WebhookOutcome::Settled(c.report.clone())
      }
    }))
  }

  /// Captures an approved provider order and applies the result.
  #[instrument(name = "OrderEngine::capture_payment", skip(self))]
  pub async fn capture_payment(&self, provider_order_id: &str) -> Result<SettlementReport, EngineError> {
    let source = SettlementSource::Capture {
      provider_order_id: provider_order_id.to_string(),
    };
    let ctx = Shared::new(ReconcileCtx::new(self.services.clone(), source));
    self.registry.run(ctx.clone()).await?;
    Ok(ctx.snapshot(|c| c.report.clone()))
  }

  #[instrument(name = "OrderEngine::cancel_order", skip_all, fields(order_id = %request.order_id, user_id = %request.user_id))]
  pub async fn cancel_order(&self, request: CancelRequest) -> Result<CancelOutcome, EngineError> {
    let ctx = Shared::new(CancelCtx {
      services: self.services.clone(),
      request,
      outcome: None,
    });
    self.registry.run(ctx.clone()).await?;
    ctx
      .snapshot(|c| c.outcome.clone())
      .ok_or_else(|| EngineError::Storage("cancellation produced no outcome".to_string()))
  }

  #[instrument(
    name = "OrderEngine::update_status",
    skip_all,
    fields(order_id = %request.order_id, status = %request.status, skip_write = request.skip_write)
  )]
  pub async fn update_status(&self, request: StatusUpdate) -> Result<TransitionOutcome, EngineError> {
    let order_id = request.order_id;
    let ctx = Shared::new(TransitionCtx {
      services: self.services.clone(),
      request,
      target: None,
      order: None,
      restocked: None,
      notified_in_app: false,
      emailed: false,
    });
    self.registry.run(ctx.clone()).await?;
    ctx.snapshot(|c| {
      let order = c.order.clone().ok_or_else(|| EngineError::not_found("order", order_id))?;
      Ok(TransitionOutcome {
        order,
        restocked: c.restocked,
        notified_in_app: c.notified_in_app,
        emailed: c.emailed,
      })
    })
  }

  /// Deletes cart lines idle for longer than the configured age.
  #[instrument(name = "OrderEngine::purge_stale_carts", skip(self))]
  pub async fn purge_stale_carts(&self) -> Result<u64, EngineError> {
    let cutoff = Utc::now() - self.services.config.stale_cart_max_age;
    let purged = self.services.store.purge_stale_carts(cutoff).await?;
    info!(purged, %cutoff, "Stale cart lines purged.");
    Ok(purged)
  }

  pub async fn order(&self, order_id: Uuid) -> Result<OrderRecord, EngineError> {
    self.services.store.order(order_id).await
  }

  /// Orders of a checkout that still wait for payment.
  pub async fn unpaid_orders(&self, user_id: Uuid, checkout_id: Uuid) -> Result<Vec<OrderRecord>, EngineError> {
    let orders = self.services.store.orders_for_checkout(user_id, checkout_id).await?;
    Ok(orders.into_iter().filter(|o| o.status == OrderStatus::PendingPayment).collect())
  }
}
