// server/src/web/handlers/checkout_handlers.rs

use actix_web::{web, HttpRequest, HttpResponse};
use orderflow::model::AddOn;
use orderflow::CheckoutRequest;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedUser;

const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

#[derive(Deserialize, Debug, Default)]
pub struct CheckoutRequestPayload {
  pub cart_line_ids: Vec<Uuid>,
  #[serde(default)]
  pub voucher_code: Option<String>,
  #[serde(default)]
  pub addons: HashMap<Uuid, Vec<AddOn>>,
  #[serde(default)]
  pub payment_method: Option<String>,
  /// Also accepted as the `Idempotency-Key` header; the body wins.
  #[serde(default)]
  pub idempotency_key: Option<String>,
}

#[instrument(
    name = "handler::start_checkout",
    skip(app_state, req, req_payload, auth_user),
    fields(user_id = %auth_user.user_id, lines = req_payload.cart_line_ids.len())
)]
pub async fn start_checkout_handler(
  app_state: web::Data<AppState>,
  req: HttpRequest,
  req_payload: web::Json<CheckoutRequestPayload>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let payload = req_payload.into_inner();
  let idempotency_key = payload.idempotency_key.or_else(|| {
    req
      .headers()
      .get(IDEMPOTENCY_HEADER)
      .and_then(|v| v.to_str().ok())
      .map(str::to_string)
  });

  let receipt = app_state
    .engine
    .checkout(CheckoutRequest {
      user_id: auth_user.user_id,
      cart_line_ids: payload.cart_line_ids,
      voucher_code: payload.voucher_code,
      addons: payload.addons,
      idempotency_key,
      payment_method: payload.payment_method,
    })
    .await
    .map_err(|e| {
      warn!(error = %e, "Checkout failed.");
      AppError::Checkout(e)
    })?;

  info!(checkout_id = %receipt.checkout_id, total = receipt.total, "Checkout started.");
  Ok(HttpResponse::Ok().json(receipt))
}

#[instrument(name = "handler::resume_payment", skip(app_state, auth_user), fields(user_id = %auth_user.user_id))]
pub async fn resume_payment_handler(
  app_state: web::Data<AppState>,
  checkout_id: web::Path<Uuid>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let receipt = app_state
    .engine
    .resume_payment(auth_user.user_id, checkout_id.into_inner())
    .await
    .map_err(AppError::Checkout)?;
  Ok(HttpResponse::Ok().json(receipt))
}

#[derive(Deserialize, Debug)]
pub struct ValidateVoucherPayload {
  pub code: String,
  pub subtotal: i64,
}

/// Previews a discount code. An invalid code is a normal 200 answer with a reason.
#[instrument(name = "handler::validate_voucher", skip(app_state, req_payload))]
pub async fn validate_voucher_handler(
  app_state: web::Data<AppState>,
  req_payload: web::Json<ValidateVoucherPayload>,
) -> Result<HttpResponse, AppError> {
  let verdict = app_state
    .engine
    .validate_voucher(&req_payload.code, req_payload.subtotal)
    .await?;
  Ok(HttpResponse::Ok().json(verdict))
}
