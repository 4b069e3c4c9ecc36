// server/src/web/handlers/order_handlers.rs

use actix_web::{web, HttpResponse};
use orderflow::{CancelOutcome, CancelRequest};
use serde::Deserialize;
use tracing::instrument;
use uuid::Uuid;

use crate::errors::AppError;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedUser;

#[derive(Deserialize, Debug, Default)]
pub struct CancelOrderPayload {
  #[serde(default)]
  pub reason: Option<String>,
}

/// 200 when cancelled outright, 202 when the request waits for admin approval.
#[instrument(name = "handler::cancel_order", skip(app_state, req_payload, auth_user), fields(user_id = %auth_user.user_id))]
pub async fn cancel_order_handler(
  app_state: web::Data<AppState>,
  order_id: web::Path<Uuid>,
  req_payload: Option<web::Json<CancelOrderPayload>>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let reason = req_payload.and_then(|p| p.into_inner().reason);
  let outcome = app_state
    .engine
    .cancel_order(CancelRequest {
      order_id: order_id.into_inner(),
      user_id: auth_user.user_id,
      reason,
    })
    .await?;

  Ok(match outcome {
    CancelOutcome::Cancelled { .. } => HttpResponse::Ok().json(outcome),
    CancelOutcome::PendingApproval { .. } => HttpResponse::Accepted().json(outcome),
  })
}
