// server/src/web/handlers/admin_handlers.rs

use actix_web::{web, HttpResponse};
use chrono::NaiveDate;
use orderflow::StatusUpdate;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::errors::AppError;
use crate::state::AppState;
use crate::web::extractors::RequestActor;

#[derive(Deserialize, Debug)]
pub struct StatusUpdatePayload {
  pub status: String,
  #[serde(default)]
  pub notes: Option<String>,
  #[serde(default)]
  pub estimated_delivery: Option<NaiveDate>,
  #[serde(default)]
  pub skip_write: bool,
}

#[instrument(
    name = "handler::update_order_status",
    skip(app_state, req_payload, actor),
    fields(actor = %actor.0.name, status = %req_payload.status)
)]
pub async fn update_order_status_handler(
  app_state: web::Data<AppState>,
  order_id: web::Path<Uuid>,
  req_payload: web::Json<StatusUpdatePayload>,
  actor: RequestActor,
) -> Result<HttpResponse, AppError> {
  let payload = req_payload.into_inner();
  let outcome = app_state
    .engine
    .update_status(StatusUpdate {
      order_id: order_id.into_inner(),
      status: payload.status,
      actor: actor.0,
      notes: payload.notes,
      estimated_delivery: payload.estimated_delivery,
      skip_write: payload.skip_write,
    })
    .await?;
  Ok(HttpResponse::Ok().json(outcome))
}

#[instrument(name = "handler::purge_stale_carts", skip(app_state, actor), fields(actor = %actor.0.name))]
pub async fn purge_stale_carts_handler(
  app_state: web::Data<AppState>,
  actor: RequestActor,
) -> Result<HttpResponse, AppError> {
  if actor.0.role != orderflow::Role::Admin {
    return Err(orderflow::EngineError::Forbidden(format!("{} may not purge carts", actor.0.name)).into());
  }
  let purged = app_state.engine.purge_stale_carts().await?;
  info!(purged, "Stale cart sweep finished.");
  Ok(HttpResponse::Ok().json(json!({ "purged": purged })))
}
