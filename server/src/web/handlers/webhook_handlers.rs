// server/src/web/handlers/webhook_handlers.rs

use actix_web::{web, HttpResponse};
use orderflow::WebhookOutcome;
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::errors::AppError;
use crate::state::AppState;
use crate::web::extractors::WebhookSignature;

/// Acknowledges with 200 once no order in the event is waiting on a retry. Lines that can never
/// take the payment are logged for a manual refund and still acknowledged; only transient
/// failures answer 500 so the provider redelivers. Redelivery is harmless for applied lines.
#[instrument(
    name = "handler::payment_webhook",
    skip(app_state, signature, body),
    fields(webhook_source = %webhook_source, bytes = body.len())
)]
pub async fn payment_webhook_handler(
  app_state: web::Data<AppState>,
  webhook_source: web::Path<String>,
  signature: WebhookSignature,
  body: web::Bytes,
) -> Result<HttpResponse, AppError> {
  let outcome = app_state.engine.handle_webhook(&body, signature.0.as_deref()).await?;
  match outcome {
    WebhookOutcome::Ignored { event_type } => {
      info!(%event_type, "Webhook acknowledged without action.");
      Ok(HttpResponse::Ok().json(json!({"status": "ignored", "event_type": event_type})))
    }
    WebhookOutcome::Settled(report) => {
      for (order_id, reason) in &report.rejected {
        warn!(%order_id, %reason, "Paid order cannot be settled; manual refund required.");
      }
      if !report.is_clean() {
        warn!(failed = report.failed.len(), "Webhook settled only partially, asking for redelivery.");
      }
      let report = report.into_result()?;
      Ok(HttpResponse::Ok().json(json!({"status": "settled", "report": report})))
    }
  }
}

#[instrument(name = "handler::capture_payment", skip(app_state))]
pub async fn capture_payment_handler(
  app_state: web::Data<AppState>,
  provider_order_id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
  let report = app_state.engine.capture_payment(&provider_order_id).await?.into_result()?;
  Ok(HttpResponse::Ok().json(report))
}
