// server/src/errors.rs

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use orderflow::EngineError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
  #[error(transparent)]
  Engine(#[from] EngineError),

  /// Checkout failures are shown to shoppers as a generic retry prompt; the cause is only logged.
  #[error("Checkout failed: {0}")]
  Checkout(EngineError),

  #[error("Authentication Failed: {0}")]
  Auth(String),

  #[error("Configuration Error: {0}")]
  Config(String),

  #[error("Database Error: {0}")]
  Sqlx(#[from] sqlx::Error),

  #[error("Internal Server Error: {0}")]
  Internal(String),
}

impl From<anyhow::Error> for AppError {
  fn from(err: anyhow::Error) -> Self {
    match err.downcast::<sqlx::Error>() {
      Ok(db) => AppError::Sqlx(db),
      Err(err) => match err.downcast::<EngineError>() {
        Ok(engine) => AppError::Engine(engine),
        Err(err) => AppError::Internal(err.to_string()),
      },
    }
  }
}

fn engine_status(err: &EngineError) -> StatusCode {
  match err {
    EngineError::Validation(_) => StatusCode::BAD_REQUEST,
    EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
    EngineError::Forbidden(_) => StatusCode::FORBIDDEN,
    EngineError::Conflict(_) => StatusCode::CONFLICT,
    EngineError::Upstream(_) => StatusCode::BAD_GATEWAY,
    // A provider retries a webhook we did not fully apply
    EngineError::PartialFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    EngineError::Storage(_) | EngineError::Workflow { .. } => StatusCode::INTERNAL_SERVER_ERROR,
  }
}

impl ResponseError for AppError {
  fn status_code(&self) -> StatusCode {
    match self {
      AppError::Engine(e) => engine_status(e),
      AppError::Checkout(e) if e.is_terminal() => engine_status(e),
      AppError::Checkout(_) => StatusCode::BAD_GATEWAY,
      AppError::Auth(_) => StatusCode::UNAUTHORIZED,
      AppError::Config(_) | AppError::Sqlx(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  fn error_response(&self) -> HttpResponse {
    let status = self.status_code();
    if status.is_server_error() {
      tracing::error!(application_error = %self, "Responding with error");
    } else {
      tracing::warn!(application_error = %self, "Responding with error");
    }

    let body = match self {
      AppError::Engine(EngineError::PartialFailure { applied, failed }) => json!({
        "error": "Settlement partially applied",
        "applied": applied,
        "failed": failed.iter().map(|(id, reason)| json!({"order_id": id, "reason": reason})).collect::<Vec<_>>(),
      }),
      AppError::Engine(EngineError::Storage(detail)) => json!({"error": "Storage error", "detail": detail}),
      AppError::Engine(EngineError::Workflow { source }) => {
        tracing::error!(workflow_error = ?source, "Workflow error details");
        json!({"error": "Workflow processing error", "detail": source.to_string()})
      }
      AppError::Engine(e) => json!({"error": e.to_string()}),
      AppError::Checkout(e) if e.is_terminal() => json!({"error": e.to_string()}),
      AppError::Checkout(_) => json!({"error": "We could not start your payment. Please try again."}),
      AppError::Auth(m) => json!({"error": m}),
      AppError::Config(m) => json!({"error": "Configuration issue", "detail": m}),
      AppError::Sqlx(_) => json!({"error": "Database operation failed"}),
      AppError::Internal(m) => json!({"error": "An internal error occurred", "detail": m}),
    };
    HttpResponse::build(status).json(body)
  }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;
