// core/src/error.rs
use crate::workflow::WorkflowError;
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by engine operations.
///
/// `Validation`, `NotFound`, `Forbidden` and `Conflict` are terminal: they are raised before any
/// side effect and retrying the same request will not help. `Upstream` means an external payment
/// call failed. `PartialFailure` is only produced from a settlement report, never mid-way.
#[derive(Debug, Error)]
pub enum EngineError {
  #[error("Validation Error: {0}")]
  Validation(String),

  #[error("{entity} not found: {id}")]
  NotFound { entity: &'static str, id: String },

  #[error("Forbidden: {0}")]
  Forbidden(String),

  #[error("Conflict: {0}")]
  Conflict(String),

  #[error("Payment provider error: {0}")]
  Upstream(String),

  #[error("Settlement partially applied ({} applied, {} failed)", applied.len(), failed.len())]
  PartialFailure {
    applied: Vec<Uuid>,
    failed: Vec<(Uuid, String)>,
  },

  #[error("Storage error: {0}")]
  Storage(String),

  #[error("Workflow error: {source}")]
  Workflow {
    #[from]
    source: WorkflowError,
  },
}

impl EngineError {
  pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
    EngineError::NotFound {
      entity,
      id: id.to_string(),
    }
  }

  /// Terminal errors are reported to the caller as-is and never retried.
  pub fn is_terminal(&self) -> bool {
    matches!(
      self,
      EngineError::Validation(_) | EngineError::NotFound { .. } | EngineError::Forbidden(_) | EngineError::Conflict(_)
    )
  }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
