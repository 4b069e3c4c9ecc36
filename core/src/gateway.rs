// core/src/gateway.rs

use crate::error::EngineError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outbound request for a hosted payment session covering one checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionRequest {
  pub user_id: Uuid,
  pub checkout_id: Uuid,
  pub amount: i64,
  pub currency: String,
  /// Order ids joined by commas; the provider echoes it back on confirmation.
  pub reference: String,
  pub success_url: String,
  pub cancel_url: String,
  pub payment_method: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSession {
  pub session_id: String,
  pub checkout_url: String,
  pub provider_order_id: Option<String>,
}

/// A verified inbound provider event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEvent {
  pub event_id: String,
  pub event_type: String,
  #[serde(default)]
  pub reference: Option<String>,
  #[serde(default)]
  pub transaction_id: Option<String>,
  #[serde(default)]
  pub provider_order_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureStatus {
  Completed,
  Pending,
  Declined,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureResult {
  pub status: CaptureStatus,
  pub transaction_id: String,
  pub provider_order_id: String,
  pub reference: String,
}

/// External payment provider. Implementations are black boxes with this contract.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
  async fn create_session(&self, request: &SessionRequest) -> Result<PaymentSession, EngineError>;

  /// Captures an approved provider order and reports the outcome.
  async fn capture(&self, provider_order_id: &str) -> Result<CaptureResult, EngineError>;

  /// Checks the signature of a webhook payload and parses it.
  fn verify_event(&self, payload: &[u8], signature: Option<&str>) -> Result<ProviderEvent, EngineError>;
}

/// Codec for the order-id reference carried through the provider.
pub mod reference {
  use crate::error::EngineError;
  use uuid::Uuid;

  pub fn encode(order_ids: &[Uuid]) -> String {
    order_ids.iter().map(Uuid::to_string).collect::<Vec<_>>().join(",")
  }

  /// Parses a comma-joined reference. Blank segments are ignored; duplicates are dropped.
  pub fn decode(reference: &str) -> Result<Vec<Uuid>, EngineError> {
    let mut ids = Vec::new();
    for part in reference.split(',').map(str::trim).filter(|p| !p.is_empty()) {
      let id = Uuid::parse_str(part)
        .map_err(|e| EngineError::Validation(format!("invalid order id '{}' in payment reference: {}", part, e)))?;
      if !ids.contains(&id) {
        ids.push(id);
      }
    }
    if ids.is_empty() {
      return Err(EngineError::Validation("payment reference has no order ids".to_string()));
    }
    Ok(ids)
  }

  #[cfg(test)]
  mod tests {
    use super::*;

    #[test]
    fn decodes_what_it_encodes() {
      let ids = vec![Uuid::new_v4(), Uuid::new_v4()];
      assert_eq!(decode(&encode(&ids)).unwrap(), ids);
    }

    #[test]
    fn tolerates_whitespace_and_repeats() {
      let id = Uuid::new_v4();
      let raw = format!(" {id} ,,{id}, ");
      assert_eq!(decode(&raw).unwrap(), vec![id]);
    }

    #[test]
    fn rejects_garbage_and_empty() {
      assert!(matches!(decode("not-a-uuid"), Err(EngineError::Validation(_))));
      assert!(matches!(decode(" , "), Err(EngineError::Validation(_))));
    }
  }
}
