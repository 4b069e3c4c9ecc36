// server/src/services/mock_gateway.rs

//! A stand-in payment provider. Sessions are remembered in memory so a later capture can echo
//! the order reference back, and webhooks are authenticated by a shared secret.

use async_trait::async_trait;
use orderflow::{
  CaptureResult, CaptureStatus, EngineError, PaymentGateway, PaymentSession, ProviderEvent, SessionRequest,
};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

pub struct MockGateway {
  account_id: String,
  webhook_secret: String,
  checkout_base_url: String,
  /// Session reference keyed by provider order id.
  sessions: Mutex<HashMap<String, String>>,
}

impl MockGateway {
  pub fn new(account_id: impl Into<String>, webhook_secret: impl Into<String>, checkout_base_url: impl Into<String>) -> Self {
    Self {
      account_id: account_id.into(),
      webhook_secret: webhook_secret.into(),
      checkout_base_url: checkout_base_url.into(),
      sessions: Mutex::new(HashMap::new()),
    }
  }
}

#[async_trait]
impl PaymentGateway for MockGateway {
  #[instrument(skip_all, fields(checkout_id = %request.checkout_id, amount = request.amount, currency = %request.currency, account = %self.account_id))]
  async fn create_session(&self, request: &SessionRequest) -> Result<PaymentSession, EngineError> {
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    // Arbitrary failure condition for exercising the retry path
    if request.amount % 1000 == 123 {
      warn!("Mock provider refused the session.");
      return Err(EngineError::Upstream("mock provider declined amount".to_string()));
    }

    // Repeating a checkout yields the same ids, as real providers do for an idempotency key
    let key = request.checkout_id.simple().to_string();
    let session = PaymentSession {
      session_id: format!("cs_mock_{}", key),
      checkout_url: format!(
        "{}/mock-pay/{}?account={}",
        self.checkout_base_url.trim_end_matches('/'),
        key,
        self.account_id
      ),
      provider_order_id: Some(format!("po_mock_{}", key)),
    };
    if let Some(provider_order_id) = &session.provider_order_id {
      self
        .sessions
        .lock()
        .await
        .insert(provider_order_id.clone(), request.reference.clone());
    }
    info!(session_id = %session.session_id, "Mock payment session created.");
    Ok(session)
  }

  #[instrument(skip(self))]
  async fn capture(&self, provider_order_id: &str) -> Result<CaptureResult, EngineError> {
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let reference = self
      .sessions
      .lock()
      .await
      .get(provider_order_id)
      .cloned()
      .ok_or_else(|| EngineError::Upstream(format!("mock provider has no order {}", provider_order_id)))?;
    Ok(CaptureResult {
      status: CaptureStatus::Completed,
      transaction_id: format!("tx_{}", provider_order_id),
      provider_order_id: provider_order_id.to_string(),
      reference,
    })
  }

  fn verify_event(&self, payload: &[u8], signature: Option<&str>) -> Result<ProviderEvent, EngineError> {
    match signature {
      Some(given) if given.trim() == self.webhook_secret => {}
      Some(_) => return Err(EngineError::Forbidden("webhook signature mismatch".to_string())),
      None => return Err(EngineError::Forbidden("webhook signature missing".to_string())),
    }
    serde_json::from_slice(payload).map_err(|e| EngineError::Validation(format!("malformed webhook payload: {}", e)))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use uuid::Uuid;

  fn request(amount: i64) -> SessionRequest {
    SessionRequest {
      user_id: Uuid::new_v4(),
      checkout_id: Uuid::new_v4(),
      amount,
      currency: "USD".into(),
      reference: format!("{}", Uuid::new_v4()),
      success_url: "http://localhost/ok".into(),
      cancel_url: "http://localhost/cancel".into(),
      payment_method: "card".into(),
    }
  }

  #[tokio::test]
  async fn capture_echoes_the_session_reference() {
    let gateway = MockGateway::new("acct", "secret", "http://localhost:8080/");
    let req = request(9540);
    let session = gateway.create_session(&req).await.unwrap();
    assert!(session.checkout_url.starts_with("http://localhost:8080/mock-pay/"));

    let again = gateway.create_session(&req).await.unwrap();
    assert_eq!(again, session);

    let po = session.provider_order_id.unwrap();
    let capture = gateway.capture(&po).await.unwrap();
    assert_eq!(capture.status, CaptureStatus::Completed);
    assert_eq!(capture.reference, req.reference);
    assert!(matches!(gateway.capture("po_unknown").await, Err(EngineError::Upstream(_))));
  }

  #[tokio::test]
  async fn declining_amounts_fail_upstream() {
    let gateway = MockGateway::new("acct", "secret", "http://localhost");
    assert!(matches!(
      gateway.create_session(&request(2123)).await,
      Err(EngineError::Upstream(_))
    ));
  }

  #[test]
  fn webhooks_need_the_shared_secret() {
    let gateway = MockGateway::new("acct", "secret", "http://localhost");
    let payload = br#"{"event_id":"evt_1","event_type":"payment.captured","reference":"x"}"#;
    assert!(matches!(gateway.verify_event(payload, None), Err(EngineError::Forbidden(_))));
    assert!(matches!(gateway.verify_event(payload, Some("nope")), Err(EngineError::Forbidden(_))));
    let event = gateway.verify_event(payload, Some("secret")).unwrap();
    assert_eq!(event.event_type, "payment.captured");
    assert!(matches!(gateway.verify_event(b"{", Some("secret")), Err(EngineError::Validation(_))));
  }
}
