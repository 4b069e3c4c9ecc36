// core/src/config.rs

use chrono::Duration;

/// Engine settings. The server builds this from its environment; tests use `Default`.
#[derive(Debug, Clone)]
pub struct EngineConfig {
  /// ISO currency code sent with every payment session.
  pub currency: String,
  pub success_url: String,
  pub cancel_url: String,
  pub default_payment_method: String,
  /// Provider event types that mean "payment confirmed".
  pub confirmation_event_types: Vec<String>,
  /// Cart rows older than this may be purged by the sweep.
  pub stale_cart_max_age: Duration,
}

impl EngineConfig {
  pub fn is_confirmation_event(&self, event_type: &str) -> bool {
    self.confirmation_event_types.iter().any(|t| t == event_type)
  }
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      currency: "USD".to_string(),
      success_url: "http://127.0.0.1:8080/checkout/success".to_string(),
      cancel_url: "http://127.0.0.1:8080/checkout/cancel".to_string(),
      default_payment_method: "card".to_string(),
      confirmation_event_types: vec![
        "checkout.session.completed".to_string(),
        "payment_intent.succeeded".to_string(),
        "payment.captured".to_string(),
      ],
      stale_cart_max_age: Duration::days(30),
    }
  }
}
