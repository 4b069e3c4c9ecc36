// server/src/services/tracing_notifier.rs
use async_trait::async_trait;
use orderflow::{EmailMessage, EngineError, Notification, Notifier, Recipient};
use tracing::{info, warn};

/// Delivers notifications into the log. Swap for a real transport in production.
pub struct TracingNotifier {
  pub email_sender: String,
}

#[async_trait]
impl Notifier for TracingNotifier {
  async fn push_in_app(&self, notification: &Notification) -> Result<(), EngineError> {
    let recipient = match notification.recipient {
      Recipient::User(user_id) => user_id.to_string(),
      Recipient::Broadcast => "admins".to_string(),
    };
    info!(
      %recipient,
      category = notification.category.as_str(),
      title = %notification.title,
      orders = ?notification.order_ids,
      "In-app notification delivered."
    );
    Ok(())
  }

  async fn send_email(&self, email: &EmailMessage) -> Result<(), EngineError> {
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    if email.subject.to_lowercase().contains("fail_test") {
      warn!(subject = %email.subject, "Simulated email failure.");
      return Err(EngineError::Upstream("simulated email send failure".to_string()));
    }
    let preview: String = email.body.chars().take(50).collect();
    info!(
      to = %email.user_id,
      from = %self.email_sender,
      subject = %email.subject,
      preview = %preview,
      "Order email sent."
    );
    Ok(())
  }
}
