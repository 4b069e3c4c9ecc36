// core/src/pipelines/notify.rs

//! Preference-gated delivery shared by the pipelines' notification steps.

use crate::engine::Services;
use crate::error::EngineError;
use crate::model::{FulfillmentStage, ORDER_STATUS_EMAIL, ORDER_STATUS_IN_APP};
use crate::notifier::{EmailMessage, Notification, Recipient};
use chrono::NaiveDate;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
  pub in_app: bool,
  pub email: bool,
}

/// Sends `notification` in-app and by email, each only if the user's preferences allow it.
/// A failing channel is logged and does not stop the other.
pub async fn notify_user(services: &Services, user_id: Uuid, notification: Notification) -> Result<Delivery, EngineError> {
  let preferences = services.store.notification_preferences(user_id).await?;
  let mut delivery = Delivery::default();

  if preferences.allows(ORDER_STATUS_IN_APP) {
    match services.notifier.push_in_app(&notification).await {
      Ok(()) => delivery.in_app = true,
      Err(e) => warn!(%user_id, error = %e, "In-app notification failed."),
    }
  } else {
    debug!(%user_id, "In-app order notifications disabled by user.");
  }

  if preferences.allows(ORDER_STATUS_EMAIL) {
    let email = EmailMessage {
      user_id,
      subject: notification.title.clone(),
      body: notification.message.clone(),
      category: notification.category,
    };
    match services.notifier.send_email(&email).await {
      Ok(()) => delivery.email = true,
      Err(e) => warn!(%user_id, error = %e, "Order email failed."),
    }
  } else {
    debug!(%user_id, "Order emails disabled by user.");
  }

  Ok(delivery)
}

/// Sends a broadcast to admins. There are no preferences to consult.
pub async fn notify_admins(services: &Services, mut notification: Notification) -> Result<(), EngineError> {
  notification.recipient = Recipient::Broadcast;
  services.notifier.push_in_app(&notification).await
}

pub fn format_amount(amount: i64, currency: &str) -> String {
  let sign = if amount < 0 { "-" } else { "" };
  let abs = amount.unsigned_abs();
  format!("{} {}{}.{:02}", currency, sign, abs / 100, abs % 100)
}

pub fn status_message(stage: FulfillmentStage, notes: Option<&str>, estimated_delivery: Option<NaiveDate>) -> String {
  let mut message = stage.message().to_string();
  if let Some(date) = estimated_delivery {
    message.push_str(&format!(" Estimated delivery: {}.", date.format("%Y-%m-%d")));
  }
  if let Some(notes) = notes.map(str::trim).filter(|n| !n.is_empty()) {
    message.push_str(&format!(" Note: {}", notes));
  }
  message
}
