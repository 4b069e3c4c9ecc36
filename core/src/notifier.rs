// core/src/notifier.rs

use crate::error::EngineError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "user_id", rename_all = "snake_case")]
pub enum Recipient {
  User(Uuid),
  /// Every admin.
  Broadcast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationCategory {
  OrderPlaced,
  OrderStatus,
  CancellationRequest,
}

impl NotificationCategory {
  pub fn as_str(self) -> &'static str {
    match self {
      NotificationCategory::OrderPlaced => "order_placed",
      NotificationCategory::OrderStatus => "order_status",
      NotificationCategory::CancellationRequest => "cancellation_request",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
  pub recipient: Recipient,
  pub title: String,
  pub message: String,
  pub category: NotificationCategory,
  pub order_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
  pub user_id: Uuid,
  pub subject: String,
  pub body: String,
  pub category: NotificationCategory,
}

/// Delivery transport. The engine decides whether and what to send; the notifier only delivers.
#[async_trait]
pub trait Notifier: Send + Sync {
  async fn push_in_app(&self, notification: &Notification) -> Result<(), EngineError>;

  async fn send_email(&self, email: &EmailMessage) -> Result<(), EngineError>;
}
