// core/src/model/status.rs

//! Storage statuses, customer-facing fulfillment stages, and the mappings and transition table
//! between them. Every conversion between the two vocabularies goes through this module.

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status values accepted by the order store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
  PendingPayment,
  PendingAcceptance,
  Reserved,
  Approved,
  InProduction,
  StartPackaging,
  ReadyForDelivery,
  OutForDelivery,
  Completed,
  PendingCancellation,
  Cancelled,
}

/// Stages shown to customers. Richer than `OrderStatus`; see [`FulfillmentStage::canonical`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentStage {
  PendingPayment,
  PendingAcceptance,
  Reserved,
  PendingBalancePayment,
  Approved,
  InProduction,
  QualityCheck,
  Packaging,
  ReadyForDelivery,
  OutForDelivery,
  Completed,
  PendingCancellation,
  Cancelled,
}

impl OrderStatus {
  pub const ALL: [OrderStatus; 11] = [
    OrderStatus::PendingPayment,
    OrderStatus::PendingAcceptance,
    OrderStatus::Reserved,
    OrderStatus::Approved,
    OrderStatus::InProduction,
    OrderStatus::StartPackaging,
    OrderStatus::ReadyForDelivery,
    OrderStatus::OutForDelivery,
    OrderStatus::Completed,
    OrderStatus::PendingCancellation,
    OrderStatus::Cancelled,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      OrderStatus::PendingPayment => "pending_payment",
      OrderStatus::PendingAcceptance => "pending_acceptance",
      OrderStatus::Reserved => "reserved",
      OrderStatus::Approved => "approved",
      OrderStatus::InProduction => "in_production",
      OrderStatus::StartPackaging => "start_packaging",
      OrderStatus::ReadyForDelivery => "ready_for_delivery",
      OrderStatus::OutForDelivery => "out_for_delivery",
      OrderStatus::Completed => "completed",
      OrderStatus::PendingCancellation => "pending_cancellation",
      OrderStatus::Cancelled => "cancelled",
    }
  }

  /// Display label stored in `order_progress`.
  pub fn progress_label(self) -> &'static str {
    match self {
      OrderStatus::PendingPayment => "awaiting_payment",
      OrderStatus::PendingAcceptance => "awaiting_acceptance",
      OrderStatus::Reserved => "payment_confirmed",
      OrderStatus::StartPackaging => "packaging",
      OrderStatus::PendingCancellation => "cancellation_requested",
      other => other.as_str(),
    }
  }

  /// The stage a record shows when the status is set without an explicit stage.
  pub fn default_stage(self) -> FulfillmentStage {
    match self {
      OrderStatus::PendingPayment => FulfillmentStage::PendingPayment,
      OrderStatus::PendingAcceptance => FulfillmentStage::PendingAcceptance,
      OrderStatus::Reserved => FulfillmentStage::Reserved,
      OrderStatus::Approved => FulfillmentStage::Approved,
      OrderStatus::InProduction => FulfillmentStage::InProduction,
      OrderStatus::StartPackaging => FulfillmentStage::Packaging,
      OrderStatus::ReadyForDelivery => FulfillmentStage::ReadyForDelivery,
      OrderStatus::OutForDelivery => FulfillmentStage::OutForDelivery,
      OrderStatus::Completed => FulfillmentStage::Completed,
      OrderStatus::PendingCancellation => FulfillmentStage::PendingCancellation,
      OrderStatus::Cancelled => FulfillmentStage::Cancelled,
    }
  }

  pub fn is_terminal(self) -> bool {
    matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
  }

  /// Statuses a customer may cancel outright, with compensation.
  pub fn is_customer_cancellable(self) -> bool {
    matches!(
      self,
      OrderStatus::PendingPayment | OrderStatus::Reserved | OrderStatus::PendingAcceptance
    )
  }

  /// Statuses where a customer cancellation becomes a request awaiting admin approval.
  pub fn is_in_production(self) -> bool {
    matches!(
      self,
      OrderStatus::Approved | OrderStatus::InProduction | OrderStatus::StartPackaging
    )
  }

  /// Allowed next statuses. A status listed for itself is a same-rank relabel
  /// (e.g. `in_production` shown as `quality_check`).
  pub fn allowed_next(self) -> &'static [OrderStatus] {
    use OrderStatus::*;
    match self {
      PendingPayment => &[
        PendingPayment,
        Reserved,
        PendingAcceptance,
        Approved,
        InProduction,
        StartPackaging,
        ReadyForDelivery,
        OutForDelivery,
        Completed,
        PendingCancellation,
        Cancelled,
      ],
      Reserved | PendingAcceptance => &[
        Reserved,
        PendingAcceptance,
        Approved,
        InProduction,
        StartPackaging,
        ReadyForDelivery,
        OutForDelivery,
        Completed,
        PendingCancellation,
        Cancelled,
      ],
      Approved => &[
        Approved,
        InProduction,
        StartPackaging,
        ReadyForDelivery,
        OutForDelivery,
        Completed,
        PendingCancellation,
        Cancelled,
      ],
      InProduction => &[
        InProduction,
        StartPackaging,
        ReadyForDelivery,
        OutForDelivery,
        Completed,
        PendingCancellation,
        Cancelled,
      ],
      StartPackaging => &[
        StartPackaging,
        ReadyForDelivery,
        OutForDelivery,
        Completed,
        PendingCancellation,
        Cancelled,
      ],
      ReadyForDelivery => &[ReadyForDelivery, OutForDelivery, Completed, PendingCancellation, Cancelled],
      OutForDelivery => &[OutForDelivery, Completed, PendingCancellation, Cancelled],
      PendingCancellation => &[
        Cancelled,
        Approved,
        InProduction,
        StartPackaging,
        ReadyForDelivery,
        OutForDelivery,
      ],
      Completed | Cancelled => &[],
    }
  }

  pub fn can_transition_to(self, next: OrderStatus) -> bool {
    self.allowed_next().contains(&next)
  }
}

impl FulfillmentStage {
  pub const ALL: [FulfillmentStage; 13] = [
    FulfillmentStage::PendingPayment,
    FulfillmentStage::PendingAcceptance,
    FulfillmentStage::Reserved,
    FulfillmentStage::PendingBalancePayment,
    FulfillmentStage::Approved,
    FulfillmentStage::InProduction,
    FulfillmentStage::QualityCheck,
    FulfillmentStage::Packaging,
    FulfillmentStage::ReadyForDelivery,
    FulfillmentStage::OutForDelivery,
    FulfillmentStage::Completed,
    FulfillmentStage::PendingCancellation,
    FulfillmentStage::Cancelled,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      FulfillmentStage::PendingPayment => "pending_payment",
      FulfillmentStage::PendingAcceptance => "pending_acceptance",
      FulfillmentStage::Reserved => "reserved",
      FulfillmentStage::PendingBalancePayment => "pending_balance_payment",
      FulfillmentStage::Approved => "approved",
      FulfillmentStage::InProduction => "in_production",
      FulfillmentStage::QualityCheck => "quality_check",
      FulfillmentStage::Packaging => "packaging",
      FulfillmentStage::ReadyForDelivery => "ready_for_delivery",
      FulfillmentStage::OutForDelivery => "out_for_delivery",
      FulfillmentStage::Completed => "completed",
      FulfillmentStage::PendingCancellation => "pending_cancellation",
      FulfillmentStage::Cancelled => "cancelled",
    }
  }

  /// The storage status this stage is persisted as.
  pub fn canonical(self) -> OrderStatus {
    match self {
      FulfillmentStage::PendingPayment => OrderStatus::PendingPayment,
      FulfillmentStage::PendingAcceptance => OrderStatus::PendingAcceptance,
      FulfillmentStage::Reserved | FulfillmentStage::PendingBalancePayment => OrderStatus::Reserved,
      FulfillmentStage::Approved => OrderStatus::Approved,
      FulfillmentStage::InProduction | FulfillmentStage::QualityCheck => OrderStatus::InProduction,
      FulfillmentStage::Packaging => OrderStatus::StartPackaging,
      FulfillmentStage::ReadyForDelivery => OrderStatus::ReadyForDelivery,
      FulfillmentStage::OutForDelivery => OrderStatus::OutForDelivery,
      FulfillmentStage::Completed => OrderStatus::Completed,
      FulfillmentStage::PendingCancellation => OrderStatus::PendingCancellation,
      FulfillmentStage::Cancelled => OrderStatus::Cancelled,
    }
  }

  pub fn display_name(self) -> &'static str {
    match self {
      FulfillmentStage::PendingPayment => "Awaiting payment",
      FulfillmentStage::PendingAcceptance => "Awaiting acceptance",
      FulfillmentStage::Reserved => "Payment confirmed",
      FulfillmentStage::PendingBalancePayment => "Balance due",
      FulfillmentStage::Approved => "Approved",
      FulfillmentStage::InProduction => "In production",
      FulfillmentStage::QualityCheck => "Quality check",
      FulfillmentStage::Packaging => "Packaging",
      FulfillmentStage::ReadyForDelivery => "Ready for delivery",
      FulfillmentStage::OutForDelivery => "Out for delivery",
      FulfillmentStage::Completed => "Completed",
      FulfillmentStage::PendingCancellation => "Cancellation requested",
      FulfillmentStage::Cancelled => "Cancelled",
    }
  }

  /// Customer-facing message for a transition into this stage.
  pub fn message(self) -> &'static str {
    match self {
      FulfillmentStage::PendingPayment => "Your order is waiting for payment.",
      FulfillmentStage::PendingAcceptance => "Your order is waiting to be accepted by our team.",
      FulfillmentStage::Reserved => "Your payment is confirmed and your items are reserved.",
      FulfillmentStage::PendingBalancePayment => "Your order has an outstanding balance to pay.",
      FulfillmentStage::Approved => "Your order has been approved.",
      FulfillmentStage::InProduction => "Your order is now in production.",
      FulfillmentStage::QualityCheck => "Your order is going through quality checks.",
      FulfillmentStage::Packaging => "Your order is being packaged.",
      FulfillmentStage::ReadyForDelivery => "Your order is ready for delivery.",
      FulfillmentStage::OutForDelivery => "Your order is out for delivery.",
      FulfillmentStage::Completed => "Your order has been completed. Thank you!",
      FulfillmentStage::PendingCancellation => "Your cancellation request is awaiting review.",
      FulfillmentStage::Cancelled => "Your order has been cancelled.",
    }
  }
}

fn normalize(raw: &str) -> String {
  raw.trim().to_ascii_lowercase().replace([' ', '-'], "_")
}

impl FromStr for OrderStatus {
  type Err = EngineError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let wanted = normalize(s);
    OrderStatus::ALL
      .into_iter()
      .find(|status| status.as_str() == wanted)
      .ok_or_else(|| EngineError::Validation(format!("unknown order status '{}'", s)))
  }
}

impl FromStr for FulfillmentStage {
  type Err = EngineError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let wanted = normalize(s);
    FulfillmentStage::ALL
      .into_iter()
      .find(|stage| stage.as_str() == wanted)
      .ok_or_else(|| EngineError::Validation(format!("unknown fulfillment stage '{}'", s)))
  }
}

impl fmt::Display for OrderStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl fmt::Display for FulfillmentStage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Maps a requested customer-facing status to its storage value. Unknown input passes through.
pub fn canonical_status(requested: &str) -> String {
  match requested.parse::<FulfillmentStage>() {
    Ok(stage) => stage.canonical().as_str().to_string(),
    Err(_) => requested.to_string(),
  }
}

/// Maps a storage status to its progress label. Unknown input passes through.
pub fn progress_label(status: &str) -> String {
  match status.parse::<OrderStatus>() {
    Ok(status) => status.progress_label().to_string(),
    Err(_) => status.to_string(),
  }
}

/// Resolves an admin-supplied target into the stage to display and the status to store.
pub fn resolve_target(requested: &str) -> Result<(FulfillmentStage, OrderStatus), EngineError> {
  if let Ok(stage) = requested.parse::<FulfillmentStage>() {
    return Ok((stage, stage.canonical()));
  }
  let status: OrderStatus = canonical_status(requested).parse()?;
  Ok((status.default_stage(), status))
}
