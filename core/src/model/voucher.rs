// core/src/model/voucher.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountKind {
  /// `value` is a whole percent, clamped to 0..=100.
  Percent,
  /// `value` is an amount in minor units.
  Amount,
}

impl DiscountKind {
  pub fn as_str(self) -> &'static str {
    match self {
      DiscountKind::Percent => "percent",
      DiscountKind::Amount => "amount",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountCode {
  pub code: String,
  pub kind: DiscountKind,
  pub value: i64,
  pub starts_at: Option<DateTime<Utc>>,
  pub ends_at: Option<DateTime<Utc>>,
  pub min_subtotal: i64,
  pub max_uses: Option<i64>,
  pub used_count: i64,
  pub active: bool,
}

impl DiscountCode {
  /// Codes are unique case-insensitively; stores key them by this form.
  pub fn normalize(code: &str) -> String {
    code.trim().to_ascii_uppercase()
  }

  pub fn cap_reached(&self) -> bool {
    self.max_uses.map_or(false, |max| self.used_count >= max)
  }
}

/// One consumption of a code, keyed by the checkout that applied it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherRedemption {
  pub code: String,
  pub checkout_id: Uuid,
  pub redeemed_at: DateTime<Utc>,
}

/// Result of `redeem_voucher`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redemption {
  Consumed { used_count: i64 },
  /// The checkout had already consumed this code.
  AlreadyRedeemed,
}
