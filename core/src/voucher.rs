// core/src/voucher.rs

//! Discount code validation. Consumption is a store operation; see `OrderStore::redeem_voucher`.

use crate::model::{DiscountCode, DiscountKind};
use crate::pricing::discount_for;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VoucherRejection {
  #[error("discount code '{0}' does not exist")]
  Unknown(String),
  #[error("discount code is not active")]
  Inactive,
  #[error("discount code is not valid yet")]
  NotStarted,
  #[error("discount code has expired")]
  Expired,
  #[error("order subtotal is below the minimum of {minimum} for this code")]
  BelowMinimum { minimum: i64 },
  #[error("discount code has reached its usage limit")]
  CapReached,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidVoucher {
  pub code: String,
  pub kind: DiscountKind,
  pub value: i64,
  /// Discount this code gives on the subtotal it was validated against.
  pub discount: i64,
}

/// Checks `code` against `subtotal` at `now`.
pub fn validate(code: &DiscountCode, subtotal: i64, now: DateTime<Utc>) -> Result<ValidVoucher, VoucherRejection> {
  if !code.active {
    return Err(VoucherRejection::Inactive);
  }
  if code.starts_at.map_or(false, |start| now < start) {
    return Err(VoucherRejection::NotStarted);
  }
  if code.ends_at.map_or(false, |end| now > end) {
    return Err(VoucherRejection::Expired);
  }
  if subtotal < code.min_subtotal {
    return Err(VoucherRejection::BelowMinimum {
      minimum: code.min_subtotal,
    });
  }
  if code.cap_reached() {
    return Err(VoucherRejection::CapReached);
  }
  Ok(ValidVoucher {
    code: code.code.clone(),
    kind: code.kind,
    value: code.value,
    discount: discount_for(code.kind, code.value, subtotal),
  })
}

/// Answer to a voucher preview: either `{type, value}` or `{invalid, reason}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum VoucherVerdict {
  Valid {
    valid: bool,
    #[serde(rename = "type")]
    kind: DiscountKind,
    value: i64,
    discount: i64,
  },
  Invalid {
    valid: bool,
    reason: String,
  },
}

impl VoucherVerdict {
  pub fn is_valid(&self) -> bool {
    matches!(self, VoucherVerdict::Valid { .. })
  }
}

impl From<Result<ValidVoucher, VoucherRejection>> for VoucherVerdict {
  fn from(result: Result<ValidVoucher, VoucherRejection>) -> Self {
    match result {
      Ok(v) => VoucherVerdict::Valid {
        valid: true,
        kind: v.kind,
        value: v.value,
        discount: v.discount,
      },
      Err(rejection) => VoucherVerdict::Invalid {
        valid: false,
        reason: rejection.to_string(),
      },
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Duration;

  fn code() -> DiscountCode {
    DiscountCode {
      code: "SPRING10".into(),
      kind: DiscountKind::Percent,
      value: 10,
      starts_at: None,
      ends_at: None,
      min_subtotal: 0,
      max_uses: None,
      used_count: 0,
      active: true,
    }
  }

  #[test]
  fn valid_code_reports_discount() {
    let v = validate(&code(), 1000, Utc::now()).unwrap();
    assert_eq!(v.discount, 100);
    assert_eq!(v.kind, DiscountKind::Percent);
  }

  #[test]
  fn usage_cap_is_enforced_at_equality() {
    let mut c = code();
    c.max_uses = Some(3);
    c.used_count = 2;
    assert!(validate(&c, 1000, Utc::now()).is_ok());
    c.used_count = 3;
    assert_eq!(validate(&c, 1000, Utc::now()), Err(VoucherRejection::CapReached));
  }

  #[test]
  fn minimum_subtotal_is_enforced() {
    let mut c = code();
    c.min_subtotal = 5000;
    assert_eq!(
      validate(&c, 4999, Utc::now()),
      Err(VoucherRejection::BelowMinimum { minimum: 5000 })
    );
    assert!(validate(&c, 5000, Utc::now()).is_ok());
  }

  #[test]
  fn window_and_active_flag() {
    let now = Utc::now();
    let mut c = code();
    c.starts_at = Some(now + Duration::hours(1));
    assert_eq!(validate(&c, 1000, now), Err(VoucherRejection::NotStarted));
    c.starts_at = None;
    c.ends_at = Some(now - Duration::hours(1));
    assert_eq!(validate(&c, 1000, now), Err(VoucherRejection::Expired));
    c.ends_at = None;
    c.active = false;
    assert_eq!(validate(&c, 1000, now), Err(VoucherRejection::Inactive));
  }

  #[test]
  fn verdict_serializes_both_shapes() {
    let ok: VoucherVerdict = validate(&code(), 1000, Utc::now()).into();
    let json = serde_json::to_value(&ok).unwrap();
    assert_eq!(json["type"], "percent");
    assert_eq!(json["value"], 10);

    let bad: VoucherVerdict = Err(VoucherRejection::Expired).into();
    let json = serde_json::to_value(&bad).unwrap();
    assert_eq!(json["valid"], false);
    assert_eq!(json["reason"], "discount code has expired");
  }
}
