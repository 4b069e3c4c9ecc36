// core/src/pricing.rs

//! Line totals, discounts and their allocation across a checkout.

use crate::model::{DiscountKind, OrderRecord};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineQuote {
  pub line_id: Uuid,
  pub unit_total: i64,
  pub quantity: i64,
  pub subtotal: i64,
  pub discount_share: i64,
  pub total: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Quote {
  pub lines: Vec<LineQuote>,
  pub subtotal: i64,
  pub discount: i64,
  pub total: i64,
}

/// Discount for `subtotal`, never more than the subtotal.
/// Percentages are whole percents rounded half-up to the minor unit.
pub fn discount_for(kind: DiscountKind, value: i64, subtotal: i64) -> i64 {
  let subtotal = subtotal.max(0);
  let raw = match kind {
    DiscountKind::Percent => {
      let pct = value.clamp(0, 100) as i128;
      ((subtotal as i128 * pct + 50) / 100) as i64
    }
    DiscountKind::Amount => value.max(0),
  };
  raw.min(subtotal)
}

/// Splits `discount` across `subtotals` proportionally, rounding down, with the remainder
/// placed on the last line that can still absorb it. Shares never exceed their line.
pub fn allocate(discount: i64, subtotals: &[i64]) -> Vec<i64> {
  let total: i64 = subtotals.iter().map(|s| (*s).max(0)).sum();
  let discount = discount.clamp(0, total);
  if total == 0 {
    return vec![0; subtotals.len()];
  }

  let mut shares: Vec<i64> = subtotals
    .iter()
    .map(|s| ((discount as i128 * (*s).max(0) as i128) / total as i128) as i64)
    .collect();

  let mut remainder = discount - shares.iter().sum::<i64>();
  for (share, subtotal) in shares.iter_mut().zip(subtotals).rev() {
    if remainder == 0 {
      break;
    }
    let room = (*subtotal).max(0) - *share;
    let add = room.min(remainder);
    *share += add;
    remainder -= add;
  }
  shares
}

/// Prices `lines` (cart rows with add-ons already attached) against a checkout discount.
pub fn quote(lines: &[OrderRecord], discount: i64) -> Quote {
  let subtotals: Vec<i64> = lines.iter().map(|l| l.line_subtotal().max(0)).collect();
  let subtotal: i64 = subtotals.iter().sum();
  let discount = discount.clamp(0, subtotal);
  let shares = allocate(discount, &subtotals);

  let lines: Vec<LineQuote> = lines
    .iter()
    .zip(subtotals.iter().zip(shares))
    .map(|(line, (line_subtotal, share))| LineQuote {
      line_id: line.id,
      unit_total: line.unit_total(),
      quantity: line.quantity,
      subtotal: *line_subtotal,
      discount_share: share,
      total: (line_subtotal - share).max(0),
    })
    .collect();

  Quote {
    total: (subtotal - discount).max(0),
    lines,
    subtotal,
    discount,
  }
}

/// Subtotal of `lines` before any discount.
pub fn subtotal(lines: &[OrderRecord]) -> i64 {
  lines.iter().map(|l| l.line_subtotal().max(0)).sum()
}
