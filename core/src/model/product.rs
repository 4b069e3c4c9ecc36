// core/src/model/product.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
  pub id: Uuid,
  pub name: String,
  /// Current unit price in minor units.
  pub price: i64,
  /// Available quantity; never negative.
  pub stock: i64,
  pub updated_at: DateTime<Utc>,
}
