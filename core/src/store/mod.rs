// core/src/store/mod.rs

//! Persistence seam. Business rules live in the engine; stores only guarantee atomicity.

pub mod memory;

use crate::error::EngineError;
use crate::model::{AddOn, DiscountCode, NotificationPreferences, OrderRecord, Product, Redemption};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub use memory::MemoryStore;

/// What a mutation wants done with the rows it was handed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commit {
  Write,
  Unchanged,
}

/// A read-modify-write over one order row and its product's stock. Runs while the store holds
/// both rows locked; an `Err` leaves both untouched.
pub type Mutation<'a> = Box<dyn FnOnce(&mut OrderRecord, &mut i64) -> Result<Commit, EngineError> + Send + 'a>;

#[async_trait]
pub trait OrderStore: Send + Sync {
  async fn product(&self, product_id: Uuid) -> Result<Product, EngineError>;

  /// Cart lines of `user_id` among `line_ids`. Ids that are not the user's cart lines are omitted.
  async fn cart_lines(&self, user_id: Uuid, line_ids: &[Uuid]) -> Result<Vec<OrderRecord>, EngineError>;

  async fn order(&self, order_id: Uuid) -> Result<OrderRecord, EngineError>;

  /// Records created by one checkout, in creation order.
  async fn orders_for_checkout(&self, user_id: Uuid, checkout_id: Uuid) -> Result<Vec<OrderRecord>, EngineError>;

  /// Inserts `records` and deletes `consumed_cart_lines` in one unit. Fails with `Conflict`
  /// (and changes nothing) if any of the cart lines is already gone.
  async fn create_orders(&self, records: &[OrderRecord], consumed_cart_lines: &[Uuid]) -> Result<(), EngineError>;

  /// Returns the record as it stands after the mutation.
  async fn mutate_order(&self, order_id: Uuid, mutation: Mutation<'_>) -> Result<OrderRecord, EngineError>;

  /// Adds `quantity` to the user's cart line for `product_id`, replacing its add-ons, or inserts
  /// a new line at `unit_price`.
  async fn upsert_cart_line(
    &self,
    user_id: Uuid,
    product_id: Uuid,
    quantity: i64,
    unit_price: i64,
    addons: Vec<AddOn>,
  ) -> Result<OrderRecord, EngineError>;

  async fn voucher(&self, code: &str) -> Result<Option<DiscountCode>, EngineError>;

  /// Consumes one use of `code` for `checkout_id`. Repeating it for the same checkout is a no-op.
  /// Fails with `Conflict` when the usage cap was reached in the meantime.
  async fn redeem_voucher(&self, code: &str, checkout_id: Uuid) -> Result<Redemption, EngineError>;

  async fn notification_preferences(&self, user_id: Uuid) -> Result<NotificationPreferences, EngineError>;

  /// Deletes cart lines last touched before `older_than` and returns how many went.
  async fn purge_stale_carts(&self, older_than: DateTime<Utc>) -> Result<u64, EngineError>;
}
