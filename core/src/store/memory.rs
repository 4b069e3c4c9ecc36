// core/src/store/memory.rs

use crate::error::EngineError;
use crate::model::{
  AddOn, DiscountCode, ItemType, NotificationPreferences, OrderRecord, Product, Redemption, VoucherRedemption,
};
use crate::store::{Commit, Mutation, OrderStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::{debug, instrument};
use uuid::Uuid;

#[derive(Default)]
struct Tables {
  products: HashMap<Uuid, Product>,
  /// Insertion order is creation order.
  orders: Vec<OrderRecord>,
  vouchers: HashMap<String, DiscountCode>,
  redemptions: HashMap<(String, Uuid), VoucherRedemption>,
  preferences: HashMap<Uuid, NotificationPreferences>,
}

impl Tables {
  fn order_index(&self, order_id: Uuid) -> Option<usize> {
    self.orders.iter().position(|o| o.id == order_id)
  }
}

/// `OrderStore` backed by process memory. One mutex over all tables makes every operation atomic.
#[derive(Default)]
pub struct MemoryStore {
  tables: Mutex<Tables>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert_product(&self, product: Product) {
    self.tables.lock().products.insert(product.id, product);
  }

  pub fn insert_voucher(&self, voucher: DiscountCode) {
    let key = DiscountCode::normalize(&voucher.code);
    self.tables.lock().vouchers.insert(key, voucher);
  }

  pub fn insert_order(&self, record: OrderRecord) {
    self.tables.lock().orders.push(record);
  }

  pub fn set_preferences(&self, user_id: Uuid, preferences: NotificationPreferences) {
    self.tables.lock().preferences.insert(user_id, preferences);
  }

  pub fn stock(&self, product_id: Uuid) -> Option<i64> {
    self.tables.lock().products.get(&product_id).map(|p| p.stock)
  }

  pub fn voucher_used_count(&self, code: &str) -> Option<i64> {
    self
      .tables
      .lock()
      .vouchers
      .get(&DiscountCode::normalize(code))
      .map(|v| v.used_count)
  }

  pub fn orders_of(&self, user_id: Uuid) -> Vec<OrderRecord> {
    self
      .tables
      .lock()
      .orders
      .iter()
      .filter(|o| o.user_id == user_id)
      .cloned()
      .collect()
  }
}

#[async_trait]
impl OrderStore for MemoryStore {
  async fn product(&self, product_id: Uuid) -> Result<Product, EngineError> {
    self
      .tables
      .lock()
      .products
      .get(&product_id)
      .cloned()
      .ok_or_else(|| EngineError::not_found("product", product_id))
  }

  async fn cart_lines(&self, user_id: Uuid, line_ids: &[Uuid]) -> Result<Vec<OrderRecord>, EngineError> {
    let tables = self.tables.lock();
    Ok(
      line_ids
        .iter()
        .filter_map(|id| tables.orders.iter().find(|o| o.id == *id))
        .filter(|o| o.user_id == user_id && o.item_type == ItemType::Cart)
        .cloned()
        .collect(),
    )
  }

  async fn order(&self, order_id: Uuid) -> Result<OrderRecord, EngineError> {
    let tables = self.tables.lock();
    tables
      .order_index(order_id)
      .map(|i| tables.orders[i].clone())
      .ok_or_else(|| EngineError::not_found("order", order_id))
  }

  async fn orders_for_checkout(&self, user_id: Uuid, checkout_id: Uuid) -> Result<Vec<OrderRecord>, EngineError> {
    Ok(
      self
        .tables
        .lock()
        .orders
        .iter()
        .filter(|o| o.user_id == user_id && o.item_type != ItemType::Cart && o.meta.checkout_id == Some(checkout_id))
        .cloned()
        .collect(),
    )
  }

  #[instrument(name = "MemoryStore::create_orders", skip_all, fields(records = records.len()))]
  async fn create_orders(&self, records: &[OrderRecord], consumed_cart_lines: &[Uuid]) -> Result<(), EngineError> {
    let mut tables = self.tables.lock();
    for line_id in consumed_cart_lines {
      let present = tables
        .orders
        .iter()
        .any(|o| o.id == *line_id && o.item_type == ItemType::Cart);
      if !present {
        return Err(EngineError::Conflict(format!("cart line {} was already checked out", line_id)));
      }
    }
    tables
      .orders
      .retain(|o| !(o.item_type == ItemType::Cart && consumed_cart_lines.contains(&o.id)));
    tables.orders.extend(records.iter().cloned());
    debug!(consumed = consumed_cart_lines.len(), "Order records created.");
    Ok(())
  }

  async fn mutate_order(&self, order_id: Uuid, mutation: Mutation<'_>) -> Result<OrderRecord, EngineError> {
    let mut tables = self.tables.lock();
    let index = tables
      .order_index(order_id)
      .ok_or_else(|| EngineError::not_found("order", order_id))?;
    let product_id = tables.orders[index].product_id;
    let mut stock = tables
      .products
      .get(&product_id)
      .map(|p| p.stock)
      .ok_or_else(|| EngineError::not_found("product", product_id))?;

    let mut record = tables.orders[index].clone();
    match mutation(&mut record, &mut stock)? {
      Commit::Write => {
        if let Some(product) = tables.products.get_mut(&product_id) {
          if product.stock != stock {
            product.stock = stock;
            product.updated_at = Utc::now();
          }
        }
        tables.orders[index] = record.clone();
        Ok(record)
      }
      Commit::Unchanged => Ok(tables.orders[index].clone()),
    }
  }

  async fn upsert_cart_line(
    &self,
    user_id: Uuid,
    product_id: Uuid,
    quantity: i64,
    unit_price: i64,
    addons: Vec<AddOn>,
  ) -> Result<OrderRecord, EngineError> {
    let mut tables = self.tables.lock();
    let existing = tables
      .orders
      .iter_mut()
      .find(|o| o.user_id == user_id && o.product_id == product_id && o.item_type == ItemType::Cart);
    if let Some(line) = existing {
      line.merge_into_cart_line(quantity, addons)?;
      line.touch(Utc::now());
      return Ok(line.clone());
    }
    let line = OrderRecord::new_cart_line(user_id, product_id, quantity, unit_price, addons)?;
    tables.orders.push(line.clone());
    Ok(line)
  }

  async fn voucher(&self, code: &str) -> Result<Option<DiscountCode>, EngineError> {
    Ok(self.tables.lock().vouchers.get(&DiscountCode::normalize(code)).cloned())
  }

  async fn redeem_voucher(&self, code: &str, checkout_id: Uuid) -> Result<Redemption, EngineError> {
    let key = DiscountCode::normalize(code);
    let mut tables = self.tables.lock();
    if tables.redemptions.contains_key(&(key.clone(), checkout_id)) {
      return Ok(Redemption::AlreadyRedeemed);
    }
    let voucher = tables
      .vouchers
      .get_mut(&key)
      .ok_or_else(|| EngineError::not_found("discount code", &key))?;
    if voucher.cap_reached() {
      return Err(EngineError::Conflict(format!("discount code {} has reached its usage limit", key)));
    }
    voucher.used_count += 1;
    let used_count = voucher.used_count;
    tables.redemptions.insert(
      (key.clone(), checkout_id),
      VoucherRedemption {
        code: key,
        checkout_id,
        redeemed_at: Utc::now(),
      },
    );
    Ok(Redemption::Consumed { used_count })
  }

  async fn notification_preferences(&self, user_id: Uuid) -> Result<NotificationPreferences, EngineError> {
    Ok(self.tables.lock().preferences.get(&user_id).cloned().unwrap_or_default())
  }

  async fn purge_stale_carts(&self, older_than: DateTime<Utc>) -> Result<u64, EngineError> {
    let mut tables = self.tables.lock();
    let before = tables.orders.len();
    tables
      .orders
      .retain(|o| !(o.item_type == ItemType::Cart && o.updated_at < older_than));
    Ok((before - tables.orders.len()) as u64)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{DiscountKind, Redemption};

  fn product(stock: i64) -> Product {
    Product {
      id: Uuid::new_v4(),
      name: "Walnut desk".into(),
      price: 5000,
      stock,
      updated_at: Utc::now(),
    }
  }

  #[tokio::test]
  async fn failed_mutation_leaves_rows_untouched() {
    let store = MemoryStore::new();
    let p = product(5);
    store.insert_product(p.clone());
    let line = store.upsert_cart_line(Uuid::new_v4(), p.id, 1, p.price, Vec::new()).await.unwrap();

    let err = store
      .mutate_order(
        line.id,
        Box::new(|record: &mut OrderRecord, stock: &mut i64| {
          *stock = 0;
          record.quantity = 99;
          Err(EngineError::Conflict("nope".into()))
        }),
      )
      .await
      .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));
    assert_eq!(store.stock(p.id), Some(5));
    assert_eq!(store.order(line.id).await.unwrap().quantity, 1);
  }

  #[tokio::test]
  async fn cart_lines_merge_per_product() {
    let store = MemoryStore::new();
    let p = product(5);
    store.insert_product(p.clone());
    let user = Uuid::new_v4();
    let first = store.upsert_cart_line(user, p.id, 1, p.price, Vec::new()).await.unwrap();
    let second = store.upsert_cart_line(user, p.id, 2, 1, Vec::new()).await.unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(second.quantity, 3);
    assert_eq!(second.price, p.price);
    assert_eq!(store.orders_of(user).len(), 1);
  }

  #[tokio::test]
  async fn redemption_is_idempotent_per_checkout() {
    let store = MemoryStore::new();
    store.insert_voucher(DiscountCode {
      code: "once".into(),
      kind: DiscountKind::Amount,
      value: 100,
      starts_at: None,
      ends_at: None,
      min_subtotal: 0,
      max_uses: Some(1),
      used_count: 0,
      active: true,
    });
    let checkout = Uuid::new_v4();
    assert_eq!(
      store.redeem_voucher("ONCE", checkout).await.unwrap(),
      Redemption::Consumed { used_count: 1 }
    );
    assert_eq!(store.redeem_voucher("once", checkout).await.unwrap(), Redemption::AlreadyRedeemed);
    assert!(matches!(
      store.redeem_voucher("once", Uuid::new_v4()).await,
      Err(EngineError::Conflict(_))
    ));
    assert_eq!(store.voucher_used_count("ONCE"), Some(1));
  }
}
