// server/src/store/postgres.rs

//! `OrderStore` over PostgreSQL. Every read-modify-write runs in a transaction that holds the
//! order row and its product row with `FOR UPDATE`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use orderflow::model::{
  AddOn, DiscountCode, HistoryEntry, NotificationPreferences, OrderMeta, OrderRecord, Product, Redemption,
};
use orderflow::{Commit, EngineError, Mutation, OrderStore};
use serde::de::DeserializeOwned;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

const ORDER_COLUMNS: &str = "id, user_id, product_id, item_type, status, order_status, order_progress, quantity, \
   price, total_amount, payment_status, meta, progress_history, created_at, updated_at";

fn storage(err: sqlx::Error) -> EngineError {
  EngineError::Storage(err.to_string())
}

/// Enum columns hold the same snake_case strings the model serializes to.
fn decode_enum<T: DeserializeOwned>(column: &str, value: &str) -> Result<T, EngineError> {
  serde_json::from_value(serde_json::Value::String(value.to_string()))
    .map_err(|_| EngineError::Storage(format!("unexpected {} value '{}'", column, value)))
}

#[derive(FromRow)]
struct ProductRow {
  id: Uuid,
  name: String,
  price: i64,
  stock: i64,
  updated_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
  fn from(row: ProductRow) -> Self {
    Product {
      id: row.id,
      name: row.name,
      price: row.price,
      stock: row.stock,
      updated_at: row.updated_at,
    }
  }
}

#[derive(FromRow)]
struct OrderRow {
  id: Uuid,
  user_id: Uuid,
  product_id: Uuid,
  item_type: String,
  status: String,
  order_status: String,
  order_progress: String,
  quantity: i64,
  price: i64,
  total_amount: i64,
  payment_status: String,
  meta: Json<OrderMeta>,
  progress_history: Json<Vec<HistoryEntry>>,
  created_at: DateTime<Utc>,
  updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for OrderRecord {
  type Error = EngineError;

  fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
    Ok(OrderRecord {
      id: row.id,
      user_id: row.user_id,
      product_id: row.product_id,
      item_type: decode_enum("item_type", &row.item_type)?,
      status: row.status.parse()?,
      order_status: row.order_status.parse()?,
      order_progress: row.order_progress,
      quantity: row.quantity,
      price: row.price,
      total_amount: row.total_amount,
      payment_status: decode_enum("payment_status", &row.payment_status)?,
      meta: row.meta.0,
      progress_history: row.progress_history.0,
      created_at: row.created_at,
      updated_at: row.updated_at,
    })
  }
}

#[derive(FromRow)]
struct DiscountRow {
  code: String,
  kind: String,
  value: i64,
  starts_at: Option<DateTime<Utc>>,
  ends_at: Option<DateTime<Utc>>,
  min_subtotal: i64,
  max_uses: Option<i64>,
  used_count: i64,
  active: bool,
}

impl TryFrom<DiscountRow> for DiscountCode {
  type Error = EngineError;

  fn try_from(row: DiscountRow) -> Result<Self, Self::Error> {
    Ok(DiscountCode {
      code: row.code,
      kind: decode_enum("discount kind", &row.kind)?,
      value: row.value,
      starts_at: row.starts_at,
      ends_at: row.ends_at,
      min_subtotal: row.min_subtotal,
      max_uses: row.max_uses,
      used_count: row.used_count,
      active: row.active,
    })
  }
}

#[derive(Clone)]
pub struct PgOrderStore {
  pool: PgPool,
}

impl PgOrderStore {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }

  pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(&self.pool).await
  }

  async fn lock_order(tx: &mut Transaction<'_, Postgres>, order_id: Uuid) -> Result<OrderRecord, EngineError> {
    let row: Option<OrderRow> = sqlx::query_as(&format!("SELECT {} FROM orders WHERE id = $1 FOR UPDATE", ORDER_COLUMNS))
      .bind(order_id)
      .fetch_optional(&mut **tx)
      .await
      .map_err(storage)?;
    row
      .ok_or_else(|| EngineError::not_found("order", order_id))?
      .try_into()
  }

  async fn insert_order(tx: &mut Transaction<'_, Postgres>, record: &OrderRecord) -> Result<u64, EngineError> {
    let done = sqlx::query(
      "INSERT INTO orders (id, user_id, product_id, item_type, status, order_status, order_progress, quantity, \
         price, total_amount, payment_status, checkout_id, meta, progress_history, created_at, updated_at) \
       VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16) \
       ON CONFLICT DO NOTHING",
    )
    .bind(record.id)
    .bind(record.user_id)
    .bind(record.product_id)
    .bind(record.item_type.as_str())
    .bind(record.status.as_str())
    .bind(record.order_status.as_str())
    .bind(&record.order_progress)
    .bind(record.quantity)
    .bind(record.price)
    .bind(record.total_amount)
    .bind(record.payment_status.as_str())
    .bind(record.meta.checkout_id)
    .bind(Json(&record.meta))
    .bind(Json(&record.progress_history))
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(&mut **tx)
    .await
    .map_err(storage)?;
    Ok(done.rows_affected())
  }

  async fn write_order(tx: &mut Transaction<'_, Postgres>, record: &OrderRecord) -> Result<(), EngineError> {
    sqlx::query(
      "UPDATE orders SET item_type = $2, status = $3, order_status = $4, order_progress = $5, quantity = $6, \
         total_amount = $7, payment_status = $8, checkout_id = $9, meta = $10, progress_history = $11, updated_at = $12 \
       WHERE id = $1",
    )
    .bind(record.id)
    .bind(record.item_type.as_str())
    .bind(record.status.as_str())
    .bind(record.order_status.as_str())
    .bind(&record.order_progress)
    .bind(record.quantity)
    .bind(record.total_amount)
    .bind(record.payment_status.as_str())
    .bind(record.meta.checkout_id)
    .bind(Json(&record.meta))
    .bind(Json(&record.progress_history))
    .bind(record.updated_at)
    .execute(&mut **tx)
    .await
    .map_err(storage)?;
    Ok(())
  }
}

#[async_trait]
impl OrderStore for PgOrderStore {
  async fn product(&self, product_id: Uuid) -> Result<Product, EngineError> {
    let row: Option<ProductRow> = sqlx::query_as("SELECT id, name, price, stock, updated_at FROM products WHERE id = $1")
      .bind(product_id)
      .fetch_optional(&self.pool)
      .await
      .map_err(storage)?;
    row
      .map(Product::from)
      .ok_or_else(|| EngineError::not_found("product", product_id))
  }

  async fn cart_lines(&self, user_id: Uuid, line_ids: &[Uuid]) -> Result<Vec<OrderRecord>, EngineError> {
    let rows: Vec<OrderRow> = sqlx::query_as(&format!(
      "SELECT {} FROM orders WHERE id = ANY($1) AND user_id = $2 AND item_type = 'cart'",
      ORDER_COLUMNS
    ))
    .bind(line_ids.to_vec())
    .bind(user_id)
    .fetch_all(&self.pool)
    .await
    .map_err(storage)?;
    let mut lines = rows.into_iter().map(OrderRecord::try_from).collect::<Result<Vec<_>, _>>()?;
    lines.sort_by_key(|l| line_ids.iter().position(|id| *id == l.id));
    Ok(lines)
  }

  async fn order(&self, order_id: Uuid) -> Result<OrderRecord, EngineError> {
    let row: Option<OrderRow> = sqlx::query_as(&format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS))
      .bind(order_id)
      .fetch_optional(&self.pool)
      .await
      .map_err(storage)?;
    row.ok_or_else(|| EngineError::not_found("order", order_id))?.try_into()
  }

  async fn orders_for_checkout(&self, user_id: Uuid, checkout_id: Uuid) -> Result<Vec<OrderRecord>, EngineError> {
    let rows: Vec<OrderRow> = sqlx::query_as(&format!(
      "SELECT {} FROM orders WHERE user_id = $1 AND checkout_id = $2 AND item_type <> 'cart' ORDER BY created_at, id",
      ORDER_COLUMNS
    ))
    .bind(user_id)
    .bind(checkout_id)
    .fetch_all(&self.pool)
    .await
    .map_err(storage)?;
    rows.into_iter().map(OrderRecord::try_from).collect()
  }

  #[instrument(skip_all, fields(records = records.len(), consumed = consumed_cart_lines.len()))]
  async fn create_orders(&self, records: &[OrderRecord], consumed_cart_lines: &[Uuid]) -> Result<(), EngineError> {
    let mut tx = self.pool.begin().await.map_err(storage)?;

    let deleted = sqlx::query("DELETE FROM orders WHERE id = ANY($1) AND item_type = 'cart'")
      .bind(consumed_cart_lines.to_vec())
      .execute(&mut *tx)
      .await
      .map_err(storage)?
      .rows_affected();
    if deleted != consumed_cart_lines.len() as u64 {
      warn!(deleted, expected = consumed_cart_lines.len(), "Cart lines vanished during checkout.");
      return Err(EngineError::Conflict("some cart lines were already checked out".to_string()));
    }

    for record in records {
      if Self::insert_order(&mut tx, record).await? == 0 {
        return Err(EngineError::Conflict(format!("order {} already exists", record.id)));
      }
    }
    tx.commit().await.map_err(storage)?;
    debug!("Order records created.");
    Ok(())
  }

  #[instrument(skip(self, mutation))]
  async fn mutate_order(&self, order_id: Uuid, mutation: Mutation<'_>) -> Result<OrderRecord, EngineError> {
    let mut tx = self.pool.begin().await.map_err(storage)?;
    let mut record = Self::lock_order(&mut tx, order_id).await?;

    let stock_before: i64 = sqlx::query_scalar("SELECT stock FROM products WHERE id = $1 FOR UPDATE")
      .bind(record.product_id)
      .fetch_optional(&mut *tx)
      .await
      .map_err(storage)?
      .ok_or_else(|| EngineError::not_found("product", record.product_id))?;

    let mut stock = stock_before;
    let original = record.clone();
    // Dropping `tx` on an error rolls both rows back
    match mutation(&mut record, &mut stock)? {
      Commit::Write => {
        Self::write_order(&mut tx, &record).await?;
        if stock != stock_before {
          sqlx::query("UPDATE products SET stock = $2, updated_at = NOW() WHERE id = $1")
            .bind(record.product_id)
            .bind(stock)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        }
        tx.commit().await.map_err(storage)?;
        Ok(record)
      }
      Commit::Unchanged => {
        tx.rollback().await.map_err(storage)?;
        Ok(original)
      }
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
    // A concurrent first insert loses to the unique cart index; the retry then finds and merges it
    for _ in 0..2 {
      let mut tx = self.pool.begin().await.map_err(storage)?;
      let existing: Option<OrderRow> = sqlx::query_as(&format!(
        "SELECT {} FROM orders WHERE user_id = $1 AND product_id = $2 AND item_type = 'cart' FOR UPDATE",
        ORDER_COLUMNS
      ))
      .bind(user_id)
      .bind(product_id)
      .fetch_optional(&mut *tx)
      .await
      .map_err(storage)?;

      if let Some(row) = existing {
        let mut line = OrderRecord::try_from(row)?;
        line.merge_into_cart_line(quantity, addons)?;
        line.touch(Utc::now());
        Self::write_order(&mut tx, &line).await?;
        tx.commit().await.map_err(storage)?;
        return Ok(line);
      }

      let line = OrderRecord::new_cart_line(user_id, product_id, quantity, unit_price, addons.clone())?;
      if Self::insert_order(&mut tx, &line).await? == 1 {
        tx.commit().await.map_err(storage)?;
        return Ok(line);
      }
      debug!(%user_id, %product_id, "Concurrent cart insert detected, merging instead.");
    }
    Err(EngineError::Conflict("cart line is being updated concurrently, try again".to_string()))
  }

  async fn voucher(&self, code: &str) -> Result<Option<DiscountCode>, EngineError> {
    let row: Option<DiscountRow> = sqlx::query_as(
      "SELECT code, kind, value, starts_at, ends_at, min_subtotal, max_uses, used_count, active \
       FROM discount_codes WHERE code = $1",
    )
    .bind(DiscountCode::normalize(code))
    .fetch_optional(&self.pool)
    .await
    .map_err(storage)?;
    row.map(DiscountCode::try_from).transpose()
  }

  #[instrument(skip(self))]
  async fn redeem_voucher(&self, code: &str, checkout_id: Uuid) -> Result<Redemption, EngineError> {
    let code = DiscountCode::normalize(code);
    let mut tx = self.pool.begin().await.map_err(storage)?;

    let used_count: Option<i64> = sqlx::query_scalar(
      "UPDATE discount_codes SET used_count = used_count + 1 \
       WHERE code = $1 AND (max_uses IS NULL OR used_count < max_uses) \
       AND NOT EXISTS (SELECT 1 FROM voucher_redemptions WHERE code = $1 AND checkout_id = $2) \
       RETURNING used_count",
    )
    .bind(&code)
    .bind(checkout_id)
    .fetch_optional(&mut *tx)
    .await
    .map_err(storage)?;

    let Some(used_count) = used_count else {
      let (exists, redeemed): (bool, bool) = sqlx::query_as(
        "SELECT EXISTS (SELECT 1 FROM discount_codes WHERE code = $1), \
                EXISTS (SELECT 1 FROM voucher_redemptions WHERE code = $1 AND checkout_id = $2)",
      )
      .bind(&code)
      .bind(checkout_id)
      .fetch_one(&mut *tx)
      .await
      .map_err(storage)?;
      return match (exists, redeemed) {
        (_, true) => Ok(Redemption::AlreadyRedeemed),
        (false, _) => Err(EngineError::not_found("discount code", &code)),
        (true, false) => Err(EngineError::Conflict(format!("discount code {} has reached its usage limit", code))),
      };
    };

    let inserted = sqlx::query(
      "INSERT INTO voucher_redemptions (code, checkout_id, redeemed_at) VALUES ($1, $2, NOW()) ON CONFLICT DO NOTHING",
    )
    .bind(&code)
    .bind(checkout_id)
    .execute(&mut *tx)
    .await
    .map_err(storage)?
    .rows_affected();
    if inserted == 0 {
      // Lost a race with the same checkout; drop our increment
      tx.rollback().await.map_err(storage)?;
      return Ok(Redemption::AlreadyRedeemed);
    }
    tx.commit().await.map_err(storage)?;
    Ok(Redemption::Consumed { used_count })
  }

  async fn notification_preferences(&self, user_id: Uuid) -> Result<NotificationPreferences, EngineError> {
    let flags: Option<Json<NotificationPreferences>> =
      sqlx::query_scalar("SELECT flags FROM notification_preferences WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;
    Ok(flags.map(|f| f.0).unwrap_or_default())
  }

  async fn purge_stale_carts(&self, older_than: DateTime<Utc>) -> Result<u64, EngineError> {
    let done = sqlx::query("DELETE FROM orders WHERE item_type = 'cart' AND updated_at < $1")
      .bind(older_than)
      .execute(&self.pool)
      .await
      .map_err(storage)?;
    Ok(done.rows_affected())
  }
}
