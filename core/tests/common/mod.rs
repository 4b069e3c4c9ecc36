// tests/common/mod.rs
#![allow(dead_code)] // Each test binary uses a different subset of these helpers

use async_trait::async_trait;
use chrono::Utc;
use once_cell::sync::Lazy;
use orderflow::model::{AddOn, DiscountCode, DiscountKind, NotificationPreferences, OrderRecord, Product};
use orderflow::{
  AddToCart, CaptureResult, CaptureStatus, CheckoutReceipt, CheckoutRequest, EmailMessage, EngineConfig, EngineError,
  MemoryStore, Notification, Notifier, OrderEngine, PaymentGateway, PaymentSession, ProviderEvent, SessionRequest,
  WebhookOutcome,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::Level;
use uuid::Uuid;

pub const WEBHOOK_SECRET: &str = "whsec_test";

// --- Helper for Tracing Setup ---
static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer()
    .try_init()
    .ok();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}

// --- Recording payment gateway ---

#[derive(Default)]
pub struct RecordingGateway {
  pub sessions: Mutex<Vec<SessionRequest>>,
  pub fail_sessions: AtomicBool,
  /// Capture results keyed by provider order id.
  pub captures: Mutex<HashMap<String, CaptureResult>>,
  session_seq: AtomicUsize,
}

impl RecordingGateway {
  pub fn session_count(&self) -> usize {
    self.sessions.lock().len()
  }

  pub fn last_session(&self) -> Option<SessionRequest> {
    self.sessions.lock().last().cloned()
  }
}

#[async_trait]
impl PaymentGateway for RecordingGateway {
  async fn create_session(&self, request: &SessionRequest) -> Result<PaymentSession, EngineError> {
    if self.fail_sessions.load(Ordering::SeqCst) {
      return Err(EngineError::Upstream("provider unavailable".to_string()));
    }
    self.sessions.lock().push(request.clone());
    let n = self.session_seq.fetch_add(1, Ordering::SeqCst) + 1;
    Ok(PaymentSession {
      session_id: format!("cs_test_{}", n),
      checkout_url: format!("https://pay.test/session/{}", n),
      provider_order_id: Some(format!("po_test_{}", n)),
    })
  }

  async fn capture(&self, provider_order_id: &str) -> Result<CaptureResult, EngineError> {
    self
      .captures
      .lock()
      .get(provider_order_id)
      .cloned()
      .ok_or_else(|| EngineError::Upstream(format!("unknown provider order {}", provider_order_id)))
  }

  fn verify_event(&self, payload: &[u8], signature: Option<&str>) -> Result<ProviderEvent, EngineError> {
    if signature != Some(WEBHOOK_SECRET) {
      return Err(EngineError::Forbidden("invalid webhook signature".to_string()));
    }
    serde_json::from_slice(payload).map_err(|e| EngineError::Validation(format!("malformed event: {}", e)))
  }
}

// --- Recording notifier ---

#[derive(Default)]
pub struct RecordingNotifier {
  pub in_app: Mutex<Vec<Notification>>,
  pub emails: Mutex<Vec<EmailMessage>>,
  pub fail_in_app: AtomicBool,
}

impl RecordingNotifier {
  pub fn in_app_count(&self) -> usize {
    self.in_app.lock().len()
  }

  pub fn email_count(&self) -> usize {
    self.emails.lock().len()
  }
}

#[async_trait]
impl Notifier for RecordingNotifier {
  async fn push_in_app(&self, notification: &Notification) -> Result<(), EngineError> {
    if self.fail_in_app.load(Ordering::SeqCst) {
      return Err(EngineError::Upstream("notification service down".to_string()));
    }
    self.in_app.lock().push(notification.clone());
    Ok(())
  }

  async fn send_email(&self, email: &EmailMessage) -> Result<(), EngineError> {
    self.emails.lock().push(email.clone());
    Ok(())
  }
}

// --- Harness ---

pub struct Harness {
  pub engine: Arc<OrderEngine>,
  pub store: Arc<MemoryStore>,
  pub gateway: Arc<RecordingGateway>,
  pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
  pub fn new() -> Self {
    setup_tracing();
    let store = Arc::new(MemoryStore::new());
    let gateway = Arc::new(RecordingGateway::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let engine = Arc::new(OrderEngine::new(
      store.clone(),
      gateway.clone(),
      notifier.clone(),
      EngineConfig::default(),
    ));
    Self {
      engine,
      store,
      gateway,
      notifier,
    }
  }

  pub fn product(&self, price: i64, stock: i64) -> Product {
    let product = Product {
      id: Uuid::new_v4(),
      name: format!("Product {}", price),
      price,
      stock,
      updated_at: Utc::now(),
    };
    self.store.insert_product(product.clone());
    product
  }

  pub fn stock(&self, product: &Product) -> i64 {
    self.store.stock(product.id).unwrap_or(-1)
  }

  pub fn voucher(&self, code: &str, kind: DiscountKind, value: i64) -> DiscountCode {
    let voucher = DiscountCode {
      code: code.to_string(),
      kind,
      value,
      starts_at: None,
      ends_at: None,
      min_subtotal: 0,
      max_uses: None,
      used_count: 0,
      active: true,
    };
    self.store.insert_voucher(voucher.clone());
    voucher
  }

  pub fn preferences(&self, user_id: Uuid, flags: &[(&str, bool)]) {
    let prefs = flags
      .iter()
      .fold(NotificationPreferences::default(), |p, (flag, on)| p.with(flag, *on));
    self.store.set_preferences(user_id, prefs);
  }

  pub async fn add_to_cart(&self, user_id: Uuid, product: &Product, quantity: i64, addons: Vec<AddOn>) -> OrderRecord {
    self
      .engine
      .add_to_cart(AddToCart {
        user_id,
        product_id: product.id,
        quantity,
        addons,
      })
      .await
      .expect("add to cart")
  }

  pub async fn checkout(&self, user_id: Uuid, lines: &[&OrderRecord], voucher: Option<&str>) -> Result<CheckoutReceipt, EngineError> {
    self
      .engine
      .checkout(CheckoutRequest {
        user_id,
        cart_line_ids: lines.iter().map(|l| l.id).collect(),
        voucher_code: voucher.map(str::to_string),
        ..Default::default()
      })
      .await
  }

  /// Delivers a signed confirmation webhook for the receipt's orders.
  pub async fn confirm(&self, receipt: &CheckoutReceipt) -> Result<WebhookOutcome, EngineError> {
    let payload = event_payload("checkout.session.completed", &receipt.order_ids, "tx_test");
    self.engine.handle_webhook(&payload, Some(WEBHOOK_SECRET)).await
  }

  /// Checks out `quantity` of a fresh product and confirms payment.
  pub async fn reserved_order(&self, user_id: Uuid, quantity: i64, stock: i64) -> (Product, OrderRecord) {
    let product = self.product(1000, stock);
    let line = self.add_to_cart(user_id, &product, quantity, Vec::new()).await;
    let receipt = self.checkout(user_id, &[&line], None).await.expect("checkout");
    self.confirm(&receipt).await.expect("confirm");
    let order = self.engine.order(receipt.order_ids[0]).await.expect("order");
    (product, order)
  }
}

pub fn event_payload(event_type: &str, order_ids: &[Uuid], transaction_id: &str) -> Vec<u8> {
  let reference = order_ids.iter().map(Uuid::to_string).collect::<Vec<_>>().join(",");
  serde_json::to_vec(&ProviderEvent {
    event_id: format!("evt_{}", Uuid::new_v4().simple()),
    event_type: event_type.to_string(),
    reference: Some(reference),
    transaction_id: Some(transaction_id.to_string()),
    provider_order_id: None,
  })
  .expect("serialize event")
}

pub fn addon(key: &str, fee: i64) -> AddOn {
  AddOn {
    key: key.to_string(),
    label: key.replace('_', " "),
    fee,
    value: None,
  }
}

pub fn completed_capture(provider_order_id: &str, order_ids: &[Uuid]) -> CaptureResult {
  CaptureResult {
    status: CaptureStatus::Completed,
    transaction_id: format!("cap_{}", provider_order_id),
    provider_order_id: provider_order_id.to_string(),
    reference: order_ids.iter().map(Uuid::to_string).collect::<Vec<_>>().join(","),
  }
}
