// core/src/lib.rs

//! Order lifecycle and payment reconciliation.
//!
//! Cart lines become priced order records at checkout, payment confirmations (webhooks or
//! direct captures) reserve inventory exactly once, customers cancel with compensation, and
//! admins move orders through fulfillment. Each operation is a step pipeline from [`workflow`]
//! driven by [`OrderEngine`].

pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod inventory;
pub mod model;
pub mod notifier;
pub mod pipelines;
pub mod pricing;
pub mod store;
pub mod voucher;
pub mod workflow;

pub use config::EngineConfig;
pub use engine::{OrderEngine, Services};
pub use error::{EngineError, Result};
pub use gateway::{CaptureResult, CaptureStatus, PaymentGateway, PaymentSession, ProviderEvent, SessionRequest};
pub use notifier::{EmailMessage, Notification, NotificationCategory, Notifier, Recipient};
pub use pipelines::contexts::{
  Actor, AddToCart, CancelOutcome, CancelRequest, CheckoutReceipt, CheckoutRequest, Role, SettlementReport,
  StatusUpdate, TransitionOutcome, WebhookOutcome,
};
pub use store::{Commit, MemoryStore, Mutation, OrderStore};
