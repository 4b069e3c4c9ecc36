// core/src/model/mod.rs

pub mod order;
pub mod preferences;
pub mod product;
pub mod status;
pub mod voucher;

pub use order::{
  AddOn, AppliedVoucher, Cancellation, CancellationState, HistoryEntry, ItemType, OrderMeta, OrderRecord,
  PaymentStatus, Reservation, StageMeta,
};
pub use preferences::{NotificationPreferences, ORDER_STATUS_EMAIL, ORDER_STATUS_IN_APP};
pub use product::Product;
pub use status::{canonical_status, progress_label, resolve_target, FulfillmentStage, OrderStatus};
pub use voucher::{DiscountCode, DiscountKind, Redemption, VoucherRedemption};
