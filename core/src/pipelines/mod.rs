// core/src/pipelines/mod.rs

//! The engine's pipelines. Each is registered once, keyed by its context type.

use crate::error::EngineError;
use crate::workflow::Registry;

pub mod cancel;
pub mod cart;
pub mod checkout;
pub mod contexts;
pub mod notify;
pub mod reconcile;
pub mod transition;

pub fn register_all_pipelines(registry: &Registry<EngineError>) {
  tracing::info!("Registering order pipelines...");

  cart::register_add_to_cart_pipeline(registry);
  checkout::register_checkout_pipeline(registry);
  reconcile::register_reconcile_pipeline(registry);
  cancel::register_cancel_pipeline(registry);
  transition::register_transition_pipeline(registry);

  tracing::info!("All order pipelines registered.");
}
