// server/src/state.rs
use crate::config::AppConfig;
use orderflow::OrderEngine;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
  pub engine: Arc<OrderEngine>,
  pub config: Arc<AppConfig>,
}
