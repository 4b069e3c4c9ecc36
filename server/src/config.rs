// server/src/config.rs

use crate::errors::{AppError, Result};
use dotenvy::dotenv;
use orderflow::EngineConfig;
use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
  pub server_host: String,
  pub server_port: u16,
  pub database_url: String,
  pub app_base_url: String,
  pub currency: String,

  /// Shared secret the mock provider puts in `X-Signature`.
  pub payment_webhook_secret: String,
  pub mock_payment_account_id: String,

  pub mock_email_sender: String,

  pub stale_cart_max_age_hours: i64,
  /// Apply the bundled migrations on startup.
  pub run_migrations: bool,
}

impl AppConfig {
  pub fn from_env() -> Result<Self> {
    dotenv().ok();

    let get_env = |var_name: &str| {
      env::var(var_name).map_err(|e| AppError::Config(format!("Missing environment variable '{}': {}", var_name, e)))
    };

    let server_host = get_env("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let server_port = get_env("SERVER_PORT")
      .unwrap_or_else(|_| "8080".to_string())
      .parse::<u16>()
      .map_err(|e| AppError::Config(format!("Invalid SERVER_PORT: {}", e)))?;
    let database_url = get_env("DATABASE_URL")?;
    let app_base_url = get_env("APP_BASE_URL").unwrap_or_else(|_| format!("http://{}:{}", server_host, server_port));
    let currency = get_env("CURRENCY").unwrap_or_else(|_| "USD".to_string()).to_uppercase();

    let payment_webhook_secret = get_env("PAYMENT_WEBHOOK_SECRET")?;
    let mock_payment_account_id = get_env("MOCK_PAYMENT_ACCOUNT_ID").unwrap_or_else(|_| "mock_main_acct".to_string());

    let stale_cart_max_age_hours = get_env("STALE_CART_MAX_AGE_HOURS")
      .unwrap_or_else(|_| "720".to_string())
      .parse::<i64>()
      .map_err(|e| AppError::Config(format!("Invalid STALE_CART_MAX_AGE_HOURS: {}", e)))?;
    if stale_cart_max_age_hours <= 0 {
      return Err(AppError::Config("STALE_CART_MAX_AGE_HOURS must be positive".to_string()));
    }
    let mock_email_sender = get_env("MOCK_EMAIL_SENDER").unwrap_or_else(|_| "noreply@example.com".to_string());
    let run_migrations = get_env("RUN_MIGRATIONS")
      .unwrap_or_else(|_| "true".to_string())
      .parse::<bool>()
      .map_err(|e| AppError::Config(format!("Invalid RUN_MIGRATIONS value: {}", e)))?;

    tracing::info!("Application configuration loaded successfully.");

    Ok(Self {
      server_host,
      server_port,
      database_url,
      app_base_url,
      currency,
      payment_webhook_secret,
      mock_payment_account_id,
      mock_email_sender,
      stale_cart_max_age_hours,
      run_migrations,
    })
  }

  #[cfg(test)]
  pub fn for_tests() -> Self {
    AppConfig {
      server_host: "127.0.0.1".into(),
      server_port: 8080,
      database_url: "postgres://localhost/orders".into(),
      app_base_url: "https://shop.example/".into(),
      currency: "EUR".into(),
      payment_webhook_secret: "whsec_test".into(),
      mock_payment_account_id: "acct".into(),
      mock_email_sender: "noreply@example.com".into(),
      stale_cart_max_age_hours: 48,
      run_migrations: false,
    }
  }

  /// Engine settings derived from this configuration.
  pub fn engine_config(&self) -> EngineConfig {
    let base = self.app_base_url.trim_end_matches('/');
    EngineConfig {
      currency: self.currency.clone(),
      success_url: format!("{}/checkout/success", base),
      cancel_url: format!("{}/checkout/cancel", base),
      stale_cart_max_age: chrono::Duration::hours(self.stale_cart_max_age_hours),
      ..EngineConfig::default()
    }
  }
}
