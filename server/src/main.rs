// server/src/main.rs

mod config;
mod errors;
mod services;
mod state;
mod store;
mod web;

use crate::config::AppConfig;
use crate::services::{MockGateway, TracingNotifier};
use crate::state::AppState;
use crate::store::PgOrderStore;

use actix_web::{web as actix_data, App, HttpServer};
use anyhow::Context;
use orderflow::OrderEngine;
use sqlx::PgPool;
use std::sync::Arc;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// `RUST_LOG` picks the filter (default `info`); `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
  dotenvy::dotenv().ok();
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  let builder = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_span_events(FmtSpan::CLOSE);
  let json = std::env::var("LOG_FORMAT").map_or(false, |f| f.eq_ignore_ascii_case("json"));
  if json {
    builder.json().init();
  } else {
    builder.init();
  }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
  init_tracing();
  tracing::info!("Starting order service...");

  let app_config = Arc::new(AppConfig::from_env().context("loading configuration")?);

  let db_pool = PgPool::connect(&app_config.database_url)
    .await
    .context("connecting to the database")?;
  tracing::info!("Successfully connected to the database.");

  let store = PgOrderStore::new(db_pool);
  if app_config.run_migrations {
    store.migrate().await.context("running migrations")?;
    tracing::info!("Database migrations applied.");
  }

  let gateway = MockGateway::new(
    app_config.mock_payment_account_id.clone(),
    app_config.payment_webhook_secret.clone(),
    app_config.app_base_url.clone(),
  );
  let notifier = TracingNotifier {
    email_sender: app_config.mock_email_sender.clone(),
  };
  let engine = Arc::new(OrderEngine::new(
    Arc::new(store),
    Arc::new(gateway),
    Arc::new(notifier),
    app_config.engine_config(),
  ));

  let app_state = AppState {
    engine,
    config: app_config.clone(),
  };

  let server_address = format!("{}:{}", app_config.server_host, app_config.server_port);
  tracing::info!("Attempting to bind server to {}...", server_address);

  HttpServer::new(move || {
    App::new()
      .app_data(actix_data::Data::new(app_state.clone()))
      .wrap(tracing_actix_web::TracingLogger::default())
      .configure(web::configure_app_routes)
  })
  .bind(&server_address)?
  .run()
  .await?;
  Ok(())
}
