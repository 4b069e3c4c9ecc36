// server/src/web/routes.rs

use actix_web::web;

use crate::state::AppState;
use crate::web::handlers::{admin_handlers, cart_handlers, checkout_handlers, order_handlers, webhook_handlers};

async fn health_check_handler(app_state: web::Data<AppState>) -> actix_web::HttpResponse {
  actix_web::HttpResponse::Ok().json(serde_json::json!({ "status": "ok", "currency": app_state.config.currency }))
}

pub fn configure_app_routes(cfg: &mut web::ServiceConfig) {
  cfg.service(
    web::scope("/api/v1")
      .route("/health", web::get().to(health_check_handler))
      .service(web::scope("/cart").route("/add", web::post().to(cart_handlers::add_to_cart_handler)))
      .service(
        web::scope("/checkout")
          .route("", web::post().to(checkout_handlers::start_checkout_handler))
          .route(
            "/{checkout_id}/resume",
            web::post().to(checkout_handlers::resume_payment_handler),
          ),
      )
      .route(
        "/vouchers/validate",
        web::post().to(checkout_handlers::validate_voucher_handler),
      )
      // {source} names the provider; all of them converge on the same settlement
      .route(
        "/webhooks/{source}",
        web::post().to(webhook_handlers::payment_webhook_handler),
      )
      .route(
        "/payments/{provider_order_id}/capture",
        web::post().to(webhook_handlers::capture_payment_handler),
      )
      .route("/orders/{id}/cancel", web::post().to(order_handlers::cancel_order_handler))
      .service(
        web::scope("/admin")
          .route(
            "/orders/{id}/status",
            web::post().to(admin_handlers::update_order_status_handler),
          )
          .route("/carts/purge", web::post().to(admin_handlers::purge_stale_carts_handler)),
      ),
  );
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::AppConfig;
  use crate::services::{MockGateway, TracingNotifier};
  use actix_web::{http::StatusCode, test, App};
  use chrono::Utc;
  use orderflow::model::Product;
  use orderflow::{MemoryStore, OrderEngine};
  use serde_json::{json, Value};
  use std::sync::Arc;
  use uuid::Uuid;

  fn state_with(store: Arc<MemoryStore>) -> AppState {
    let config = AppConfig::for_tests();
    let gateway = MockGateway::new("acct", config.payment_webhook_secret.clone(), config.app_base_url.clone());
    let notifier = TracingNotifier {
      email_sender: config.mock_email_sender.clone(),
    };
    let engine = OrderEngine::new(store, Arc::new(gateway), Arc::new(notifier), config.engine_config());
    AppState {
      engine: Arc::new(engine),
      config: Arc::new(config),
    }
  }

  fn product(store: &MemoryStore, price: i64, stock: i64) -> Product {
    let product = Product {
      id: Uuid::new_v4(),
      name: "Oak shelf".to_string(),
      price,
      stock,
      updated_at: Utc::now(),
    };
    store.insert_product(product.clone());
    product
  }

  #[actix_web::test]
  async fn checkout_webhook_and_cancel_over_http() {
    let store = Arc::new(MemoryStore::new());
    let shelf = product(&store, 4000, 5);
    let app = test::init_service(
      App::new()
        .app_data(web::Data::new(state_with(store.clone())))
        .configure(configure_app_routes),
    )
    .await;
    let user = Uuid::new_v4().to_string();

    let req = test::TestRequest::post()
      .uri("/api/v1/cart/add")
      .insert_header(("X-User-ID", user.as_str()))
      .set_json(json!({"product_id": shelf.id, "quantity": 2}))
      .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let line_id = body["cartItem"]["id"].as_str().unwrap().to_string();

    let req = test::TestRequest::post()
      .uri("/api/v1/checkout")
      .insert_header(("X-User-ID", user.as_str()))
      .set_json(json!({"cart_line_ids": [line_id]}))
      .to_request();
    let receipt: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(receipt["total"], 8000);
    let order_id = receipt["order_ids"][0].as_str().unwrap().to_string();

    let event = json!({
      "event_id": "evt_1",
      "event_type": "checkout.session.completed",
      "reference": order_id,
      "transaction_id": "tx_1"
    });
    let req = test::TestRequest::post()
      .uri("/api/v1/webhooks/mock")
      .insert_header(("X-Signature", "forged"))
      .set_json(&event)
      .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

    let req = test::TestRequest::post()
      .uri("/api/v1/webhooks/mock")
      .insert_header(("X-Signature", "whsec_test"))
      .set_json(&event)
      .to_request();
    let settled: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(settled["status"], "settled");
    assert_eq!(store.stock(shelf.id), Some(3));

    let req = test::TestRequest::post()
      .uri(&format!("/api/v1/orders/{}/cancel", order_id))
      .insert_header(("X-User-ID", user.as_str()))
      .set_json(json!({"reason": "duplicate order"}))
      .to_request();
    let cancelled: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(cancelled["outcome"], "cancelled");
    assert_eq!(cancelled["compensated_inventory"], true);
    assert_eq!(store.stock(shelf.id), Some(5));

    let req = test::TestRequest::post()
      .uri(&format!("/api/v1/orders/{}/cancel", order_id))
      .insert_header(("X-User-ID", user.as_str()))
      .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);
  }

  #[actix_web::test]
  async fn confirmation_for_a_cancelled_order_is_acknowledged() {
    let store = Arc::new(MemoryStore::new());
    let shelf = product(&store, 4000, 5);
    let app = test::init_service(
      App::new()
        .app_data(web::Data::new(state_with(store.clone())))
        .configure(configure_app_routes),
    )
    .await;
    let user = Uuid::new_v4().to_string();

    let req = test::TestRequest::post()
      .uri("/api/v1/cart/add")
      .insert_header(("X-User-ID", user.as_str()))
      .set_json(json!({"product_id": shelf.id, "quantity": 1}))
      .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let line_id = body["cartItem"]["id"].as_str().unwrap().to_string();

    let req = test::TestRequest::post()
      .uri("/api/v1/checkout")
      .insert_header(("X-User-ID", user.as_str()))
      .set_json(json!({"cart_line_ids": [line_id]}))
      .to_request();
    let receipt: Value = test::call_and_read_body_json(&app, req).await;
    let order_id = receipt["order_ids"][0].as_str().unwrap().to_string();

    let req = test::TestRequest::post()
      .uri(&format!("/api/v1/orders/{}/cancel", order_id))
      .insert_header(("X-User-ID", user.as_str()))
      .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    let event = json!({
      "event_id": "evt_late",
      "event_type": "checkout.session.completed",
      "reference": order_id,
      "transaction_id": "tx_late"
    });
    for _ in 0..3 {
      let req = test::TestRequest::post()
        .uri("/api/v1/webhooks/mock")
        .insert_header(("X-Signature", "whsec_test"))
        .set_json(&event)
        .to_request();
      let resp = test::call_service(&app, req).await;
      assert_eq!(resp.status(), StatusCode::OK);
      let body: Value = test::read_body_json(resp).await;
      assert_eq!(body["report"]["rejected"].as_array().unwrap().len(), 1);
      assert!(body["report"]["failed"].as_array().unwrap().is_empty());
    }
    assert_eq!(store.stock(shelf.id), Some(5));
  }

  #[actix_web::test]
  async fn admin_routes_check_the_caller() {
    let store = Arc::new(MemoryStore::new());
    let app = test::init_service(
      App::new()
        .app_data(web::Data::new(state_with(store)))
        .configure(configure_app_routes),
    )
    .await;
    let uri = format!("/api/v1/admin/orders/{}/status", Uuid::new_v4());

    let req = test::TestRequest::post().uri(&uri).set_json(json!({"status": "approved"})).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::post()
      .uri(&uri)
      .insert_header(("X-User-ID", Uuid::new_v4().to_string()))
      .set_json(json!({"status": "approved"}))
      .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

    let req = test::TestRequest::post()
      .uri(&uri)
      .insert_header(("X-Admin-Name", "ops"))
      .set_json(json!({"status": "approved"}))
      .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

    let req = test::TestRequest::post()
      .uri("/api/v1/admin/carts/purge")
      .insert_header(("X-Admin-Name", "ops"))
      .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["purged"], 0);
  }

  #[actix_web::test]
  async fn voucher_preview_and_health() {
    let app = test::init_service(
      App::new()
        .app_data(web::Data::new(state_with(Arc::new(MemoryStore::new()))))
        .configure(configure_app_routes),
    )
    .await;

    let req = test::TestRequest::get().uri("/api/v1/health").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "ok");

    let req = test::TestRequest::post()
      .uri("/api/v1/vouchers/validate")
      .set_json(json!({"code": "nope", "subtotal": 1000}))
      .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["valid"], false);
  }
}
