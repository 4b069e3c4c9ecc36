// server/src/web/handlers/cart_handlers.rs

use actix_web::{web, HttpResponse};
use orderflow::model::AddOn;
use orderflow::AddToCart;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::errors::AppError;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedUser;

#[derive(Deserialize, Debug)]
pub struct AddToCartRequestPayload {
  pub product_id: Uuid,
  pub quantity: i64,
  #[serde(default)]
  pub addons: Vec<AddOn>,
}

#[instrument(
    name = "handler::add_to_cart",
    skip(app_state, req_payload, auth_user),
    fields(user_id = %auth_user.user_id, product_id = %req_payload.product_id, quantity = %req_payload.quantity)
)]
pub async fn add_to_cart_handler(
  app_state: web::Data<AppState>,
  req_payload: web::Json<AddToCartRequestPayload>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let payload = req_payload.into_inner();
  let line = app_state
    .engine
    .add_to_cart(AddToCart {
      user_id: auth_user.user_id,
      product_id: payload.product_id,
      quantity: payload.quantity,
      addons: payload.addons,
    })
    .await?;

  info!(line_id = %line.id, quantity = line.quantity, "Add to cart successful.");
  Ok(HttpResponse::Ok().json(json!({
      "message": "Item added to cart successfully.",
      "cartItem": line
  })))
}
