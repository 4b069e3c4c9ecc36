// core/src/pipelines/cart.rs

use crate::error::EngineError;
use crate::pipelines::contexts::AddToCartCtx;
use crate::workflow::{Flow, Pipeline, Registry, Shared};
use tracing::{info, warn};

pub fn register_add_to_cart_pipeline(registry: &Registry<EngineError>) {
  let mut p = Pipeline::<AddToCartCtx, EngineError>::new(
    "add_to_cart",
    &[
      ("validate_cart_input", false),
      ("fetch_product_for_cart", false),
      ("check_product_stock_for_cart", false),
      ("merge_into_cart", false),
    ],
  );

  // Step 1: Validate input
  p.on("validate_cart_input", |ctx: Shared<AddToCartCtx>| async move {
    let (quantity, addons_ok) = ctx.snapshot(|c| {
      (
        c.request.quantity,
        c.request.addons.iter().all(|a| a.fee >= 0 && !a.key.trim().is_empty()),
      )
    });
    if quantity <= 0 {
      warn!(quantity, "Add to cart: quantity must be positive.");
      return Err(EngineError::Validation("Quantity must be a positive number.".to_string()));
    }
    if !addons_ok {
      return Err(EngineError::Validation(
        "Add-ons need a key and a non-negative fee.".to_string(),
      ));
    }
    Ok(Flow::Continue)
  });

  // Step 2: Fetch product
  p.on("fetch_product_for_cart", |ctx: Shared<AddToCartCtx>| async move {
    let (store, product_id) = ctx.snapshot(|c| (c.services.store.clone(), c.request.product_id));
    let product = store.product(product_id).await?;
    ctx.write().product = Some(product);
    Ok::<_, EngineError>(Flow::Continue)
  });

  // Step 3: Check stock
  p.on("check_product_stock_for_cart", |ctx: Shared<AddToCartCtx>| async move {
    let (available, requested, product_id) = ctx.snapshot(|c| {
      (
        c.product.as_ref().map_or(0, |p| p.stock),
        c.request.quantity,
        c.request.product_id,
      )
    });
    if available < requested {
      warn!(%product_id, available, requested, "Add to cart: insufficient stock.");
      return Err(EngineError::Validation(format!(
        "Insufficient stock. Only {} available.",
        available
      )));
    }
    Ok(Flow::Continue)
  });

  // Step 4: Merge into the user's cart line for this product, or insert one
  p.on("merge_into_cart", |ctx: Shared<AddToCartCtx>| async move {
    let (store, request, price) = ctx.snapshot(|c| {
      (
        c.services.store.clone(),
        c.request.clone(),
        c.product.as_ref().map(|p| p.price),
      )
    });
    let price = price.ok_or_else(|| EngineError::not_found("product", request.product_id))?;
    let line = store
      .upsert_cart_line(request.user_id, request.product_id, request.quantity, price, request.addons)
      .await?;
    info!(
      user_id = %request.user_id,
      line_id = %line.id,
      quantity = line.quantity,
      "Cart line added or merged."
    );
    ctx.write().line = Some(line);
    Ok::<_, EngineError>(Flow::Continue)
  });

  registry.register(p);
  info!("Add to cart pipeline registered.");
}
