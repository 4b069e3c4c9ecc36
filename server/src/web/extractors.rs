// server/src/web/extractors.rs

//! Request identity. Authentication proper happens upstream of this service; these extractors
//! trust the identity headers it forwards.

use crate::errors::AppError;
use actix_web::{dev::Payload, FromRequest, HttpRequest};
use futures_util::future::{ready, Ready};
use orderflow::{Actor, Role};
use tracing::warn;
use uuid::Uuid;

pub const USER_HEADER: &str = "X-User-ID";
pub const ADMIN_HEADER: &str = "X-Admin-Name";
pub const SIGNATURE_HEADER: &str = "X-Signature";

fn header<'a>(req: &'a HttpRequest, name: &str) -> Option<&'a str> {
  req
    .headers()
    .get(name)
    .and_then(|v| v.to_str().ok())
    .map(str::trim)
    .filter(|v| !v.is_empty())
}

fn user_id(req: &HttpRequest) -> Result<Uuid, AppError> {
  header(req, USER_HEADER)
    .and_then(|v| Uuid::parse_str(v).ok())
    .ok_or_else(|| {
      warn!("Missing or invalid {} header.", USER_HEADER);
      AppError::Auth(format!("User authentication required. Missing or invalid {} header.", USER_HEADER))
    })
}

#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser {
  pub user_id: Uuid,
}

impl FromRequest for AuthenticatedUser {
  type Error = AppError;
  type Future = Ready<Result<Self, Self::Error>>;

  fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
    ready(user_id(req).map(|user_id| AuthenticatedUser { user_id }))
  }
}

/// The caller of an admin route. Without `X-Admin-Name` a signed-in customer is still
/// identified, so the engine can refuse them with `Forbidden`.
#[derive(Debug, Clone)]
pub struct RequestActor(pub Actor);

impl FromRequest for RequestActor {
  type Error = AppError;
  type Future = Ready<Result<Self, Self::Error>>;

  fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
    if let Some(name) = header(req, ADMIN_HEADER) {
      return ready(Ok(RequestActor(Actor::admin(name))));
    }
    ready(user_id(req).map(|user_id| {
      RequestActor(Actor {
        name: user_id.to_string(),
        role: Role::Customer,
      })
    }))
  }
}

/// Raw value of the provider signature header, if any.
#[derive(Debug, Clone)]
pub struct WebhookSignature(pub Option<String>);

impl FromRequest for WebhookSignature {
  type Error = AppError;
  type Future = Ready<Result<Self, Self::Error>>;

  fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
    ready(Ok(WebhookSignature(header(req, SIGNATURE_HEADER).map(str::to_string))))
  }
}
