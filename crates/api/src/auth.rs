//! Caller identity extraction.
//!
//! Authentication happens upstream at the gateway; by the time a
//! request reaches this service the verified user id arrives in the
//! `X-User-Id` header. Requests without it are rejected with 401.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::UserId;

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated shopper, extracted from `X-User-Id`.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser(pub UserId);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Unauthorized)?;
        let uuid = uuid::Uuid::parse_str(value).map_err(|_| ApiError::Unauthorized)?;
        Ok(Self(UserId::from_uuid(uuid)))
    }
}
