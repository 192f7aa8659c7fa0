//! Caller identity resolved by the gateway in front of this service.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::UserId;
use fulfillment::Caller;

use crate::error::ApiError;

/// Header carrying the authenticated user id.
pub const USER_ID_HEADER: &str = "x-user-id";
/// Header carrying the caller's role; `admin` grants admin access.
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// The caller of a request, taken from the identity headers.
#[derive(Debug, Clone, Copy)]
pub struct Identity(pub Caller);

impl Identity {
    pub fn user_id(&self) -> UserId {
        self.0.user_id
    }

    /// Fails with 403 unless the caller is an admin.
    pub fn require_admin(&self) -> Result<Caller, ApiError> {
        if self.0.is_admin {
            Ok(self.0)
        } else {
            Err(ApiError::Forbidden("admin role required".to_string()))
        }
    }
}

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| ApiError::Unauthorized(format!("missing {USER_ID_HEADER} header")))?;
        let user_id: UserId = raw
            .to_str()
            .ok()
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| ApiError::Unauthorized(format!("invalid {USER_ID_HEADER} header")))?;

        let is_admin = parts
            .headers
            .get(USER_ROLE_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|role| role.eq_ignore_ascii_case("admin"));

        Ok(Identity(if is_admin {
            Caller::admin(user_id)
        } else {
            Caller::user(user_id)
        }))
    }
}
