//! Caller identification for administrative routes.
//!
//! The caller's platform user id arrives in the `X-Admin-Id` header, set by
//! the bot front end after it has authenticated the user on the platform.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::ApiError;
use crate::AppState;

pub const ADMIN_ID_HEADER: &str = "x-admin-id";

/// Any identified caller, admin or not.
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: String,
}

/// A caller registered as an admin.
#[derive(Debug, Clone)]
pub struct AdminUser {
    pub user_id: String,
}

fn caller_id(parts: &Parts) -> Result<String, ApiError> {
    parts
        .headers
        .get(ADMIN_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::unauthorized("Missing X-Admin-Id header"))
}

impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(Caller {
            user_id: caller_id(parts)?,
        })
    }
}

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user_id = caller_id(parts)?;

        if !state.registry.is_admin(&user_id).await? {
            tracing::debug!(%user_id, "non-admin rejected");
            return Err(ApiError::forbidden("You are not authorized to use this command"));
        }

        Ok(AdminUser { user_id })
    }
}
