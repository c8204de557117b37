//! Admin enrollment.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::admin::{AdminUser, Caller};
use crate::error::{ApiError, ApiErrorBody};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admins/bootstrap", post(bootstrap))
        .route("/admins", post(add_admin))
}

// ---------------------------------------------------------------------------
// POST /api/v1/admins/bootstrap
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct BootstrapResponse {
    /// `true` when the caller became the first admin.
    pub bootstrapped: bool,
}

/// Claim the first admin seat. A no-op once any admin exists.
#[utoipa::path(
    post,
    path = "/api/v1/admins/bootstrap",
    tag = "Admins",
    params(("X-Admin-Id" = String, Header, description = "Caller's platform user id")),
    responses(
        (status = 200, description = "Bootstrap outcome", body = BootstrapResponse),
        (status = 401, description = "Missing caller id", body = ApiErrorBody),
    )
)]
pub async fn bootstrap(
    Caller { user_id }: Caller,
    State(state): State<AppState>,
) -> Result<Json<BootstrapResponse>, ApiError> {
    let bootstrapped = state.registry.bootstrap_if_empty(&user_id, Utc::now()).await?;
    if bootstrapped {
        tracing::info!(%user_id, "first admin bootstrapped");
    }
    Ok(Json(BootstrapResponse { bootstrapped }))
}

// ---------------------------------------------------------------------------
// POST /api/v1/admins
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddAdminRequest {
    pub user_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AddAdminResponse {
    pub user_id: String,
    /// `false` when the user was already an admin.
    pub added: bool,
}

#[utoipa::path(
    post,
    path = "/api/v1/admins",
    tag = "Admins",
    params(("X-Admin-Id" = String, Header, description = "Calling admin's user id")),
    request_body = AddAdminRequest,
    responses(
        (status = 201, description = "Admin added", body = AddAdminResponse),
        (status = 200, description = "Already an admin", body = AddAdminResponse),
        (status = 400, description = "Bad request", body = ApiErrorBody),
        (status = 403, description = "Caller is not an admin", body = ApiErrorBody),
    )
)]
pub async fn add_admin(
    AdminUser { user_id: caller }: AdminUser,
    State(state): State<AppState>,
    Json(body): Json<AddAdminRequest>,
) -> Result<(StatusCode, Json<AddAdminResponse>), ApiError> {
    let added = state.registry.add_admin(&body.user_id, Utc::now()).await?;
    let status = if added {
        tracing::info!(%caller, user_id = %body.user_id, "admin added");
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    Ok((
        status,
        Json(AddAdminResponse {
            user_id: body.user_id.trim().to_string(),
            added,
        }),
    ))
}
