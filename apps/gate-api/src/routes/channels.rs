//! Channel setup and statistics for admins.

use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::admin::AdminUser;
use crate::error::{ApiError, ApiErrorBody};
use crate::lifecycle::events::DeclineAction;
use crate::lifecycle::{Intent, LifecycleEvent};
use crate::models::channel::{Channel, ChannelSummary};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/channels", post(register_channel).get(list_channels))
        .route("/channels/{id}/approvals", get(approval_count))
        .route("/channels/{id}/welcome", put(set_welcome))
        .route("/channels/{id}/approval", put(set_approval))
        .route("/channels/{id}/timeout", put(set_timeout))
        .route(
            "/channels/{id}/requests/{user_id}/decline",
            post(decline_request),
        )
}

// ---------------------------------------------------------------------------
// POST /api/v1/channels
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterChannelRequest {
    pub channel_id: String,
    pub title: String,
}

/// Register a channel, or refresh its title. Existing templates and timeout
/// are kept.
#[utoipa::path(
    post,
    path = "/api/v1/channels",
    tag = "Channels",
    params(("X-Admin-Id" = String, Header, description = "Calling admin's user id")),
    request_body = RegisterChannelRequest,
    responses(
        (status = 200, description = "Channel registered", body = Channel),
        (status = 400, description = "Bad request", body = ApiErrorBody),
        (status = 403, description = "Caller is not an admin", body = ApiErrorBody),
    )
)]
pub async fn register_channel(
    AdminUser { user_id }: AdminUser,
    State(state): State<AppState>,
    Json(body): Json<RegisterChannelRequest>,
) -> Result<Json<Channel>, ApiError> {
    let channel = state
        .registry
        .register_channel(&body.channel_id, &body.title, &user_id, Utc::now())
        .await?;

    tracing::info!(channel_id = %channel.channel_id, admin_id = %user_id, "channel registered");
    Ok(Json(channel))
}

// ---------------------------------------------------------------------------
// GET /api/v1/channels
// ---------------------------------------------------------------------------

/// Channels managed by the caller, each with its approval count.
#[utoipa::path(
    get,
    path = "/api/v1/channels",
    tag = "Channels",
    params(("X-Admin-Id" = String, Header, description = "Calling admin's user id")),
    responses(
        (status = 200, description = "Managed channels", body = [ChannelSummary]),
        (status = 403, description = "Caller is not an admin", body = ApiErrorBody),
    )
)]
pub async fn list_channels(
    AdminUser { user_id }: AdminUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<ChannelSummary>>, ApiError> {
    let channels = state.registry.list_channels_for_admin(&user_id).await?;

    let mut summaries = Vec::with_capacity(channels.len());
    for channel in channels {
        let approval_count = state.requests.count_approved(&channel.channel_id).await?;
        summaries.push(ChannelSummary {
            channel,
            approval_count,
        });
    }

    Ok(Json(summaries))
}

// ---------------------------------------------------------------------------
// GET /api/v1/channels/:id/approvals
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct ApprovalCountResponse {
    pub channel_id: String,
    pub approval_count: i64,
}

#[utoipa::path(
    get,
    path = "/api/v1/channels/{id}/approvals",
    tag = "Channels",
    params(
        ("id" = String, Path, description = "Channel ID"),
        ("X-Admin-Id" = String, Header, description = "Calling admin's user id"),
    ),
    responses(
        (status = 200, description = "Approved requests so far", body = ApprovalCountResponse),
        (status = 403, description = "Caller is not an admin", body = ApiErrorBody),
        (status = 404, description = "Channel not set up", body = ApiErrorBody),
    )
)]
pub async fn approval_count(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
) -> Result<Json<ApprovalCountResponse>, ApiError> {
    require_channel(&state, &channel_id).await?;
    let approval_count = state.requests.count_approved(&channel_id).await?;

    Ok(Json(ApprovalCountResponse {
        channel_id,
        approval_count,
    }))
}

// ---------------------------------------------------------------------------
// PUT /api/v1/channels/:id/welcome
// PUT /api/v1/channels/:id/approval
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetTemplateRequest {
    /// Template text with `{name}`, `{username}`, `{channel}` or `{timeout}`.
    pub template: String,
}

#[utoipa::path(
    put,
    path = "/api/v1/channels/{id}/welcome",
    tag = "Channels",
    params(
        ("id" = String, Path, description = "Channel ID"),
        ("X-Admin-Id" = String, Header, description = "Calling admin's user id"),
    ),
    request_body = SetTemplateRequest,
    responses(
        (status = 200, description = "Welcome template updated", body = Channel),
        (status = 400, description = "Bad request", body = ApiErrorBody),
        (status = 403, description = "Caller is not an admin", body = ApiErrorBody),
        (status = 404, description = "Channel not set up", body = ApiErrorBody),
    )
)]
pub async fn set_welcome(
    AdminUser { user_id }: AdminUser,
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
    Json(body): Json<SetTemplateRequest>,
) -> Result<Json<Channel>, ApiError> {
    let channel = state
        .registry
        .set_welcome_template(&channel_id, &body.template)
        .await?;
    tracing::info!(%channel_id, admin_id = %user_id, "welcome template updated");
    Ok(Json(channel))
}

#[utoipa::path(
    put,
    path = "/api/v1/channels/{id}/approval",
    tag = "Channels",
    params(
        ("id" = String, Path, description = "Channel ID"),
        ("X-Admin-Id" = String, Header, description = "Calling admin's user id"),
    ),
    request_body = SetTemplateRequest,
    responses(
        (status = 200, description = "Approval template updated", body = Channel),
        (status = 400, description = "Bad request", body = ApiErrorBody),
        (status = 403, description = "Caller is not an admin", body = ApiErrorBody),
        (status = 404, description = "Channel not set up", body = ApiErrorBody),
    )
)]
pub async fn set_approval(
    AdminUser { user_id }: AdminUser,
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
    Json(body): Json<SetTemplateRequest>,
) -> Result<Json<Channel>, ApiError> {
    let channel = state
        .registry
        .set_approval_template(&channel_id, &body.template)
        .await?;
    tracing::info!(%channel_id, admin_id = %user_id, "approval template updated");
    Ok(Json(channel))
}

// ---------------------------------------------------------------------------
// PUT /api/v1/channels/:id/timeout
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetTimeoutRequest {
    pub hours: i32,
}

/// Change the approval window. Requests already pending keep their expiry.
#[utoipa::path(
    put,
    path = "/api/v1/channels/{id}/timeout",
    tag = "Channels",
    params(
        ("id" = String, Path, description = "Channel ID"),
        ("X-Admin-Id" = String, Header, description = "Calling admin's user id"),
    ),
    request_body = SetTimeoutRequest,
    responses(
        (status = 200, description = "Timeout updated", body = Channel),
        (status = 400, description = "Timeout is not positive", body = ApiErrorBody),
        (status = 403, description = "Caller is not an admin", body = ApiErrorBody),
        (status = 404, description = "Channel not set up", body = ApiErrorBody),
    )
)]
pub async fn set_timeout(
    AdminUser { user_id }: AdminUser,
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
    Json(body): Json<SetTimeoutRequest>,
) -> Result<Json<Channel>, ApiError> {
    let channel = state
        .registry
        .set_approval_timeout(&channel_id, body.hours)
        .await?;
    tracing::info!(%channel_id, admin_id = %user_id, hours = body.hours, "approval timeout updated");
    Ok(Json(channel))
}

// ---------------------------------------------------------------------------
// POST /api/v1/channels/:id/requests/:user_id/decline
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct DeclineResponse {
    /// `false` when the user had no pending request.
    pub declined: bool,
    pub intents: Vec<Intent>,
}

#[utoipa::path(
    post,
    path = "/api/v1/channels/{id}/requests/{user_id}/decline",
    tag = "Channels",
    params(
        ("id" = String, Path, description = "Channel ID"),
        ("user_id" = String, Path, description = "Requesting user's ID"),
        ("X-Admin-Id" = String, Header, description = "Calling admin's user id"),
    ),
    responses(
        (status = 200, description = "Decline outcome", body = DeclineResponse),
        (status = 403, description = "Caller is not an admin", body = ApiErrorBody),
        (status = 404, description = "Channel not set up", body = ApiErrorBody),
    )
)]
pub async fn decline_request(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path((channel_id, user_id)): Path<(String, String)>,
) -> Result<Json<DeclineResponse>, ApiError> {
    let intents = state
        .dispatch(LifecycleEvent::Decline(DeclineAction {
            channel_id,
            user_id,
            now: Utc::now(),
        }))
        .await?;

    Ok(Json(DeclineResponse {
        declined: !intents.is_empty(),
        intents,
    }))
}

async fn require_channel(state: &AppState, channel_id: &str) -> Result<Channel, ApiError> {
    state
        .registry
        .get_channel(channel_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Channel {channel_id} is not set up")))
}
