//! Inbound platform events.
//!
//! The bot front end posts each platform update here and receives the
//! resulting intents. The same intents are published on `/intents`.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};

use crate::error::{ApiError, ApiErrorBody};
use crate::lifecycle::events::{ApprovalAction, JoinRequested, SweepTick};
use crate::lifecycle::{Intent, LifecycleEvent};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/events/join-requested", post(join_requested))
        .route("/events/approval", post(approval))
        .route("/events/sweep", post(sweep))
}

// ---------------------------------------------------------------------------
// POST /api/v1/events/join-requested
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/api/v1/events/join-requested",
    tag = "Events",
    request_body = JoinRequested,
    responses(
        (status = 200, description = "Intents emitted for the request", body = [Intent]),
        (status = 400, description = "Malformed event", body = ApiErrorBody),
        (status = 500, description = "The request could not be recorded", body = ApiErrorBody),
    )
)]
pub async fn join_requested(
    State(state): State<AppState>,
    Json(body): Json<JoinRequested>,
) -> Result<Json<Vec<Intent>>, ApiError> {
    let intents = state.dispatch(LifecycleEvent::JoinRequested(body)).await?;
    Ok(Json(intents))
}

// ---------------------------------------------------------------------------
// POST /api/v1/events/approval
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/api/v1/events/approval",
    tag = "Events",
    request_body = ApprovalAction,
    responses(
        (status = 200, description = "Intents emitted for the action", body = [Intent]),
        (status = 400, description = "Malformed event or action token", body = ApiErrorBody),
    )
)]
pub async fn approval(
    State(state): State<AppState>,
    Json(body): Json<ApprovalAction>,
) -> Result<Json<Vec<Intent>>, ApiError> {
    let action = body.resolve_token()?;
    let intents = state.dispatch(LifecycleEvent::ApprovalAction(action)).await?;
    Ok(Json(intents))
}

// ---------------------------------------------------------------------------
// POST /api/v1/events/sweep
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/api/v1/events/sweep",
    tag = "Events",
    request_body = SweepTick,
    responses(
        (status = 200, description = "Expiry notices emitted by the sweep", body = [Intent]),
        (status = 500, description = "Expired requests could not be listed", body = ApiErrorBody),
    )
)]
pub async fn sweep(
    State(state): State<AppState>,
    Json(body): Json<SweepTick>,
) -> Result<Json<Vec<Intent>>, ApiError> {
    let intents = state.dispatch(LifecycleEvent::Sweep(body)).await?;
    Ok(Json(intents))
}
