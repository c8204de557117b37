pub mod admins;
pub mod channels;
pub mod events;
pub mod health;
pub mod intents;

use axum::Router;
use utoipa::OpenApi;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(intents::router())
        .nest(
            "/api/v1",
            events::router()
                .merge(admins::router())
                .merge(channels::router()),
        )
}

#[derive(OpenApi)]
#[openapi(
    paths(
        // Health
        health::health,
        // Events
        events::join_requested,
        events::approval,
        events::sweep,
        // Admins
        admins::bootstrap,
        admins::add_admin,
        // Channels
        channels::register_channel,
        channels::list_channels,
        channels::approval_count,
        channels::set_welcome,
        channels::set_approval,
        channels::set_timeout,
        channels::decline_request,
    ),
    components(
        schemas(
            // Error types
            crate::error::ApiErrorBody,
            crate::error::ApiErrorDetail,
            // Models
            crate::models::channel::Channel,
            crate::models::channel::ChannelSummary,
            crate::models::join_request::JoinRequest,
            // Events and intents
            crate::lifecycle::events::JoinRequested,
            crate::lifecycle::events::ApprovalAction,
            crate::lifecycle::events::SweepTick,
            crate::lifecycle::Intent,
            // Route request/response types
            health::HealthResponse,
            admins::BootstrapResponse,
            admins::AddAdminRequest,
            admins::AddAdminResponse,
            channels::RegisterChannelRequest,
            channels::ApprovalCountResponse,
            channels::SetTemplateRequest,
            channels::SetTimeoutRequest,
            channels::DeclineResponse,
        )
    ),
    tags(
        (name = "Health", description = "Health check"),
        (name = "Events", description = "Platform events driving the approval lifecycle"),
        (name = "Admins", description = "Admin enrollment"),
        (name = "Channels", description = "Channel setup and statistics"),
    )
)]
pub struct ApiDoc;
