//! Turns lifecycle events into store transitions and outbound intents.
//!
//! The controller holds no state of its own; every decision is made against
//! the request store, so concurrent handlers for the same key are arbitrated
//! by the store's conditional transitions.

use std::sync::Arc;

use crate::db::channels::ChannelRegistry;
use crate::db::requests::RequestStore;
use crate::error::GateError;
use crate::lifecycle::events::{
    ActionToken, ApprovalAction, DeclineAction, Intent, JoinRequested, LifecycleEvent, SweepTick,
};
use crate::models::join_request::{JoinRequest, RequestState};
use crate::templates::{
    render, render_approval_prompt, render_declined_message, render_expired_message,
    DefaultTemplates, RenderContext,
};

pub const APPROVED_TEXT: &str =
    "✅ You have been approved to join the channel!\n\nWelcome to the community!";

const APPROVAL_ERROR_TEXT: &str = "❌ Something went wrong while approving your request. Please try again later.";

/// Why an approval action could not be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalFailure {
    ChannelNotSetUp,
    NoRequest,
    AlreadyApproved,
    Expired,
    Declined,
    /// The request changed state between the attempt and the lookup.
    Conflict,
}

impl ApprovalFailure {
    pub fn message(self) -> &'static str {
        match self {
            Self::ChannelNotSetUp => "❌ This channel is not set up for join approvals.",
            Self::NoRequest => "❌ No pending join request was found.",
            Self::AlreadyApproved => "✅ Your request has already been approved.",
            Self::Expired => {
                "⏰ Your join request has expired. You can request to join the channel again."
            }
            Self::Declined => "❌ Your join request was declined.",
            Self::Conflict => APPROVAL_ERROR_TEXT,
        }
    }

    fn classify(latest: Option<&JoinRequest>, now: chrono::DateTime<chrono::Utc>) -> Self {
        let Some(request) = latest else {
            return Self::NoRequest;
        };
        match request.state(now) {
            RequestState::Approved => Self::AlreadyApproved,
            RequestState::Expired => Self::Expired,
            // A rejection stamped at or after the expiry came from the sweep.
            RequestState::Rejected => match (request.rejected_at, request.expires_at) {
                (Some(rejected), Some(expires)) if rejected >= expires => Self::Expired,
                _ => Self::Declined,
            },
            RequestState::Pending => Self::Conflict,
        }
    }
}

pub struct LifecycleController {
    requests: Arc<dyn RequestStore>,
    registry: Arc<dyn ChannelRegistry>,
    defaults: Arc<DefaultTemplates>,
}

impl LifecycleController {
    pub fn new(
        requests: Arc<dyn RequestStore>,
        registry: Arc<dyn ChannelRegistry>,
        defaults: Arc<DefaultTemplates>,
    ) -> Self {
        Self {
            requests,
            registry,
            defaults,
        }
    }

    pub fn defaults(&self) -> &DefaultTemplates {
        &self.defaults
    }

    /// Handle one event.
    ///
    /// A failed approval is answered with a generic refusal so the requester
    /// is not left waiting. Every other failure is returned to the caller as
    /// the failure of that event.
    pub async fn handle(&self, event: LifecycleEvent) -> Result<Vec<Intent>, GateError> {
        let name = event.name();
        let result = match event {
            LifecycleEvent::JoinRequested(ev) => self.join_requested(ev).await,
            LifecycleEvent::ApprovalAction(ev) => {
                let token = ActionToken::approve(&ev.channel_id, &ev.user_id).to_string();
                return Ok(self.approval_action(ev).await.unwrap_or_else(|err| {
                    tracing::error!(event = name, error = %err, "approval failed");
                    vec![Intent::RespondToAction {
                        token,
                        success: false,
                        text: APPROVAL_ERROR_TEXT.to_string(),
                    }]
                }));
            }
            LifecycleEvent::Sweep(tick) => self.sweep(tick).await,
            LifecycleEvent::Decline(ev) => self.decline(ev).await,
        };

        match &result {
            Err(err @ GateError::Storage(_)) => {
                tracing::error!(event = name, error = %err, "lifecycle event failed")
            }
            Err(err) => tracing::debug!(event = name, error = %err, "lifecycle event refused"),
            Ok(_) => {}
        }
        result
    }

    // -----------------------------------------------------------------------
    // Join requested
    // -----------------------------------------------------------------------

    /// Record the request and prompt the user. Requests for channels nobody
    /// registered are ignored.
    pub async fn join_requested(&self, ev: JoinRequested) -> Result<Vec<Intent>, GateError> {
        let Some(channel) = self.registry.get_channel(&ev.channel_id).await? else {
            tracing::debug!(channel_id = %ev.channel_id, "join request for unregistered channel ignored");
            return Ok(Vec::new());
        };
        let timeout_hours = channel.timeout_hours(&self.defaults);

        // At most one active request per key: an unexpired one is reused and
        // an expired one is closed before a fresh request is opened.
        let reusable = match self.requests.get_pending(&ev.channel_id, &ev.user_id).await? {
            Some(existing) if existing.is_approvable(ev.now) => Some(existing),
            Some(stale) => {
                self.requests.reject_request(stale.id, ev.now).await?;
                None
            }
            None => None,
        };

        let pending = match reusable {
            Some(existing) => {
                tracing::debug!(request_id = existing.id, "re-prompting existing join request");
                Some(existing)
            }
            None => {
                let id = self
                    .requests
                    .create(&ev.channel_id, &ev.user_id, ev.now, timeout_hours)
                    .await?;
                tracing::info!(
                    request_id = id,
                    channel_id = %ev.channel_id,
                    user_id = %ev.user_id,
                    "join request recorded"
                );
                self.requests.get_pending(&ev.channel_id, &ev.user_id).await?
            }
        };

        let ctx = RenderContext {
            name: ev.user_display_name.as_deref(),
            handle: ev.user_handle.as_deref(),
            channel_title: Some(&channel.title),
            timeout_hours: Some(timeout_hours),
        };
        let text = render_approval_prompt(
            channel.approval_template(&self.defaults),
            &ctx,
            pending.and_then(|p| p.expires_at),
            ev.now,
        );

        Ok(vec![Intent::SendDirectMessage {
            recipient_user_id: ev.user_id.clone(),
            text,
            action_token: Some(ActionToken::approve(&ev.channel_id, &ev.user_id).to_string()),
        }])
    }

    // -----------------------------------------------------------------------
    // Approval action
    // -----------------------------------------------------------------------

    /// Approve the requester's pending request, admitting and welcoming them.
    pub async fn approval_action(&self, ev: ApprovalAction) -> Result<Vec<Intent>, GateError> {
        let token = ActionToken::approve(&ev.channel_id, &ev.user_id).to_string();

        // Read before the transition: nothing after a successful approve may fail.
        let Some(channel) = self.registry.get_channel(&ev.channel_id).await? else {
            return Ok(vec![refusal(token, ApprovalFailure::ChannelNotSetUp)]);
        };

        if !self
            .requests
            .approve(&ev.channel_id, &ev.user_id, ev.now)
            .await?
        {
            let latest = self.requests.latest(&ev.channel_id, &ev.user_id).await?;
            let failure = ApprovalFailure::classify(latest.as_ref(), ev.now);
            tracing::info!(
                channel_id = %ev.channel_id,
                user_id = %ev.user_id,
                reason = ?failure,
                "approval refused"
            );
            return Ok(vec![refusal(token, failure)]);
        }

        tracing::info!(channel_id = %ev.channel_id, user_id = %ev.user_id, "join request approved");

        let ctx = RenderContext {
            name: ev.user_display_name.as_deref(),
            handle: ev.user_handle.as_deref(),
            channel_title: Some(&channel.title),
            timeout_hours: Some(channel.timeout_hours(&self.defaults)),
        };
        let welcome = render(channel.welcome_template(&self.defaults), &ctx);

        Ok(vec![
            Intent::AdmitMember {
                channel_id: ev.channel_id.clone(),
                user_id: ev.user_id.clone(),
            },
            Intent::SendChannelMessage {
                channel_id: ev.channel_id,
                text: welcome,
            },
            Intent::RespondToAction {
                token,
                success: true,
                text: APPROVED_TEXT.to_string(),
            },
        ])
    }

    // -----------------------------------------------------------------------
    // Sweep
    // -----------------------------------------------------------------------

    /// Expire every unresolved request whose deadline passed before `tick.now`.
    ///
    /// Each row is rejected by id, so a request that was approved, declined or
    /// superseded since the listing is left alone and produces no message.
    pub async fn sweep(&self, tick: SweepTick) -> Result<Vec<Intent>, GateError> {
        let expired = self.requests.list_expired_unresolved(tick.now).await?;
        let mut intents = Vec::with_capacity(expired.len());

        for request in expired {
            match self.requests.reject_request(request.id, tick.now).await {
                Ok(true) => intents.push(Intent::SendDirectMessage {
                    recipient_user_id: request.user_id,
                    text: render_expired_message(&request.channel_title),
                    action_token: None,
                }),
                Ok(false) => {
                    tracing::debug!(request_id = request.id, "request resolved before sweep")
                }
                Err(err) => tracing::warn!(
                    request_id = request.id,
                    error = %err,
                    "failed to expire join request"
                ),
            }
        }

        if !intents.is_empty() {
            tracing::info!(expired = intents.len(), "expired join requests");
        }
        Ok(intents)
    }

    // -----------------------------------------------------------------------
    // Decline
    // -----------------------------------------------------------------------

    /// Reject the pending request on an admin's behalf. Nothing is emitted
    /// when there was no active request.
    pub async fn decline(&self, ev: DeclineAction) -> Result<Vec<Intent>, GateError> {
        let channel = self
            .registry
            .get_channel(&ev.channel_id)
            .await?
            .ok_or_else(|| GateError::channel_not_set_up(&ev.channel_id))?;

        if !self
            .requests
            .reject(&ev.channel_id, &ev.user_id, ev.now)
            .await?
        {
            return Ok(Vec::new());
        }

        tracing::info!(channel_id = %ev.channel_id, user_id = %ev.user_id, "join request declined");

        Ok(vec![
            Intent::DeclineMember {
                channel_id: ev.channel_id,
                user_id: ev.user_id.clone(),
            },
            Intent::SendDirectMessage {
                recipient_user_id: ev.user_id,
                text: render_declined_message(&channel.title),
                action_token: None,
            },
        ])
    }
}

fn refusal(token: String, failure: ApprovalFailure) -> Intent {
    Intent::RespondToAction {
        token,
        success: false,
        text: failure.message().to_string(),
    }
}
