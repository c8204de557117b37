//! Inbound lifecycle events and the outbound intents they produce.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::GateError;

// ---------------------------------------------------------------------------
// Inbound events
// ---------------------------------------------------------------------------

/// A user asked to join a channel.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct JoinRequested {
    pub channel_id: String,
    pub user_id: String,
    #[serde(default)]
    pub user_display_name: Option<String>,
    /// Platform handle without the leading `@`.
    #[serde(default)]
    pub user_handle: Option<String>,
    #[serde(default = "Utc::now")]
    pub now: DateTime<Utc>,
}

/// The requester pressed the approval button carried by their prompt.
///
/// The front end may send the ids, or just echo the button's `action_token`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ApprovalAction {
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub action_token: Option<String>,
    /// Profile details for the welcome message, when the platform provides them.
    #[serde(default)]
    pub user_display_name: Option<String>,
    #[serde(default)]
    pub user_handle: Option<String>,
    #[serde(default = "Utc::now")]
    pub now: DateTime<Utc>,
}

impl ApprovalAction {
    /// Take the ids from `action_token` when one was sent. Ids given next to
    /// the token must agree with it.
    pub fn resolve_token(mut self) -> Result<Self, GateError> {
        if let Some(raw) = self.action_token.take() {
            let token: ActionToken = raw
                .parse()
                .map_err(|_| GateError::validation("Malformed action token"))?;
            let agrees = |given: &str, parsed: &str| given.is_empty() || given == parsed;
            if !agrees(&self.channel_id, &token.channel_id) || !agrees(&self.user_id, &token.user_id)
            {
                return Err(GateError::validation(
                    "Action token does not match the given channel and user",
                ));
            }
            self.channel_id = token.channel_id;
            self.user_id = token.user_id;
        }

        if self.channel_id.is_empty() || self.user_id.is_empty() {
            return Err(GateError::validation(
                "Either action_token or channel_id and user_id are required",
            ));
        }
        Ok(self)
    }
}

/// Periodic trigger for expiring timed-out requests.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SweepTick {
    #[serde(default = "Utc::now")]
    pub now: DateTime<Utc>,
}

/// An admin declined a pending request.
#[derive(Debug, Clone)]
pub struct DeclineAction {
    pub channel_id: String,
    pub user_id: String,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    JoinRequested(JoinRequested),
    ApprovalAction(ApprovalAction),
    Sweep(SweepTick),
    Decline(DeclineAction),
}

impl LifecycleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinRequested(_) => "join_requested",
            Self::ApprovalAction(_) => "approval_action",
            Self::Sweep(_) => "sweep",
            Self::Decline(_) => "decline",
        }
    }
}

// ---------------------------------------------------------------------------
// Outbound intents
// ---------------------------------------------------------------------------

/// An instruction for the delivery collaborator. The core never waits on
/// its execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Intent {
    SendDirectMessage {
        recipient_user_id: String,
        text: String,
        /// Routing key for the approval button, when the message carries one.
        #[serde(skip_serializing_if = "Option::is_none")]
        action_token: Option<String>,
    },
    AdmitMember {
        channel_id: String,
        user_id: String,
    },
    DeclineMember {
        channel_id: String,
        user_id: String,
    },
    SendChannelMessage {
        channel_id: String,
        text: String,
    },
    RespondToAction {
        token: String,
        success: bool,
        text: String,
    },
}

// ---------------------------------------------------------------------------
// Action token
// ---------------------------------------------------------------------------

const APPROVE_PREFIX: &str = "approve";

/// Routing key embedded in the approval prompt: `approve:{channel_id}:{user_id}`.
///
/// The channel id may itself contain `:`; the user id is everything after the
/// last separator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionToken {
    pub channel_id: String,
    pub user_id: String,
}

impl ActionToken {
    pub fn approve(channel_id: &str, user_id: &str) -> Self {
        Self {
            channel_id: channel_id.to_string(),
            user_id: user_id.to_string(),
        }
    }
}

impl fmt::Display for ActionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{APPROVE_PREFIX}:{}:{}", self.channel_id, self.user_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed action token")]
pub struct InvalidActionToken;

impl FromStr for ActionToken {
    type Err = InvalidActionToken;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix(APPROVE_PREFIX)
            .and_then(|r| r.strip_prefix(':'))
            .ok_or(InvalidActionToken)?;
        let (channel_id, user_id) = rest.rsplit_once(':').ok_or(InvalidActionToken)?;
        if channel_id.is_empty() || user_id.is_empty() {
            return Err(InvalidActionToken);
        }
        Ok(Self::approve(channel_id, user_id))
    }
}
