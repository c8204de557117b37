use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;
use utoipa::ToSchema;

use crate::db::schema::join_requests;

/// A membership application for a channel. Rows are never deleted; terminal
/// rows double as the approval log.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Serialize, ToSchema)]
#[diesel(table_name = join_requests)]
pub struct JoinRequest {
    pub id: i64,
    pub channel_id: String,
    pub user_id: String,
    pub requested_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
}

/// Where a request sits in its lifecycle at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Pending,
    /// Still active in storage but past `expires_at`; the next sweep rejects it.
    Expired,
    Approved,
    Rejected,
}

impl JoinRequest {
    /// Neither terminal timestamp is set.
    pub fn is_active(&self) -> bool {
        self.approved_at.is_none() && self.rejected_at.is_none()
    }

    /// An active request can still be approved at `now`.
    pub fn is_approvable(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && self.expires_at.map_or(true, |exp| exp > now)
    }

    pub fn state(&self, now: DateTime<Utc>) -> RequestState {
        if self.approved_at.is_some() {
            RequestState::Approved
        } else if self.rejected_at.is_some() {
            RequestState::Rejected
        } else if self.is_approvable(now) {
            RequestState::Pending
        } else {
            RequestState::Expired
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = join_requests)]
pub struct NewJoinRequest<'a> {
    pub id: i64,
    pub channel_id: &'a str,
    pub user_id: &'a str,
    pub requested_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// An unresolved request past its expiry, joined with its channel title.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Serialize, ToSchema)]
pub struct ExpiredRequest {
    pub id: i64,
    pub channel_id: String,
    pub user_id: String,
    pub requested_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub channel_title: String,
}
