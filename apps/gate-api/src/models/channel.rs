use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;
use utoipa::ToSchema;

use crate::db::schema::channels;
use crate::templates::DefaultTemplates;

/// A channel whose join requests are gated by approval.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Serialize, ToSchema)]
#[diesel(table_name = channels)]
pub struct Channel {
    pub channel_id: String,
    pub title: String,
    pub welcome_template: Option<String>,
    pub approval_template: Option<String>,
    pub created_at: DateTime<Utc>,
    pub approval_timeout_hours: Option<i32>,
}

impl Channel {
    /// Welcome template, or the process-wide default when none is configured.
    pub fn welcome_template<'a>(&'a self, defaults: &'a DefaultTemplates) -> &'a str {
        self.welcome_template
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(&defaults.welcome)
    }

    /// Approval prompt template, or the process-wide default.
    pub fn approval_template<'a>(&'a self, defaults: &'a DefaultTemplates) -> &'a str {
        self.approval_template
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(&defaults.approval)
    }

    /// Effective approval timeout. Rows written before the column existed,
    /// or with a non-positive value, use the default.
    pub fn timeout_hours(&self, defaults: &DefaultTemplates) -> i32 {
        self.approval_timeout_hours
            .filter(|h| *h > 0)
            .unwrap_or(defaults.timeout_hours)
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = channels)]
pub struct NewChannel<'a> {
    pub channel_id: &'a str,
    pub title: &'a str,
    pub created_at: DateTime<Utc>,
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = channels)]
pub struct UpdateChannel<'a> {
    pub welcome_template: Option<&'a str>,
    pub approval_template: Option<&'a str>,
    pub approval_timeout_hours: Option<i32>,
}

/// Channel listing entry for the admin statistics view.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ChannelSummary {
    #[serde(flatten)]
    pub channel: Channel,
    pub approval_count: i64,
}
