//! Channel configuration and admin association.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::result::OptionalExtension;
use diesel_async::AsyncConnection;
use scoped_futures::ScopedFutureExt;

use crate::db::pool::DbPool;
use crate::db::schema::{admins, channel_admins, channels};
use crate::error::GateError;
use crate::models::channel::{Channel, NewChannel, UpdateChannel};

const MAX_TITLE_LEN: usize = 255;
const MAX_TEMPLATE_LEN: usize = 4096;

#[async_trait]
pub trait ChannelRegistry: Send + Sync {
    /// Create the channel, or overwrite only its title when it already exists.
    /// `admin_id` is recorded as an admin managing the channel.
    async fn register_channel(
        &self,
        channel_id: &str,
        title: &str,
        admin_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Channel, GateError>;

    async fn get_channel(&self, channel_id: &str) -> Result<Option<Channel>, GateError>;

    async fn set_welcome_template(
        &self,
        channel_id: &str,
        template: &str,
    ) -> Result<Channel, GateError>;

    async fn set_approval_template(
        &self,
        channel_id: &str,
        template: &str,
    ) -> Result<Channel, GateError>;

    /// Applies to requests created afterwards; existing expiries are fixed.
    async fn set_approval_timeout(&self, channel_id: &str, hours: i32)
        -> Result<Channel, GateError>;

    async fn list_channels_for_admin(&self, admin_id: &str) -> Result<Vec<Channel>, GateError>;

    async fn is_admin(&self, user_id: &str) -> Result<bool, GateError>;

    /// Returns `true` when the user was not an admin before.
    async fn add_admin(&self, user_id: &str, now: DateTime<Utc>) -> Result<bool, GateError>;

    /// Make `user_id` the first admin if no admin exists yet.
    async fn bootstrap_if_empty(&self, user_id: &str, now: DateTime<Utc>)
        -> Result<bool, GateError>;
}

pub fn validate_title(title: &str) -> Result<&str, GateError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(GateError::validation("Channel title is required"));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(GateError::validation(format!(
            "Channel title must be {MAX_TITLE_LEN} characters or fewer"
        )));
    }
    Ok(title)
}

pub fn validate_template(template: &str) -> Result<&str, GateError> {
    let template = template.trim();
    if template.is_empty() {
        return Err(GateError::validation("Template text is required"));
    }
    if template.chars().count() > MAX_TEMPLATE_LEN {
        return Err(GateError::validation(format!(
            "Template must be {MAX_TEMPLATE_LEN} characters or fewer"
        )));
    }
    Ok(template)
}

pub fn validate_timeout(hours: i32) -> Result<i32, GateError> {
    if hours <= 0 {
        return Err(GateError::validation(
            "Approval timeout must be a positive number of hours",
        ));
    }
    Ok(hours)
}

pub fn validate_id<'a>(field: &str, id: &'a str) -> Result<&'a str, GateError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(GateError::validation(format!("{field} is required")));
    }
    Ok(id)
}

// ---------------------------------------------------------------------------
// PostgreSQL implementation
// ---------------------------------------------------------------------------

pub struct PgChannelRegistry {
    pool: DbPool,
}

impl PgChannelRegistry {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn update_channel(
        &self,
        channel_id: &str,
        changes: UpdateChannel<'_>,
    ) -> Result<Channel, GateError> {
        let mut conn = self.pool.get().await?;

        diesel_async::RunQueryDsl::get_result(
            diesel::update(channels::table.find(channel_id))
                .set(&changes)
                .returning(Channel::as_returning()),
            &mut conn,
        )
        .await
        .optional()?
        .ok_or_else(|| GateError::channel_not_set_up(channel_id))
    }
}

#[async_trait]
impl ChannelRegistry for PgChannelRegistry {
    async fn register_channel(
        &self,
        channel_id: &str,
        title: &str,
        admin_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Channel, GateError> {
        let channel_id = validate_id("channel_id", channel_id)?;
        let admin_id = validate_id("admin_id", admin_id)?;
        let title = validate_title(title)?;

        let mut conn = self.pool.get().await?;

        conn.transaction::<_, GateError, _>(|conn| {
            async move {
                let channel: Channel = diesel_async::RunQueryDsl::get_result(
                    diesel::insert_into(channels::table)
                        .values(NewChannel {
                            channel_id,
                            title,
                            created_at: now,
                        })
                        .on_conflict(channels::channel_id)
                        .do_update()
                        .set(channels::title.eq(title))
                        .returning(Channel::as_returning()),
                    conn,
                )
                .await?;

                diesel_async::RunQueryDsl::execute(
                    diesel::insert_into(admins::table)
                        .values((admins::user_id.eq(admin_id), admins::added_at.eq(now)))
                        .on_conflict_do_nothing(),
                    conn,
                )
                .await?;

                diesel_async::RunQueryDsl::execute(
                    diesel::insert_into(channel_admins::table)
                        .values((
                            channel_admins::channel_id.eq(channel_id),
                            channel_admins::user_id.eq(admin_id),
                        ))
                        .on_conflict_do_nothing(),
                    conn,
                )
                .await?;

                Ok(channel)
            }
            .scope_boxed()
        })
        .await
    }

    async fn get_channel(&self, channel_id: &str) -> Result<Option<Channel>, GateError> {
        let mut conn = self.pool.get().await?;

        let channel = diesel_async::RunQueryDsl::get_result(
            channels::table.find(channel_id).select(Channel::as_select()),
            &mut conn,
        )
        .await
        .optional()?;

        Ok(channel)
    }

    async fn set_welcome_template(
        &self,
        channel_id: &str,
        template: &str,
    ) -> Result<Channel, GateError> {
        let template = validate_template(template)?;
        let changes = UpdateChannel {
            welcome_template: Some(template),
            ..Default::default()
        };
        self.update_channel(channel_id, changes).await
    }

    async fn set_approval_template(
        &self,
        channel_id: &str,
        template: &str,
    ) -> Result<Channel, GateError> {
        let template = validate_template(template)?;
        let changes = UpdateChannel {
            approval_template: Some(template),
            ..Default::default()
        };
        self.update_channel(channel_id, changes).await
    }

    async fn set_approval_timeout(
        &self,
        channel_id: &str,
        hours: i32,
    ) -> Result<Channel, GateError> {
        let hours = validate_timeout(hours)?;
        let changes = UpdateChannel {
            approval_timeout_hours: Some(hours),
            ..Default::default()
        };
        self.update_channel(channel_id, changes).await
    }

    async fn list_channels_for_admin(&self, admin_id: &str) -> Result<Vec<Channel>, GateError> {
        let mut conn = self.pool.get().await?;

        let list: Vec<Channel> = diesel_async::RunQueryDsl::load(
            channels::table
                .inner_join(channel_admins::table)
                .filter(channel_admins::user_id.eq(admin_id))
                .order((channels::title.asc(), channels::channel_id.asc()))
                .select(Channel::as_select()),
            &mut conn,
        )
        .await?;

        Ok(list)
    }

    async fn is_admin(&self, user_id: &str) -> Result<bool, GateError> {
        let mut conn = self.pool.get().await?;

        let count: i64 = diesel_async::RunQueryDsl::get_result(
            admins::table.filter(admins::user_id.eq(user_id)).count(),
            &mut conn,
        )
        .await?;

        Ok(count > 0)
    }

    async fn add_admin(&self, user_id: &str, now: DateTime<Utc>) -> Result<bool, GateError> {
        let user_id = validate_id("user_id", user_id)?;
        let mut conn = self.pool.get().await?;

        let inserted = diesel_async::RunQueryDsl::execute(
            diesel::insert_into(admins::table)
                .values((admins::user_id.eq(user_id), admins::added_at.eq(now)))
                .on_conflict_do_nothing(),
            &mut conn,
        )
        .await?;

        Ok(inserted > 0)
    }

    async fn bootstrap_if_empty(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, GateError> {
        let user_id = validate_id("user_id", user_id)?;
        let mut conn = self.pool.get().await?;

        conn.transaction::<_, GateError, _>(|conn| {
            async move {
                // Serializes concurrent bootstraps; plain reads stay unblocked.
                diesel_async::RunQueryDsl::execute(
                    diesel::sql_query("LOCK TABLE admins IN SHARE ROW EXCLUSIVE MODE"),
                    conn,
                )
                .await?;

                let existing: i64 =
                    diesel_async::RunQueryDsl::get_result(admins::table.count(), conn).await?;
                if existing > 0 {
                    return Ok(false);
                }

                diesel_async::RunQueryDsl::execute(
                    diesel::insert_into(admins::table)
                        .values((admins::user_id.eq(user_id), admins::added_at.eq(now))),
                    conn,
                )
                .await?;

                Ok(true)
            }
            .scope_boxed()
        })
        .await
    }
}
