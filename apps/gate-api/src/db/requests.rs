//! Join request storage.
//!
//! Every transition is a single conditional UPDATE over the terminal
//! columns, so two callers racing on the same key resolve to exactly one
//! winner without any lock held across calls.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, OptionalExtension};
use gatekeeper_common::SnowflakeGenerator;

use crate::db::pool::DbPool;
use crate::db::schema::{channels, join_requests};
use crate::error::GateError;
use crate::models::join_request::{ExpiredRequest, JoinRequest, NewJoinRequest};

/// Durable table of join requests keyed by `(channel_id, user_id)`.
#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Insert a new active request expiring `timeout_hours` after `now`.
    /// When the key already has an active request, that request's id is
    /// returned and nothing is inserted.
    async fn create(
        &self,
        channel_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
        timeout_hours: i32,
    ) -> Result<i64, GateError>;

    /// Mark the active request approved if it has not expired at `now`.
    /// `false` means there was nothing to approve.
    async fn approve(
        &self,
        channel_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, GateError>;

    /// Mark the active request rejected. `false` means it was already terminal
    /// or never existed.
    async fn reject(
        &self,
        channel_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, GateError>;

    /// Reject one specific request if it is still active.
    async fn reject_request(&self, id: i64, now: DateTime<Utc>) -> Result<bool, GateError>;

    /// Most recent active request for the key.
    async fn get_pending(
        &self,
        channel_id: &str,
        user_id: &str,
    ) -> Result<Option<JoinRequest>, GateError>;

    /// Most recent request for the key in any state.
    async fn latest(
        &self,
        channel_id: &str,
        user_id: &str,
    ) -> Result<Option<JoinRequest>, GateError>;

    /// Active requests whose expiry is before `now`, oldest expiry first.
    async fn list_expired_unresolved(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ExpiredRequest>, GateError>;

    async fn count_approved(&self, channel_id: &str) -> Result<i64, GateError>;
}

/// Expiry for a request created at `now`. Fixed at creation time.
pub fn expiry_for(now: DateTime<Utc>, timeout_hours: i32) -> Result<DateTime<Utc>, GateError> {
    if timeout_hours <= 0 {
        return Err(GateError::validation("Approval timeout must be a positive number of hours"));
    }
    Ok(now + Duration::hours(i64::from(timeout_hours)))
}

// ---------------------------------------------------------------------------
// PostgreSQL implementation
// ---------------------------------------------------------------------------

pub struct PgRequestStore {
    pool: DbPool,
    ids: Arc<SnowflakeGenerator>,
}

impl PgRequestStore {
    pub fn new(pool: DbPool, ids: Arc<SnowflakeGenerator>) -> Self {
        Self { pool, ids }
    }
}

#[async_trait]
impl RequestStore for PgRequestStore {
    async fn create(
        &self,
        channel_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
        timeout_hours: i32,
    ) -> Result<i64, GateError> {
        let expires_at = expiry_for(now, timeout_hours)?;
        let id = self.ids.generate();
        let mut conn = self.pool.get().await?;

        let inserted = diesel_async::RunQueryDsl::execute(
            diesel::insert_into(join_requests::table).values(NewJoinRequest {
                id,
                channel_id,
                user_id,
                requested_at: now,
                expires_at: Some(expires_at),
            }),
            &mut conn,
        )
        .await;

        match inserted {
            Ok(_) => Ok(id),
            Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _)) => {
                Err(GateError::channel_not_set_up(channel_id))
            }
            // join_requests_single_active_idx: a concurrent create won.
            Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                drop(conn);
                let winner = self.get_pending(channel_id, user_id).await?.ok_or_else(|| {
                    GateError::Storage("active join request resolved during create".to_string())
                })?;
                tracing::debug!(request_id = winner.id, "join request already active");
                Ok(winner.id)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn approve(
        &self,
        channel_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, GateError> {
        let mut conn = self.pool.get().await?;

        let updated = diesel_async::RunQueryDsl::execute(
            diesel::update(
                join_requests::table
                    .filter(join_requests::channel_id.eq(channel_id))
                    .filter(join_requests::user_id.eq(user_id))
                    .filter(join_requests::approved_at.is_null())
                    .filter(join_requests::rejected_at.is_null())
                    .filter(
                        join_requests::expires_at
                            .is_null()
                            .or(join_requests::expires_at.gt(now)),
                    ),
            )
            .set(join_requests::approved_at.eq(now)),
            &mut conn,
        )
        .await?;

        Ok(updated > 0)
    }

    async fn reject(
        &self,
        channel_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, GateError> {
        let mut conn = self.pool.get().await?;

        let updated = diesel_async::RunQueryDsl::execute(
            diesel::update(
                join_requests::table
                    .filter(join_requests::channel_id.eq(channel_id))
                    .filter(join_requests::user_id.eq(user_id))
                    .filter(join_requests::approved_at.is_null())
                    .filter(join_requests::rejected_at.is_null()),
            )
            .set(join_requests::rejected_at.eq(now)),
            &mut conn,
        )
        .await?;

        Ok(updated > 0)
    }

    async fn reject_request(&self, id: i64, now: DateTime<Utc>) -> Result<bool, GateError> {
        let mut conn = self.pool.get().await?;

        let updated = diesel_async::RunQueryDsl::execute(
            diesel::update(
                join_requests::table
                    .filter(join_requests::id.eq(id))
                    .filter(join_requests::approved_at.is_null())
                    .filter(join_requests::rejected_at.is_null()),
            )
            .set(join_requests::rejected_at.eq(now)),
            &mut conn,
        )
        .await?;

        Ok(updated > 0)
    }

    async fn get_pending(
        &self,
        channel_id: &str,
        user_id: &str,
    ) -> Result<Option<JoinRequest>, GateError> {
        let mut conn = self.pool.get().await?;

        let request = diesel_async::RunQueryDsl::first(
            join_requests::table
                .filter(join_requests::channel_id.eq(channel_id))
                .filter(join_requests::user_id.eq(user_id))
                .filter(join_requests::approved_at.is_null())
                .filter(join_requests::rejected_at.is_null())
                .order((join_requests::requested_at.desc(), join_requests::id.desc()))
                .select(JoinRequest::as_select()),
            &mut conn,
        )
        .await
        .optional()?;

        Ok(request)
    }

    async fn latest(
        &self,
        channel_id: &str,
        user_id: &str,
    ) -> Result<Option<JoinRequest>, GateError> {
        let mut conn = self.pool.get().await?;

        let request = diesel_async::RunQueryDsl::first(
            join_requests::table
                .filter(join_requests::channel_id.eq(channel_id))
                .filter(join_requests::user_id.eq(user_id))
                .order((join_requests::requested_at.desc(), join_requests::id.desc()))
                .select(JoinRequest::as_select()),
            &mut conn,
        )
        .await
        .optional()?;

        Ok(request)
    }

    async fn list_expired_unresolved(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ExpiredRequest>, GateError> {
        let mut conn = self.pool.get().await?;

        let rows: Vec<ExpiredRequest> = diesel_async::RunQueryDsl::load(
            join_requests::table
                .inner_join(channels::table)
                .filter(join_requests::approved_at.is_null())
                .filter(join_requests::rejected_at.is_null())
                .filter(join_requests::expires_at.lt(now))
                .order((join_requests::expires_at.asc(), join_requests::id.asc()))
                .select((
                    join_requests::id,
                    join_requests::channel_id,
                    join_requests::user_id,
                    join_requests::requested_at,
                    join_requests::expires_at.assume_not_null(),
                    channels::title,
                )),
            &mut conn,
        )
        .await?;

        Ok(rows)
    }

    async fn count_approved(&self, channel_id: &str) -> Result<i64, GateError> {
        let mut conn = self.pool.get().await?;

        let count: i64 = diesel_async::RunQueryDsl::get_result(
            join_requests::table
                .filter(join_requests::channel_id.eq(channel_id))
                .filter(join_requests::approved_at.is_not_null())
                .count(),
            &mut conn,
        )
        .await?;

        Ok(count)
    }
}
