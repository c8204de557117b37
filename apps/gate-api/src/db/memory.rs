//! In-memory store and registry backing the controller and route tests.
//! They honor the same atomicity contract as the SQL versions:
//! a transition holds the per-key shard lock for its whole check-and-set.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use gatekeeper_common::SnowflakeGenerator;
use parking_lot::RwLock;

use crate::db::channels::{
    validate_id, validate_template, validate_timeout, validate_title, ChannelRegistry,
};
use crate::db::requests::{expiry_for, RequestStore};
use crate::error::GateError;
use crate::models::channel::Channel;
use crate::models::join_request::{ExpiredRequest, JoinRequest};
use crate::templates::DEFAULT_APPROVAL_TIMEOUT_HOURS;

type Key = (String, String);

fn key(channel_id: &str, user_id: &str) -> Key {
    (channel_id.to_string(), user_id.to_string())
}

// ---------------------------------------------------------------------------
// Channel registry
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RegistryState {
    channels: HashMap<String, Channel>,
    admins: HashSet<String>,
    channel_admins: HashSet<Key>,
}

#[derive(Default)]
pub struct MemoryChannelRegistry {
    state: RwLock<RegistryState>,
}

impl MemoryChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn title_of(&self, channel_id: &str) -> Option<String> {
        self.state
            .read()
            .channels
            .get(channel_id)
            .map(|c| c.title.clone())
    }

    fn update<F>(&self, channel_id: &str, apply: F) -> Result<Channel, GateError>
    where
        F: FnOnce(&mut Channel),
    {
        let mut state = self.state.write();
        let channel = state
            .channels
            .get_mut(channel_id)
            .ok_or_else(|| GateError::channel_not_set_up(channel_id))?;
        apply(channel);
        Ok(channel.clone())
    }
}

#[async_trait]
impl ChannelRegistry for MemoryChannelRegistry {
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

        let mut state = self.state.write();
        let channel = state
            .channels
            .entry(channel_id.to_string())
            .and_modify(|c| c.title = title.to_string())
            .or_insert_with(|| Channel {
                channel_id: channel_id.to_string(),
                title: title.to_string(),
                welcome_template: None,
                approval_template: None,
                created_at: now,
                approval_timeout_hours: Some(DEFAULT_APPROVAL_TIMEOUT_HOURS),
            })
            .clone();
        state.admins.insert(admin_id.to_string());
        state.channel_admins.insert(key(channel_id, admin_id));

        Ok(channel)
    }

    async fn get_channel(&self, channel_id: &str) -> Result<Option<Channel>, GateError> {
        Ok(self.state.read().channels.get(channel_id).cloned())
    }

    async fn set_welcome_template(
        &self,
        channel_id: &str,
        template: &str,
    ) -> Result<Channel, GateError> {
        let template = validate_template(template)?;
        self.update(channel_id, |c| c.welcome_template = Some(template.to_string()))
    }

    async fn set_approval_template(
        &self,
        channel_id: &str,
        template: &str,
    ) -> Result<Channel, GateError> {
        let template = validate_template(template)?;
        self.update(channel_id, |c| c.approval_template = Some(template.to_string()))
    }

    async fn set_approval_timeout(
        &self,
        channel_id: &str,
        hours: i32,
    ) -> Result<Channel, GateError> {
        let hours = validate_timeout(hours)?;
        self.update(channel_id, |c| c.approval_timeout_hours = Some(hours))
    }

    async fn list_channels_for_admin(&self, admin_id: &str) -> Result<Vec<Channel>, GateError> {
        let state = self.state.read();
        let mut list: Vec<Channel> = state
            .channel_admins
            .iter()
            .filter(|(_, user)| user == admin_id)
            .filter_map(|(channel_id, _)| state.channels.get(channel_id).cloned())
            .collect();
        list.sort_by(|a, b| {
            a.title
                .cmp(&b.title)
                .then_with(|| a.channel_id.cmp(&b.channel_id))
        });
        Ok(list)
    }

    async fn is_admin(&self, user_id: &str) -> Result<bool, GateError> {
        Ok(self.state.read().admins.contains(user_id))
    }

    async fn add_admin(&self, user_id: &str, _now: DateTime<Utc>) -> Result<bool, GateError> {
        let user_id = validate_id("user_id", user_id)?;
        Ok(self.state.write().admins.insert(user_id.to_string()))
    }

    async fn bootstrap_if_empty(
        &self,
        user_id: &str,
        _now: DateTime<Utc>,
    ) -> Result<bool, GateError> {
        let user_id = validate_id("user_id", user_id)?;
        let mut state = self.state.write();
        if !state.admins.is_empty() {
            return Ok(false);
        }
        state.admins.insert(user_id.to_string());
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Request store
// ---------------------------------------------------------------------------

pub struct MemoryRequestStore {
    rows: DashMap<Key, Vec<JoinRequest>>,
    index: DashMap<i64, Key>,
    ids: Arc<SnowflakeGenerator>,
    registry: Arc<MemoryChannelRegistry>,
}

impl MemoryRequestStore {
    /// The registry stands in for the `channels` table: it backs the
    /// foreign-key check on create and the title join in sweeps.
    pub fn new(registry: Arc<MemoryChannelRegistry>, ids: Arc<SnowflakeGenerator>) -> Self {
        Self {
            rows: DashMap::new(),
            index: DashMap::new(),
            ids,
            registry,
        }
    }

    /// Every stored request, in no particular order.
    pub fn all(&self) -> Vec<JoinRequest> {
        self.rows
            .iter()
            .flat_map(|entry| entry.value().clone())
            .collect()
    }
}

fn newest<'a>(rows: impl Iterator<Item = &'a JoinRequest>) -> Option<&'a JoinRequest> {
    rows.max_by_key(|r| (r.requested_at, r.id))
}

#[async_trait]
impl RequestStore for MemoryRequestStore {
    async fn create(
        &self,
        channel_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
        timeout_hours: i32,
    ) -> Result<i64, GateError> {
        let expires_at = expiry_for(now, timeout_hours)?;
        if self.registry.title_of(channel_id).is_none() {
            return Err(GateError::channel_not_set_up(channel_id));
        }

        let k = key(channel_id, user_id);
        let mut rows = self.rows.entry(k.clone()).or_default();
        if let Some(active) = rows.iter().find(|r| r.is_active()) {
            return Ok(active.id);
        }

        let id = self.ids.generate();
        rows.push(JoinRequest {
            id,
            channel_id: channel_id.to_string(),
            user_id: user_id.to_string(),
            requested_at: now,
            approved_at: None,
            expires_at: Some(expires_at),
            rejected_at: None,
        });
        drop(rows);
        self.index.insert(id, k);

        Ok(id)
    }

    async fn approve(
        &self,
        channel_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, GateError> {
        let Some(mut rows) = self.rows.get_mut(&key(channel_id, user_id)) else {
            return Ok(false);
        };

        let mut changed = false;
        for row in rows.iter_mut().filter(|r| r.is_approvable(now)) {
            row.approved_at = Some(now);
            changed = true;
        }
        Ok(changed)
    }

    async fn reject(
        &self,
        channel_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, GateError> {
        let Some(mut rows) = self.rows.get_mut(&key(channel_id, user_id)) else {
            return Ok(false);
        };

        let mut changed = false;
        for row in rows.iter_mut().filter(|r| r.is_active()) {
            row.rejected_at = Some(now);
            changed = true;
        }
        Ok(changed)
    }

    async fn reject_request(&self, id: i64, now: DateTime<Utc>) -> Result<bool, GateError> {
        let Some(k) = self.index.get(&id).map(|k| k.value().clone()) else {
            return Ok(false);
        };
        let Some(mut rows) = self.rows.get_mut(&k) else {
            return Ok(false);
        };

        match rows.iter_mut().find(|r| r.id == id && r.is_active()) {
            Some(row) => {
                row.rejected_at = Some(now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_pending(
        &self,
        channel_id: &str,
        user_id: &str,
    ) -> Result<Option<JoinRequest>, GateError> {
        Ok(self
            .rows
            .get(&key(channel_id, user_id))
            .and_then(|rows| newest(rows.iter().filter(|r| r.is_active())).cloned()))
    }

    async fn latest(
        &self,
        channel_id: &str,
        user_id: &str,
    ) -> Result<Option<JoinRequest>, GateError> {
        Ok(self
            .rows
            .get(&key(channel_id, user_id))
            .and_then(|rows| newest(rows.iter()).cloned()))
    }

    async fn list_expired_unresolved(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ExpiredRequest>, GateError> {
        let expired: Vec<(JoinRequest, DateTime<Utc>)> = self
            .rows
            .iter()
            .flat_map(|entry| {
                entry
                    .value()
                    .iter()
                    .filter(|r| r.is_active())
                    .filter_map(|r| r.expires_at.filter(|exp| *exp < now).map(|exp| (r.clone(), exp)))
                    .collect::<Vec<_>>()
            })
            .collect();

        let mut list: Vec<ExpiredRequest> = expired
            .into_iter()
            .filter_map(|(r, expires_at)| {
                let channel_title = self.registry.title_of(&r.channel_id)?;
                Some(ExpiredRequest {
                    id: r.id,
                    channel_id: r.channel_id,
                    user_id: r.user_id,
                    requested_at: r.requested_at,
                    expires_at,
                    channel_title,
                })
            })
            .collect();
        list.sort_by_key(|r| (r.expires_at, r.id));

        Ok(list)
    }

    async fn count_approved(&self, channel_id: &str) -> Result<i64, GateError> {
        let count = self
            .rows
            .iter()
            .filter(|entry| entry.key().0 == channel_id)
            .map(|entry| entry.value().iter().filter(|r| r.approved_at.is_some()).count())
            .sum::<usize>();
        Ok(count as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn setup() -> (Arc<MemoryChannelRegistry>, MemoryRequestStore) {
        let registry = Arc::new(MemoryChannelRegistry::new());
        registry
            .register_channel("chan", "Channel", "admin", Utc::now())
            .await
            .unwrap();
        let store = MemoryRequestStore::new(registry.clone(), Arc::new(SnowflakeGenerator::new(0)));
        (registry, store)
    }

    #[tokio::test]
    async fn create_rejects_unknown_channel() {
        let (_, store) = setup().await;
        let err = store.create("nope", "u1", Utc::now(), 1).await.unwrap_err();
        assert!(matches!(err, GateError::NotFound(_)));
    }

    #[tokio::test]
    async fn reject_request_only_touches_that_row() {
        let (_, store) = setup().await;
        let t0 = Utc::now();
        let first = store.create("chan", "u1", t0, 1).await.unwrap();
        assert!(store.reject_request(first, t0).await.unwrap());
        let second = store
            .create("chan", "u1", t0 + Duration::minutes(1), 1)
            .await
            .unwrap();

        // A stale sweep entry for the first row must not touch the second.
        assert!(!store.reject_request(first, t0 + Duration::hours(2)).await.unwrap());
        let pending = store.get_pending("chan", "u1").await.unwrap().unwrap();
        assert_eq!(pending.id, second);
    }

    #[tokio::test]
    async fn create_keeps_one_active_request_per_key() {
        let (_, store) = setup().await;
        let t0 = Utc::now();
        let first = store.create("chan", "u1", t0, 1).await.unwrap();
        let again = store
            .create("chan", "u1", t0 + Duration::minutes(1), 1)
            .await
            .unwrap();
        assert_eq!(again, first);
        assert_eq!(store.all().iter().filter(|r| r.is_active()).count(), 1);
    }

    #[tokio::test]
    async fn latest_prefers_newest_request() {
        let (_, store) = setup().await;
        let t0 = Utc::now();
        store.create("chan", "u1", t0, 1).await.unwrap();
        store.reject("chan", "u1", t0).await.unwrap();
        let newer = store
            .create("chan", "u1", t0 + Duration::seconds(5), 1)
            .await
            .unwrap();
        assert_eq!(store.latest("chan", "u1").await.unwrap().unwrap().id, newer);
    }
}
