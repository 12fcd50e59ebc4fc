//! In-memory store with JSON state-file persistence.
//!
//! Profiles are held as serialized JSON and decoded on every read, so the
//! typed `Profile` never leaks a storage representation into the engine.
//! The whole store can be written to and restored from a single JSON file.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    Account, ConnectionDirection, DriftBufferEntry, Notification, NotificationKey, Profile,
    SocialConnection, SocialCounts, Store, StoreError, Tweet,
};

/// Thread-safe in-memory implementation of [`Store`].
#[derive(Default)]
pub struct MemoryStore {
    accounts: DashMap<String, Account>,
    /// Profile rows, serialized.
    profiles: DashMap<String, String>,
    /// Tweets per account, kept sorted by `created_at` ascending.
    tweets: DashMap<String, Vec<Tweet>>,
    drift: DashMap<String, Vec<DriftBufferEntry>>,
    connections: DashMap<String, Vec<SocialConnection>>,
    social_counts: DashMap<String, SocialCounts>,
    notifications: DashMap<String, Vec<Notification>>,
}

/// On-disk representation of a [`MemoryStore`].
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreState {
    #[serde(default)]
    accounts: BTreeMap<String, Account>,
    #[serde(default)]
    profiles: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    tweets: BTreeMap<String, Vec<Tweet>>,
    #[serde(default)]
    drift: BTreeMap<String, Vec<DriftBufferEntry>>,
    #[serde(default)]
    connections: BTreeMap<String, Vec<SocialConnection>>,
    #[serde(default)]
    social_counts: BTreeMap<String, SocialCounts>,
    #[serde(default)]
    notifications: BTreeMap<String, Vec<Notification>>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Load a store from a state file. A missing file yields an empty store.
    pub async fn load(path: impl AsRef<Path>) -> Result<Arc<Self>, StoreError> {
        let path = path.as_ref();
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "state file not found, starting empty");
                return Ok(Self::new());
            }
            Err(e) => return Err(e.into()),
        };

        let state: StoreState = serde_json::from_slice(&bytes)?;
        let store = Self::default();

        for (key, account) in state.accounts {
            store.accounts.insert(key, account);
        }
        for (key, profile) in state.profiles {
            store.profiles.insert(key, serde_json::to_string(&profile)?);
        }
        for (key, mut tweets) in state.tweets {
            tweets.sort_by_key(|t| t.created_at);
            store.tweets.insert(key, tweets);
        }
        for (key, entries) in state.drift {
            store.drift.insert(key, entries);
        }
        for (key, connections) in state.connections {
            store.connections.insert(key, connections);
        }
        for (key, counts) in state.social_counts {
            store.social_counts.insert(key, counts);
        }
        for (key, notifications) in state.notifications {
            store.notifications.insert(key, notifications);
        }

        info!(
            path = %path.display(),
            accounts = store.accounts.len(),
            "loaded state file"
        );
        Ok(Arc::new(store))
    }

    /// Write the full store to a state file.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        let mut state = StoreState::default();

        for entry in self.accounts.iter() {
            state
                .accounts
                .insert(entry.key().clone(), entry.value().clone());
        }
        for entry in self.profiles.iter() {
            state
                .profiles
                .insert(entry.key().clone(), serde_json::from_str(entry.value())?);
        }
        for entry in self.tweets.iter() {
            state.tweets.insert(entry.key().clone(), entry.value().clone());
        }
        for entry in self.drift.iter() {
            state.drift.insert(entry.key().clone(), entry.value().clone());
        }
        for entry in self.connections.iter() {
            state
                .connections
                .insert(entry.key().clone(), entry.value().clone());
        }
        for entry in self.social_counts.iter() {
            state.social_counts.insert(entry.key().clone(), *entry.value());
        }
        for entry in self.notifications.iter() {
            state
                .notifications
                .insert(entry.key().clone(), entry.value().clone());
        }

        let json = serde_json::to_vec_pretty(&state)?;
        tokio::fs::write(path.as_ref(), json).await?;
        debug!(path = %path.as_ref().display(), "saved state file");
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_account(&self, account_id: &str) -> Result<Option<Account>, StoreError> {
        Ok(self.accounts.get(account_id).map(|a| a.value().clone()))
    }

    async fn put_account(&self, account: &Account) -> Result<(), StoreError> {
        self.accounts.insert(account.id.clone(), account.clone());
        Ok(())
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, StoreError> {
        let mut accounts: Vec<Account> = self.accounts.iter().map(|a| a.value().clone()).collect();
        accounts.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(accounts)
    }

    async fn get_profile(&self, account_id: &str) -> Result<Option<Profile>, StoreError> {
        match self.profiles.get(account_id) {
            Some(row) => Ok(Some(serde_json::from_str(row.value())?)),
            None => Ok(None),
        }
    }

    async fn put_profile(&self, profile: &Profile) -> Result<(), StoreError> {
        let row = serde_json::to_string(profile)?;
        self.profiles.insert(profile.account_id.clone(), row);
        Ok(())
    }

    async fn insert_tweets(&self, account_id: &str, tweets: &[Tweet]) -> Result<usize, StoreError> {
        let mut stored = self.tweets.entry(account_id.to_string()).or_default();
        let known: HashSet<String> = stored.iter().map(|t| t.id.clone()).collect();

        let mut inserted = 0;
        for tweet in tweets {
            if !known.contains(&tweet.id) {
                stored.push(tweet.clone());
                inserted += 1;
            }
        }
        stored.sort_by_key(|t| t.created_at);
        Ok(inserted)
    }

    async fn get_tweets(&self, account_id: &str, ids: &[String]) -> Result<Vec<Tweet>, StoreError> {
        let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
        Ok(self
            .tweets
            .get(account_id)
            .map(|stored| {
                stored
                    .iter()
                    .filter(|t| wanted.contains(t.id.as_str()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn recent_tweets(&self, account_id: &str, limit: usize) -> Result<Vec<Tweet>, StoreError> {
        Ok(self
            .tweets
            .get(account_id)
            .map(|stored| stored.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn tweet_timestamps(&self, account_id: &str) -> Result<Vec<DateTime<Utc>>, StoreError> {
        Ok(self
            .tweets
            .get(account_id)
            .map(|stored| stored.iter().map(|t| t.created_at).collect())
            .unwrap_or_default())
    }

    async fn insert_drift_entries(&self, entries: &[DriftBufferEntry]) -> Result<(), StoreError> {
        for entry in entries {
            self.drift
                .entry(entry.account_id.clone())
                .or_default()
                .push(entry.clone());
        }
        Ok(())
    }

    async fn list_drift_entries(
        &self,
        account_id: &str,
    ) -> Result<Vec<DriftBufferEntry>, StoreError> {
        Ok(self
            .drift
            .get(account_id)
            .map(|e| e.value().clone())
            .unwrap_or_default())
    }

    async fn count_drift_entries(&self, account_id: &str) -> Result<usize, StoreError> {
        Ok(self.drift.get(account_id).map(|e| e.len()).unwrap_or(0))
    }

    async fn clear_drift_entries(&self, account_id: &str) -> Result<usize, StoreError> {
        Ok(self
            .drift
            .remove(account_id)
            .map(|(_, entries)| entries.len())
            .unwrap_or(0))
    }

    async fn list_connections(
        &self,
        account_id: &str,
    ) -> Result<Vec<SocialConnection>, StoreError> {
        Ok(self
            .connections
            .get(account_id)
            .map(|c| c.value().clone())
            .unwrap_or_default())
    }

    async fn upsert_connection(&self, connection: &SocialConnection) -> Result<(), StoreError> {
        let mut rows = self
            .connections
            .entry(connection.account_id.clone())
            .or_default();

        match rows
            .iter_mut()
            .find(|c| c.user_id == connection.user_id && c.direction == connection.direction)
        {
            Some(existing) => *existing = connection.clone(),
            None => rows.push(connection.clone()),
        }
        Ok(())
    }

    async fn deactivate_connection(
        &self,
        account_id: &str,
        user_id: &str,
        direction: ConnectionDirection,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let Some(mut rows) = self.connections.get_mut(account_id) else {
            return Ok(false);
        };

        match rows
            .iter_mut()
            .find(|c| c.user_id == user_id && c.direction == direction && c.is_active)
        {
            Some(row) => {
                row.is_active = false;
                row.deactivated_at = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_social_counts(&self, account_id: &str) -> Result<Option<SocialCounts>, StoreError> {
        Ok(self.social_counts.get(account_id).map(|c| *c.value()))
    }

    async fn put_social_counts(
        &self,
        account_id: &str,
        counts: &SocialCounts,
    ) -> Result<(), StoreError> {
        self.social_counts.insert(account_id.to_string(), *counts);
        Ok(())
    }

    async fn insert_notifications(&self, notifications: &[Notification]) -> Result<(), StoreError> {
        // Validate the whole batch before touching any row.
        let mut batch_ids = HashSet::new();
        for notification in notifications {
            if !batch_ids.insert(notification.id.as_str()) {
                return Err(StoreError::Write(format!(
                    "duplicate notification id in batch: {}",
                    notification.id
                )));
            }
            let exists = self
                .notifications
                .get(&notification.account_id)
                .is_some_and(|rows| rows.iter().any(|n| n.id == notification.id));
            if exists {
                return Err(StoreError::Write(format!(
                    "notification already exists: {}",
                    notification.id
                )));
            }
        }

        for notification in notifications {
            self.notifications
                .entry(notification.account_id.clone())
                .or_default()
                .push(notification.clone());
        }
        Ok(())
    }

    async fn notifications_since(
        &self,
        account_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<NotificationKey>, StoreError> {
        Ok(self
            .notifications
            .get(account_id)
            .map(|rows| {
                rows.iter()
                    .filter(|n| n.created_at >= since)
                    .map(|n| NotificationKey {
                        change_type: n.change_type,
                        title: n.title.clone(),
                        created_at: n.created_at,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn list_notifications(&self, account_id: &str) -> Result<Vec<Notification>, StoreError> {
        let mut rows = self
            .notifications
            .get(account_id)
            .map(|rows| rows.value().clone())
            .unwrap_or_default();
        rows.sort_by_key(|n| n.created_at);
        Ok(rows)
    }
}
