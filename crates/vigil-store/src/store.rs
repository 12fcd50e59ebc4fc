//! The storage interface the engine runs against.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    Account, ConnectionDirection, DriftBufferEntry, Notification, NotificationKey, Profile,
    SocialConnection, SocialCounts, StoreError, Tweet,
};

/// Row and key/value access for every record the engine reads or writes.
///
/// Implementations must make `insert_notifications` all-or-nothing and keep
/// connections unique per `(account_id, user_id, direction)`.
#[async_trait]
pub trait Store: Send + Sync {
    // =========================================================================
    // Accounts
    // =========================================================================

    async fn get_account(&self, account_id: &str) -> Result<Option<Account>, StoreError>;

    async fn put_account(&self, account: &Account) -> Result<(), StoreError>;

    async fn list_accounts(&self) -> Result<Vec<Account>, StoreError>;

    // =========================================================================
    // Profiles
    // =========================================================================

    async fn get_profile(&self, account_id: &str) -> Result<Option<Profile>, StoreError>;

    async fn put_profile(&self, profile: &Profile) -> Result<(), StoreError>;

    // =========================================================================
    // Tweets
    // =========================================================================

    /// Insert tweets, skipping ids already stored. Returns the number inserted.
    async fn insert_tweets(&self, account_id: &str, tweets: &[Tweet]) -> Result<usize, StoreError>;

    async fn get_tweets(&self, account_id: &str, ids: &[String]) -> Result<Vec<Tweet>, StoreError>;

    /// Most recent tweets first.
    async fn recent_tweets(&self, account_id: &str, limit: usize) -> Result<Vec<Tweet>, StoreError>;

    /// Every tweet timestamp for the account, ascending.
    async fn tweet_timestamps(&self, account_id: &str) -> Result<Vec<DateTime<Utc>>, StoreError>;

    // =========================================================================
    // Drift buffer
    // =========================================================================

    async fn insert_drift_entries(&self, entries: &[DriftBufferEntry]) -> Result<(), StoreError>;

    async fn list_drift_entries(&self, account_id: &str)
    -> Result<Vec<DriftBufferEntry>, StoreError>;

    async fn count_drift_entries(&self, account_id: &str) -> Result<usize, StoreError>;

    /// Delete every buffered entry for the account. Returns the number removed.
    async fn clear_drift_entries(&self, account_id: &str) -> Result<usize, StoreError>;

    // =========================================================================
    // Social graph
    // =========================================================================

    /// All connections for the account, active and deactivated.
    async fn list_connections(&self, account_id: &str)
    -> Result<Vec<SocialConnection>, StoreError>;

    async fn upsert_connection(&self, connection: &SocialConnection) -> Result<(), StoreError>;

    /// Soft-delete a connection. Returns false if no active row matched.
    async fn deactivate_connection(
        &self,
        account_id: &str,
        user_id: &str,
        direction: ConnectionDirection,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn get_social_counts(&self, account_id: &str) -> Result<Option<SocialCounts>, StoreError>;

    async fn put_social_counts(
        &self,
        account_id: &str,
        counts: &SocialCounts,
    ) -> Result<(), StoreError>;

    // =========================================================================
    // Notifications
    // =========================================================================

    /// Insert a batch of notifications. Either every row is stored or none is.
    async fn insert_notifications(&self, notifications: &[Notification]) -> Result<(), StoreError>;

    /// Notifications created at or after `since`.
    async fn notifications_since(
        &self,
        account_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<NotificationKey>, StoreError>;

    /// All notifications for the account, oldest first.
    async fn list_notifications(&self, account_id: &str) -> Result<Vec<Notification>, StoreError>;
}
