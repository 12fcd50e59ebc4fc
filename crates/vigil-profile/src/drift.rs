//! Persistent buffer of tweets that matched no topic.

use chrono::{DateTime, Utc};
use tracing::debug;

use vigil_store::{DriftBufferEntry, Embedding, Store, StoreError};

/// View of one account's drift buffer.
pub struct DriftBuffer<'a> {
    store: &'a dyn Store,
    account_id: &'a str,
    threshold: usize,
}

impl<'a> DriftBuffer<'a> {
    pub fn new(store: &'a dyn Store, account_id: &'a str, threshold: usize) -> Self {
        Self {
            store,
            account_id,
            threshold,
        }
    }

    /// Buffer `(tweet_id, embedding)` pairs and return the new size.
    pub async fn push(
        &self,
        items: Vec<(String, Embedding)>,
        added_at: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        if !items.is_empty() {
            let entries: Vec<DriftBufferEntry> = items
                .into_iter()
                .map(|(tweet_id, embedding)| DriftBufferEntry {
                    account_id: self.account_id.to_string(),
                    tweet_id,
                    embedding,
                    added_at,
                })
                .collect();
            self.store.insert_drift_entries(&entries).await?;
        }
        let len = self.len().await?;
        debug!(account_id = self.account_id, len, "drift buffer size");
        Ok(len)
    }

    pub async fn len(&self) -> Result<usize, StoreError> {
        self.store.count_drift_entries(self.account_id).await
    }

    /// Whether a buffer of `len` entries must be re-clustered.
    pub fn is_due(&self, len: usize) -> bool {
        len >= self.threshold
    }

    pub async fn entries(&self) -> Result<Vec<DriftBufferEntry>, StoreError> {
        self.store.list_drift_entries(self.account_id).await
    }

    pub async fn clear(&self) -> Result<usize, StoreError> {
        self.store.clear_drift_entries(self.account_id).await
    }
}
