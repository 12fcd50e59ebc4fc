//! Repeat-notification suppression.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use vigil_store::{ChangeType, NotificationKey, Store, StoreError};

use crate::change::DetectedChange;
use crate::notify::dimension_from_title;

/// `(change type, dimension)` pairs notified within the suppression window.
#[derive(Debug, Clone, Default)]
pub struct SuppressionFilter {
    keys: HashSet<(ChangeType, String)>,
}

impl SuppressionFilter {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_notifications(notifications: &[NotificationKey]) -> Self {
        let keys = notifications
            .iter()
            .filter_map(|n| {
                dimension_from_title(&n.title).map(|d| (n.change_type, d.to_string()))
            })
            .collect();
        Self { keys }
    }

    /// Rebuild the filter from notifications created at or after
    /// `now - window`.
    pub async fn load(
        store: &dyn Store,
        account_id: &str,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<Self, StoreError> {
        let recent = store.notifications_since(account_id, now - window).await?;
        let filter = Self::from_notifications(&recent);
        debug!(account_id, keys = filter.len(), "loaded suppression keys");
        Ok(filter)
    }

    pub fn is_suppressed(&self, change_type: ChangeType, dimension: &str) -> bool {
        self.keys.contains(&(change_type, dimension.to_string()))
    }

    /// Drop suppressed changes and duplicates within the batch. Returns the
    /// survivors and the number dropped.
    pub fn apply(&self, changes: Vec<DetectedChange>) -> (Vec<DetectedChange>, usize) {
        let mut seen = HashSet::new();
        let before = changes.len();
        let kept: Vec<DetectedChange> = changes
            .into_iter()
            .filter(|c| {
                !self.is_suppressed(c.change_type, &c.dimension)
                    && seen.insert((c.change_type, c.dimension.clone()))
            })
            .collect();
        let dropped = before - kept.len();
        (kept, dropped)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use vigil_store::{MemoryStore, Notification};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 2, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_apply_drops_suppressed_and_duplicates() {
        let filter = SuppressionFilter::from_notifications(&[NotificationKey {
            change_type: ChangeType::PersonalityDrift,
            title: "Personality Drift: openness".to_string(),
            created_at: now(),
        }]);

        let (kept, dropped) = filter.apply(vec![
            DetectedChange::new(ChangeType::PersonalityDrift, "openness"),
            DetectedChange::new(ChangeType::PersonalityDrift, "optimism"),
            DetectedChange::new(ChangeType::PersonalityDrift, "optimism"),
            DetectedChange::new(ChangeType::TopicEmergence, "openness"),
        ]);

        assert_eq!(dropped, 2);
        let dims: Vec<_> = kept.iter().map(|c| (c.change_type, c.dimension.as_str())).collect();
        assert_eq!(
            dims,
            vec![
                (ChangeType::PersonalityDrift, "optimism"),
                (ChangeType::TopicEmergence, "openness")
            ]
        );
    }

    #[tokio::test]
    async fn test_window_cutoff_is_inclusive() {
        let store = MemoryStore::new();
        let at_cutoff = Notification::new(
            "acct",
            ChangeType::FollowerSpike,
            "Follower Spike: count".to_string(),
            String::new(),
            now() - Duration::hours(24),
        );
        store.insert_notifications(&[at_cutoff]).await.unwrap();

        let filter = SuppressionFilter::load(store.as_ref(), "acct", now(), Duration::hours(24))
            .await
            .unwrap();
        assert!(filter.is_suppressed(ChangeType::FollowerSpike, "count"));

        let later = now() + Duration::seconds(1);
        let filter = SuppressionFilter::load(store.as_ref(), "acct", later, Duration::hours(24))
            .await
            .unwrap();
        assert!(filter.is_empty());
    }
}
