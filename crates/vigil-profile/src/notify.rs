//! Notification titles and persistence.

use chrono::{DateTime, Utc};
use tracing::info;

use vigil_store::{ChangeType, Notification, Store};

use crate::EngineError;
use crate::change::DetectedChange;
use crate::explain::template_explanation;

/// Title for a change; the dimension follows the first `": "`.
pub fn title_for(change_type: ChangeType, dimension: &str) -> String {
    let prefix = match change_type {
        ChangeType::PersonalityDrift => "Personality Drift",
        ChangeType::TopicEmergence => "New Topic",
        ChangeType::TopicAbandonment => "Topic Abandoned",
        ChangeType::ActivityAnomaly => "Activity Anomaly",
        ChangeType::FollowerSpike => "Follower Spike",
        ChangeType::FollowerDrop => "Follower Drop",
        ChangeType::FollowingSpike => "Following Spike",
        ChangeType::NotableFollowerGained => "Notable New Follower",
        ChangeType::NotableFollowerLost => "Notable Follower Lost",
        ChangeType::NewMutualConnection => "New Mutual Connection",
    };
    format!("{}: {}", prefix, dimension)
}

/// Recover the dimension from a stored title.
pub fn dimension_from_title(title: &str) -> Option<&str> {
    title.split_once(": ").map(|(_, dimension)| dimension)
}

/// Writes changes to the store as notifications.
pub struct NotificationEmitter<'a> {
    store: &'a dyn Store,
}

impl<'a> NotificationEmitter<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// Persist every change as one batch. Nothing is stored on failure.
    pub async fn emit(
        &self,
        account_id: &str,
        changes: &[DetectedChange],
        now: DateTime<Utc>,
    ) -> Result<Vec<Notification>, EngineError> {
        if changes.is_empty() {
            return Ok(Vec::new());
        }

        let notifications: Vec<Notification> = changes
            .iter()
            .map(|change| {
                Notification::new(
                    account_id,
                    change.change_type,
                    title_for(change.change_type, &change.dimension),
                    change
                        .explanation
                        .clone()
                        .unwrap_or_else(|| template_explanation(change)),
                    now,
                )
            })
            .collect();

        self.store.insert_notifications(&notifications).await?;
        info!(account_id, count = notifications.len(), "emitted notifications");
        Ok(notifications)
    }
}
