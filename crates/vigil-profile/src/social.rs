//! Follower graph bookkeeping and social signal detection.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use vigil_store::{
    ChangeType, ConnectionDirection, SocialConnection, SocialCounts, Store, StoreError,
};

use crate::EngineConfig;
use crate::change::DetectedChange;
use crate::explain::template_explanation;
use crate::suppression::SuppressionFilter;

/// A user who started or stopped following, or was followed or unfollowed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionChange {
    pub user_id: String,
    pub username: String,
    pub direction: ConnectionDirection,
    #[serde(default)]
    pub follower_count: u64,
    #[serde(default)]
    pub is_blue_verified: bool,
}

/// What the social-graph fetcher observed since the previous run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialSnapshot {
    pub following_count: u64,
    pub follower_count: u64,
    #[serde(default)]
    pub added: Vec<ConnectionChange>,
    #[serde(default)]
    pub removed: Vec<ConnectionChange>,
}

impl SocialSnapshot {
    pub fn counts(&self, taken_at: DateTime<Utc>) -> SocialCounts {
        SocialCounts {
            following_count: self.following_count,
            follower_count: self.follower_count,
            taken_at,
        }
    }
}

/// Outcome of applying a snapshot's diffs to the stored connections.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConnectionDiff {
    pub added: usize,
    pub removed: usize,
    /// Users who gained a mutual row in this pass.
    pub new_mutuals: Vec<ConnectionChange>,
}

/// A write to the stored connections.
#[derive(Debug, Clone, PartialEq)]
enum ConnectionWrite {
    Upsert(SocialConnection),
    Deactivate {
        user_id: String,
        direction: ConnectionDirection,
    },
}

/// Connection writes worked out from a snapshot but not yet stored.
///
/// Detection reads [`ConnectionPlan::diff`]; the writes are committed once
/// the resulting notifications have been persisted, so a failed run leaves
/// the stored graph untouched and the same diff is seen again.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionPlan {
    pub diff: ConnectionDiff,
    writes: Vec<ConnectionWrite>,
}

impl ConnectionPlan {
    /// Number of pending writes.
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Apply the pending writes in order.
    pub async fn commit(
        self,
        store: &dyn Store,
        account_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ConnectionDiff, StoreError> {
        for write in &self.writes {
            match write {
                ConnectionWrite::Upsert(row) => store.upsert_connection(row).await?,
                ConnectionWrite::Deactivate { user_id, direction } => {
                    store
                        .deactivate_connection(account_id, user_id, *direction, now)
                        .await?;
                }
            }
        }

        info!(
            account_id,
            added = self.diff.added,
            removed = self.diff.removed,
            new_mutuals = self.diff.new_mutuals.len(),
            "applied connection diff"
        );
        Ok(self.diff)
    }
}

/// Replace the row keyed by `(user_id, direction)` or append it.
fn put_row(rows: &mut Vec<SocialConnection>, row: SocialConnection) {
    match rows
        .iter_mut()
        .find(|r| r.user_id == row.user_id && r.direction == row.direction)
    {
        Some(existing) => *existing = row,
        None => rows.push(row),
    }
}

/// Work out the writes that apply added and removed connections and bring
/// mutual rows in line with the active following and follower rows.
pub fn plan_connection_diff(
    existing: &[SocialConnection],
    account_id: &str,
    snapshot: &SocialSnapshot,
    now: DateTime<Utc>,
) -> ConnectionPlan {
    let mut rows = existing.to_vec();
    let mut plan = ConnectionPlan::default();

    for change in &snapshot.added {
        if change.direction == ConnectionDirection::Mutual {
            warn!(user_id = %change.user_id, "ignoring added connection with mutual direction");
            continue;
        }
        let first_seen_at = rows
            .iter()
            .find(|r| r.user_id == change.user_id && r.direction == change.direction)
            .map(|r| r.first_seen_at)
            .unwrap_or(now);
        let row = SocialConnection {
            account_id: account_id.to_string(),
            user_id: change.user_id.clone(),
            username: change.username.clone(),
            direction: change.direction,
            follower_count: change.follower_count,
            is_blue_verified: change.is_blue_verified,
            is_active: true,
            first_seen_at,
            deactivated_at: None,
        };
        put_row(&mut rows, row.clone());
        plan.writes.push(ConnectionWrite::Upsert(row));
        plan.diff.added += 1;
    }

    for change in &snapshot.removed {
        let active = rows.iter_mut().find(|r| {
            r.user_id == change.user_id && r.direction == change.direction && r.is_active
        });
        if let Some(row) = active {
            row.is_active = false;
            row.deactivated_at = Some(now);
            plan.writes.push(ConnectionWrite::Deactivate {
                user_id: change.user_id.clone(),
                direction: change.direction,
            });
            plan.diff.removed += 1;
        }
    }

    let mut following: BTreeMap<&str, &SocialConnection> = BTreeMap::new();
    let mut followers: BTreeMap<&str, &SocialConnection> = BTreeMap::new();
    let mut mutual_rows: BTreeMap<&str, &SocialConnection> = BTreeMap::new();
    for row in &rows {
        match row.direction {
            ConnectionDirection::Following if row.is_active => {
                following.insert(row.user_id.as_str(), row);
            }
            ConnectionDirection::Follower if row.is_active => {
                followers.insert(row.user_id.as_str(), row);
            }
            ConnectionDirection::Mutual => {
                mutual_rows.insert(row.user_id.as_str(), row);
            }
            _ => {}
        }
    }

    for (user_id, follower) in &followers {
        if !following.contains_key(user_id) {
            continue;
        }
        let previous = mutual_rows.get(user_id);
        if previous.is_some_and(|m| m.is_active) {
            continue;
        }

        let row = SocialConnection {
            direction: ConnectionDirection::Mutual,
            is_active: true,
            first_seen_at: previous.map(|m| m.first_seen_at).unwrap_or(now),
            deactivated_at: None,
            ..(*follower).clone()
        };
        debug!(account_id, user_id, "new mutual connection");
        plan.diff.new_mutuals.push(ConnectionChange {
            user_id: row.user_id.clone(),
            username: row.username.clone(),
            direction: ConnectionDirection::Mutual,
            follower_count: row.follower_count,
            is_blue_verified: row.is_blue_verified,
        });
        plan.writes.push(ConnectionWrite::Upsert(row));
    }

    for (user_id, row) in &mutual_rows {
        if row.is_active && !(following.contains_key(user_id) && followers.contains_key(user_id)) {
            plan.writes.push(ConnectionWrite::Deactivate {
                user_id: user_id.to_string(),
                direction: ConnectionDirection::Mutual,
            });
        }
    }

    plan
}

/// Plan and immediately commit a snapshot's connection changes.
pub async fn apply_connection_diff(
    store: &dyn Store,
    account_id: &str,
    snapshot: &SocialSnapshot,
    now: DateTime<Utc>,
) -> Result<ConnectionDiff, StoreError> {
    let existing = store.list_connections(account_id).await?;
    plan_connection_diff(&existing, account_id, snapshot, now)
        .commit(store, account_id, now)
        .await
}

/// Result of one social detection pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SocialDetection {
    /// No previous counts existed; nothing was compared.
    pub is_baseline: bool,
    pub changes: Vec<DetectedChange>,
    pub suppressed: usize,
}

/// `current * 100 > other * percent`, in exact integer arithmetic.
fn exceeds_percent(current: u64, other: u64, percent: u64) -> bool {
    current as u128 * 100 > other as u128 * percent as u128
}

pub struct SocialSignalDetector<'a> {
    config: &'a EngineConfig,
}

impl<'a> SocialSignalDetector<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    fn is_notable(&self, change: &ConnectionChange) -> bool {
        change.is_blue_verified || change.follower_count > self.config.notable_follower_count
    }

    /// Detect social changes. `monitored` holds the ids and lowercased
    /// usernames of every monitored account.
    pub fn detect(
        &self,
        snapshot: &SocialSnapshot,
        previous: Option<&SocialCounts>,
        new_mutuals: &[ConnectionChange],
        monitored: &HashSet<String>,
        suppression: &SuppressionFilter,
    ) -> SocialDetection {
        let Some(previous) = previous else {
            return SocialDetection {
                is_baseline: true,
                ..Default::default()
            };
        };

        let mut changes = Vec::new();
        let pct = self.config.follower_change_percent;
        let (prev_followers, cur_followers) = (previous.follower_count, snapshot.follower_count);

        if prev_followers > 0 {
            if exceeds_percent(cur_followers, prev_followers, pct) {
                changes.push(
                    DetectedChange::new(ChangeType::FollowerSpike, "count")
                        .values(prev_followers as f64, cur_followers as f64),
                );
            } else if exceeds_percent(prev_followers, cur_followers, pct) {
                changes.push(
                    DetectedChange::new(ChangeType::FollowerDrop, "count")
                        .values(prev_followers as f64, cur_followers as f64),
                );
            }
        }

        let (prev_following, cur_following) = (previous.following_count, snapshot.following_count);
        if prev_following > 0
            && exceeds_percent(cur_following, prev_following, self.config.following_spike_percent)
        {
            changes.push(
                DetectedChange::new(ChangeType::FollowingSpike, "count")
                    .values(prev_following as f64, cur_following as f64),
            );
        }

        for change in &snapshot.added {
            if change.direction == ConnectionDirection::Follower && self.is_notable(change) {
                changes.push(user_change(ChangeType::NotableFollowerGained, change));
            }
        }
        for change in &snapshot.removed {
            if change.direction == ConnectionDirection::Follower && self.is_notable(change) {
                changes.push(user_change(ChangeType::NotableFollowerLost, change));
            }
        }
        for change in new_mutuals {
            let is_monitored = monitored.contains(&change.user_id)
                || monitored.contains(&change.username.to_lowercase());
            if self.is_notable(change) || is_monitored {
                changes.push(
                    user_change(ChangeType::NewMutualConnection, change)
                        .metadata(json!({
                            "follower_count": change.follower_count,
                            "is_blue_verified": change.is_blue_verified,
                            "monitored": is_monitored,
                        })),
                );
            }
        }

        let changes = changes
            .into_iter()
            .map(|c| {
                let text = template_explanation(&c);
                c.explained(text)
            })
            .collect();
        let (changes, suppressed) = suppression.apply(changes);

        SocialDetection {
            is_baseline: false,
            changes,
            suppressed,
        }
    }
}

fn user_change(change_type: ChangeType, change: &ConnectionChange) -> DetectedChange {
    DetectedChange::new(change_type, format!("@{}", change.username)).metadata(json!({
        "user_id": change.user_id,
        "follower_count": change.follower_count,
        "is_blue_verified": change.is_blue_verified,
    }))
}
