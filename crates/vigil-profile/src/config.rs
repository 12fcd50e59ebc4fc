//! Engine thresholds.

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Every tunable threshold used by the engine.
///
/// Missing fields deserialize to their defaults, so a partial TOML or JSON
/// document only needs the values it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Half-life of the temporal weighting, in days.
    pub half_life_days: f64,
    /// Multiplier applied to replies.
    pub reply_weight: f64,

    pub min_clusters: usize,
    pub max_clusters: usize,
    /// Seed for k-means++ initialization.
    pub kmeans_seed: u64,
    pub kmeans_max_iterations: u64,
    pub kmeans_tolerance: f64,

    /// Minimum cosine similarity for a tweet to join an existing topic.
    pub similarity_threshold: f64,
    /// Drift buffer size that triggers re-clustering.
    pub recluster_threshold: usize,
    /// Tweets sampled per cluster when asking for a label.
    pub label_sample_size: usize,

    /// Re-evaluate personality every this many processed tweets.
    pub personality_cadence: u64,
    pub personality_fetch_limit: usize,
    pub personality_sample_size: usize,

    /// Absolute score change (0–100 scale) that counts as drift.
    pub personality_drift_threshold: f64,
    pub topic_emergence_threshold: f64,
    /// Previous proportion a topic must exceed to be reported as abandoned.
    pub topic_abandonment_min_proportion: f64,
    /// Relative decline that counts as abandonment for a surviving topic.
    pub topic_decline_ratio: f64,
    pub activity_ratio: f64,

    /// Follower spike/drop threshold, in percent of the other count.
    pub follower_change_percent: u64,
    pub following_spike_percent: u64,
    /// Followers above which a user is notable.
    pub notable_follower_count: u64,

    pub suppression_window_hours: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            half_life_days: 90.0,
            reply_weight: 0.5,
            min_clusters: 2,
            max_clusters: 15,
            kmeans_seed: 42,
            kmeans_max_iterations: 300,
            kmeans_tolerance: 1e-4,
            similarity_threshold: 0.75,
            recluster_threshold: 50,
            label_sample_size: 10,
            personality_cadence: 50,
            personality_fetch_limit: 200,
            personality_sample_size: 60,
            personality_drift_threshold: 15.0,
            topic_emergence_threshold: 0.15,
            topic_abandonment_min_proportion: 0.05,
            topic_decline_ratio: 0.5,
            activity_ratio: 2.0,
            follower_change_percent: 120,
            following_spike_percent: 130,
            notable_follower_count: 10_000,
            suppression_window_hours: 24,
        }
    }
}

impl EngineConfig {
    pub fn suppression_window(&self) -> Duration {
        Duration::hours(self.suppression_window_hours)
    }
}
