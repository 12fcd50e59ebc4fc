//! Core record types shared by the engine and the storage adapters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An embedding vector produced by the embedding provider.
pub type Embedding = Vec<f32>;

/// A monitored account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Stable account identifier.
    pub id: String,
    /// Handle without the leading `@`.
    pub username: String,
    pub created_at: DateTime<Utc>,
}

/// A fetched tweet. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tweet {
    pub id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_reply: bool,
    #[serde(default)]
    pub is_retweet: bool,
    #[serde(default)]
    pub is_quote: bool,
    /// Text of the quoted tweet, when this is a quote tweet and it was fetched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quoted_text: Option<String>,
}

/// Sentiment distribution of a topic. Fractions sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    pub positive: f64,
    pub neutral: f64,
    pub negative: f64,
}

impl Default for Sentiment {
    fn default() -> Self {
        Self {
            positive: 0.0,
            neutral: 1.0,
            negative: 0.0,
        }
    }
}

/// A semantic cluster of an account's tweets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub id: String,
    pub label: String,
    pub centroid: Embedding,
    /// Share of the account's content in `[0, 1]`.
    pub proportion: f64,
    pub tweet_count: u64,
    #[serde(default)]
    pub sentiment: Sentiment,
}

/// The named personality dimensions scored by the evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraitDimension {
    Openness,
    Conscientiousness,
    Extraversion,
    Agreeableness,
    Neuroticism,
    Optimism,
    Assertiveness,
}

impl TraitDimension {
    /// Every dimension, in scoring order.
    pub const ALL: [TraitDimension; 7] = [
        TraitDimension::Openness,
        TraitDimension::Conscientiousness,
        TraitDimension::Extraversion,
        TraitDimension::Agreeableness,
        TraitDimension::Neuroticism,
        TraitDimension::Optimism,
        TraitDimension::Assertiveness,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TraitDimension::Openness => "openness",
            TraitDimension::Conscientiousness => "conscientiousness",
            TraitDimension::Extraversion => "extraversion",
            TraitDimension::Agreeableness => "agreeableness",
            TraitDimension::Neuroticism => "neuroticism",
            TraitDimension::Optimism => "optimism",
            TraitDimension::Assertiveness => "assertiveness",
        }
    }
}

impl std::fmt::Display for TraitDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scores on each personality dimension, 0–100.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PersonalityScores {
    pub openness: f64,
    pub conscientiousness: f64,
    pub extraversion: f64,
    pub agreeableness: f64,
    pub neuroticism: f64,
    pub optimism: f64,
    pub assertiveness: f64,
}

impl PersonalityScores {
    /// Score for a single dimension.
    pub fn get(&self, dimension: TraitDimension) -> f64 {
        match dimension {
            TraitDimension::Openness => self.openness,
            TraitDimension::Conscientiousness => self.conscientiousness,
            TraitDimension::Extraversion => self.extraversion,
            TraitDimension::Agreeableness => self.agreeableness,
            TraitDimension::Neuroticism => self.neuroticism,
            TraitDimension::Optimism => self.optimism,
            TraitDimension::Assertiveness => self.assertiveness,
        }
    }

    /// Iterate `(dimension, score)` pairs in scoring order.
    pub fn iter(&self) -> impl Iterator<Item = (TraitDimension, f64)> + '_ {
        TraitDimension::ALL.iter().map(|d| (*d, self.get(*d)))
    }
}

/// A personality evaluation. Replaced wholesale on every evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Personality {
    pub scores: PersonalityScores,
    /// Up to five short value tags.
    pub values: Vec<String>,
    pub summary: String,
}

/// Posting cadence derived from the full tweet history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityMetrics {
    pub tweets_per_day: f64,
    pub max_silence_hours: f64,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
}

/// The evolving per-account summary maintained by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub account_id: String,
    #[serde(default)]
    pub topics: Vec<Topic>,
    #[serde(default)]
    pub personality: Option<Personality>,
    /// First-ever evaluation. Never overwritten once set.
    #[serde(default)]
    pub personality_baseline: Option<Personality>,
    #[serde(default)]
    pub activity_metrics: Option<ActivityMetrics>,
    #[serde(default)]
    pub total_tweets_processed: u64,
    #[serde(default)]
    pub last_personality_eval_at: Option<DateTime<Utc>>,
    pub last_updated_at: DateTime<Utc>,
}

impl Profile {
    /// Empty profile for an account that has never been analyzed.
    ///
    /// `last_updated_at` starts at the Unix epoch so the first run
    /// processes the full history.
    pub fn new(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            topics: Vec::new(),
            personality: None,
            personality_baseline: None,
            activity_metrics: None,
            total_tweets_processed: 0,
            last_personality_eval_at: None,
            last_updated_at: DateTime::<Utc>::default(),
        }
    }

    /// Dimensionality of the topic centroids, if any topic exists.
    pub fn embedding_dimensions(&self) -> Option<usize> {
        self.topics.first().map(|t| t.centroid.len())
    }
}

/// A tweet that matched no topic, waiting for re-clustering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftBufferEntry {
    pub account_id: String,
    pub tweet_id: String,
    pub embedding: Embedding,
    pub added_at: DateTime<Utc>,
}

/// Direction of a social connection relative to the monitored account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionDirection {
    /// The monitored account follows this user.
    Following,
    /// This user follows the monitored account.
    Follower,
    /// Both of the above.
    Mutual,
}

impl ConnectionDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionDirection::Following => "following",
            ConnectionDirection::Follower => "follower",
            ConnectionDirection::Mutual => "mutual",
        }
    }
}

/// A follower/following edge. Deactivation is a soft delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialConnection {
    pub account_id: String,
    pub user_id: String,
    pub username: String,
    pub direction: ConnectionDirection,
    #[serde(default)]
    pub follower_count: u64,
    #[serde(default)]
    pub is_blue_verified: bool,
    pub is_active: bool,
    pub first_seen_at: DateTime<Utc>,
    #[serde(default)]
    pub deactivated_at: Option<DateTime<Utc>>,
}

/// Follower/following totals recorded at the end of a social run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SocialCounts {
    pub following_count: u64,
    pub follower_count: u64,
    pub taken_at: DateTime<Utc>,
}

/// Kind of a detected change. Stored on notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    PersonalityDrift,
    TopicEmergence,
    TopicAbandonment,
    ActivityAnomaly,
    FollowerSpike,
    FollowerDrop,
    FollowingSpike,
    NotableFollowerGained,
    NotableFollowerLost,
    NewMutualConnection,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::PersonalityDrift => "personality_drift",
            ChangeType::TopicEmergence => "topic_emergence",
            ChangeType::TopicAbandonment => "topic_abandonment",
            ChangeType::ActivityAnomaly => "activity_anomaly",
            ChangeType::FollowerSpike => "follower_spike",
            ChangeType::FollowerDrop => "follower_drop",
            ChangeType::FollowingSpike => "following_spike",
            ChangeType::NotableFollowerGained => "notable_follower_gained",
            ChangeType::NotableFollowerLost => "notable_follower_lost",
            ChangeType::NewMutualConnection => "new_mutual_connection",
        }
    }
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub account_id: String,
    pub title: String,
    pub explanation: String,
    pub change_type: ChangeType,
    #[serde(default)]
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Create an unread notification with a fresh id.
    pub fn new(
        account_id: impl Into<String>,
        change_type: ChangeType,
        title: String,
        explanation: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            account_id: account_id.into(),
            title,
            explanation,
            change_type,
            is_read: false,
            created_at,
        }
    }
}

/// The projection of a notification used to rebuild suppression state.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationKey {
    pub change_type: ChangeType,
    pub title: String,
    pub created_at: DateTime<Utc>,
}
