//! Incremental profile analysis and change detection for monitored accounts.
//!
//! This crate provides:
//! - Temporal weighting and k-means topic bootstrap
//! - Incremental topic classification with a drift buffer
//! - Activity metrics and periodic personality evaluation
//! - Profile and social change detection with 24h suppression
//! - Notification emission with LLM or template explanations

pub mod activity;
pub mod change;
pub mod classifier;
pub mod cluster;
mod config;
pub mod detect;
pub mod drift;
mod engine;
mod error;
pub mod explain;
pub mod labeling;
pub mod notify;
pub mod personality;
mod prompt;
pub mod social;
pub mod suppression;
pub mod weighting;

pub use change::DetectedChange;
pub use classifier::{ClassificationSummary, EmbeddedTweet, IncrementalClassifier, NewTopic};
pub use config::EngineConfig;
pub use detect::{Detection, ProfileChangeDetector, ProfileSnapshot, TopicSnapshot};
pub use engine::{
    Checkpoint, DetectionSummary, PersonalityOutcome, ProcessSummary, ProfileEngine, RunReport,
    SocialSummary, StageOutcome,
};
pub use error::EngineError;
pub use social::{
    ConnectionChange, ConnectionPlan, SocialSignalDetector, SocialSnapshot, apply_connection_diff,
    plan_connection_diff,
};
pub use suppression::SuppressionFilter;
pub use weighting::TemporalWeighting;
