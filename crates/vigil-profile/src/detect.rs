//! Profile change detection against a baseline and a prior snapshot.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use vigil_store::{ActivityMetrics, ChangeType, PersonalityScores, Profile, Topic};

use crate::EngineConfig;
use crate::change::DetectedChange;
use crate::suppression::SuppressionFilter;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicSnapshot {
    pub id: String,
    pub label: String,
    pub proportion: f64,
}

impl From<&Topic> for TopicSnapshot {
    fn from(topic: &Topic) -> Self {
        Self {
            id: topic.id.clone(),
            label: topic.label.clone(),
            proportion: topic.proportion,
        }
    }
}

/// The parts of a profile that detection compares against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    #[serde(default)]
    pub personality_baseline: Option<PersonalityScores>,
    #[serde(default)]
    pub topics: Vec<TopicSnapshot>,
    #[serde(default)]
    pub activity_metrics: Option<ActivityMetrics>,
    pub taken_at: DateTime<Utc>,
}

impl ProfileSnapshot {
    pub fn capture(profile: &Profile, taken_at: DateTime<Utc>) -> Self {
        Self {
            personality_baseline: profile.personality_baseline.as_ref().map(|p| p.scores),
            topics: profile.topics.iter().map(TopicSnapshot::from).collect(),
            activity_metrics: profile.activity_metrics.clone(),
            taken_at,
        }
    }
}

/// Result of one detection pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Detection {
    /// No personality baseline existed yet; nothing was compared.
    pub is_baseline: bool,
    pub changes: Vec<DetectedChange>,
    pub suppressed: usize,
}

pub struct ProfileChangeDetector<'a> {
    config: &'a EngineConfig,
}

impl<'a> ProfileChangeDetector<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Compare `profile` with the previous snapshot.
    ///
    /// The personality baseline comes from `previous` when it is supplied and
    /// from the profile otherwise. Topic and activity changes need a previous
    /// snapshot.
    pub fn detect(
        &self,
        profile: &Profile,
        previous: Option<&ProfileSnapshot>,
        suppression: &SuppressionFilter,
    ) -> Detection {
        let baseline = match previous {
            Some(snapshot) => snapshot.personality_baseline,
            None => profile.personality_baseline.as_ref().map(|p| p.scores),
        };
        let Some(baseline) = baseline else {
            debug!(account_id = %profile.account_id, "no personality baseline yet");
            return Detection {
                is_baseline: true,
                ..Default::default()
            };
        };

        let mut changes = Vec::new();
        if let Some(current) = &profile.personality {
            changes.extend(self.personality_drift(&baseline, &current.scores));
        }
        if let Some(previous) = previous {
            changes.extend(self.topic_changes(&previous.topics, &profile.topics));
            if let (Some(prev), Some(cur)) = (&previous.activity_metrics, &profile.activity_metrics)
            {
                changes.extend(self.activity_changes(prev, cur));
            }
        }

        let (changes, suppressed) = suppression.apply(changes);
        Detection {
            is_baseline: false,
            changes,
            suppressed,
        }
    }

    fn personality_drift(
        &self,
        baseline: &PersonalityScores,
        current: &PersonalityScores,
    ) -> Vec<DetectedChange> {
        current
            .iter()
            .filter_map(|(dimension, score)| {
                let before = baseline.get(dimension);
                let drift = (score - before).abs();
                if drift <= self.config.personality_drift_threshold {
                    return None;
                }
                let direction = if score > before { "increase" } else { "decrease" };
                Some(
                    DetectedChange::new(ChangeType::PersonalityDrift, dimension.as_str())
                        .values(before, score)
                        .metadata(json!({ "direction": direction, "drift": drift })),
                )
            })
            .collect()
    }

    fn topic_changes(&self, previous: &[TopicSnapshot], current: &[Topic]) -> Vec<DetectedChange> {
        let mut changes = Vec::new();
        let before: HashMap<&str, &TopicSnapshot> =
            previous.iter().map(|t| (t.id.as_str(), t)).collect();
        let after: HashMap<&str, &Topic> = current.iter().map(|t| (t.id.as_str(), t)).collect();

        for topic in current {
            if !before.contains_key(topic.id.as_str())
                && topic.proportion > self.config.topic_emergence_threshold
            {
                let mut change = DetectedChange::new(ChangeType::TopicEmergence, &topic.label)
                    .metadata(json!({ "topic_id": topic.id, "tweet_count": topic.tweet_count }));
                change.after_value = Some(topic.proportion);
                changes.push(change);
            }
        }

        for prev in previous {
            if prev.proportion <= self.config.topic_abandonment_min_proportion {
                continue;
            }
            match after.get(prev.id.as_str()) {
                None => {
                    let mut change = DetectedChange::new(ChangeType::TopicAbandonment, &prev.label)
                        .metadata(json!({ "topic_id": prev.id, "removed": true }));
                    change.before_value = Some(prev.proportion);
                    changes.push(change);
                }
                Some(cur) => {
                    let decline = (prev.proportion - cur.proportion) / prev.proportion;
                    if decline > self.config.topic_decline_ratio {
                        changes.push(
                            DetectedChange::new(ChangeType::TopicAbandonment, &prev.label)
                                .values(prev.proportion, cur.proportion)
                                .metadata(json!({ "topic_id": prev.id, "decline": decline })),
                        );
                    }
                }
            }
        }

        changes
    }

    fn activity_changes(
        &self,
        previous: &ActivityMetrics,
        current: &ActivityMetrics,
    ) -> Vec<DetectedChange> {
        let ratio = self.config.activity_ratio;
        let mut changes = Vec::new();
        let (prev_rate, cur_rate) = (previous.tweets_per_day, current.tweets_per_day);

        if cur_rate > ratio * prev_rate {
            changes.push(
                DetectedChange::new(ChangeType::ActivityAnomaly, "tweets_per_day_spike")
                    .values(prev_rate, cur_rate)
                    .metadata(json!({ "metric": "tweets_per_day" })),
            );
        } else if prev_rate > ratio * cur_rate {
            changes.push(
                DetectedChange::new(ChangeType::ActivityAnomaly, "tweets_per_day_drop")
                    .values(prev_rate, cur_rate)
                    .metadata(json!({ "metric": "tweets_per_day" })),
            );
        }

        let (prev_silence, cur_silence) = (previous.max_silence_hours, current.max_silence_hours);
        if prev_silence > 0.0 && cur_silence > ratio * prev_silence {
            changes.push(
                DetectedChange::new(ChangeType::ActivityAnomaly, "unusual_silence")
                    .values(prev_silence, cur_silence)
                    .metadata(json!({ "metric": "max_silence_hours" })),
            );
        }

        changes
    }
}
