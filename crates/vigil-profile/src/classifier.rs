//! Topic assignment for incoming tweets.
//!
//! A profile with no topics is bootstrapped by clustering the whole batch.
//! Afterwards each tweet either joins its most similar topic or waits in the
//! drift buffer; a full buffer is re-clustered into new topics in the same
//! call.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument};

use vigil_llm::Providers;
use vigil_store::{Embedding, Profile, Store, Topic, Tweet};

use crate::cluster::{Cluster, Clusterer, blend_centroid, cosine_similarity};
use crate::drift::DriftBuffer;
use crate::labeling::TopicLabeler;
use crate::weighting::TemporalWeighting;
use crate::{EngineConfig, EngineError};

/// A tweet paired with its embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedTweet {
    pub tweet: Tweet,
    pub embedding: Embedding,
}

/// A topic created by bootstrap or re-clustering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewTopic {
    pub id: String,
    pub label: String,
    pub tweet_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReclusterSummary {
    /// Buffered tweets consumed.
    pub consumed: usize,
    pub new_topics: Vec<NewTopic>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClassificationSummary {
    pub bootstrapped: bool,
    pub processed: usize,
    pub matched: usize,
    pub drifted: usize,
    /// Topics installed by bootstrap.
    pub new_topics: Vec<NewTopic>,
    pub recluster: Option<ReclusterSummary>,
}

/// Index of the most similar topic if it clears `threshold`. Ties keep the
/// first topic.
pub fn best_topic(topics: &[Topic], embedding: &[f32], threshold: f64) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (index, topic) in topics.iter().enumerate() {
        let similarity = cosine_similarity(&topic.centroid, embedding);
        if best.is_none_or(|(_, s)| similarity > s) {
            best = Some((index, similarity));
        }
    }
    best.filter(|(_, similarity)| *similarity >= threshold)
}

/// Recompute every topic's proportion from its tweet count.
pub fn renormalize(topics: &mut [Topic]) {
    let total: u64 = topics.iter().map(|t| t.tweet_count).sum();
    let count = topics.len();
    for topic in topics.iter_mut() {
        topic.proportion = if total == 0 {
            1.0 / count as f64
        } else {
            topic.tweet_count as f64 / total as f64
        };
    }
}

pub struct IncrementalClassifier<'a> {
    store: &'a dyn Store,
    providers: &'a Providers,
    config: &'a EngineConfig,
}

impl<'a> IncrementalClassifier<'a> {
    pub fn new(store: &'a dyn Store, providers: &'a Providers, config: &'a EngineConfig) -> Self {
        Self {
            store,
            providers,
            config,
        }
    }

    /// Classify a batch, persist the profile, and re-cluster the drift buffer
    /// if it reached the threshold.
    #[instrument(skip_all, fields(account_id = %profile.account_id, batch = tweets.len()))]
    pub async fn classify(
        &self,
        profile: &mut Profile,
        tweets: &[EmbeddedTweet],
        now: DateTime<Utc>,
    ) -> Result<ClassificationSummary, EngineError> {
        if tweets.is_empty() {
            return Ok(ClassificationSummary::default());
        }

        let expected = profile
            .embedding_dimensions()
            .unwrap_or(tweets[0].embedding.len());
        for t in tweets {
            if t.embedding.len() != expected {
                return Err(EngineError::DimensionMismatch {
                    expected,
                    actual: t.embedding.len(),
                });
            }
        }

        if profile.topics.is_empty() {
            return self.bootstrap(profile, tweets, now).await;
        }

        let mut summary = ClassificationSummary {
            processed: tweets.len(),
            ..Default::default()
        };
        let mut drifted = Vec::new();

        for t in tweets {
            match best_topic(&profile.topics, &t.embedding, self.config.similarity_threshold) {
                Some((index, similarity)) => {
                    let topic = &mut profile.topics[index];
                    blend_centroid(&mut topic.centroid, &t.embedding, topic.tweet_count);
                    topic.tweet_count += 1;
                    summary.matched += 1;
                    debug!(tweet_id = %t.tweet.id, topic = %topic.label, similarity, "assigned tweet");
                }
                None => {
                    debug!(tweet_id = %t.tweet.id, "tweet drifted");
                    drifted.push((t.tweet.id.clone(), t.embedding.clone()));
                }
            }
        }
        summary.drifted = drifted.len();

        renormalize(&mut profile.topics);
        profile.total_tweets_processed += tweets.len() as u64;
        profile.last_updated_at = now;
        self.store.put_profile(profile).await?;

        let buffer = DriftBuffer::new(
            self.store,
            &profile.account_id,
            self.config.recluster_threshold,
        );
        let buffered = buffer.push(drifted, now).await?;

        info!(
            matched = summary.matched,
            drifted = summary.drifted,
            buffered,
            "classified batch"
        );

        if buffer.is_due(buffered) {
            summary.recluster = Some(self.recluster(profile).await?);
        }

        Ok(summary)
    }

    async fn bootstrap(
        &self,
        profile: &mut Profile,
        tweets: &[EmbeddedTweet],
        now: DateTime<Utc>,
    ) -> Result<ClassificationSummary, EngineError> {
        let weighting = TemporalWeighting::from_config(self.config);
        let items: Vec<(String, Embedding)> = tweets
            .iter()
            .map(|t| (t.tweet.id.clone(), t.embedding.clone()))
            .collect();
        let weights: Vec<f64> = tweets
            .iter()
            .map(|t| weighting.weight(t.tweet.created_at, now, t.tweet.is_reply))
            .collect();

        let clusters = Clusterer::from_config(self.config).cluster(&items, Some(&weights))?;

        let texts: HashMap<&str, &str> = tweets
            .iter()
            .map(|t| (t.tweet.id.as_str(), t.tweet.text.as_str()))
            .collect();
        let topics = self.build_topics(&clusters, &texts, 0).await;

        let new_topics: Vec<NewTopic> = topics.iter().map(new_topic).collect();
        profile.topics = topics;
        profile.total_tweets_processed += tweets.len() as u64;
        profile.last_updated_at = now;
        self.store.put_profile(profile).await?;

        info!(topics = new_topics.len(), "bootstrapped topics");
        Ok(ClassificationSummary {
            bootstrapped: true,
            processed: tweets.len(),
            new_topics,
            ..Default::default()
        })
    }

    /// Cluster the drift buffer into new topics and append them.
    ///
    /// The buffer is cleared only after the profile has been written.
    #[instrument(skip_all, fields(account_id = %profile.account_id))]
    pub async fn recluster(&self, profile: &mut Profile) -> Result<ReclusterSummary, EngineError> {
        let buffer = DriftBuffer::new(
            self.store,
            &profile.account_id,
            self.config.recluster_threshold,
        );
        let entries = buffer.entries().await?;
        if entries.is_empty() {
            return Ok(ReclusterSummary::default());
        }

        if let Some(expected) = profile.embedding_dimensions() {
            if let Some(bad) = entries.iter().find(|e| e.embedding.len() != expected) {
                return Err(EngineError::DimensionMismatch {
                    expected,
                    actual: bad.embedding.len(),
                });
            }
        }

        let items: Vec<(String, Embedding)> = entries
            .into_iter()
            .map(|e| (e.tweet_id, e.embedding))
            .collect();
        let clusters = Clusterer::from_config(self.config).cluster(&items, None)?;

        let ids: Vec<String> = items.iter().map(|(id, _)| id.clone()).collect();
        let stored = self.store.get_tweets(&profile.account_id, &ids).await?;
        let texts: HashMap<&str, &str> = stored
            .iter()
            .map(|t| (t.id.as_str(), t.text.as_str()))
            .collect();

        let topics = self
            .build_topics(&clusters, &texts, profile.topics.len())
            .await;
        let new_topics: Vec<NewTopic> = topics.iter().map(new_topic).collect();

        profile.topics.extend(topics);
        renormalize(&mut profile.topics);
        self.store.put_profile(profile).await?;
        let consumed = buffer.clear().await?;

        info!(consumed, new_topics = new_topics.len(), "re-clustered drift buffer");
        Ok(ReclusterSummary {
            consumed,
            new_topics,
        })
    }

    /// Label each cluster and turn it into a topic. `existing` offsets the
    /// ordinal used in placeholder labels.
    async fn build_topics(
        &self,
        clusters: &[Cluster],
        texts: &HashMap<&str, &str>,
        existing: usize,
    ) -> Vec<Topic> {
        let labeler = TopicLabeler::new(self.providers, self.config.label_sample_size);
        let mut topics = Vec::with_capacity(clusters.len());

        for (index, cluster) in clusters.iter().enumerate() {
            let samples: Vec<String> = cluster
                .member_ids
                .iter()
                .filter_map(|id| texts.get(id.as_str()).map(|t| t.to_string()))
                .collect();
            let (label, sentiment) = labeler.describe(&samples, existing + index + 1).await;

            topics.push(Topic {
                id: uuid::Uuid::new_v4().to_string(),
                label,
                centroid: cluster.centroid.clone(),
                proportion: cluster.proportion,
                tweet_count: cluster.member_ids.len() as u64,
                sentiment,
            });
        }

        topics
    }
}

fn new_topic(topic: &Topic) -> NewTopic {
    NewTopic {
        id: topic.id.clone(),
        label: topic.label.clone(),
        tweet_count: topic.tweet_count,
    }
}
