//! The per-account analysis pipeline.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, instrument, warn};

use vigil_llm::{ChatProvider, MeteredChat, Providers, TokenUsage, UsageMeter, embed_all};
use vigil_store::{Account, ActivityMetrics, Notification, Profile, Store, Tweet};

use crate::activity;
use crate::classifier::{ClassificationSummary, EmbeddedTweet, IncrementalClassifier};
use crate::detect::{Detection, ProfileChangeDetector, ProfileSnapshot};
use crate::explain::Explainer;
use crate::notify::NotificationEmitter;
use crate::personality::{self, PersonalityEvaluator};
use crate::social::{ConnectionDiff, SocialSignalDetector, SocialSnapshot, plan_connection_diff};
use crate::suppression::SuppressionFilter;
use crate::{EngineConfig, EngineError};

/// Points in a run where cancellation is observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Checkpoint {
    PostFetch,
    PostEmbedding,
    PostClassification,
    PostDetection,
}

impl std::fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Checkpoint::PostFetch => "post_fetch",
            Checkpoint::PostEmbedding => "post_embedding",
            Checkpoint::PostClassification => "post_classification",
            Checkpoint::PostDetection => "post_detection",
        };
        f.write_str(s)
    }
}

/// Outcome of a stage whose failure does not abort the run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome<T> {
    Completed(T),
    Failed { error: String },
}

impl<T> StageOutcome<T> {
    pub fn completed(&self) -> Option<&T> {
        match self {
            StageOutcome::Completed(value) => Some(value),
            StageOutcome::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PersonalityOutcome {
    NotDue,
    Evaluated { baseline_set: bool },
    /// The provider failed; the profile is unchanged.
    Skipped { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessSummary {
    pub received: usize,
    /// Tweets newer than the profile's last update.
    pub fresh: usize,
    pub stored: usize,
    pub skipped_empty: usize,
    pub classification: ClassificationSummary,
    pub activity: ActivityMetrics,
    pub personality: PersonalityOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionSummary {
    pub is_baseline: bool,
    pub suppressed: usize,
    pub notifications: Vec<Notification>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SocialSummary {
    pub is_baseline: bool,
    pub diff: ConnectionDiff,
    pub suppressed: usize,
    pub notifications: Vec<Notification>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub account_id: String,
    pub processing: ProcessSummary,
    pub detection: StageOutcome<DetectionSummary>,
    pub token_usage: TokenUsage,
}

fn checkpoint(
    cancel: Option<&watch::Receiver<bool>>,
    checkpoint: Checkpoint,
) -> Result<(), EngineError> {
    if cancel.is_some_and(|rx| *rx.borrow()) {
        info!(%checkpoint, "run cancelled");
        return Err(EngineError::Cancelled { checkpoint });
    }
    Ok(())
}

fn usage_since(before: TokenUsage, after: TokenUsage) -> TokenUsage {
    TokenUsage {
        prompt_tokens: after.prompt_tokens.saturating_sub(before.prompt_tokens),
        completion_tokens: after
            .completion_tokens
            .saturating_sub(before.completion_tokens),
    }
}

/// Analyzes accounts against a shared store.
///
/// Runs for one account must not overlap; different accounts may run
/// concurrently on the same store.
pub struct ProfileEngine {
    store: Arc<dyn Store>,
    providers: Providers,
    config: EngineConfig,
    usage: Arc<UsageMeter>,
}

impl ProfileEngine {
    pub fn new(store: Arc<dyn Store>, providers: Providers, config: EngineConfig) -> Self {
        let usage = UsageMeter::new();
        let chat: Arc<dyn ChatProvider> =
            Arc::new(MeteredChat::new(providers.chat.clone(), usage.clone()));
        let providers = Providers { chat, ..providers };
        Self {
            store,
            providers,
            config,
            usage,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Tokens consumed by this engine so far.
    pub fn token_usage(&self) -> TokenUsage {
        self.usage.total()
    }

    async fn account(&self, account_id: &str) -> Result<Account, EngineError> {
        self.store
            .get_account(account_id)
            .await?
            .ok_or_else(|| EngineError::AccountNotFound(account_id.to_string()))
    }

    async fn require_profile(&self, account_id: &str) -> Result<Profile, EngineError> {
        self.store
            .get_profile(account_id)
            .await?
            .ok_or_else(|| EngineError::ProfileNotFound(account_id.to_string()))
    }

    async fn profile_or_new(&self, account_id: &str) -> Result<Profile, EngineError> {
        Ok(self
            .store
            .get_profile(account_id)
            .await?
            .unwrap_or_else(|| Profile::new(account_id)))
    }

    /// Full analysis with cancellation checkpoints.
    ///
    /// `previous` overrides the snapshot detection compares against; by
    /// default the profile is captured before any tweet is processed.
    #[instrument(skip(self, tweets, previous, cancel), fields(batch = tweets.len()))]
    pub async fn run(
        &self,
        account_id: &str,
        tweets: Vec<Tweet>,
        previous: Option<ProfileSnapshot>,
        cancel: &watch::Receiver<bool>,
        now: DateTime<Utc>,
    ) -> Result<RunReport, EngineError> {
        let usage_before = self.token_usage();
        let account = self.account(account_id).await?;
        let profile = self.profile_or_new(account_id).await?;
        let snapshot = previous.unwrap_or_else(|| ProfileSnapshot::capture(&profile, now));
        checkpoint(Some(cancel), Checkpoint::PostFetch)?;

        let processing = self
            .process(&account, profile, tweets, now, Some(cancel))
            .await?;

        let detection = match self.detect(&account, Some(&snapshot), now).await {
            Ok(detection) => {
                checkpoint(Some(cancel), Checkpoint::PostDetection)?;
                self.notify(&account, detection, now).await
            }
            Err(e) => {
                warn!(error = %e, "profile change detection failed");
                StageOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };

        let report = RunReport {
            account_id: account.id.clone(),
            processing,
            detection,
            token_usage: usage_since(usage_before, self.token_usage()),
        };
        info!(tokens = report.token_usage.total(), "run complete");
        Ok(report)
    }

    /// Store, embed and classify tweets, then refresh activity and
    /// personality.
    #[instrument(skip(self, tweets), fields(batch = tweets.len()))]
    pub async fn process_tweets(
        &self,
        account_id: &str,
        tweets: Vec<Tweet>,
        now: DateTime<Utc>,
    ) -> Result<ProcessSummary, EngineError> {
        let account = self.account(account_id).await?;
        let profile = self.profile_or_new(account_id).await?;
        self.process(&account, profile, tweets, now, None).await
    }

    async fn process(
        &self,
        account: &Account,
        mut profile: Profile,
        tweets: Vec<Tweet>,
        now: DateTime<Utc>,
        cancel: Option<&watch::Receiver<bool>>,
    ) -> Result<ProcessSummary, EngineError> {
        let received = tweets.len();
        let previous_total = profile.total_tweets_processed;

        let mut seen = HashSet::new();
        let fresh: Vec<Tweet> = tweets
            .into_iter()
            .filter(|t| t.created_at > profile.last_updated_at && seen.insert(t.id.clone()))
            .collect();
        let stored = self.store.insert_tweets(&account.id, &fresh).await?;

        let (texts, skipped_empty): (Vec<Tweet>, Vec<Tweet>) = fresh
            .iter()
            .cloned()
            .partition(|t| !t.text.trim().is_empty());
        let inputs: Vec<String> = texts.iter().map(|t| t.text.clone()).collect();
        let embeddings = embed_all(self.providers.embedding.as_ref(), &inputs).await?;
        self.usage.record(embeddings.usage);
        checkpoint(cancel, Checkpoint::PostEmbedding)?;

        let embedded: Vec<EmbeddedTweet> = texts
            .into_iter()
            .zip(embeddings.vectors)
            .map(|(tweet, embedding)| EmbeddedTweet { tweet, embedding })
            .collect();

        let classification = if embedded.is_empty() {
            self.store.put_profile(&profile).await?;
            ClassificationSummary::default()
        } else {
            IncrementalClassifier::new(self.store.as_ref(), &self.providers, &self.config)
                .classify(&mut profile, &embedded, now)
                .await?
        };
        checkpoint(cancel, Checkpoint::PostClassification)?;

        let activity = self.refresh_activity(&account.id, now).await?;
        let personality = self
            .maybe_evaluate_personality(&account.id, previous_total, now)
            .await?;

        info!(
            received,
            fresh = fresh.len(),
            stored,
            skipped_empty = skipped_empty.len(),
            "processed tweets"
        );
        Ok(ProcessSummary {
            received,
            fresh: fresh.len(),
            stored,
            skipped_empty: skipped_empty.len(),
            classification,
            activity,
            personality,
        })
    }

    /// Classify already-embedded tweets into the account's topics.
    #[instrument(skip(self, tweets), fields(batch = tweets.len()))]
    pub async fn classify(
        &self,
        account_id: &str,
        tweets: &[EmbeddedTweet],
        now: DateTime<Utc>,
    ) -> Result<ClassificationSummary, EngineError> {
        self.account(account_id).await?;
        let mut profile = self.profile_or_new(account_id).await?;
        IncrementalClassifier::new(self.store.as_ref(), &self.providers, &self.config)
            .classify(&mut profile, tweets, now)
            .await
    }

    /// Recompute activity metrics from the stored tweet history.
    #[instrument(skip(self))]
    pub async fn refresh_activity(
        &self,
        account_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ActivityMetrics, EngineError> {
        let mut profile = self.require_profile(account_id).await?;
        let timestamps = self.store.tweet_timestamps(account_id).await?;
        let metrics = activity::compute(&timestamps, now);
        profile.activity_metrics = Some(metrics.clone());
        self.store.put_profile(&profile).await?;
        info!(
            tweets_per_day = metrics.tweets_per_day,
            max_silence_hours = metrics.max_silence_hours,
            "refreshed activity"
        );
        Ok(metrics)
    }

    /// Evaluate personality if this batch reached the cadence.
    ///
    /// Provider failures leave the profile untouched and are reported as
    /// skipped; a response that fails validation is an error.
    #[instrument(skip(self))]
    pub async fn maybe_evaluate_personality(
        &self,
        account_id: &str,
        previous_total: u64,
        now: DateTime<Utc>,
    ) -> Result<PersonalityOutcome, EngineError> {
        let account = self.account(account_id).await?;
        let mut profile = self.require_profile(account_id).await?;
        let total = profile.total_tweets_processed;
        let cadence = self.config.personality_cadence;

        if total == previous_total {
            return Ok(PersonalityOutcome::NotDue);
        }
        if personality::skipped_cadence(previous_total, total, cadence) {
            warn!(
                previous_total,
                total,
                cadence,
                "batch crossed the personality cadence without landing on it"
            );
        }
        if !personality::should_re_evaluate(total, profile.last_personality_eval_at, cadence) {
            return Ok(PersonalityOutcome::NotDue);
        }

        let baseline_missing = profile.personality_baseline.is_none();
        let evaluator =
            PersonalityEvaluator::new(self.store.as_ref(), &self.providers, &self.config);
        match evaluator.evaluate(&mut profile, &account.username, now).await {
            Ok(_) => {
                self.store.put_profile(&profile).await?;
                Ok(PersonalityOutcome::Evaluated {
                    baseline_set: baseline_missing,
                })
            }
            Err(EngineError::Llm(e)) => {
                warn!(error = %e, "personality evaluation skipped");
                Ok(PersonalityOutcome::Skipped {
                    error: e.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Detect, explain and persist profile changes. Never fails the caller.
    #[instrument(skip(self, previous))]
    pub async fn detect_profile_changes(
        &self,
        account_id: &str,
        previous: Option<&ProfileSnapshot>,
        now: DateTime<Utc>,
    ) -> StageOutcome<DetectionSummary> {
        let account = match self.account(account_id).await {
            Ok(account) => account,
            Err(e) => {
                return StageOutcome::Failed {
                    error: e.to_string(),
                };
            }
        };
        match self.detect(&account, previous, now).await {
            Ok(detection) => self.notify(&account, detection, now).await,
            Err(e) => {
                warn!(error = %e, "profile change detection failed");
                StageOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    async fn detect(
        &self,
        account: &Account,
        previous: Option<&ProfileSnapshot>,
        now: DateTime<Utc>,
    ) -> Result<Detection, EngineError> {
        let profile = self.require_profile(&account.id).await?;
        let suppression = SuppressionFilter::load(
            self.store.as_ref(),
            &account.id,
            now,
            self.config.suppression_window(),
        )
        .await?;
        let detection =
            ProfileChangeDetector::new(&self.config).detect(&profile, previous, &suppression);
        info!(
            is_baseline = detection.is_baseline,
            changes = detection.changes.len(),
            suppressed = detection.suppressed,
            "detected profile changes"
        );
        Ok(detection)
    }

    async fn notify(
        &self,
        account: &Account,
        detection: Detection,
        now: DateTime<Utc>,
    ) -> StageOutcome<DetectionSummary> {
        let changes = Explainer::new(&self.providers)
            .explain_all(&account.username, detection.changes)
            .await;
        match NotificationEmitter::new(self.store.as_ref())
            .emit(&account.id, &changes, now)
            .await
        {
            Ok(notifications) => StageOutcome::Completed(DetectionSummary {
                is_baseline: detection.is_baseline,
                suppressed: detection.suppressed,
                notifications,
            }),
            Err(e) => {
                warn!(error = %e, "failed to persist notifications");
                StageOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    /// Apply a social snapshot and notify on notable changes. Never fails the
    /// caller.
    #[instrument(skip(self, snapshot))]
    pub async fn process_social(
        &self,
        account_id: &str,
        snapshot: SocialSnapshot,
        now: DateTime<Utc>,
    ) -> StageOutcome<SocialSummary> {
        match self.try_process_social(account_id, &snapshot, now).await {
            Ok(summary) => StageOutcome::Completed(summary),
            Err(e) => {
                warn!(error = %e, "social detection failed");
                StageOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    async fn try_process_social(
        &self,
        account_id: &str,
        snapshot: &SocialSnapshot,
        now: DateTime<Utc>,
    ) -> Result<SocialSummary, EngineError> {
        let account = self.account(account_id).await?;
        let previous = self.store.get_social_counts(account_id).await?;
        let existing = self.store.list_connections(account_id).await?;
        let plan = plan_connection_diff(&existing, account_id, snapshot, now);

        let monitored: HashSet<String> = self
            .store
            .list_accounts()
            .await?
            .into_iter()
            .filter(|a| a.id != account.id)
            .flat_map(|a| [a.id, a.username.to_lowercase()])
            .collect();
        let suppression = SuppressionFilter::load(
            self.store.as_ref(),
            account_id,
            now,
            self.config.suppression_window(),
        )
        .await?;

        let detection = SocialSignalDetector::new(&self.config).detect(
            snapshot,
            previous.as_ref(),
            &plan.diff.new_mutuals,
            &monitored,
            &suppression,
        );
        let notifications = NotificationEmitter::new(self.store.as_ref())
            .emit(account_id, &detection.changes, now)
            .await?;
        // Connections and counts are written only once the notifications are.
        let diff = plan.commit(self.store.as_ref(), account_id, now).await?;
        self.store
            .put_social_counts(account_id, &snapshot.counts(now))
            .await?;

        info!(
            is_baseline = detection.is_baseline,
            notifications = notifications.len(),
            suppressed = detection.suppressed,
            "processed social snapshot"
        );
        Ok(SocialSummary {
            is_baseline: detection.is_baseline,
            diff,
            suppressed: detection.suppressed,
            notifications,
        })
    }
}
