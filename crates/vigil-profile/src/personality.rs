//! Periodic personality evaluation.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{info, instrument, warn};

use vigil_llm::Providers;
use vigil_store::{Personality, PersonalityScores, Profile, Store, Tweet};

use crate::weighting::TemporalWeighting;
use crate::{EngineConfig, EngineError, prompt};

/// Most value tags accepted from the model.
pub const MAX_VALUES: usize = 5;

/// Whether a profile that has processed `total` tweets is due an evaluation.
pub fn should_re_evaluate(
    total: u64,
    last_eval_at: Option<DateTime<Utc>>,
    cadence: u64,
) -> bool {
    match last_eval_at {
        None => total > 0,
        Some(_) => cadence > 0 && total % cadence == 0,
    }
}

/// Whether moving from `before` to `after` passed a multiple of `cadence`
/// without landing on one.
pub fn skipped_cadence(before: u64, after: u64, cadence: u64) -> bool {
    cadence > 0 && after > before && after / cadence > before / cadence && after % cadence != 0
}

/// Pick at most `limit` tweets, highest temporal weight first. Equal weights
/// keep their input order.
pub fn select_sample(
    mut tweets: Vec<Tweet>,
    now: DateTime<Utc>,
    limit: usize,
    weighting: &TemporalWeighting,
) -> Vec<Tweet> {
    if tweets.len() <= limit {
        return tweets;
    }
    let mut weighted: Vec<(f64, Tweet)> = tweets
        .drain(..)
        .map(|t| (weighting.weight(t.created_at, now, t.is_reply), t))
        .collect();
    weighted.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    weighted.truncate(limit);
    weighted.into_iter().map(|(_, t)| t).collect()
}

#[derive(Deserialize)]
struct PersonalityBody {
    scores: ScoresBody,
    #[serde(default)]
    values: Vec<String>,
    summary: String,
}

#[derive(Deserialize)]
struct ScoresBody {
    openness: f64,
    conscientiousness: f64,
    extraversion: f64,
    agreeableness: f64,
    neuroticism: f64,
    optimism: f64,
    assertiveness: f64,
}

/// Parse and validate a personality response.
pub fn parse_personality(text: &str) -> Result<Personality, EngineError> {
    let json = prompt::extract_json_object(text)
        .ok_or_else(|| EngineError::InvalidPersonality("no JSON object in response".to_string()))?;
    let body: PersonalityBody = serde_json::from_str(json)
        .map_err(|e| EngineError::InvalidPersonality(e.to_string()))?;

    let scores = PersonalityScores {
        openness: body.scores.openness,
        conscientiousness: body.scores.conscientiousness,
        extraversion: body.scores.extraversion,
        agreeableness: body.scores.agreeableness,
        neuroticism: body.scores.neuroticism,
        optimism: body.scores.optimism,
        assertiveness: body.scores.assertiveness,
    };
    for (dimension, score) in scores.iter() {
        if !score.is_finite() || !(0.0..=100.0).contains(&score) {
            return Err(EngineError::InvalidPersonality(format!(
                "{} score {} is outside 0-100",
                dimension, score
            )));
        }
    }

    let values: Vec<String> = body
        .values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect();
    if values.len() > MAX_VALUES {
        return Err(EngineError::InvalidPersonality(format!(
            "{} value tags, at most {} allowed",
            values.len(),
            MAX_VALUES
        )));
    }

    let summary = body.summary.trim().to_string();
    if summary.is_empty() {
        return Err(EngineError::InvalidPersonality("empty summary".to_string()));
    }

    Ok(Personality {
        scores,
        values,
        summary,
    })
}

pub struct PersonalityEvaluator<'a> {
    store: &'a dyn Store,
    providers: &'a Providers,
    config: &'a EngineConfig,
}

impl<'a> PersonalityEvaluator<'a> {
    pub fn new(store: &'a dyn Store, providers: &'a Providers, config: &'a EngineConfig) -> Self {
        Self {
            store,
            providers,
            config,
        }
    }

    /// Evaluate the account's recent tweets and update `profile` in place.
    ///
    /// The first evaluation also becomes the baseline, which is never
    /// replaced afterwards. The caller persists the profile.
    #[instrument(skip_all, fields(account_id = %profile.account_id))]
    pub async fn evaluate(
        &self,
        profile: &mut Profile,
        username: &str,
        now: DateTime<Utc>,
    ) -> Result<Personality, EngineError> {
        let recent = self
            .store
            .recent_tweets(&profile.account_id, self.config.personality_fetch_limit)
            .await?;
        let sample = select_sample(
            recent,
            now,
            self.config.personality_sample_size,
            &TemporalWeighting::from_config(self.config),
        );
        if sample.is_empty() {
            warn!("no stored tweets to evaluate");
        }

        let messages = prompt::personality_messages(username, &sample);
        let response = self
            .providers
            .chat
            .chat(&self.providers.chat_model, &messages)
            .await?;
        let personality = parse_personality(&response.text)?;

        if profile.personality_baseline.is_none() {
            info!("recorded personality baseline");
            profile.personality_baseline = Some(personality.clone());
        }
        profile.personality = Some(personality.clone());
        profile.last_personality_eval_at = Some(now);

        info!(sample = sample.len(), "evaluated personality");
        Ok(personality)
    }
}
