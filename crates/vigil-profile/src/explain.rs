//! Human-readable explanations for detected changes.

use futures_util::future::join_all;
use tracing::{debug, warn};

use vigil_llm::{LlmError, Providers};
use vigil_store::ChangeType;

use crate::change::DetectedChange;
use crate::notify::title_for;
use crate::prompt;

fn percent(value: Option<f64>) -> String {
    format!("{:.0}%", value.unwrap_or(0.0) * 100.0)
}

fn count(value: Option<f64>) -> String {
    format!("{:.0}", value.unwrap_or(0.0))
}

/// Deterministic explanation built from the change's own values.
pub fn template_explanation(change: &DetectedChange) -> String {
    let (before, after) = (change.before_value, change.after_value);
    let d = &change.dimension;
    match change.change_type {
        ChangeType::PersonalityDrift => {
            let direction = if after.unwrap_or(0.0) >= before.unwrap_or(0.0) {
                "increased"
            } else {
                "decreased"
            };
            format!(
                "{} has {} from a baseline of {} to {}.",
                d,
                direction,
                count(before),
                count(after)
            )
        }
        ChangeType::TopicEmergence => format!(
            "A new topic \"{}\" now makes up {} of the account's content.",
            d,
            percent(after)
        ),
        ChangeType::TopicAbandonment => match after {
            Some(_) => format!(
                "The topic \"{}\" fell from {} to {} of the account's content.",
                d,
                percent(before),
                percent(after)
            ),
            None => format!(
                "The topic \"{}\" ({} of content) is no longer present.",
                d,
                percent(before)
            ),
        },
        ChangeType::ActivityAnomaly => match d.as_str() {
            "unusual_silence" => format!(
                "The longest silence grew from {:.1} to {:.1} hours.",
                before.unwrap_or(0.0),
                after.unwrap_or(0.0)
            ),
            _ => format!(
                "Posting rate changed from {:.2} to {:.2} tweets per day.",
                before.unwrap_or(0.0),
                after.unwrap_or(0.0)
            ),
        },
        ChangeType::FollowerSpike | ChangeType::FollowerDrop => format!(
            "Follower count went from {} to {}.",
            count(before),
            count(after)
        ),
        ChangeType::FollowingSpike => format!(
            "Following count went from {} to {}.",
            count(before),
            count(after)
        ),
        ChangeType::NotableFollowerGained => format!("{} started following the account.", d),
        ChangeType::NotableFollowerLost => format!("{} stopped following the account.", d),
        ChangeType::NewMutualConnection => {
            format!("{} and the account now follow each other.", d)
        }
    }
}

/// Asks the chat provider to explain changes, one request per change.
pub struct Explainer<'a> {
    providers: &'a Providers,
}

impl<'a> Explainer<'a> {
    pub fn new(providers: &'a Providers) -> Self {
        Self { providers }
    }

    /// Explain every change concurrently. Changes that already carry an
    /// explanation are left alone; provider failures fall back to the
    /// template.
    pub async fn explain_all(
        &self,
        username: &str,
        changes: Vec<DetectedChange>,
    ) -> Vec<DetectedChange> {
        join_all(changes.into_iter().map(|change| async move {
            if change.explanation.is_some() {
                return change;
            }
            match self.explain(username, &change).await {
                Ok(text) => change.explained(text),
                Err(e) => {
                    warn!(
                        error = %e,
                        change_type = %change.change_type,
                        dimension = %change.dimension,
                        "explanation failed, using template"
                    );
                    let text = template_explanation(&change);
                    change.explained(text)
                }
            }
        }))
        .await
    }

    async fn explain(&self, username: &str, change: &DetectedChange) -> Result<String, LlmError> {
        let details = format!(
            "{} Metadata: {}",
            template_explanation(change),
            change.metadata
        );
        let messages = prompt::explanation_messages(
            username,
            &title_for(change.change_type, &change.dimension),
            &details,
        );
        let response = self
            .providers
            .chat
            .chat(&self.providers.chat_model, &messages)
            .await?;

        let text = response.text.trim();
        if text.is_empty() {
            return Err(LlmError::InvalidResponse("empty explanation".to_string()));
        }
        debug!(change_type = %change.change_type, "explained change");
        Ok(text.to_string())
    }
}
