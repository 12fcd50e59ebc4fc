//! Topic labels and sentiment through the chat provider.

use serde::Deserialize;
use tracing::warn;

use vigil_llm::{LlmError, Providers};
use vigil_store::Sentiment;

use crate::prompt;

#[derive(Deserialize)]
struct SentimentBody {
    positive: f64,
    neutral: f64,
    negative: f64,
}

/// Names and scores clusters of tweets.
pub struct TopicLabeler<'a> {
    providers: &'a Providers,
    sample_size: usize,
}

impl<'a> TopicLabeler<'a> {
    pub fn new(providers: &'a Providers, sample_size: usize) -> Self {
        Self {
            providers,
            sample_size,
        }
    }

    pub async fn label(&self, texts: &[String]) -> Result<String, LlmError> {
        let messages = prompt::label_messages(self.sample(texts));
        let response = self
            .providers
            .chat
            .chat(&self.providers.chat_model, &messages)
            .await?;
        prompt::clean_label(&response.text)
            .ok_or_else(|| LlmError::InvalidResponse("empty topic label".to_string()))
    }

    pub async fn sentiment(&self, texts: &[String]) -> Result<Sentiment, LlmError> {
        let messages = prompt::sentiment_messages(self.sample(texts));
        let response = self
            .providers
            .chat
            .chat(&self.providers.chat_model, &messages)
            .await?;
        parse_sentiment(&response.text)
    }

    /// Label and sentiment for one cluster, degrading to a numbered
    /// placeholder and neutral sentiment when the provider fails.
    pub async fn describe(&self, texts: &[String], ordinal: usize) -> (String, Sentiment) {
        let label = if texts.is_empty() {
            fallback_label(ordinal)
        } else {
            match self.label(texts).await {
                Ok(label) => label,
                Err(e) => {
                    warn!(error = %e, ordinal, "topic labeling failed, using placeholder");
                    fallback_label(ordinal)
                }
            }
        };

        let sentiment = if texts.is_empty() {
            Sentiment::default()
        } else {
            match self.sentiment(texts).await {
                Ok(sentiment) => sentiment,
                Err(e) => {
                    warn!(error = %e, ordinal, "sentiment scoring failed, assuming neutral");
                    Sentiment::default()
                }
            }
        };

        (label, sentiment)
    }

    fn sample<'t>(&self, texts: &'t [String]) -> &'t [String] {
        &texts[..texts.len().min(self.sample_size)]
    }
}

pub fn fallback_label(ordinal: usize) -> String {
    format!("Untitled topic {}", ordinal)
}

/// Parse a sentiment object and normalize it to sum to 1.
pub fn parse_sentiment(text: &str) -> Result<Sentiment, LlmError> {
    let json = prompt::extract_json_object(text)
        .ok_or_else(|| LlmError::InvalidResponse("sentiment is not a JSON object".to_string()))?;
    let body: SentimentBody = serde_json::from_str(json)?;

    let parts = [body.positive, body.neutral, body.negative];
    if parts.iter().any(|p| !p.is_finite() || *p < 0.0) {
        return Err(LlmError::InvalidResponse(format!(
            "sentiment fractions out of range: {:?}",
            parts
        )));
    }
    let total: f64 = parts.iter().sum();
    if total <= 0.0 {
        return Err(LlmError::InvalidResponse("sentiment sums to zero".to_string()));
    }

    Ok(Sentiment {
        positive: body.positive / total,
        neutral: body.neutral / total,
        negative: body.negative / total,
    })
}
