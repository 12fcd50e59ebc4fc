//! Fakes shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use vigil_llm::{
    ChatMessage, ChatProvider, ChatResponse, EmbeddingProvider, EmbeddingResponse, LlmError,
    Providers, TokenUsage,
};
use vigil_store::{
    Account, ConnectionDirection, DriftBufferEntry, MemoryStore, Notification, NotificationKey,
    Profile, SocialConnection, SocialCounts, Store, StoreError, Tweet,
};

pub const PERSONALITY: &str = r#"{"scores": {"openness": 70, "conscientiousness": 55,
    "extraversion": 40, "agreeableness": 65, "neuroticism": 30, "optimism": 60,
    "assertiveness": 50}, "values": ["curiosity"], "summary": "Curious and steady."}"#;

type Reply = dyn Fn(&[ChatMessage]) -> Result<String, LlmError> + Send + Sync;

/// Chat provider that answers from a closure and records system prompts.
pub struct ScriptedChat {
    reply: Box<Reply>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedChat {
    pub fn new(
        reply: impl Fn(&[ChatMessage]) -> Result<String, LlmError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            reply: Box::new(reply),
            prompts: Mutex::new(Vec::new()),
        })
    }

    /// Answers every prompt kind with a well-formed response.
    pub fn happy() -> Arc<Self> {
        Self::new(default_reply)
    }

    pub fn calls_containing(&self, needle: &str) -> usize {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.contains(needle))
            .count()
    }
}

pub fn default_reply(messages: &[ChatMessage]) -> Result<String, LlmError> {
    let system = &messages[0].content;
    let reply = if system.contains("personality") {
        PERSONALITY
    } else if system.contains("name the topic") {
        "General chatter"
    } else if system.contains("sentiment") {
        r#"{"positive": 0.2, "neutral": 0.7, "negative": 0.1}"#
    } else {
        "Posting picked up sharply."
    };
    Ok(reply.to_string())
}

#[async_trait]
impl ChatProvider for ScriptedChat {
    async fn chat(&self, _model: &str, messages: &[ChatMessage]) -> Result<ChatResponse, LlmError> {
        self.prompts.lock().unwrap().push(messages[0].content.clone());
        let text = (self.reply)(messages)?;
        Ok(ChatResponse {
            text,
            usage: TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
            },
        })
    }
}

/// Embeds each text with a caller-supplied function.
pub struct FnEmbedder(pub Box<dyn Fn(&str) -> Vec<f32> + Send + Sync>);

#[async_trait]
impl EmbeddingProvider for FnEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<EmbeddingResponse, LlmError> {
        Ok(EmbeddingResponse {
            vectors: texts.iter().map(|t| (self.0)(t)).collect(),
            usage: TokenUsage {
                prompt_tokens: texts.len() as u64,
                completion_tokens: 0,
            },
        })
    }
}

/// Every text embeds to the same vector.
pub fn constant_embedder() -> Arc<FnEmbedder> {
    Arc::new(FnEmbedder(Box::new(|_| vec![1.0, 0.0, 0.0])))
}

/// `"basis N ..."` embeds to the N-th unit vector of `dims` dimensions.
pub fn basis_embedder(dims: usize) -> Arc<FnEmbedder> {
    Arc::new(FnEmbedder(Box::new(move |text| {
        let index: usize = text
            .split_whitespace()
            .nth(1)
            .and_then(|n| n.parse().ok())
            .unwrap_or(0);
        let mut v = vec![0.0; dims];
        v[index % dims] = 1.0;
        v
    })))
}

pub fn providers(chat: Arc<ScriptedChat>, embedding: Arc<FnEmbedder>) -> Providers {
    Providers::new(chat, embedding, "chat-test")
}

pub fn epoch_day(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::days(day as i64)
}

pub fn tweet(id: &str, text: &str, created_at: DateTime<Utc>) -> Tweet {
    Tweet {
        id: id.to_string(),
        text: text.to_string(),
        created_at,
        is_reply: false,
        is_retweet: false,
        is_quote: false,
        quoted_text: None,
    }
}

pub async fn store_with_account(id: &str, username: &str) -> Arc<MemoryStore> {
    let store = MemoryStore::new();
    store
        .put_account(&Account {
            id: id.to_string(),
            username: username.to_string(),
            created_at: epoch_day(0),
        })
        .await
        .unwrap();
    store
}

/// Delegates to a `MemoryStore` and fails selected writes on demand.
pub struct FaultyStore {
    pub inner: Arc<MemoryStore>,
    /// Every `put_profile` fails while set.
    pub fail_put_profile: AtomicBool,
    /// The next this many `insert_notifications` calls fail.
    pub notification_failures: AtomicUsize,
}

impl FaultyStore {
    pub fn new(inner: Arc<MemoryStore>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            fail_put_profile: AtomicBool::new(false),
            notification_failures: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Store for FaultyStore {
    async fn get_account(&self, account_id: &str) -> Result<Option<Account>, StoreError> {
        self.inner.get_account(account_id).await
    }

    async fn put_account(&self, account: &Account) -> Result<(), StoreError> {
        self.inner.put_account(account).await
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, StoreError> {
        self.inner.list_accounts().await
    }

    async fn get_profile(&self, account_id: &str) -> Result<Option<Profile>, StoreError> {
        self.inner.get_profile(account_id).await
    }

    async fn put_profile(&self, profile: &Profile) -> Result<(), StoreError> {
        if self.fail_put_profile.load(Ordering::SeqCst) {
            return Err(StoreError::Write("profile write rejected".to_string()));
        }
        self.inner.put_profile(profile).await
    }

    async fn insert_tweets(&self, account_id: &str, tweets: &[Tweet]) -> Result<usize, StoreError> {
        self.inner.insert_tweets(account_id, tweets).await
    }

    async fn get_tweets(&self, account_id: &str, ids: &[String]) -> Result<Vec<Tweet>, StoreError> {
        self.inner.get_tweets(account_id, ids).await
    }

    async fn recent_tweets(&self, account_id: &str, limit: usize) -> Result<Vec<Tweet>, StoreError> {
        self.inner.recent_tweets(account_id, limit).await
    }

    async fn tweet_timestamps(&self, account_id: &str) -> Result<Vec<DateTime<Utc>>, StoreError> {
        self.inner.tweet_timestamps(account_id).await
    }

    async fn insert_drift_entries(&self, entries: &[DriftBufferEntry]) -> Result<(), StoreError> {
        self.inner.insert_drift_entries(entries).await
    }

    async fn list_drift_entries(
        &self,
        account_id: &str,
    ) -> Result<Vec<DriftBufferEntry>, StoreError> {
        self.inner.list_drift_entries(account_id).await
    }

    async fn count_drift_entries(&self, account_id: &str) -> Result<usize, StoreError> {
        self.inner.count_drift_entries(account_id).await
    }

    async fn clear_drift_entries(&self, account_id: &str) -> Result<usize, StoreError> {
        self.inner.clear_drift_entries(account_id).await
    }

    async fn list_connections(
        &self,
        account_id: &str,
    ) -> Result<Vec<SocialConnection>, StoreError> {
        self.inner.list_connections(account_id).await
    }

    async fn upsert_connection(&self, connection: &SocialConnection) -> Result<(), StoreError> {
        self.inner.upsert_connection(connection).await
    }

    async fn deactivate_connection(
        &self,
        account_id: &str,
        user_id: &str,
        direction: ConnectionDirection,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.inner
            .deactivate_connection(account_id, user_id, direction, at)
            .await
    }

    async fn get_social_counts(&self, account_id: &str) -> Result<Option<SocialCounts>, StoreError> {
        self.inner.get_social_counts(account_id).await
    }

    async fn put_social_counts(
        &self,
        account_id: &str,
        counts: &SocialCounts,
    ) -> Result<(), StoreError> {
        self.inner.put_social_counts(account_id, counts).await
    }

    async fn insert_notifications(&self, notifications: &[Notification]) -> Result<(), StoreError> {
        let failing = self
            .notification_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StoreError::Write("notification insert rejected".to_string()));
        }
        self.inner.insert_notifications(notifications).await
    }

    async fn notifications_since(
        &self,
        account_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<NotificationKey>, StoreError> {
        self.inner.notifications_since(account_id, since).await
    }

    async fn list_notifications(&self, account_id: &str) -> Result<Vec<Notification>, StoreError> {
        self.inner.list_notifications(account_id).await
    }
}
