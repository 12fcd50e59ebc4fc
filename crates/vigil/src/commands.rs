//! Subcommand implementations. Every command loads the state file, does its
//! work against the in-memory store and writes the state back.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use miette::Result;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tracing::{info, warn};
use vigil_llm::{ProviderConfig, ProviderRegistry};
use vigil_profile::{EngineConfig, ProfileEngine, ProfileSnapshot, SocialSnapshot, StageOutcome};
use vigil_store::{Account, MemoryStore, Store, Tweet};

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| miette::miette!("failed to read {}: {}", path.display(), e))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| miette::miette!("failed to parse {}: {}", path.display(), e))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).map_err(|e| miette::miette!("{}", e))?;
    println!("{}", text);
    Ok(())
}

async fn load_store(state: &Path) -> Result<Arc<MemoryStore>> {
    MemoryStore::load(state)
        .await
        .map_err(|e| miette::miette!("{}", e))
}

async fn save_store(store: &MemoryStore, state: &Path) -> Result<()> {
    store
        .save(state)
        .await
        .map_err(|e| miette::miette!("{}", e))
}

async fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => read_json(path).await,
        None => Ok(EngineConfig::default()),
    }
}

async fn build_engine(
    registry: &mut ProviderRegistry,
    store: &Arc<MemoryStore>,
    config_path: Option<&Path>,
    provider: &ProviderConfig,
) -> Result<ProfileEngine> {
    let config = load_config(config_path).await?;
    let providers = registry
        .resolve(provider)
        .map_err(|e| miette::miette!("{}", e))?;
    let store: Arc<dyn Store> = store.clone();
    Ok(ProfileEngine::new(store, providers, config))
}

/// Register an account, or rename it if the id is already monitored.
pub async fn add_account(state: &Path, id: &str, username: &str) -> Result<()> {
    let username = username.trim().trim_start_matches('@');
    if id.trim().is_empty() || username.is_empty() {
        return Err(miette::miette!("account id and username must not be empty"));
    }

    let store = load_store(state).await?;
    let existing = store
        .get_account(id)
        .await
        .map_err(|e| miette::miette!("{}", e))?;

    let account = Account {
        id: id.to_string(),
        username: username.to_string(),
        created_at: existing.map(|a| a.created_at).unwrap_or_else(Utc::now),
    };
    store
        .put_account(&account)
        .await
        .map_err(|e| miette::miette!("{}", e))?;
    save_store(&store, state).await?;

    info!(account_id = %account.id, username = %account.username, "account registered");
    print_json(&account)
}

/// Run the full analysis for one batch of tweets.
pub async fn analyze(
    registry: &mut ProviderRegistry,
    state: &Path,
    account_id: &str,
    tweets_path: &Path,
    previous_path: Option<&Path>,
    config_path: Option<&Path>,
    provider: &ProviderConfig,
) -> Result<()> {
    let store = load_store(state).await?;
    let engine = build_engine(registry, &store, config_path, provider).await?;

    let tweets: Vec<Tweet> = read_json(tweets_path).await?;
    let previous: Option<ProfileSnapshot> = match previous_path {
        Some(path) => Some(read_json(path).await?),
        None => None,
    };

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping at the next checkpoint");
            let _ = cancel_tx.send(true);
        }
    });

    let result = engine
        .run(account_id, tweets, previous, &cancel_rx, Utc::now())
        .await;
    interrupt.abort();

    // Work committed before a failure or cancellation stays committed.
    save_store(&store, state).await?;

    let report = result.map_err(|e| miette::miette!("{}", e))?;
    print_json(&report)
}

/// Apply a social snapshot and report notable changes.
pub async fn social(
    registry: &mut ProviderRegistry,
    state: &Path,
    account_id: &str,
    snapshot_path: &Path,
    config_path: Option<&Path>,
    provider: &ProviderConfig,
) -> Result<()> {
    let store = load_store(state).await?;
    let engine = build_engine(registry, &store, config_path, provider).await?;
    let snapshot: SocialSnapshot = read_json(snapshot_path).await?;

    let outcome = engine.process_social(account_id, snapshot, Utc::now()).await;
    save_store(&store, state).await?;
    print_json(&outcome)?;

    match outcome {
        StageOutcome::Completed(_) => Ok(()),
        StageOutcome::Failed { error } => {
            Err(miette::miette!("social detection failed: {}", error))
        }
    }
}

/// Print an account's notifications, newest first.
pub async fn notifications(state: &Path, account_id: &str, unread_only: bool) -> Result<()> {
    let store = load_store(state).await?;
    let mut notifications = store
        .list_notifications(account_id)
        .await
        .map_err(|e| miette::miette!("{}", e))?;

    if unread_only {
        notifications.retain(|n| !n.is_read);
    }
    notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    print_json(&notifications)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_add_account_persists_and_strips_at() {
        let dir = TempDir::new().unwrap();
        let state = dir.path().join("state.json");

        add_account(&state, "a1", "@alice").await.unwrap();

        let store = MemoryStore::load(&state).await.unwrap();
        let account = store.get_account("a1").await.unwrap().unwrap();
        assert_eq!(account.username, "alice");
    }

    #[tokio::test]
    async fn test_add_account_rename_keeps_created_at() {
        let dir = TempDir::new().unwrap();
        let state = dir.path().join("state.json");

        add_account(&state, "a1", "alice").await.unwrap();
        let first = MemoryStore::load(&state)
            .await
            .unwrap()
            .get_account("a1")
            .await
            .unwrap()
            .unwrap();

        add_account(&state, "a1", "alice_2").await.unwrap();
        let second = MemoryStore::load(&state)
            .await
            .unwrap()
            .get_account("a1")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(second.username, "alice_2");
        assert_eq!(second.created_at, first.created_at);
    }

    #[tokio::test]
    async fn test_add_account_rejects_empty_username() {
        let dir = TempDir::new().unwrap();
        let state = dir.path().join("state.json");
        assert!(add_account(&state, "a1", "@").await.is_err());
    }

    #[tokio::test]
    async fn test_partial_config_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(&path, r#"{"similarity_threshold": 0.8}"#)
            .await
            .unwrap();

        let config = load_config(Some(&path)).await.unwrap();
        assert_eq!(config.similarity_threshold, 0.8);
        assert_eq!(
            config.recluster_threshold,
            EngineConfig::default().recluster_threshold
        );
    }

    #[tokio::test]
    async fn test_missing_input_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let result: Result<Vec<Tweet>> = read_json(&dir.path().join("nope.json")).await;
        let message = result.unwrap_err().to_string();
        assert!(message.contains("failed to read"));
    }

    #[tokio::test]
    async fn test_engines_share_resolved_providers() {
        let store = MemoryStore::new();
        let provider = ProviderConfig {
            name: "local".to_string(),
            base_url: "http://localhost:9999/v1".to_string(),
            api_key: None,
            chat_model: "chat-small".to_string(),
            embedding_model: "embed-small".to_string(),
        };
        let mut registry = ProviderRegistry::new();

        build_engine(&mut registry, &store, None, &provider)
            .await
            .unwrap();
        build_engine(&mut registry, &store, None, &provider)
            .await
            .unwrap();
        assert_eq!(registry.resolutions(), 1);

        let other = ProviderConfig {
            chat_model: "chat-large".to_string(),
            ..provider
        };
        build_engine(&mut registry, &store, None, &other)
            .await
            .unwrap();
        assert_eq!(registry.resolutions(), 2);
    }
}
