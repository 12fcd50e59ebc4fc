//! Provider resolution.
//!
//! A [`ProviderRegistry`] turns a [`ProviderConfig`] into a ready-to-use
//! [`Providers`] bundle and keeps it until the configuration changes or the
//! caller invalidates it.

use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use crate::{ChatProvider, EmbeddingProvider, LlmError, OpenAiClient};

/// Which provider to use and how to reach it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderConfig {
    /// Name of the active provider (e.g. "openai", "local").
    pub name: String,
    /// API base URL, including any version prefix.
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub chat_model: String,
    pub embedding_model: String,
}

/// The provider handles one analysis run is built with.
#[derive(Clone)]
pub struct Providers {
    pub chat: Arc<dyn ChatProvider>,
    pub embedding: Arc<dyn EmbeddingProvider>,
    /// Model passed to every chat call.
    pub chat_model: String,
}

impl Providers {
    pub fn new(
        chat: Arc<dyn ChatProvider>,
        embedding: Arc<dyn EmbeddingProvider>,
        chat_model: impl Into<String>,
    ) -> Self {
        Self {
            chat,
            embedding,
            chat_model: chat_model.into(),
        }
    }

    /// Build HTTP-backed providers from configuration.
    pub fn from_config(config: &ProviderConfig) -> Result<Self, LlmError> {
        if config.base_url.trim().is_empty() {
            return Err(LlmError::Config("base_url is empty".to_string()));
        }
        if config.chat_model.trim().is_empty() {
            return Err(LlmError::Config("chat_model is empty".to_string()));
        }

        let client = Arc::new(OpenAiClient::new(
            config.base_url.clone(),
            config.api_key.clone(),
            config.embedding_model.clone(),
        )?);

        Ok(Self {
            chat: client.clone(),
            embedding: client,
            chat_model: config.chat_model.clone(),
        })
    }
}

impl std::fmt::Debug for Providers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Providers")
            .field("chat_model", &self.chat_model)
            .finish_non_exhaustive()
    }
}

/// Caches the resolved providers for the active configuration.
#[derive(Default)]
pub struct ProviderRegistry {
    active: Option<(ProviderConfig, Providers)>,
    resolutions: u64,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return providers for `config`, rebuilding only if it differs from the
    /// cached configuration.
    pub fn resolve(&mut self, config: &ProviderConfig) -> Result<Providers, LlmError> {
        if let Some((cached, providers)) = &self.active {
            if cached == config {
                return Ok(providers.clone());
            }
        }

        let providers = Providers::from_config(config)?;
        self.resolutions += 1;
        info!(provider = %config.name, model = %config.chat_model, "resolved providers");
        self.active = Some((config.clone(), providers.clone()));
        Ok(providers)
    }

    /// Drop the cached providers so the next `resolve` rebuilds them.
    pub fn invalidate(&mut self) {
        self.active = None;
    }

    /// Name of the provider currently cached, if any.
    pub fn active_name(&self) -> Option<&str> {
        self.active.as_ref().map(|(config, _)| config.name.as_str())
    }

    /// How many times providers have been built.
    pub fn resolutions(&self) -> u64 {
        self.resolutions
    }
}
