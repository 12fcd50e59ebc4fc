//! Vigil - incremental profile analysis and change detection for monitored
//! accounts.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vigil_llm::{ProviderConfig, ProviderRegistry};

mod commands;

#[derive(Parser)]
#[command(name = "vigil")]
#[command(about = "Track how monitored accounts change over time")]
struct Cli {
    /// JSON state file shared by every command.
    #[arg(
        long,
        global = true,
        env = "VIGIL_STATE",
        default_value = "vigil-state.json"
    )]
    state: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start monitoring an account
    AddAccount {
        #[arg(long)]
        id: String,

        #[arg(long)]
        username: String,
    },

    /// Process a batch of fetched tweets and detect profile changes
    Analyze {
        #[arg(long)]
        account: String,

        /// JSON array of tweets
        #[arg(long)]
        tweets: PathBuf,

        /// Snapshot to compare against instead of the stored profile
        #[arg(long)]
        previous: Option<PathBuf>,

        /// Engine thresholds as JSON; missing fields keep their defaults
        #[arg(long, env = "VIGIL_CONFIG")]
        config: Option<PathBuf>,

        #[command(flatten)]
        provider: ProviderArgs,
    },

    /// Apply a social-graph snapshot and detect notable changes
    Social {
        #[arg(long)]
        account: String,

        /// JSON social snapshot (counts plus added and removed connections)
        #[arg(long)]
        snapshot: PathBuf,

        #[arg(long, env = "VIGIL_CONFIG")]
        config: Option<PathBuf>,

        #[command(flatten)]
        provider: ProviderArgs,
    },

    /// List notifications for an account
    Notifications {
        #[arg(long)]
        account: String,

        /// Only show unread notifications
        #[arg(long)]
        unread: bool,
    },
}

#[derive(Args)]
struct ProviderArgs {
    #[arg(long, env = "VIGIL_PROVIDER", default_value = "openai")]
    provider_name: String,

    #[arg(long, env = "VIGIL_API_BASE", default_value = "https://api.openai.com/v1")]
    api_base: String,

    #[arg(long, env = "VIGIL_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[arg(long, env = "VIGIL_CHAT_MODEL", default_value = "gpt-4o-mini")]
    chat_model: String,

    #[arg(
        long,
        env = "VIGIL_EMBEDDING_MODEL",
        default_value = "text-embedding-3-small"
    )]
    embedding_model: String,
}

impl ProviderArgs {
    fn to_config(&self) -> ProviderConfig {
        ProviderConfig {
            name: self.provider_name.clone(),
            base_url: self.api_base.clone(),
            api_key: self.api_key.clone(),
            chat_model: self.chat_model.clone(),
            embedding_model: self.embedding_model.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "vigil=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let mut registry = ProviderRegistry::new();

    match cli.command {
        Commands::AddAccount { id, username } => {
            commands::add_account(&cli.state, &id, &username).await
        }

        Commands::Analyze {
            account,
            tweets,
            previous,
            config,
            provider,
        } => {
            commands::analyze(
                &mut registry,
                &cli.state,
                &account,
                &tweets,
                previous.as_deref(),
                config.as_deref(),
                &provider.to_config(),
            )
            .await
        }

        Commands::Social {
            account,
            snapshot,
            config,
            provider,
        } => {
            commands::social(
                &mut registry,
                &cli.state,
                &account,
                &snapshot,
                config.as_deref(),
                &provider.to_config(),
            )
            .await
        }

        Commands::Notifications { account, unread } => {
            commands::notifications(&cli.state, &account, unread).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_analyze_arguments_map_to_provider_config() {
        let cli = Cli::try_parse_from([
            "vigil",
            "--state",
            "/tmp/state.json",
            "analyze",
            "--account",
            "a1",
            "--tweets",
            "tweets.json",
            "--api-base",
            "http://localhost:8080/v1",
            "--chat-model",
            "local-chat",
        ])
        .unwrap();

        assert_eq!(cli.state, PathBuf::from("/tmp/state.json"));
        match cli.command {
            Commands::Analyze {
                account, provider, ..
            } => {
                assert_eq!(account, "a1");
                let config = provider.to_config();
                assert_eq!(config.base_url, "http://localhost:8080/v1");
                assert_eq!(config.chat_model, "local-chat");
            }
            _ => panic!("expected analyze"),
        }
    }
}
