//! gitroast binary: `serve` runs the HTTP service, `roast` is the
//! terminal client.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use gitroast::cache::ShameCache;
use gitroast::config::Config;
use gitroast::github::GitHubClient;
use gitroast::limiter::FixedWindowLimiter;
use gitroast::llm::OpenAiGenerator;
use gitroast::server::{start_server, AppState};

#[derive(Parser)]
#[command(name = "gitroast", version, about = "Roast a GitHub profile")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP service.
    Serve {
        /// Override the configured listen port.
        #[arg(long)]
        port: Option<u16>,
        /// Override the configured bind address.
        #[arg(long)]
        bind: Option<String>,
    },
    /// Roast a user from the terminal.
    Roast {
        /// GitHub username to roast.
        username: String,
        /// Response language (en-US or pt-BR).
        #[arg(long)]
        lang: Option<String>,
        /// Server to talk to.
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        server: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = Config::load().context("loading configuration")?;

    match cli.command {
        Command::Serve { port, bind } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            let api_key = config.require_api_key()?.to_string();

            let cache = Arc::new(ShameCache::open(
                config.cache_path(),
                config.cache.freshness_secs,
            ));
            let limiter = Arc::new(FixedWindowLimiter::new(
                config.rate_limit.max_requests,
                Duration::from_secs(config.rate_limit.window_secs),
            ));
            let profiles = Arc::new(GitHubClient::with_base_url(&config.github.base_url));
            let generator = Arc::new(OpenAiGenerator::with_base_url(
                &api_key,
                &config.llm.base_url,
            ));

            let state = AppState {
                config,
                cache,
                limiter,
                profiles,
                generator,
            };
            start_server(state).await?;
        }
        Command::Roast {
            username,
            lang,
            server,
        } => {
            gitroast::cli::roast::run(&config, &username, lang.as_deref(), &server).await?;
        }
    }

    Ok(())
}
