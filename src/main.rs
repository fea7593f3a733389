mod app;
mod captioner;
mod cli;
mod config;
mod error;
mod loader;
mod paths;
mod provider;
mod rules;
mod settings;
mod workflow;

use anyhow::Context;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = cli::Args::parse();

    // Read once at startup.
    let ambient = settings::AmbientConfig::from_env();

    let config_dir = paths::config_dir()?;
    let cfg = config::Config::load_optional(config_dir.join("config.toml"))?;
    tracing::debug!(?config_dir, ?cfg, "resolved config");

    let http = reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")?;

    app::cmd_caption(&http, cfg.as_ref(), &ambient, args).await
}
