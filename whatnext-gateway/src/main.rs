use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use whatnext::agent::agent_definition;
use whatnext::config::AppConfig;
use whatnext::reasoning::{ReasoningEngine, ReasoningEngineFactory};
use whatnext::vocabulary::Vocabulary;
use whatnext::{server, Services};

#[derive(Parser)]
#[command(name = "whatnext-gateway")]
#[command(version)]
#[command(about = "WhatNext conversational location recommender")]
struct Cli {
    /// TOML configuration file; built-in defaults apply when omitted.
    #[arg(long, global = true, env = "WHATNEXT_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter directives, e.g. `info,whatnext=debug`. Overrides RUST_LOG.
    #[arg(long, global = true)]
    log_filter: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API.
    Serve(ServeArgs),
    /// Register the agent configuration and print its id, for reuse via
    /// `reasoning.assistant_id`.
    RegisterAgent,
}

#[derive(Parser)]
struct ServeArgs {
    #[arg(long, env = "WHATNEXT_BIND_ADDR")]
    bind_addr: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = init_logging(cli.log_filter.as_deref()) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }

    let result = match load_config(cli.config.as_ref()) {
        Ok(config) => match cli.command {
            Commands::Serve(args) => serve(config, args).await,
            Commands::RegisterAgent => register_agent(config).await,
        },
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(filter: Option<&str>) -> anyhow::Result<()> {
    let filter = match filter {
        Some(directives) => EnvFilter::try_new(directives)?,
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,whatnext=debug")),
    };
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;
    tracing_log::LogTracer::init()?;
    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<AppConfig> {
    match path {
        Some(path) => AppConfig::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => Ok(AppConfig::default()),
    }
}

async fn serve(mut config: AppConfig, args: ServeArgs) -> anyhow::Result<()> {
    if let Some(bind_addr) = args.bind_addr {
        config.server.bind_addr = bind_addr;
    }

    let engine = ReasoningEngineFactory::create(&config.reasoning)?;
    let services = Services::build(&config, engine)
        .await
        .context("building services")?;

    info!(
        bind_addr = %config.server.bind_addr,
        timezone = %config.hours.timezone,
        "[Gateway] Starting WhatNext"
    );
    server::serve(&config.server.bind_addr, services).await?;
    Ok(())
}

async fn register_agent(config: AppConfig) -> anyhow::Result<()> {
    let vocabulary = Vocabulary::load(&config.data.categories_path, &config.data.tags_path)?;
    let engine = ReasoningEngineFactory::create(&config.reasoning)?;
    let definition = agent_definition(
        &vocabulary,
        &config.reasoning.model,
        config.reasoning.temperature,
    );
    let id = engine.create_agent(&definition).await?;
    println!("{}", id);
    Ok(())
}
