use anyhow::Result;
use clap::{Parser, Subcommand};
use compkit::{run, App, AppBuilder, ShutdownOptions};
use compkit_bootstrap::{AppConfig, AppConfigProvider, CliArgs};

use std::path::{Path, PathBuf};
use std::sync::Arc;

mod components;

use components::{AuditTrail, Catalog};

/// compkit demo - a small component graph driven by the lifecycle runtime
#[derive(Parser)]
#[command(name = "compkit-demo")]
#[command(about = "compkit demo - declarative component lifecycle")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print effective configuration (YAML) and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start every singleton and wait for Ctrl+C / SIGTERM
    Run,
    /// Validate configuration and the component graph, then exit
    Check,
    /// Start, serve a few scoped requests, report health and stop
    Once,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let args = CliArgs { verbose: cli.verbose };

    // Layered config:
    // 1) defaults -> 2) YAML (if provided) -> 3) env (APP__*) -> 4) CLI overrides
    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;
    config.apply_cli_overrides(&args);

    // Relative log paths are resolved next to the config file.
    let base_dir = cli
        .config
        .as_deref()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let logging_config = config.logging.clone().unwrap_or_default();
    compkit_bootstrap::logging::init_logging(&logging_config, &base_dir);

    tracing::info!("compkit demo starting");

    if cli.print_config {
        println!("{}", config.to_yaml()?);
        return Ok(());
    }

    let app = build_app(&config)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(Arc::new(app), ShutdownOptions::Signals).await?,
        Commands::Check => check(&app)?,
        Commands::Once => once(&app).await?,
    }
    Ok(())
}

fn build_app(config: &AppConfig) -> Result<App> {
    let provider = AppConfigProvider::new(config.clone());
    let app = components::declare(AppBuilder::new())
        .options(config.lifecycle.app_options())
        .build(&provider)?;
    Ok(app)
}

fn check(app: &App) -> Result<()> {
    let order = app.dependency_order()?;
    println!("Configuration is valid");
    println!("Start order: {}", order.join(" -> "));
    Ok(())
}

async fn once(app: &App) -> Result<()> {
    app.start().await?;

    let served = async {
        let catalog = app.get::<Catalog>("catalog").await?;
        catalog.add("1", "The Left Hand of Darkness")?;

        for item in ["1", "2"] {
            let title = app
                .request_scope(async {
                    let trail = app.get::<AuditTrail>("audit").await?;
                    trail.record(format!("lookup {item}"));
                    anyhow::Ok(catalog.title(item))
                })
                .await??;
            tracing::info!(item, title = ?title, "request served");
        }

        for (component, alive) in app.healthcheck().await {
            tracing::info!(component = %component, alive, "health");
        }
        anyhow::Ok(())
    }
    .await;

    // Stop even when serving failed; report the first error.
    let stopped = app.stop().await;
    served?;
    stopped?;
    Ok(())
}
