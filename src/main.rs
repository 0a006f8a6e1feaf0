//! Binary entrypoint for photo-finder.
//!
//! Wires the console front end to the search coordinator; all logic lives in
//! the library crate.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Level, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use photo_finder::api::{FlickrClient, ImageSource, SearchApi};
use photo_finder::config::Configuration;
use photo_finder::events::{Command, UiEvent};
use photo_finder::tasks::{console, coordinator};

#[derive(Debug, Parser)]
#[command(name = "photo-finder", version, about = "Search a photo service by keyword or location")]
struct Cli {
    /// Path to YAML config file; defaults are used if it does not exist
    #[arg(short, long, value_name = "FILE", default_value = "photo-finder.yaml")]
    config: PathBuf,

    /// Override the API key from the config file and environment
    #[arg(long, value_name = "KEY")]
    api_key: Option<String>,

    /// Write every displayed image into this directory as PNG
    #[arg(long, value_name = "DIR")]
    save_dir: Option<PathBuf>,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbosity: u8) -> Result<()> {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("photo_finder={level}").parse()?)
        .add_directive("reqwest=warn".parse()?)
        .add_directive("hyper_util=warn".parse()?);
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn load_config(cli: &Cli) -> Result<Configuration> {
    let cfg = if cli.config.exists() {
        Configuration::from_yaml_file(&cli.config)
            .with_context(|| format!("loading config from {}", cli.config.display()))?
    } else {
        info!(path = %cli.config.display(), "config file not found; using defaults");
        Configuration::default()
    };
    let mut cfg = cfg.with_env_overrides();
    if let Some(key) = &cli.api_key {
        cfg.api.api_key = key.clone();
    }
    cfg.validated().context("validating configuration")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let cfg = load_config(&cli)?;
    if cfg.api.api_key.is_empty() {
        warn!("no API key configured; searches will be rejected by the service");
    }

    let client = Arc::new(FlickrClient::new(cfg.api.clone()).context("building http client")?);
    let api: Arc<dyn SearchApi> = client.clone();
    let images: Arc<dyn ImageSource> = client;

    let (cmd_tx, cmd_rx) = mpsc::channel::<Command>(16); // Console -> Coordinator
    let (ui_tx, ui_rx) = mpsc::channel::<UiEvent>(32); // Coordinator -> Console
    let cancel = CancellationToken::new();

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!("ctrl-c handler failed: {err}");
                return;
            }
            info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    let mut tasks = JoinSet::new();

    tasks.spawn({
        let cancel = cancel.clone();
        async move {
            coordinator::run(cfg, api, images, cmd_rx, ui_tx, cancel)
                .await
                .context("coordinator task failed")
        }
    });

    tasks.spawn({
        let cancel = cancel.clone();
        let save_dir = cli.save_dir.clone();
        async move {
            if let Some(dir) = &save_dir {
                tokio::fs::create_dir_all(dir)
                    .await
                    .with_context(|| format!("creating {}", dir.display()))?;
            }
            console::run_output(ui_rx, save_dir, cancel)
                .await
                .context("output task failed")
        }
    });

    tasks.spawn({
        let cancel = cancel.clone();
        let lines = console::spawn_stdin_reader();
        async move {
            console::run_input(lines, cmd_tx, cancel)
                .await
                .context("input task failed")
        }
    });

    let mut result = Ok(());
    while let Some(joined) = tasks.join_next().await {
        // The first task to finish ends the session for everyone.
        cancel.cancel();
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!("{err:#}");
                if result.is_ok() {
                    result = Err(err);
                }
            }
            Err(err) => warn!("task join error: {err}"),
        }
    }
    info!("shutdown complete");
    result
}
