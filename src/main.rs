//! shell-bot - run a terminal program in tmux and drive it from a chat
//!
//! Run with `shell-bot -c <command>` or `shell-bot --help` for usage.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::{Result, eyre};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use shell_bot::{
    APP_NAME, Config, LaunchOptions, RESTART_EXIT_CODE, RunOutcome, SessionOrchestrator, VERSION,
    run_single_shot,
};

#[derive(Parser)]
#[command(name = APP_NAME)]
#[command(version = VERSION)]
#[command(about = "Run a terminal program in tmux and control it from Telegram")]
#[command(long_about = None)]
struct Cli {
    /// Command to run, e.g. "claude" or "bash"
    #[arg(short, long, required_unless_present_any = ["show_config", "init_config"])]
    command: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Extra environment variable for the program (repeatable)
    #[arg(short, long = "env", value_name = "KEY=VALUE", value_parser = parse_env_pair)]
    env: Vec<(String, String)>,

    /// Working directory for the program
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// Do not start the remote control bot
    #[arg(long)]
    no_bot: bool,

    /// Run as a plain child process instead of inside tmux
    #[arg(long)]
    single_shot: bool,

    /// tmux session name
    #[arg(long)]
    session_name: Option<String>,

    /// Do not attach the terminal; wait for the program to exit
    #[arg(long)]
    headless: bool,

    /// Path to config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seconds without output before an idle notice (0 disables it)
    #[arg(long)]
    idle_threshold: Option<u64>,

    /// Print the resolved configuration and exit
    #[arg(long)]
    show_config: bool,

    /// Write the configuration file with current values and exit
    #[arg(long)]
    init_config: bool,
}

fn parse_env_pair(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}

fn setup_logging(debug: bool, log_file: Option<&Path>) -> Result<()> {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
            .add_directive("reqwest=warn".parse()?)
            .add_directive("hyper=warn".parse()?)
            .add_directive("tokio=warn".parse()?)
    };

    if let Some(path) = log_file {
        // Keep logs off the attached terminal
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;

        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(file).with_ansi(false).with_target(false))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .with(filter)
            .init();
    }

    Ok(())
}

/// Cancel `token` on Ctrl-C or SIGTERM
fn cancel_on_signal(token: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                let _ = ctrl_c.await;
            }
        }
        info!("Shutdown signal received");
        token.cancel();
    });
}

fn load_config(cli: &Cli) -> Config {
    let loaded = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    let mut config = loaded.unwrap_or_else(|e| {
        eprintln!("Warning: Failed to load config, using defaults: {}", e);
        Config::default()
    });

    if let Some(name) = &cli.session_name {
        config.session_name = name.clone();
    }
    if let Some(secs) = cli.idle_threshold {
        config.idle_threshold_secs = secs;
    }
    config.debug |= cli.verbose;
    config
}

#[tokio::main]
async fn main() -> Result<()> {
    // Install color-eyre error hooks
    color_eyre::install()?;

    let cli = Cli::parse();
    let config = load_config(&cli);

    if cli.init_config {
        let path = match &cli.config {
            Some(path) => path.clone(),
            None => Config::config_file_path()?,
        };
        config.save_to(&path)?;
        println!("Configuration initialized at {:?}", path);
        return Ok(());
    }

    if cli.show_config {
        println!("{}", toml::to_string_pretty(&config)?);
        println!("\nConfig file: {:?}", Config::config_file_path()?);
        println!("Data dir: {:?}", Config::data_dir()?);
        return Ok(());
    }

    let command = cli
        .command
        .clone()
        .ok_or_else(|| eyre!("--command is required"))?;

    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Failed to create directories: {}", e);
    }

    let log_file = if cli.single_shot {
        None
    } else {
        Some(config.log_file()?)
    };
    setup_logging(config.debug, log_file.as_deref())?;
    info!("Starting {} v{}", APP_NAME, VERSION);

    let options = LaunchOptions {
        working_dir: cli.dir.clone(),
        env: cli.env.clone(),
        headless: cli.headless,
        enable_bot: !cli.no_bot,
    };
    let config = Arc::new(config);

    let outcome = if cli.single_shot {
        let cancel = CancellationToken::new();
        cancel_on_signal(cancel.clone());
        run_single_shot(&config, &command, &options, cancel).await
    } else {
        match SessionOrchestrator::new(config.clone(), &command, options) {
            Ok(mut orchestrator) => {
                cancel_on_signal(orchestrator.cancel_token());
                orchestrator.run().await
            }
            Err(e) => Err(e),
        }
    };

    let code = match outcome {
        Ok(RunOutcome {
            restart_requested: true,
            ..
        }) => {
            info!("Exiting for restart");
            RESTART_EXIT_CODE
        }
        Ok(RunOutcome { exit_code, .. }) => exit_code,
        Err(e) if e.is_fatal_startup() => {
            eprintln!("Error: {}", e);
            1
        }
        Err(e) => return Err(e.into()),
    };

    // Exit directly so a pending blocking stdin read cannot hold the runtime open
    std::process::exit(code);
}
