//! ChattyBank CLI
//!
//! Runs the Messenger banking bot and offers config and log helpers.

mod logging;

use anyhow::{Context, Result};
use chattybank_config::Config;
use chattybank_core::ChattyRuntime;
use chattybank_ipc::EventBus;
use chattybank_messenger::{router, MessengerAdapter, WebhookState};
use clap::{Parser, Subcommand};
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "chattybank")]
#[command(about = "Messenger banking assistant backed by a hosted dialog service", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long)]
    config: Option<String>,

    /// Log level (overrides core.log_level; RUST_LOG wins over both)
    #[arg(short, long)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the webhook server and conversation runtime in the foreground
    Serve,

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Log management commands
    Logs {
        #[command(subcommand)]
        action: LogCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Validate configuration (file plus environment overrides)
    Check,
    /// Print the config file path in use
    Path,
}

#[derive(Subcommand)]
enum LogCommands {
    /// List log files
    List,
    /// Delete log files past the retention window
    Clean,
    /// Show the last lines of today's log
    Tail {
        #[arg(short = 'n', long, default_value_t = 50)]
        lines: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve => {
            let config = load_config(cli.config.clone())?;
            let log_dir = config.data_dir().join("logs");
            let log_level = resolve_log_level(cli.log_level.as_deref(), &config);
            let _logging_guard = logging::init_logging(&log_dir, &log_level)?;
            serve(config).await?;
        }

        Commands::Config { action } => match action {
            ConfigCommands::Check => match load_config(cli.config) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => eprintln!("Configuration is invalid: {}", e),
            },
            ConfigCommands::Path => {
                println!("{}", config_path(cli.config).display());
            }
        },

        Commands::Logs { action } => {
            let config = load_config(cli.config)?;
            let manager = logging::LogManager::new(config.data_dir().join("logs"));
            match action {
                LogCommands::List => {
                    let files = manager.log_files()?;
                    println!(
                        "Log files ({} total):\n",
                        logging::LogManager::format_size(manager.total_size()?)
                    );
                    for file in files {
                        let metadata = fs::metadata(&file)?;
                        let modified: chrono::DateTime<chrono::Local> = metadata.modified()?.into();
                        println!(
                            "  {} ({}, modified {})",
                            file.file_name()
                                .map(|name| name.to_string_lossy().into_owned())
                                .unwrap_or_default(),
                            logging::LogManager::format_size(metadata.len()),
                            modified.format("%Y-%m-%d %H:%M:%S")
                        );
                    }
                }
                LogCommands::Clean => {
                    let deleted = if manager.log_files()?.is_empty() {
                        0
                    } else {
                        manager.cleanup_old_logs()?
                    };
                    println!("Cleaned {} old log file(s)", deleted);
                }
                LogCommands::Tail { lines } => {
                    let current_log = manager.current_log_path();
                    if current_log.exists() {
                        let content = fs::read_to_string(&current_log)?;
                        let all_lines: Vec<&str> = content.lines().collect();
                        let start = all_lines.len().saturating_sub(lines);
                        for line in &all_lines[start..] {
                            println!("{}", line);
                        }
                    } else {
                        println!("No log file found at {}", current_log.display());
                    }
                }
            }
        }
    }

    Ok(())
}

async fn serve(config: Config) -> Result<()> {
    let event_bus = EventBus::new();

    let runtime = ChattyRuntime::from_config(&config, event_bus.clone())?;
    let runtime_handle = runtime.spawn();

    let adapter = MessengerAdapter::new(&config.messenger)?;
    let outbound_rx = event_bus.outbound_subscribe();
    let outbound_handle = tokio::spawn(async move {
        adapter.run_outbound_handler(outbound_rx).await;
    });

    let public_dir = PathBuf::from(&config.server.public_dir);
    let public_dir = if public_dir.is_dir() {
        Some(public_dir)
    } else {
        warn!(
            "Static directory {} not found; assets will not be served",
            public_dir.display()
        );
        None
    };

    let state = WebhookState::new(
        &config.messenger.validation_token,
        &config.messenger.app_secret,
        event_bus,
    );
    let app = router(state, public_dir);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("ChattyBank is running on port {}", config.server.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("Shutting down");
    runtime_handle.abort();
    outbound_handle.abort();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

fn resolve_log_level(cli_level: Option<&str>, config: &Config) -> String {
    cli_level
        .or(config.core.log_level.as_deref())
        .map(str::trim)
        .filter(|level| !level.is_empty())
        .unwrap_or("info")
        .to_string()
}

fn config_path(config_path: Option<String>) -> PathBuf {
    if let Some(path) = config_path {
        PathBuf::from(path)
    } else {
        Config::default_path().unwrap_or_else(|| PathBuf::from("config.toml"))
    }
}

fn load_config(config_path_arg: Option<String>) -> Result<Config> {
    let path = config_path(config_path_arg);
    Config::load(&path).with_context(|| format!("loading config from {}", path.display()))
}
