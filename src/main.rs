mod chart;
mod config;
mod measurements;
mod poller;
mod service;
mod storage;
mod web;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn, Level};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::poller::{ApiClient, DashboardPoller, DEFAULT_REFRESH_SECS};
use crate::storage::{DocumentSource, DocumentStore};
use crate::web::{start_web_server, AppState};

#[derive(Parser)]
#[command(name = "canal-ice-monitor")]
#[command(about = "Ice-safety telemetry API and dashboard for the canal", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the read API and the dashboard page
    Serve {
        /// Port to listen on (overrides PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Directory holding the dashboard page and assets (overrides STATIC_DIR)
        #[arg(short, long)]
        static_dir: Option<PathBuf>,

        /// Path to store log files
        #[arg(short, long, default_value = "logs")]
        log_dir: PathBuf,
    },
    /// Poll a running server and show the dashboard in the terminal
    Watch {
        /// Base URL of the server
        #[arg(short, long, default_value = "http://localhost:3000")]
        url: String,

        /// Seconds between refresh cycles
        #[arg(short, long, default_value_t = DEFAULT_REFRESH_SECS)]
        interval: u64,

        /// Run a single cycle and exit
        #[arg(long, default_value = "false")]
        once: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            port,
            static_dir,
            log_dir,
        } => {
            std::fs::create_dir_all(&log_dir)?;
            let file_appender = RollingFileAppender::new(Rotation::HOURLY, &log_dir, "canal-ice-monitor.log");
            let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

            tracing_subscriber::registry()
                .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
                .with(fmt::layer().with_writer(std::io::stdout))
                .with(fmt::layer().json().with_writer(non_blocking))
                .init();

            let mut config = Config::load()?;
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(dir) = static_dir {
                config.static_dir = dir;
            }

            info!("Starting canal ice monitor");
            info!("Store endpoint: {:?}", config.store.endpoint);
            info!("Database: {:?}", config.store.database);
            info!("Container: {:?}", config.store.container);
            info!("Static files: {:?}", config.static_dir);

            let source = match DocumentStore::open(&config.store) {
                Ok(store) => Some(Arc::new(store) as Arc<dyn DocumentSource>),
                Err(e) => {
                    warn!("Document store unavailable, data endpoints will fail: {:#}", e);
                    None
                }
            };

            let state = AppState {
                source,
                settings: config.store.clone(),
            };

            tokio::select! {
                result = start_web_server(state, config.static_dir, config.port) => {
                    if let Err(e) = &result {
                        error!("Web server error: {:#}", e);
                    }
                    result
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutting down...");
                    Ok(())
                }
            }
        }
        Commands::Watch { url, interval, once } => {
            tracing_subscriber::registry()
                .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();

            let poller = DashboardPoller::new(ApiClient::new(&url)?, interval.max(1));

            if once {
                poller.run_once().await;
                poller::print_dashboard(&poller.dashboard());
                return Ok(());
            }

            info!("Polling {} every {}s, press Ctrl+C to stop", url, interval);
            tokio::select! {
                _ = poller.start() => Ok(()),
                _ = tokio::signal::ctrl_c() => Ok(()),
            }
        }
    }
}
