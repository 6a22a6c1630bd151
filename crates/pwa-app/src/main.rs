//! Command-line driver for the offline PWA worker.
//!
//! ## Usage
//!
//! ```bash
//! # Install against a dev server, then read the shell back offline
//! pwa-demo --origin http://localhost:5173/ fetch / /manifest.json --offline
//!
//! # Deliver a push message
//! pwa-demo push --payload '{"title": "Hello", "data": {"type": "info"}}'
//!
//! # Press the "Warning" notification button
//! pwa-demo notify warning
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pwa_common::{init_logging, LogConfig, LogFormat, PwaConfig};
use pwa_net::ResponseType;
use pwa_notify::NotificationKind;
use pwa_sw::ClickOutcome;
use tracing::info;
use url::Url;

mod app;
mod console;

use app::Demo;

#[derive(Parser, Debug)]
#[command(name = "pwa-demo")]
#[command(about = "Drive the offline PWA service worker from the terminal")]
struct Cli {
    /// Origin the app is served from
    #[arg(long, global = true)]
    origin: Option<Url>,

    /// JSON config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log format (pretty, compact, json)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Install the worker and fetch paths through it
    Fetch {
        /// Paths relative to the origin
        #[arg(required = true)]
        paths: Vec<String>,
        /// Go offline after installing
        #[arg(long)]
        offline: bool,
        /// Send the requests as page navigations
        #[arg(long)]
        navigate: bool,
    },

    /// Deliver a push message to the worker
    Push {
        /// Raw JSON payload
        #[arg(short, long)]
        payload: Option<String>,
    },

    /// Show a notification and click it
    Click {
        /// Notification type used for routing
        #[arg(short = 't', long = "type")]
        kind: Option<String>,
    },

    /// Press a notification button (info, success, warning, error)
    Notify {
        kind: NotificationKind,
        /// Deny the permission prompt
        #[arg(long)]
        deny: bool,
        /// Show the notification from the page instead of the worker
        #[arg(long)]
        page_only: bool,
    },

    /// Show network and worker status
    Status {
        /// Report as offline
        #[arg(long)]
        offline: bool,
    },
}

impl Cli {
    /// File config with command-line overrides applied.
    fn load_config(&self) -> Result<PwaConfig> {
        let mut config = match &self.config {
            Some(path) => PwaConfig::load(path)
                .with_context(|| format!("failed to load {}", path.display()))?,
            None => PwaConfig::default(),
        };
        if let Some(origin) = &self.origin {
            config.origin = origin.clone();
        }
        if let Some(level) = &self.log_level {
            config.log.level = level.clone();
        }
        if let Some(format) = self.log_format {
            config.log.format = format;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;
    init_logging(LogConfig::from_settings(&config.log)?);
    info!(origin = %config.origin, "Starting pwa-demo");

    let demo = Demo::new(config)?;

    match cli.command {
        Commands::Fetch {
            paths,
            offline,
            navigate,
        } => {
            let responses = demo.fetch(&paths, offline, navigate).await?;
            for (path, response) in paths.iter().zip(&responses) {
                if response.response_type == ResponseType::Error {
                    println!("{path}: network error");
                    continue;
                }
                let source = if response.from_cache { "cache" } else { "network" };
                println!(
                    "{path}: {} {} ({source}, {} bytes)",
                    response.status,
                    response.status_text,
                    response.body.len()
                );
            }
        }

        Commands::Push { payload } => match demo.push(payload).await? {
            Some(notification) => println!("Displayed notification {:?}", notification.id),
            None => println!("Push handled, nothing displayed"),
        },

        Commands::Click { kind } => match demo.click(kind.as_deref()).await? {
            ClickOutcome::Focused(client) => println!("Focused {}", client.url),
            ClickOutcome::Opened(client) => println!("Opened {}", client.url),
        },

        Commands::Notify {
            kind,
            deny,
            page_only,
        } => {
            let report = demo.notify(kind, deny, page_only).await;
            println!("{}", report.status);
        }

        Commands::Status { offline } => {
            let report = demo.status(offline).await;
            println!("Network:    {}", report.network);
            match report.controller {
                Some(state) => println!("Controller: {state}"),
                None => println!("Controller: none"),
            }
            for (name, count) in report.caches {
                println!("Cache:      {name} ({count} entries)");
            }
        }
    }

    Ok(())
}
