//! # cadence
//!
//! Command-line client for the conversation coaching backend: upload a
//! recording, follow its analysis, watch a live session channel, or practice
//! against the streaming AI partner.

#![deny(unsafe_code)]

mod app;
mod commands;
mod shutdown;

use std::path::PathBuf;

use anyhow::{Context, Result};
use cadence_core::logging::{LogFormat, init_subscriber};
use cadence_settings::CadenceSettings;
use clap::{Parser, Subcommand};

use crate::app::App;
use crate::shutdown::ShutdownCoordinator;

/// Cadence client.
#[derive(Parser, Debug)]
#[command(name = "cadence", version, about = "Cadence conversation coaching client")]
struct Cli {
    /// Settings file (defaults to `~/.cadence/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Log filter directive, e.g. `debug` or `cadence_realtime=trace`.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    /// HTTP API base URL.
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// WebSocket base URL.
    #[arg(long, global = true)]
    ws_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Upload a recording and print its conversation ID.
    Upload {
        /// Audio or video file.
        file: PathBuf,
        /// Follow the analysis until it finishes.
        #[arg(long)]
        watch: bool,
    },
    /// Poll analysis status until it reaches a final state.
    Poll {
        /// Conversation ID.
        id: String,
        /// Stop at the first failed fetch instead of retrying.
        #[arg(long)]
        stop_on_error: bool,
    },
    /// Follow a session channel: progress, participants, room messages.
    Watch {
        /// Session key.
        key: String,
    },
    /// Chat with the AI practice partner, one message per line.
    Practice {
        /// Practice session key.
        key: String,
    },
}

impl Cli {
    /// Layer command-line overrides on top of loaded settings.
    fn apply(&self, settings: &mut CadenceSettings) {
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.json_logs {
            settings.logging.format = LogFormat::Json;
        }
        if let Some(url) = &self.api_url {
            settings.api.base_url = url.trim_end_matches('/').to_owned();
        }
        if let Some(url) = &self.ws_url {
            settings.realtime.ws_url = url.trim_end_matches('/').to_owned();
        }
    }

    fn load_settings(&self) -> Result<CadenceSettings> {
        let mut settings = match &self.settings {
            Some(path) => cadence_settings::load_settings_from_path(path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))?,
            None => cadence_settings::load_settings().context("Failed to load settings")?,
        };
        self.apply(&mut settings);
        settings.validate().context("Invalid settings")?;
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let settings = args.load_settings()?;
    init_subscriber(&settings.logging.level, settings.logging.format);
    tracing::debug!(command = ?args.command, "starting");

    let app = App::new(settings);
    let shutdown = ShutdownCoordinator::new();
    let listener = shutdown.listen_for_ctrl_c();

    let result = match &args.command {
        Command::Upload { file, watch } => commands::upload(&app, file, *watch, &shutdown).await,
        Command::Poll { id, stop_on_error } => {
            commands::poll(&app, id, *stop_on_error, &shutdown).await
        }
        Command::Watch { key } => commands::watch(&app, key, &shutdown).await,
        Command::Practice { key } => commands::practice(&app, key, &shutdown).await,
    };

    shutdown.graceful_shutdown(vec![listener], None).await;
    if let Some(summary) = commands::unread_summary(&app.sink) {
        eprintln!("{summary}");
    }
    result
}
