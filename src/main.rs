//! wg-peerctl - WireGuard peer-block editor
//!
//! One-shot CLI over a WireGuard server config: create, delete, and toggle
//! peer blocks, render client QR codes, and read the raw config. Every
//! invocation prints exactly one JSON object on stdout; logs go to stderr.

mod client;
mod conf;
mod config;
mod error;
mod ops;
mod store;
mod tools;

use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::conf::transform::ToggleMode;
use crate::config::Settings;
use crate::error::{ErrorResponse, WgError};
use crate::ops::PeerOps;
use crate::tools::keys::WgTool;
use crate::tools::qr::Qrencode;
use crate::tools::service;

#[derive(Parser)]
#[command(name = "wg-peerctl", about = "Peer-block editor for WireGuard server configs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a peer and its client artifact set
    Create {
        #[arg(long)]
        name: String,
        /// Client AllowedIPs; a single /32 pins the tunnel address
        #[arg(long = "allowed-ips")]
        allowed_ips: Option<String>,
    },
    /// Delete a peer block and its artifacts
    Delete {
        #[arg(long)]
        id: String,
    },
    /// Enable or disable a peer block in place
    Toggle {
        #[arg(long)]
        id: String,
        #[arg(long, value_enum)]
        mode: Mode,
    },
    /// Render a QR image for an existing client config
    GenerateQr {
        #[arg(long)]
        id: String,
    },
    /// Print the raw server config
    ReadConfig,
    /// Enumerate peer blocks as structured records
    List,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Enable,
    Disable,
}

impl From<Mode> for ToggleMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Enable => ToggleMode::Enable,
            Mode::Disable => ToggleMode::Disable,
        }
    }
}

fn encode<T: Serialize>(resp: &T) -> Result<String, WgError> {
    serde_json::to_string(resp).map_err(|e| WgError::Io(std::io::Error::other(e)))
}

/// Run one operation. The bool says whether the server config was mutated
/// and the interface should be nudged.
async fn execute(
    command: Command,
    ops: &PeerOps<'_>,
) -> (Result<String, WgError>, bool) {
    match command {
        Command::Create { name, allowed_ips } => {
            let result = ops.create(&name, allowed_ips.as_deref()).await;
            (result.and_then(|r| encode(&r)), true)
        }
        Command::Delete { id } => {
            let result = ops.delete(&id).await;
            (result.and_then(|r| encode(&r)), true)
        }
        Command::Toggle { id, mode } => {
            let result = ops.toggle(&id, mode.into()).await;
            (result.and_then(|r| encode(&r)), true)
        }
        Command::GenerateQr { id } => {
            let result = ops.generate_qr(&id).await;
            (result.and_then(|r| encode(&r)), false)
        }
        Command::ReadConfig => {
            let result = ops.read_config().await;
            (result.and_then(|r| encode(&r)), false)
        }
        Command::List => {
            let result = ops.list().await;
            (result.and_then(|r| encode(&r)), false)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wg_peerctl=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let settings = Settings::load()?;

    let timeout = Duration::from_secs(settings.tool_timeout_secs);
    let keys = WgTool::new(&settings.wg_bin, &settings.interface, timeout);
    let qr = Qrencode::new(&settings.qrencode_bin, timeout);
    let ops = PeerOps::new(&settings, &keys, &qr);

    let (result, mutated) = execute(cli.command, &ops).await;

    match result {
        Ok(json) => {
            if mutated {
                // Push the new config live; failure here never fails the run.
                service::restart_interface(&settings.restart_bin, &settings.interface, timeout)
                    .await;
            }
            println!("{json}");
            Ok(())
        }
        Err(e) => {
            tracing::error!("[wg-peerctl] Operation failed: {}", e);
            println!("{}", encode(&ErrorResponse::from_error(&e))?);
            std::process::exit(1);
        }
    }
}
