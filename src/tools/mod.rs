//! External tool boundary
//!
//! - `keys`: WireGuard key management via the `wg` binary
//! - `qr`: QR image rendering via `qrencode`
//! - `service`: best-effort interface restart
//!
//! Key and QR access are traits so tests substitute deterministic fakes
//! instead of spawning real binaries. Every invocation runs under an
//! explicit timeout.

pub mod keys;
pub mod qr;
pub mod service;

use std::process::Output;
use std::time::Duration;

use tokio::process::Command;

use crate::error::WgError;

/// Spawn a command and wait for it, mapping a blown deadline to a tool
/// timeout error.
pub(crate) async fn run_with_timeout(
    command: &mut Command,
    tool: &str,
    timeout: Duration,
) -> Result<Output, WgError> {
    let future = command.output();
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(WgError::ToolTimeout {
            tool: tool.to_string(),
            seconds: timeout.as_secs(),
        }),
    }
}

pub(crate) fn stderr_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}
