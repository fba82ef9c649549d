//! Best-effort service restart
//!
//! The config file on disk is the contract; pushing it live is attempted but
//! a failed restart never fails the operation that edited the file.

use std::time::Duration;

use tokio::process::Command;

use super::run_with_timeout;

pub async fn restart_interface(bin: &str, interface: &str, timeout: Duration) {
    let unit = format!("wg-quick@{}", interface);
    let mut cmd = Command::new(bin);
    cmd.args(["restart", &unit]);

    match run_with_timeout(&mut cmd, bin, timeout).await {
        Ok(output) if output.status.success() => {
            tracing::info!("[Service] Restarted {}", unit);
        }
        Ok(output) => {
            tracing::warn!(
                "[Service] Restart of {} failed (non-fatal): {}",
                unit,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Err(e) => {
            tracing::warn!("[Service] Restart of {} failed (non-fatal): {}", unit, e);
        }
    }
}
