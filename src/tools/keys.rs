//! WireGuard key management via the external `wg` binary

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::WgError;

use super::{run_with_timeout, stderr_text};

/// Generated WireGuard key pair (Base64 encoded)
#[derive(Debug, Clone, serde::Serialize)]
pub struct Keypair {
    pub private_key: String,
    pub public_key: String,
}

/// Key management capability
#[async_trait]
pub trait KeyProvider: Send + Sync {
    /// Public key of the server interface
    async fn server_public_key(&self) -> Result<String, WgError>;

    /// Fresh client key pair
    async fn generate_keypair(&self) -> Result<Keypair, WgError>;
}

/// `KeyProvider` backed by the `wg` command-line tool
pub struct WgTool {
    bin: String,
    interface: String,
    timeout: Duration,
}

impl WgTool {
    pub fn new(bin: impl Into<String>, interface: impl Into<String>, timeout: Duration) -> Self {
        Self {
            bin: bin.into(),
            interface: interface.into(),
            timeout,
        }
    }
}

#[async_trait]
impl KeyProvider for WgTool {
    async fn server_public_key(&self) -> Result<String, WgError> {
        let mut cmd = Command::new(&self.bin);
        cmd.args(["show", &self.interface, "public-key"]);
        let output = run_with_timeout(&mut cmd, &self.bin, self.timeout)
            .await
            .map_err(|e| WgError::ServerKeyUnavailable(e.to_string()))?;
        if !output.status.success() {
            return Err(WgError::ServerKeyUnavailable(stderr_text(&output)));
        }
        let key = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if key.is_empty() {
            return Err(WgError::ServerKeyUnavailable(format!(
                "empty key for interface {}",
                self.interface
            )));
        }
        Ok(key)
    }

    async fn generate_keypair(&self) -> Result<Keypair, WgError> {
        let mut genkey = Command::new(&self.bin);
        genkey.arg("genkey");
        let output = run_with_timeout(&mut genkey, &self.bin, self.timeout).await?;
        if !output.status.success() {
            return Err(WgError::ToolFailed {
                tool: format!("{} genkey", self.bin),
                message: stderr_text(&output),
            });
        }
        let private_key = String::from_utf8_lossy(&output.stdout).trim().to_string();

        // `wg pubkey` derives the public half from the private key on stdin.
        let mut child = Command::new(&self.bin)
            .arg("pubkey")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        if let Some(stdin) = child.stdin.as_mut() {
            stdin.write_all(private_key.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
        }
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(WgError::ToolTimeout {
                    tool: format!("{} pubkey", self.bin),
                    seconds: self.timeout.as_secs(),
                })
            }
        };
        if !output.status.success() {
            return Err(WgError::ToolFailed {
                tool: format!("{} pubkey", self.bin),
                message: stderr_text(&output),
            });
        }
        let public_key = String::from_utf8_lossy(&output.stdout).trim().to_string();

        Ok(Keypair {
            private_key,
            public_key,
        })
    }
}
