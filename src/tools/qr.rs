//! QR image rendering via the external `qrencode` binary

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::WgError;

use super::stderr_text;

/// QR rendering capability
#[async_trait]
pub trait QrRenderer: Send + Sync {
    /// Render text to a PNG image
    async fn render_png(&self, text: &str) -> Result<Vec<u8>, WgError>;
}

/// `QrRenderer` backed by `qrencode`
pub struct Qrencode {
    bin: String,
    timeout: Duration,
}

impl Qrencode {
    pub fn new(bin: impl Into<String>, timeout: Duration) -> Self {
        Self {
            bin: bin.into(),
            timeout,
        }
    }
}

#[async_trait]
impl QrRenderer for Qrencode {
    async fn render_png(&self, text: &str) -> Result<Vec<u8>, WgError> {
        let mut cmd = Command::new(&self.bin);
        cmd.args(["-t", "PNG", "-o", "-", text]);
        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(WgError::QrToolMissing)
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                return Err(WgError::ToolTimeout {
                    tool: self.bin.clone(),
                    seconds: self.timeout.as_secs(),
                })
            }
        };
        if !output.status.success() {
            return Err(WgError::ToolFailed {
                tool: self.bin.clone(),
                message: stderr_text(&output),
            });
        }
        Ok(output.stdout)
    }
}
