//! Per-client artifacts
//!
//! Every created peer owns a key pair, a client config, a public
//! downloadable copy, and a QR image, all named by identifier. They are
//! written together at creation and removed together at deletion; the
//! filesystem is the only store.

use std::fs;
use std::path::PathBuf;

use crate::config::Settings;
use crate::error::WgError;
use crate::tools::keys::Keypair;

/// Parameters for rendering a client-side config file
#[derive(Debug)]
pub struct ClientConfigParams {
    pub private_key: String,
    pub address: String,
    pub dns: String,
    pub server_public_key: String,
    pub endpoint: String,
    pub allowed_ips: String,
    pub persistent_keepalive: Option<u32>,
}

/// Render a WireGuard client configuration string (.conf format)
pub fn render_client_config(params: &ClientConfigParams) -> String {
    let keepalive = params
        .persistent_keepalive
        .map(|k| format!("PersistentKeepalive = {}\n", k))
        .unwrap_or_default();

    format!(
        "[Interface]\n\
         PrivateKey = {}\n\
         Address = {}\n\
         DNS = {}\n\
         \n\
         [Peer]\n\
         PublicKey = {}\n\
         Endpoint = {}\n\
         AllowedIPs = {}\n\
         {}",
        params.private_key,
        params.address,
        params.dns,
        params.server_public_key,
        params.endpoint,
        params.allowed_ips,
        keepalive,
    )
}

/// On-disk artifact set for one client, keyed by its name
#[derive(Debug, Clone)]
pub struct ClientArtifacts {
    pub private_key_path: PathBuf,
    pub public_key_path: PathBuf,
    pub config_path: PathBuf,
    pub public_config_path: PathBuf,
    pub qr_path: PathBuf,
}

impl ClientArtifacts {
    pub fn for_name(settings: &Settings, name: &str) -> Self {
        Self {
            private_key_path: settings.client_config_dir.join(format!("{name}.key")),
            public_key_path: settings.client_config_dir.join(format!("{name}.pub")),
            config_path: settings.client_config_dir.join(format!("{name}.conf")),
            public_config_path: settings.public_config_dir.join(format!("{name}.conf")),
            qr_path: settings.qr_dir.join(format!("{name}.png")),
        }
    }

    /// Write key files and both config copies.
    pub fn write(&self, keypair: &Keypair, config_text: &str) -> Result<(), WgError> {
        for path in [&self.private_key_path, &self.public_config_path] {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.private_key_path, format!("{}\n", keypair.private_key))?;
        fs::write(&self.public_key_path, format!("{}\n", keypair.public_key))?;
        fs::write(&self.config_path, config_text)?;
        fs::write(&self.public_config_path, config_text)?;
        Ok(())
    }

    /// Best-effort removal; a file that is already gone is not an error.
    pub fn remove(&self) {
        for path in [
            &self.private_key_path,
            &self.public_key_path,
            &self.config_path,
            &self.public_config_path,
            &self.qr_path,
        ] {
            if let Err(e) = fs::remove_file(path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(
                        "[ClientArtifacts] Could not remove {}: {}",
                        path.display(),
                        e
                    );
                }
            }
        }
    }

    /// Client config location, preferring the private directory and falling
    /// back to the public copy.
    pub fn existing_config(&self) -> Option<PathBuf> {
        if self.config_path.exists() {
            Some(self.config_path.clone())
        } else if self.public_config_path.exists() {
            Some(self.public_config_path.clone())
        } else {
            None
        }
    }
}
