//! Peer operations
//!
//! One function per CLI operation. Each reads or rewrites the server config
//! through the `ConfigStore` and returns a serializable response; the caller
//! turns it into the JSON object on stdout.

pub mod pool;

use std::fs;

use base64::Engine;
use regex::Regex;
use serde::Serialize;

use crate::client::{render_client_config, ClientArtifacts, ClientConfigParams};
use crate::conf::transform::{self, ToggleMode};
use crate::conf::Document;
use crate::config::Settings;
use crate::error::WgError;
use crate::store::ConfigStore;
use crate::tools::keys::KeyProvider;
use crate::tools::qr::QrRenderer;

const KEEPALIVE_SECS: u32 = 25;

pub struct PeerOps<'a> {
    settings: &'a Settings,
    store: ConfigStore,
    keys: &'a dyn KeyProvider,
    qr: &'a dyn QrRenderer,
}

#[derive(Debug, Serialize)]
pub struct CreateResponse {
    pub status: &'static str,
    pub name: String,
    pub public_key: String,
    pub address: String,
    pub allowed_ips: String,
    pub config_path: String,
    pub public_config_path: String,
    pub qr_path: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub status: &'static str,
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct ToggleResponse {
    pub status: &'static str,
    pub id: String,
    pub mode: &'static str,
}

#[derive(Debug, Serialize)]
pub struct QrResponse {
    pub status: &'static str,
    pub id: String,
    pub config_path: String,
    pub qr_path: String,
    pub qr_base64: String,
}

#[derive(Debug, Serialize)]
pub struct ReadConfigResponse {
    pub status: &'static str,
    pub config: String,
}

#[derive(Debug, Serialize)]
pub struct PeerRecord {
    pub name: Option<String>,
    pub public_key: Option<String>,
    pub allowed_ips: Vec<String>,
    pub enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub status: &'static str,
    pub peers: Vec<PeerRecord>,
}

impl<'a> PeerOps<'a> {
    pub fn new(settings: &'a Settings, keys: &'a dyn KeyProvider, qr: &'a dyn QrRenderer) -> Self {
        Self {
            settings,
            store: ConfigStore::new(settings.config_path.clone()),
            keys,
            qr,
        }
    }

    /// Create a peer: allocate an address, append a named block, and write
    /// the client artifact set.
    pub async fn create(
        &self,
        name: &str,
        allowed_ips: Option<&str>,
    ) -> Result<CreateResponse, WgError> {
        validate_name(name)?;
        if self.settings.endpoint_host.is_empty() {
            return Err(WgError::EndpointUnset);
        }

        let artifacts = ClientArtifacts::for_name(self.settings, name);
        if artifacts.private_key_path.exists() {
            return Err(WgError::NameExists(name.to_string()));
        }

        let text = self.store.load()?;
        let doc = Document::parse(&text);
        if doc.peers.iter().any(|p| p.name().as_deref() == Some(name)) {
            return Err(WgError::NameExists(name.to_string()));
        }

        let server_public_key = self.keys.server_public_key().await?;
        let keypair = self.keys.generate_keypair().await?;

        let requested = allowed_ips.unwrap_or(pool::FULL_TUNNEL);
        let address = pool::resolve_address(&text, &self.settings.ipv4_prefix, requested)?;
        if pool::address_in_use(&text, &address) {
            return Err(WgError::IpInUse(address));
        }

        let client_config = render_client_config(&ClientConfigParams {
            private_key: keypair.private_key.clone(),
            address: address.clone(),
            dns: self.settings.dns.clone(),
            server_public_key,
            endpoint: format!(
                "{}:{}",
                self.settings.endpoint_host, self.settings.listen_port
            ),
            allowed_ips: requested.to_string(),
            persistent_keepalive: Some(KEEPALIVE_SECS),
        });

        // Artifacts land before the config append; if the append fails the
        // partial set is cleaned up again.
        artifacts.write(&keypair, &client_config)?;

        let public_key = keypair.public_key.clone();
        let append_result = self.store.update(|current| {
            // Re-check under the lock: another invocation may have appended
            // since the initial read.
            let doc = Document::parse(current);
            if doc.peers.iter().any(|p| p.name().as_deref() == Some(name)) {
                return Err(WgError::NameExists(name.to_string()));
            }
            if pool::address_in_use(current, &address) {
                return Err(WgError::IpInUse(address.clone()));
            }
            Ok(append_peer_block(current, name, &public_key, &address))
        });
        if let Err(e) = append_result {
            artifacts.remove();
            return Err(e);
        }

        // The config append is already committed; nothing on the QR side may
        // fail the operation anymore.
        let qr_path = match self.qr.render_png(&client_config).await {
            Ok(png) => match write_qr_image(&artifacts.qr_path, &png) {
                Ok(()) => Some(artifacts.qr_path.display().to_string()),
                Err(e) => {
                    tracing::warn!("[PeerOps] QR image not written for {}: {}", name, e);
                    None
                }
            },
            Err(e) => {
                tracing::warn!("[PeerOps] QR rendering skipped for {}: {}", name, e);
                None
            }
        };

        tracing::info!("[PeerOps] Created peer {} at {}", name, address);
        Ok(CreateResponse {
            status: "success",
            name: name.to_string(),
            public_key,
            address,
            allowed_ips: requested.to_string(),
            config_path: artifacts.config_path.display().to_string(),
            public_config_path: artifacts.public_config_path.display().to_string(),
            qr_path,
        })
    }

    /// Delete a peer block, its name annotation, and its artifact set.
    pub async fn delete(&self, identifier: &str) -> Result<DeleteResponse, WgError> {
        let mut artifact_name = identifier.to_string();
        self.store.update(|current| {
            let mut doc = Document::parse(current);
            let index = doc.find(identifier)?;
            if let Some(name) = doc.peers[index].name() {
                artifact_name = name;
            }
            doc.remove(index);
            Ok(doc.render())
        })?;

        ClientArtifacts::for_name(self.settings, &artifact_name).remove();

        tracing::info!("[PeerOps] Deleted peer {}", identifier);
        Ok(DeleteResponse {
            status: "success",
            id: identifier.to_string(),
        })
    }

    /// Comment or uncomment a peer block's syntax lines.
    pub async fn toggle(
        &self,
        identifier: &str,
        mode: ToggleMode,
    ) -> Result<ToggleResponse, WgError> {
        self.store.update(|current| {
            let mut doc = Document::parse(current);
            let index = doc.find(identifier)?;
            transform::apply(&mut doc.peers[index], mode);
            Ok(doc.render())
        })?;

        tracing::info!("[PeerOps] Toggled peer {} to {}", identifier, mode.as_str());
        Ok(ToggleResponse {
            status: "success",
            id: identifier.to_string(),
            mode: mode.as_str(),
        })
    }

    /// Render a fresh QR image for an existing client config.
    pub async fn generate_qr(&self, identifier: &str) -> Result<QrResponse, WgError> {
        let artifacts = ClientArtifacts::for_name(self.settings, identifier);
        let config_path = artifacts.existing_config().ok_or_else(|| {
            WgError::ConfigNotFound(format!("no client config for {identifier}"))
        })?;

        let config_text = fs::read_to_string(&config_path)?;
        let png = self.qr.render_png(&config_text).await?;

        write_qr_image(&artifacts.qr_path, &png)?;

        let encoded = base64::engine::general_purpose::STANDARD.encode(&png);
        Ok(QrResponse {
            status: "success",
            id: identifier.to_string(),
            config_path: config_path.display().to_string(),
            qr_path: artifacts.qr_path.display().to_string(),
            qr_base64: format!("data:image/png;base64,{encoded}"),
        })
    }

    /// Return the raw server config text.
    pub async fn read_config(&self) -> Result<ReadConfigResponse, WgError> {
        Ok(ReadConfigResponse {
            status: "success",
            config: self.store.load()?,
        })
    }

    /// Enumerate peer blocks as structured records.
    pub async fn list(&self) -> Result<ListResponse, WgError> {
        let doc = Document::parse(&self.store.load()?);
        let peers = doc
            .peers
            .iter()
            .map(|p| PeerRecord {
                name: p.name(),
                public_key: p.public_key(),
                allowed_ips: p.allowed_ips(),
                enabled: p.enabled(),
            })
            .collect();
        Ok(ListResponse {
            status: "success",
            peers,
        })
    }
}

/// Names become file names; keep them short-safe and path-safe.
fn validate_name(name: &str) -> Result<(), WgError> {
    if name.len() < 3 {
        return Err(WgError::InvalidName(
            "must be at least 3 characters long".to_string(),
        ));
    }
    let re = Regex::new(r"^[A-Za-z0-9._-]+$").unwrap();
    if !re.is_match(name) {
        return Err(WgError::InvalidName(
            "may contain only letters, numbers, dot, dash, and underscore".to_string(),
        ));
    }
    Ok(())
}

fn write_qr_image(path: &std::path::Path, png: &[u8]) -> Result<(), WgError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, png)?;
    Ok(())
}

fn append_peer_block(current: &str, name: &str, public_key: &str, address: &str) -> String {
    let mut out = current.to_string();
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(&format!(
        "\n# Name: {name}\n[Peer]\nPublicKey = {public_key}\nAllowedIPs = {address}\n"
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::keys::Keypair;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    struct FakeKeys {
        counter: AtomicU32,
    }

    impl FakeKeys {
        fn new() -> Self {
            Self {
                counter: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl KeyProvider for FakeKeys {
        async fn server_public_key(&self) -> Result<String, WgError> {
            Ok("SERVERPUB".to_string())
        }

        async fn generate_keypair(&self) -> Result<Keypair, WgError> {
            let n = self.counter.fetch_add(1, Ordering::SeqCst);
            Ok(Keypair {
                private_key: format!("PRIV{n}"),
                public_key: format!("PUB{n}"),
            })
        }
    }

    struct FakeQr;

    #[async_trait]
    impl QrRenderer for FakeQr {
        async fn render_png(&self, _text: &str) -> Result<Vec<u8>, WgError> {
            Ok(b"\x89PNG-fake".to_vec())
        }
    }

    struct MissingQr;

    #[async_trait]
    impl QrRenderer for MissingQr {
        async fn render_png(&self, _text: &str) -> Result<Vec<u8>, WgError> {
            Err(WgError::QrToolMissing)
        }
    }

    fn settings_in(dir: &TempDir) -> Settings {
        Settings {
            config_path: dir.path().join("wg1.conf"),
            client_config_dir: dir.path().join("client"),
            public_config_dir: dir.path().join("public"),
            qr_dir: dir.path().join("qr"),
            endpoint_host: "vpn.example.com".to_string(),
            ..Settings::default()
        }
    }

    fn seed_config(settings: &Settings, text: &str) {
        fs::write(&settings.config_path, text).unwrap();
    }

    const SERVER_ONLY: &str = "[Interface]\nAddress = 10.0.0.1/24\nPrivateKey = S\nListenPort = 51820\n";

    #[tokio::test]
    async fn test_create_on_fresh_config_assigns_first_pool_address() {
        let dir = TempDir::new().unwrap();
        let settings = settings_in(&dir);
        seed_config(&settings, SERVER_ONLY);
        let keys = FakeKeys::new();
        let ops = PeerOps::new(&settings, &keys, &FakeQr);

        let resp = ops.create("alice", None).await.unwrap();
        assert_eq!(resp.status, "success");
        assert_eq!(resp.address, "10.0.0.2/32");
        assert_eq!(resp.allowed_ips, "0.0.0.0/0");
        assert_eq!(resp.public_key, "PUB0");

        let text = fs::read_to_string(&settings.config_path).unwrap();
        assert!(text.contains("# Name: alice"));
        assert!(text.contains("PublicKey = PUB0"));
        assert!(text.contains("AllowedIPs = 10.0.0.2/32"));

        // Artifact set exists, and the locator resolves the created name.
        assert!(PathBuf::from(&resp.config_path).exists());
        assert!(PathBuf::from(&resp.public_config_path).exists());
        assert!(resp.qr_path.is_some());
        let doc = Document::parse(&text);
        assert!(doc.find("alice").is_ok());
    }

    #[tokio::test]
    async fn test_back_to_back_creates_get_distinct_addresses() {
        let dir = TempDir::new().unwrap();
        let settings = settings_in(&dir);
        seed_config(&settings, SERVER_ONLY);
        let keys = FakeKeys::new();
        let ops = PeerOps::new(&settings, &keys, &FakeQr);

        let a = ops.create("alice", None).await.unwrap();
        let b = ops.create("bobby", None).await.unwrap();
        assert_eq!(a.address, "10.0.0.2/32");
        assert_eq!(b.address, "10.0.0.3/32");
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_name() {
        let dir = TempDir::new().unwrap();
        let settings = settings_in(&dir);
        seed_config(&settings, SERVER_ONLY);
        let keys = FakeKeys::new();
        let ops = PeerOps::new(&settings, &keys, &FakeQr);

        ops.create("alice", None).await.unwrap();
        let err = ops.create("alice", None).await.unwrap_err();
        assert!(matches!(err, WgError::NameExists(_)));
    }

    #[tokio::test]
    async fn test_create_rejects_used_explicit_address_and_keeps_file() {
        let dir = TempDir::new().unwrap();
        let settings = settings_in(&dir);
        seed_config(&settings, SERVER_ONLY);
        let keys = FakeKeys::new();
        let ops = PeerOps::new(&settings, &keys, &FakeQr);

        ops.create("alice", Some("10.0.0.50/32")).await.unwrap();
        let before = fs::read_to_string(&settings.config_path).unwrap();

        let err = ops.create("bobby", Some("10.0.0.50/32")).await.unwrap_err();
        assert!(matches!(err, WgError::IpInUse(_)));
        assert_eq!(fs::read_to_string(&settings.config_path).unwrap(), before);
        // No bobby artifacts stick around.
        assert!(!settings.client_config_dir.join("bobby.key").exists());
        assert!(!settings.client_config_dir.join("bobby.conf").exists());
    }

    #[tokio::test]
    async fn test_create_with_missing_qr_tool_is_non_fatal() {
        let dir = TempDir::new().unwrap();
        let settings = settings_in(&dir);
        seed_config(&settings, SERVER_ONLY);
        let keys = FakeKeys::new();
        let ops = PeerOps::new(&settings, &keys, &MissingQr);

        let resp = ops.create("alice", None).await.unwrap();
        assert_eq!(resp.status, "success");
        assert!(resp.qr_path.is_none());
    }

    #[tokio::test]
    async fn test_create_succeeds_when_qr_image_cannot_be_written() {
        let dir = TempDir::new().unwrap();
        let mut settings = settings_in(&dir);
        // A regular file where the QR directory should go makes every write
        // under it fail.
        fs::write(dir.path().join("blocker"), "").unwrap();
        settings.qr_dir = dir.path().join("blocker").join("qr");
        seed_config(&settings, SERVER_ONLY);
        let keys = FakeKeys::new();
        let ops = PeerOps::new(&settings, &keys, &FakeQr);

        let resp = ops.create("alice", None).await.unwrap();
        assert_eq!(resp.status, "success");
        assert!(resp.qr_path.is_none());
        let text = fs::read_to_string(&settings.config_path).unwrap();
        assert!(text.contains("# Name: alice"));
    }

    #[tokio::test]
    async fn test_create_without_endpoint_host_fails_before_mutation() {
        let dir = TempDir::new().unwrap();
        let mut settings = settings_in(&dir);
        settings.endpoint_host = String::new();
        seed_config(&settings, SERVER_ONLY);
        let keys = FakeKeys::new();
        let ops = PeerOps::new(&settings, &keys, &FakeQr);

        let err = ops.create("alice", None).await.unwrap_err();
        assert!(matches!(err, WgError::EndpointUnset));
        assert_eq!(fs::read_to_string(&settings.config_path).unwrap(), SERVER_ONLY);
        assert!(!settings.client_config_dir.join("alice.key").exists());
    }

    #[tokio::test]
    async fn test_create_validates_name() {
        let dir = TempDir::new().unwrap();
        let settings = settings_in(&dir);
        seed_config(&settings, SERVER_ONLY);
        let keys = FakeKeys::new();
        let ops = PeerOps::new(&settings, &keys, &FakeQr);

        assert!(matches!(
            ops.create("al", None).await.unwrap_err(),
            WgError::InvalidName(_)
        ));
        assert!(matches!(
            ops.create("alice/../../etc", None).await.unwrap_err(),
            WgError::InvalidName(_)
        ));
    }

    #[tokio::test]
    async fn test_disable_then_enable_restores_block_verbatim() {
        let dir = TempDir::new().unwrap();
        let settings = settings_in(&dir);
        seed_config(&settings, SERVER_ONLY);
        let keys = FakeKeys::new();
        let ops = PeerOps::new(&settings, &keys, &FakeQr);

        ops.create("alice", None).await.unwrap();
        let created = fs::read_to_string(&settings.config_path).unwrap();

        ops.toggle("alice", ToggleMode::Disable).await.unwrap();
        let disabled = fs::read_to_string(&settings.config_path).unwrap();
        assert!(disabled.contains("# [Peer]"));
        assert!(disabled.contains("# PublicKey = PUB0"));
        assert!(disabled.contains("# AllowedIPs = 10.0.0.2/32"));

        ops.toggle("alice", ToggleMode::Enable).await.unwrap();
        assert_eq!(fs::read_to_string(&settings.config_path).unwrap(), created);
    }

    #[tokio::test]
    async fn test_toggle_by_public_key() {
        let dir = TempDir::new().unwrap();
        let settings = settings_in(&dir);
        seed_config(&settings, SERVER_ONLY);
        let keys = FakeKeys::new();
        let ops = PeerOps::new(&settings, &keys, &FakeQr);

        ops.create("alice", None).await.unwrap();
        let resp = ops.toggle("PUB0", ToggleMode::Disable).await.unwrap();
        assert_eq!(resp.mode, "disable");
        let doc = Document::parse(&fs::read_to_string(&settings.config_path).unwrap());
        assert!(!doc.peers[0].enabled());
    }

    #[tokio::test]
    async fn test_toggle_unknown_identifier_is_explicit_error() {
        let dir = TempDir::new().unwrap();
        let settings = settings_in(&dir);
        seed_config(&settings, SERVER_ONLY);
        let keys = FakeKeys::new();
        let ops = PeerOps::new(&settings, &keys, &FakeQr);

        let err = ops.toggle("ghost", ToggleMode::Enable).await.unwrap_err();
        assert!(matches!(err, WgError::PeerNotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_removes_block_annotation_and_artifacts() {
        let dir = TempDir::new().unwrap();
        let settings = settings_in(&dir);
        seed_config(&settings, SERVER_ONLY);
        let keys = FakeKeys::new();
        let ops = PeerOps::new(&settings, &keys, &FakeQr);

        let created = ops.create("alice", None).await.unwrap();
        ops.delete("alice").await.unwrap();

        let text = fs::read_to_string(&settings.config_path).unwrap();
        assert!(!text.contains("[Peer]"));
        assert!(!text.contains("# Name: alice"));
        assert!(!PathBuf::from(&created.config_path).exists());
        assert!(!PathBuf::from(&created.public_config_path).exists());
        assert!(!settings.client_config_dir.join("alice.key").exists());
    }

    #[tokio::test]
    async fn test_second_delete_reports_not_found() {
        let dir = TempDir::new().unwrap();
        let settings = settings_in(&dir);
        seed_config(&settings, SERVER_ONLY);
        let keys = FakeKeys::new();
        let ops = PeerOps::new(&settings, &keys, &FakeQr);

        ops.create("alice", None).await.unwrap();
        ops.delete("alice").await.unwrap();
        let err = ops.delete("alice").await.unwrap_err();
        assert!(matches!(err, WgError::PeerNotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_leaves_other_peers_byte_for_byte() {
        let dir = TempDir::new().unwrap();
        let settings = settings_in(&dir);
        seed_config(&settings, SERVER_ONLY);
        let keys = FakeKeys::new();
        let ops = PeerOps::new(&settings, &keys, &FakeQr);

        ops.create("alice", None).await.unwrap();
        ops.create("bobby", None).await.unwrap();
        ops.delete("alice").await.unwrap();

        let text = fs::read_to_string(&settings.config_path).unwrap();
        assert!(text.contains("# Name: bobby"));
        assert!(text.contains("PublicKey = PUB1"));
        assert!(text.contains("AllowedIPs = 10.0.0.3/32"));
        assert!(!text.contains("alice"));
    }

    #[tokio::test]
    async fn test_generate_qr_returns_data_uri() {
        let dir = TempDir::new().unwrap();
        let settings = settings_in(&dir);
        seed_config(&settings, SERVER_ONLY);
        let keys = FakeKeys::new();
        let ops = PeerOps::new(&settings, &keys, &FakeQr);

        ops.create("alice", None).await.unwrap();
        let resp = ops.generate_qr("alice").await.unwrap();
        assert!(resp.qr_base64.starts_with("data:image/png;base64,"));
        assert!(PathBuf::from(&resp.qr_path).exists());
    }

    #[tokio::test]
    async fn test_generate_qr_unknown_client_fails() {
        let dir = TempDir::new().unwrap();
        let settings = settings_in(&dir);
        seed_config(&settings, SERVER_ONLY);
        let keys = FakeKeys::new();
        let ops = PeerOps::new(&settings, &keys, &FakeQr);

        let err = ops.generate_qr("ghost").await.unwrap_err();
        assert!(matches!(err, WgError::ConfigNotFound(_)));
    }

    #[tokio::test]
    async fn test_generate_qr_requires_the_tool() {
        let dir = TempDir::new().unwrap();
        let settings = settings_in(&dir);
        seed_config(&settings, SERVER_ONLY);
        let keys = FakeKeys::new();
        let create_ops = PeerOps::new(&settings, &keys, &FakeQr);
        create_ops.create("alice", None).await.unwrap();

        let ops = PeerOps::new(&settings, &keys, &MissingQr);
        let err = ops.generate_qr("alice").await.unwrap_err();
        assert!(matches!(err, WgError::QrToolMissing));
    }

    #[tokio::test]
    async fn test_read_config_round_trips_raw_text() {
        let dir = TempDir::new().unwrap();
        let settings = settings_in(&dir);
        seed_config(&settings, SERVER_ONLY);
        let keys = FakeKeys::new();
        let ops = PeerOps::new(&settings, &keys, &FakeQr);

        let resp = ops.read_config().await.unwrap();
        assert_eq!(resp.config, SERVER_ONLY);
    }

    #[tokio::test]
    async fn test_read_config_missing_file() {
        let dir = TempDir::new().unwrap();
        let settings = settings_in(&dir);
        let keys = FakeKeys::new();
        let ops = PeerOps::new(&settings, &keys, &FakeQr);

        let err = ops.read_config().await.unwrap_err();
        assert!(matches!(err, WgError::ConfigNotFound(_)));
    }

    #[tokio::test]
    async fn test_list_reports_structured_records() {
        let dir = TempDir::new().unwrap();
        let settings = settings_in(&dir);
        seed_config(&settings, SERVER_ONLY);
        let keys = FakeKeys::new();
        let ops = PeerOps::new(&settings, &keys, &FakeQr);

        ops.create("alice", None).await.unwrap();
        ops.create("bobby", None).await.unwrap();
        ops.toggle("bobby", ToggleMode::Disable).await.unwrap();

        let resp = ops.list().await.unwrap();
        assert_eq!(resp.peers.len(), 2);
        assert_eq!(resp.peers[0].name.as_deref(), Some("alice"));
        assert!(resp.peers[0].enabled);
        assert_eq!(resp.peers[1].name.as_deref(), Some("bobby"));
        assert!(!resp.peers[1].enabled);
        assert_eq!(resp.peers[1].allowed_ips, vec!["10.0.0.3/32"]);
    }
}
