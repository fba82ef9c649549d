//! Configuration module

use std::path::PathBuf;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Server-side WireGuard config the peer blocks live in
    #[serde(default = "default_config_path")]
    pub config_path: PathBuf,
    /// Interface name, used for `wg show` and the service restart
    #[serde(default = "default_interface")]
    pub interface: String,
    /// Private per-client directory (keys + client configs)
    #[serde(default = "default_client_config_dir")]
    pub client_config_dir: PathBuf,
    /// Web-served directory holding downloadable client configs
    #[serde(default = "default_public_config_dir")]
    pub public_config_dir: PathBuf,
    /// Directory QR images are rendered into
    #[serde(default = "default_qr_dir")]
    pub qr_dir: PathBuf,
    /// Allocation pool prefix, e.g. "10.0.0." scans .2 through .254
    #[serde(default = "default_ipv4_prefix")]
    pub ipv4_prefix: String,
    /// Public endpoint host clients connect to
    #[serde(default)]
    pub endpoint_host: String,
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    #[serde(default = "default_dns")]
    pub dns: String,
    #[serde(default = "default_wg_bin")]
    pub wg_bin: String,
    #[serde(default = "default_qrencode_bin")]
    pub qrencode_bin: String,
    #[serde(default = "default_restart_bin")]
    pub restart_bin: String,
    /// Timeout applied to every external tool invocation
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            config_path: default_config_path(),
            interface: default_interface(),
            client_config_dir: default_client_config_dir(),
            public_config_dir: default_public_config_dir(),
            qr_dir: default_qr_dir(),
            ipv4_prefix: default_ipv4_prefix(),
            endpoint_host: String::new(),
            listen_port: default_listen_port(),
            dns: default_dns(),
            wg_bin: default_wg_bin(),
            qrencode_bin: default_qrencode_bin(),
            restart_bin: default_restart_bin(),
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

fn default_config_path() -> PathBuf {
    PathBuf::from("/etc/wireguard/wg1.conf")
}

fn default_interface() -> String {
    "wg1".to_string()
}

fn default_client_config_dir() -> PathBuf {
    PathBuf::from("/etc/wireguard/client")
}

fn default_public_config_dir() -> PathBuf {
    PathBuf::from("/var/www/wireguard/conf")
}

fn default_qr_dir() -> PathBuf {
    PathBuf::from("/var/www/wireguard/qr")
}

fn default_ipv4_prefix() -> String {
    "10.0.0.".to_string()
}

fn default_listen_port() -> u16 {
    51820
}

fn default_dns() -> String {
    "1.1.1.1".to_string()
}

fn default_wg_bin() -> String {
    "wg".to_string()
}

fn default_qrencode_bin() -> String {
    "qrencode".to_string()
}

fn default_restart_bin() -> String {
    "systemctl".to_string()
}

fn default_tool_timeout_secs() -> u64 {
    15
}

impl Settings {
    pub fn load() -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::Environment::with_prefix("WGPEERCTL").separator("__"))
            .build()?;

        let settings: Settings = settings.try_deserialize().unwrap_or_default();
        Ok(settings)
    }
}
