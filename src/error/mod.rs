//! Error handling module

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WgError {
    #[error("peer not found: {0}")]
    PeerNotFound(String),

    #[error("ambiguous identifier: {0}")]
    AmbiguousIdentifier(String),

    #[error("name already exists: {0}")]
    NameExists(String),

    #[error("IP already in use: {0}")]
    IpInUse(String),

    #[error("no available IPs in pool {0}0/24")]
    PoolExhausted(String),

    #[error("invalid allowed-ips: {0}")]
    InvalidAllowedIps(String),

    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("config not found: {0}")]
    ConfigNotFound(String),

    #[error("cannot read server public key: {0}")]
    ServerKeyUnavailable(String),

    #[error("endpoint host not configured")]
    EndpointUnset,

    #[error("qrencode not installed")]
    QrToolMissing,

    #[error("{tool} failed: {message}")]
    ToolFailed { tool: String, message: String },

    #[error("{tool} timed out after {seconds}s")]
    ToolTimeout { tool: String, seconds: u64 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// JSON error object written to stdout, one per failed invocation
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    pub message: String,
}

impl ErrorResponse {
    pub fn from_error(err: &WgError) -> Self {
        Self {
            status: "error",
            message: err.to_string(),
        }
    }
}
