use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level configuration. Every field has a default so an empty file (or
/// no file at all) yields a runnable localhost server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ComcoreConfig {
    pub server: ServerConfig,
    pub tls: TlsConfig,
    pub data: DataConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Address the TLS listener binds to.
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 4433,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TlsConfig {
    /// PEM certificate chain. When unset (or the file is missing) a
    /// self-signed certificate is generated under the data dir.
    pub cert_file: Option<PathBuf>,
    /// PEM private key, paired with `cert_file`.
    pub key_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DataConfig {
    /// Root for server-written files (generated certs, uploads). Defaults
    /// to the platform data dir.
    pub dir: Option<PathBuf>,
}
