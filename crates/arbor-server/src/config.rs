use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;

use arbor_values::BatchConfig;
use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Tasks verifying and decoding the chunks of one write request.
    pub write_concurrency: usize,
    /// zstd level for `getRefs` responses.
    pub compression_level: i32,
    /// Largest request body accepted, compressed.
    pub max_body_bytes: usize,
    /// Largest `writeValue` body accepted once decompressed.
    pub max_decompressed_bytes: usize,
    pub batch: BatchConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8000),
            write_concurrency: 4,
            compression_level: 3,
            max_body_bytes: 256 * 1024 * 1024,
            max_decompressed_bytes: 512 * 1024 * 1024,
            batch: BatchConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(s: &str) -> ServerResult<Self> {
        toml::from_str(s).map_err(|e| ServerError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> ServerResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}
