/// HTTP endpoint paths for the remote chunk-store protocol.
pub mod endpoints {
    pub const ROOT: &str = "/root/";
    pub const WRITE_VALUE: &str = "/writeValue/";
    pub const GET_REFS: &str = "/getRefs/";
    pub const HAS_REFS: &str = "/hasRefs/";
    pub const GET_BLOB: &str = "/getBlob/";
    pub const HEALTH: &str = "/health";
}

/// Query and form parameter names.
pub mod params {
    /// Expected current root on `POST /root/`.
    pub const LAST: &str = "last";
    /// Proposed new root on `POST /root/`.
    pub const CURRENT: &str = "current";
    /// Repeated hash parameter in `getRefs`/`hasRefs` bodies.
    pub const REF: &str = "ref";
    /// Blob hash on `GET /getBlob/`.
    pub const HASH: &str = "h";
}

pub const PROTOCOL_VERSION: u32 = 1;

/// Health check response.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub protocol_version: u32,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            protocol_version: PROTOCOL_VERSION,
        }
    }
}
