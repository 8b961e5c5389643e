use async_trait::async_trait;
use arbor_protocol::{Method, WireRequest, WireResponse};
use reqwest::header::CONTENT_TYPE;
use url::Url;

use crate::error::{SyncError, SyncResult};
use crate::transport::RemoteTransport;

/// [`RemoteTransport`] over HTTP.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    base: Url,
}

impl HttpTransport {
    pub fn new(base: Url) -> Self {
        Self::with_client(reqwest::Client::new(), base)
    }

    pub fn with_client(client: reqwest::Client, base: Url) -> Self {
        Self { client, base }
    }

    pub fn parse(base: &str) -> SyncResult<Self> {
        let base = Url::parse(base)
            .map_err(|e| SyncError::TransportError(format!("invalid remote url {base:?}: {e}")))?;
        Ok(Self::new(base))
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn url_for(&self, request: &WireRequest) -> SyncResult<Url> {
        let mut url = self
            .base
            .join(request.path.trim_start_matches('/'))
            .map_err(|e| SyncError::TransportError(e.to_string()))?;
        url.set_query(request.query.as_deref().filter(|q| !q.is_empty()));
        Ok(url)
    }
}

#[async_trait]
impl RemoteTransport for HttpTransport {
    async fn send(&self, request: WireRequest) -> SyncResult<WireResponse> {
        let url = self.url_for(&request)?;
        let mut builder = match request.method {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url).body(request.body),
        };
        if let Some(ct) = request.content_type {
            builder = builder.header(CONTENT_TYPE, ct);
        }
        let resp = builder
            .send()
            .await
            .map_err(|e| SyncError::TransportError(e.to_string()))?;
        let status = resp.status().as_u16();
        let body = resp
            .bytes()
            .await
            .map_err(|e| SyncError::TransportError(e.to_string()))?;
        Ok(WireResponse::new(status, body))
    }

    fn describe(&self) -> String {
        self.base.to_string()
    }
}
