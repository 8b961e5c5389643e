use bytes::Bytes;

/// HTTP method of a protocol request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// A protocol request, independent of how it travels.
#[derive(Clone, Debug)]
pub struct WireRequest {
    pub method: Method,
    pub path: &'static str,
    pub query: Option<String>,
    pub body: Bytes,
    pub content_type: Option<&'static str>,
}

impl WireRequest {
    pub fn get(path: &'static str) -> Self {
        Self {
            method: Method::Get,
            path,
            query: None,
            body: Bytes::new(),
            content_type: None,
        }
    }

    pub fn post(path: &'static str, body: impl Into<Bytes>) -> Self {
        Self {
            method: Method::Post,
            path,
            query: None,
            body: body.into(),
            content_type: Some(content_types::OCTET_STREAM),
        }
    }

    /// A form-encoded POST, as used for hash lists.
    pub fn form(path: &'static str, body: String) -> Self {
        Self {
            content_type: Some(content_types::FORM),
            ..Self::post(path, body)
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Path plus query string.
    pub fn uri(&self) -> String {
        match &self.query {
            Some(q) if !q.is_empty() => format!("{}?{}", self.path, q),
            _ => self.path.to_string(),
        }
    }
}

/// A protocol response: status code and raw body.
#[derive(Clone, Debug)]
pub struct WireResponse {
    pub status: u16,
    pub body: Bytes,
}

impl WireResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as text, lossily decoded.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

pub mod content_types {
    pub const OCTET_STREAM: &str = "application/octet-stream";
    pub const FORM: &str = "application/x-www-form-urlencoded";
}

/// Status codes with protocol meaning.
pub mod status {
    pub const OK: u16 = 200;
    pub const CREATED: u16 = 201;
    pub const BAD_REQUEST: u16 = 400;
    pub const CONFLICT: u16 = 409;
    pub const TOO_MANY_REQUESTS: u16 = 429;
}
