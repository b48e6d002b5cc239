//! Request/response shapes exchanged between the bridge and the network
//! capability.
//!
//! Guests describe an outbound request as three strings (url, method, body).
//! `HttpRequest::from_guest` turns those into an explicit request value,
//! including the empty-body shim for methods that conventionally carry a
//! payload.

use std::fmt;

use reqwest::Url;

use crate::error::HostError;

/// Content type attached to every guest-originated payload.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Payload sent when a body-carrying method arrives without a body.
pub const EMPTY_JSON_BODY: &[u8] = b"{}";

/// HTTP method requested by the guest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
    /// Any other token, kept upper-cased.
    Other(String),
}

impl HttpMethod {
    /// Parse a method token as written by the guest (trimmed, case-insensitive).
    pub fn parse(raw: &str) -> Self {
        let token = raw.trim().to_ascii_uppercase();
        match token.as_str() {
            "GET" => Self::Get,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "PATCH" => Self::Patch,
            "DELETE" => Self::Delete,
            "HEAD" => Self::Head,
            "OPTIONS" => Self::Options,
            _ => Self::Other(token),
        }
    }

    /// Canonical upper-case token.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Other(token) => token,
        }
    }

    /// Methods that conventionally carry a request body.
    pub fn carries_body(&self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An outbound request handed to a `NetworkClient`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    /// Build the request a guest asked for.
    ///
    /// A non-empty `body` is sent as JSON. An empty body on POST/PUT/PATCH is
    /// replaced by `{}` so the upstream always receives a JSON document.
    pub fn from_guest(method: HttpMethod, url: String, body: Option<Vec<u8>>) -> Self {
        let body = match body {
            Some(bytes) if !bytes.is_empty() => Some(bytes),
            _ if method.carries_body() => Some(EMPTY_JSON_BODY.to_vec()),
            _ => None,
        };

        let mut headers = vec![("Accept".to_string(), JSON_CONTENT_TYPE.to_string())];
        if body.is_some() {
            headers.push(("Content-Type".to_string(), JSON_CONTENT_TYPE.to_string()));
        }

        Self {
            method,
            url,
            headers,
            body,
        }
    }

    /// Look up a header value (case-insensitive name match).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// The body as UTF-8 text, if present and valid.
    pub fn body_text(&self) -> Option<&str> {
        self.body
            .as_deref()
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
    }
}

/// Response returned by a `NetworkClient`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Create a response with the given status and body.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// A `200 OK` response.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::new(200, body)
    }

    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Resolve a guest-supplied URL against the call's target host.
///
/// Absolute URLs are returned unchanged. Relative references (`/capture`)
/// are joined onto `base`; a relative reference with no usable base is an
/// error.
pub fn resolve_url(base: Option<&str>, target: &str) -> Result<String, HostError> {
    if let Ok(absolute) = Url::parse(target) {
        return Ok(absolute.into());
    }

    let base = base
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .ok_or_else(|| {
            HostError::invalid_url(format!("relative url '{}' with no target host", target))
        })?;

    let base = Url::parse(base)
        .map_err(|e| HostError::invalid_url(format!("target host '{}': {}", base, e)))?;
    base.join(target)
        .map(String::from)
        .map_err(|e| HostError::invalid_url(format!("'{}': {}", target, e)))
}
