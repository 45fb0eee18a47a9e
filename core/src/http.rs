//! HTTP transport types and the transport contract.
//!
//! # Design
//! Requests and responses are plain data. The core builds `HttpRequest`
//! values and consumes `HttpResponse` / `TransportFailure` values; the
//! transport collaborator owns sockets, TLS, retries and on-disk caching.
//!
//! The transport reports each request's terminal outcome exactly once, on
//! one of its worker threads, through `TransportCallback`. The callback
//! methods take `self: Box<Self>`, so a second terminal call cannot be
//! expressed.
//!
//! All fields use owned types (`String`, `Vec`) so values can cross thread
//! and FFI boundaries without lifetime concerns.

use std::time::Duration;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

/// How long a transport may serve this request from its response cache.
///
/// The core only describes the window; storage is the transport's business.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    pub max_age: Duration,
}

impl CacheConfig {
    pub fn new(max_age: Duration) -> Self {
        Self { max_age }
    }
}

/// An HTTP request described as plain data.
///
/// Built by `ApiClient`. The transport executes it and reports back through
/// a `TransportCallback`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub cache: Option<CacheConfig>,
}

impl HttpRequest {
    /// Set a header, replacing any existing value with the same
    /// (case-insensitive) name.
    pub fn set_header(&mut self, key: &str, value: &str) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(key));
        self.headers.push((key.to_string(), value.to_string()));
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

/// An HTTP response described as plain data.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

/// Category of a transport-level failure, as reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Unknown,
    /// No route to the destination network.
    Route,
    /// DNS resolution failed.
    Host,
    Connect,
    /// Request body or parameters could not be encoded.
    Encode,
    /// Malformed URL.
    Url,
    Timeout,
    /// Invalid request parameters rejected before sending.
    Params,
    Tls,
    /// 4xx class status.
    NotFound,
    /// 5xx class status.
    Server,
    /// The service explicitly refused the request.
    Service,
}

/// A transport-level failure: the request never produced an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportFailure {
    pub kind: FailureKind,
    /// HTTP status, when the failure came from a response.
    pub status: Option<u16>,
    pub message: String,
}

impl TransportFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
        }
    }

    /// Classify an HTTP status for transports that surface every response
    /// as data. Returns `None` for statuses that carry an envelope.
    pub fn from_status(status: u16, body: &str) -> Option<Self> {
        let kind = match status {
            400..=499 => FailureKind::NotFound,
            500..=599 => FailureKind::Server,
            _ => return None,
        };
        let message = if body.is_empty() {
            format!("HTTP {status}")
        } else {
            format!("HTTP {status}: {body}")
        };
        Some(Self {
            kind,
            status: Some(status),
            message,
        })
    }
}

/// Terminal outcome callbacks, invoked on a transport worker thread.
pub trait TransportCallback: Send {
    /// The request completed with a response that should carry an envelope.
    fn on_http_success(self: Box<Self>, response: HttpResponse);

    /// The request failed below the envelope layer.
    fn on_http_failed(self: Box<Self>, failure: TransportFailure);

    /// The request was canceled before completing.
    fn on_http_canceled(self: Box<Self>, request: HttpRequest);
}

/// The transport collaborator. Implementations must call exactly one
/// `TransportCallback` method per issued request.
pub trait Transport: Send + Sync {
    fn issue(&self, request: HttpRequest, callback: Box<dyn TransportCallback>);
}
