//! Error types for the client core.
//!
//! # Design
//! `ClientError` is the single error value that reaches request owners. It
//! carries a closed `ErrorKind`, the domain that produced it (client side or
//! server side), a machine code and a human `pretty_message` filled in by the
//! `ErrorTranslator`. Envelope and transport failures are always classified
//! into a `ClientError`; nothing below the parsing boundary panics or
//! propagates a foreign error type.
//!
//! Misuse of the library itself (bad handler tags, malformed config, bad
//! error-book payloads) gets its own small error enums.

use std::fmt;

use thiserror::Error;

/// Machine codes for client-side error kinds. Server envelope errors use the
/// server's own (positive) code instead.
pub mod codes {
    /// Request canceled; also used for "network unreachable".
    pub const NET_EXCEPTION: i32 = -1;
    pub const TIMEOUT_EXCEPTION: i32 = -2;
    pub const TLS_EXCEPTION: i32 = -3;
    /// Malformed or incomplete envelope.
    pub const DATA_EXCEPTION: i32 = -4;
    pub const IO_EXCEPTION: i32 = -5;
    /// Base for codes derived from an HTTP status: `HTTP_STATUS_BASE + status`.
    pub const HTTP_STATUS_BASE: i32 = 10_000;
}

/// Which side of the wire produced the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorDomain {
    Client,
    Server,
}

impl fmt::Display for ErrorDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorDomain::Client => write!(f, "client"),
            ErrorDomain::Server => write!(f, "server"),
        }
    }
}

/// The closed set of error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Connection, routing, DNS, encoding, URL or 4xx failures.
    ClientIo,
    Timeout,
    Tls,
    /// Malformed or missing envelope fields.
    Data,
    /// The server answered with a non-zero envelope code or a 5xx status.
    Server,
    /// The service refused the request, or a success callback failed.
    HttpStatus,
    /// The request was canceled.
    Canceled,
}

/// A classified request failure delivered to owners and to the global
/// error handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{domain} error {code}: {message}")]
pub struct ClientError {
    pub domain: ErrorDomain,
    pub kind: ErrorKind,
    pub code: i32,
    pub http_status: Option<u16>,
    pub message: String,
    pub pretty_message: String,
    closed: bool,
}

impl ClientError {
    pub fn new(domain: ErrorDomain, kind: ErrorKind, code: i32, message: impl Into<String>) -> Self {
        Self {
            domain,
            kind,
            code,
            http_status: None,
            message: message.into(),
            pretty_message: String::new(),
            closed: false,
        }
    }

    /// Client-side malformed-data error.
    pub fn data(message: impl Into<String>) -> Self {
        Self::new(ErrorDomain::Client, ErrorKind::Data, codes::DATA_EXCEPTION, message)
    }

    /// Server-side envelope error carrying the server's own code.
    pub fn server(code: i32, message: impl Into<String>) -> Self {
        Self::new(ErrorDomain::Server, ErrorKind::Server, code, message)
    }

    /// The request was canceled before completing.
    pub fn canceled() -> Self {
        Self::new(
            ErrorDomain::Client,
            ErrorKind::Canceled,
            codes::NET_EXCEPTION,
            "CanceledException",
        )
    }

    pub fn with_http_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    /// Mark the error as fully handled by a per-request handler.
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Errors from handler registration on a `LifecycleMailbox`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MailboxError {
    #[error("tag {0} is reserved for wildcard handlers")]
    ReservedTag(i32),

    #[error("tag {0} is already registered")]
    DuplicateTag(i32),

    #[error("tags must not repeat")]
    DuplicateTags,
}

/// Errors from applying an error-code payload to the `ErrorBook`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorBookError {
    #[error("malformed error book payload: {0}")]
    Malformed(String),

    #[error("error book payload must be a JSON object")]
    NotAnObject,

    #[error("error code key {0:?} is not an integer")]
    InvalidCode(String),
}

/// Errors from loading a `ClientConfig`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid client config: {0}")]
    Invalid(#[from] serde_json::Error),

    #[error("base_url must not be empty")]
    MissingBaseUrl,
}
