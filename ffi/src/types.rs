//! `#[repr(C)]` types for the FFI boundary.
//!
//! # Design
//! Each type mirrors a core type but uses C-compatible representations:
//! `*mut c_char` instead of `String`, raw pointers instead of `Vec`, and
//! enums with explicit discriminants. Enum-valued *inputs* are taken as
//! `u32` and checked with `from_raw`, so a bad value from C is an error
//! rather than undefined behavior. Conversion functions live here to keep
//! `lib.rs` focused on the `extern "C"` surface.

use std::ffi::CString;
use std::os::raw::c_char;
use std::sync::Arc;

use tether_core::http::{FailureKind, HttpMethod};
use tether_core::{ApiClient, ClientError, ClientHandler, ErrorDomain, ErrorKind};

/// Opaque handle to an `ApiClient` and its shared context. C callers
/// receive a pointer to this and pass it back into every FFI function.
pub struct FfiContext {
    pub(crate) inner: ApiClient,
}

/// Host-supplied suppression hook: return `true` to swallow an error.
pub type FfiSuppressFn = Option<extern "C" fn(kind: FfiErrorKind, code: i32) -> bool>;

/// Bridges the host's suppression hook into the core. Unhandled errors are
/// returned to the host in result structs, so there is nothing to forward.
pub(crate) struct FfiHandler {
    pub(crate) suppress: FfiSuppressFn,
}

impl ClientHandler for FfiHandler {
    fn suppress(&self, error: &ClientError) -> bool {
        match self.suppress {
            Some(hook) => hook(error.kind.into(), error.code),
            None => false,
        }
    }

    fn on_handle_error(&self, _error: &ClientError) {}
}

/// Heap-allocate `s` as a C string. Interior NULs are dropped.
pub(crate) fn to_c_string(s: impl Into<String>) -> *mut c_char {
    let s: String = s.into();
    CString::new(s.replace('\0', ""))
        .unwrap_or_default()
        .into_raw()
}

pub(crate) fn to_c_string_or_null(s: &str) -> *mut c_char {
    if s.is_empty() {
        std::ptr::null_mut()
    } else {
        to_c_string(s)
    }
}

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// HTTP method as a C enum.
#[repr(C)]
pub enum FfiHttpMethod {
    Get = 0,
    Post = 1,
    Put = 2,
    Delete = 3,
}

impl From<HttpMethod> for FfiHttpMethod {
    fn from(m: HttpMethod) -> Self {
        match m {
            HttpMethod::Get => FfiHttpMethod::Get,
            HttpMethod::Post => FfiHttpMethod::Post,
            HttpMethod::Put => FfiHttpMethod::Put,
            HttpMethod::Delete => FfiHttpMethod::Delete,
        }
    }
}

/// A single HTTP header as a key-value pair of C strings.
#[repr(C)]
pub struct FfiHeader {
    pub key: *mut c_char,
    pub value: *mut c_char,
}

/// An HTTP request described as C-compatible plain data.
///
/// `cache_max_age_secs` is 0 when the response must not be served from a
/// cache.
#[repr(C)]
pub struct FfiHttpRequest {
    pub method: FfiHttpMethod,
    pub path: *mut c_char,
    pub headers: *mut FfiHeader,
    pub headers_len: u32,
    pub body: *mut c_char,
    pub cache_max_age_secs: u64,
}

impl FfiHttpRequest {
    /// Convert a core `HttpRequest` into a heap-allocated `FfiHttpRequest`.
    pub(crate) fn from_core(req: tether_core::HttpRequest) -> *mut Self {
        let path = to_c_string(req.path);
        let body = match req.body {
            Some(b) => to_c_string(b),
            None => std::ptr::null_mut(),
        };

        let headers_len = req.headers.len() as u32;
        let headers = if req.headers.is_empty() {
            std::ptr::null_mut()
        } else {
            let ffi_headers: Box<[FfiHeader]> = req
                .headers
                .into_iter()
                .map(|(k, v)| FfiHeader {
                    key: to_c_string(k),
                    value: to_c_string(v),
                })
                .collect();
            Box::into_raw(ffi_headers) as *mut FfiHeader
        };

        let ffi_req = Box::new(FfiHttpRequest {
            method: req.method.into(),
            path,
            headers,
            headers_len,
            body,
            cache_max_age_secs: req.cache.map_or(0, |c| c.max_age.as_secs()),
        });
        Box::into_raw(ffi_req)
    }
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Result shape requested from `tether_parse_envelope`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiShape {
    Void = 0,
    Single = 1,
    List = 2,
    Cursor = 3,
}

impl FfiShape {
    pub(crate) fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(FfiShape::Void),
            1 => Some(FfiShape::Single),
            2 => Some(FfiShape::List),
            3 => Some(FfiShape::Cursor),
            _ => None,
        }
    }
}

/// Transport failure category reported by the host's HTTP engine.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiFailureKind {
    Unknown = 0,
    Route = 1,
    Host = 2,
    Connect = 3,
    Encode = 4,
    Url = 5,
    Timeout = 6,
    Params = 7,
    Tls = 8,
    NotFound = 9,
    Server = 10,
    Service = 11,
}

impl FfiFailureKind {
    pub(crate) fn from_raw(raw: u32) -> Option<Self> {
        let kind = match raw {
            0 => FfiFailureKind::Unknown,
            1 => FfiFailureKind::Route,
            2 => FfiFailureKind::Host,
            3 => FfiFailureKind::Connect,
            4 => FfiFailureKind::Encode,
            5 => FfiFailureKind::Url,
            6 => FfiFailureKind::Timeout,
            7 => FfiFailureKind::Params,
            8 => FfiFailureKind::Tls,
            9 => FfiFailureKind::NotFound,
            10 => FfiFailureKind::Server,
            11 => FfiFailureKind::Service,
            _ => return None,
        };
        Some(kind)
    }
}

impl From<FfiFailureKind> for FailureKind {
    fn from(kind: FfiFailureKind) -> Self {
        match kind {
            FfiFailureKind::Unknown => FailureKind::Unknown,
            FfiFailureKind::Route => FailureKind::Route,
            FfiFailureKind::Host => FailureKind::Host,
            FfiFailureKind::Connect => FailureKind::Connect,
            FfiFailureKind::Encode => FailureKind::Encode,
            FfiFailureKind::Url => FailureKind::Url,
            FfiFailureKind::Timeout => FailureKind::Timeout,
            FfiFailureKind::Params => FailureKind::Params,
            FfiFailureKind::Tls => FailureKind::Tls,
            FfiFailureKind::NotFound => FailureKind::NotFound,
            FfiFailureKind::Server => FailureKind::Server,
            FfiFailureKind::Service => FailureKind::Service,
        }
    }
}

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Outcome category of an FFI call.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiStatus {
    Ok = 0,
    Error = 1,
    NullArg = 2,
    InvalidArg = 3,
    Panic = 4,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiErrorDomain {
    Client = 0,
    Server = 1,
}

impl From<ErrorDomain> for FfiErrorDomain {
    fn from(domain: ErrorDomain) -> Self {
        match domain {
            ErrorDomain::Client => FfiErrorDomain::Client,
            ErrorDomain::Server => FfiErrorDomain::Server,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiErrorKind {
    ClientIo = 0,
    Timeout = 1,
    Tls = 2,
    Data = 3,
    Server = 4,
    HttpStatus = 5,
    Canceled = 6,
}

impl From<ErrorKind> for FfiErrorKind {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::ClientIo => FfiErrorKind::ClientIo,
            ErrorKind::Timeout => FfiErrorKind::Timeout,
            ErrorKind::Tls => FfiErrorKind::Tls,
            ErrorKind::Data => FfiErrorKind::Data,
            ErrorKind::Server => FfiErrorKind::Server,
            ErrorKind::HttpStatus => FfiErrorKind::HttpStatus,
            ErrorKind::Canceled => FfiErrorKind::Canceled,
        }
    }
}

/// A classified client error. `http_status` is 0 when no status applies.
/// A `suppressed` error should not be shown to the user.
#[repr(C)]
pub struct FfiClientError {
    pub domain: FfiErrorDomain,
    pub kind: FfiErrorKind,
    pub code: i32,
    pub http_status: u16,
    pub message: *mut c_char,
    pub pretty_message: *mut c_char,
    pub suppressed: bool,
}

impl FfiClientError {
    pub(crate) fn from_core(error: ClientError, suppressed: bool) -> Self {
        FfiClientError {
            domain: error.domain.into(),
            kind: error.kind.into(),
            code: error.code,
            http_status: error.http_status.unwrap_or(0),
            message: to_c_string(error.message),
            pretty_message: to_c_string(error.pretty_message),
            suppressed,
        }
    }

    pub(crate) fn into_raw(self) -> *mut Self {
        Box::into_raw(Box::new(self))
    }

    /// Free the C-string fields (but not the struct itself).
    pub(crate) fn free_fields(&self) {
        free_c_string(self.message);
        free_c_string(self.pretty_message);
    }
}

/// Result envelope for `tether_parse_envelope`.
///
/// On `Ok`, `error` is null and the data fields are set according to the
/// shape: `data_json` holds the decoded value (single) or the items array
/// (list, cursor) as JSON text; `sid` is set for a cursor page with more
/// pages; `extra` holds the leftover envelope keys as JSON text. Unused
/// fields are null.
///
/// On any other status, `error` points to the classified error (for
/// `Error`) or is null, and `message` describes argument or panic
/// failures.
#[repr(C)]
pub struct FfiEnvelopeResult {
    pub status: FfiStatus,
    pub error: *mut FfiClientError,
    pub message: *mut c_char,
    pub data_json: *mut c_char,
    pub sid: *mut c_char,
    pub extra: *mut c_char,
}

impl FfiEnvelopeResult {
    fn empty(status: FfiStatus) -> Self {
        FfiEnvelopeResult {
            status,
            error: std::ptr::null_mut(),
            message: std::ptr::null_mut(),
            data_json: std::ptr::null_mut(),
            sid: std::ptr::null_mut(),
            extra: std::ptr::null_mut(),
        }
    }

    pub(crate) fn ok(data_json: Option<String>, sid: &str, extra: &str) -> *mut Self {
        let result = FfiEnvelopeResult {
            data_json: data_json.map_or(std::ptr::null_mut(), to_c_string),
            sid: to_c_string_or_null(sid),
            extra: to_c_string_or_null(extra),
            ..Self::empty(FfiStatus::Ok)
        };
        Box::into_raw(Box::new(result))
    }

    pub(crate) fn from_error(error: ClientError, suppressed: bool) -> *mut Self {
        let result = FfiEnvelopeResult {
            error: FfiClientError::from_core(error, suppressed).into_raw(),
            ..Self::empty(FfiStatus::Error)
        };
        Box::into_raw(Box::new(result))
    }

    pub(crate) fn null_arg(name: &str) -> *mut Self {
        let result = FfiEnvelopeResult {
            message: to_c_string(format!("null argument: {name}")),
            ..Self::empty(FfiStatus::NullArg)
        };
        Box::into_raw(Box::new(result))
    }

    pub(crate) fn invalid_arg(msg: &str) -> *mut Self {
        let result = FfiEnvelopeResult {
            message: to_c_string(msg),
            ..Self::empty(FfiStatus::InvalidArg)
        };
        Box::into_raw(Box::new(result))
    }

    /// Build an error result for a caught panic.
    pub(crate) fn panic(msg: &str) -> *mut Self {
        let result = FfiEnvelopeResult {
            message: to_c_string(msg),
            ..Self::empty(FfiStatus::Panic)
        };
        Box::into_raw(Box::new(result))
    }
}

pub(crate) fn free_c_string(s: *mut c_char) {
    if !s.is_null() {
        drop(unsafe { CString::from_raw(s) });
    }
}

/// Core handler wiring shared by `tether_context_new`.
pub(crate) fn handler(suppress: FfiSuppressFn) -> Arc<dyn ClientHandler> {
    Arc::new(FfiHandler { suppress })
}
