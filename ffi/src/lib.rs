//! C-ABI wrapper around `tether-core`.
//!
//! # Overview
//! Exposes the stateless half of the core through `extern "C"` functions:
//! envelope parsing, transport-failure classification and the error book.
//! The host keeps its own threads and lifecycle handling and calls in with
//! raw response bodies.
//!
//! # Design
//! - Every `extern "C"` function wraps its body in `catch_unwind` so panics
//!   never cross the FFI boundary.
//! - Payloads cross as JSON text (`data_json`, `extra`); the host decodes
//!   them with its own models.
//! - Every error passes through the translator, so `pretty_message` and
//!   `suppressed` are filled in exactly as for in-process callers.
//! - The C caller owns all returned pointers and must call the matching
//!   `tether_free_*` function to release them.

pub mod types;

use std::ffi::CStr;
use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};

use serde_json::Value;
use tether_core::decoder::{CursorDecoder, ListDecoder, SingleDecoder, VoidDecoder};
use tether_core::{envelope, ApiClient, ClientConfig, ClientContext, ClientError, ErrorTranslator, TransportFailure};
use tracing::warn;

use types::*;

/// Borrow a C string as `&str`. `None` for null or invalid UTF-8.
fn c_str<'a>(s: *const c_char) -> Option<&'a str> {
    if s.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(s) }.to_str().ok()
}

// ---------------------------------------------------------------------------
// Context lifecycle
// ---------------------------------------------------------------------------

/// Create the process context from a JSON `ClientConfig`.
///
/// A null `config_json` selects the defaults. `suppress` may be null.
/// Returns null if the config is malformed or an internal panic occurs.
/// The caller must free the returned pointer with `tether_context_free`.
#[unsafe(no_mangle)]
pub extern "C" fn tether_context_new(config_json: *const c_char, suppress: FfiSuppressFn) -> *mut FfiContext {
    catch_unwind(|| {
        let config = if config_json.is_null() {
            ClientConfig::default()
        } else {
            let Some(raw) = c_str(config_json) else {
                return std::ptr::null_mut();
            };
            match ClientConfig::from_json(raw) {
                Ok(config) => config,
                Err(e) => {
                    warn!(error = %e, "rejected client config");
                    return std::ptr::null_mut();
                }
            }
        };
        let client = ApiClient::new(ClientContext::new(config, handler(suppress)));
        Box::into_raw(Box::new(FfiContext { inner: client }))
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Free a context created by `tether_context_new`. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn tether_context_free(ctx: *mut FfiContext) {
    if !ctx.is_null() {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            drop(unsafe { Box::from_raw(ctx) });
        }));
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Build the error-code table request. The host should honor
/// `cache_max_age_secs` and feed the response body to
/// `tether_error_book_refresh`.
///
/// Returns null if `ctx` is null.
/// The caller must free the returned pointer with `tether_free_request`.
#[unsafe(no_mangle)]
pub extern "C" fn tether_build_error_book(ctx: *const FfiContext) -> *mut FfiHttpRequest {
    catch_unwind(AssertUnwindSafe(|| {
        if ctx.is_null() {
            return std::ptr::null_mut();
        }
        let ctx = unsafe { &*ctx };
        FfiHttpRequest::from_core(ctx.inner.build_error_book())
    }))
    .unwrap_or(std::ptr::null_mut())
}

// ---------------------------------------------------------------------------
// Envelope parsing
// ---------------------------------------------------------------------------

/// Classify and decode a response body.
///
/// `shape` is an `FfiShape` discriminant. Items and single values are
/// returned as JSON text.
#[unsafe(no_mangle)]
pub extern "C" fn tether_parse_envelope(
    ctx: *const FfiContext,
    shape: u32,
    body: *const c_char,
) -> *mut FfiEnvelopeResult {
    catch_unwind(AssertUnwindSafe(|| {
        if ctx.is_null() {
            return FfiEnvelopeResult::null_arg("ctx");
        }
        if body.is_null() {
            return FfiEnvelopeResult::null_arg("body");
        }
        let Some(shape) = FfiShape::from_raw(shape) else {
            return FfiEnvelopeResult::invalid_arg("unknown shape");
        };
        let Some(body) = c_str(body) else {
            return FfiEnvelopeResult::invalid_arg("body is not UTF-8");
        };
        let ctx = unsafe { &*ctx };
        parse_envelope(&ctx.inner, shape, body)
    }))
    .unwrap_or_else(|_| FfiEnvelopeResult::panic("panic in tether_parse_envelope"))
}

fn parse_envelope(client: &ApiClient, shape: FfiShape, body: &str) -> *mut FfiEnvelopeResult {
    let decoded = match shape {
        FfiShape::Void => envelope::parse(&VoidDecoder, body).map(|()| (None, String::new(), String::new())),
        FfiShape::Single => envelope::parse(&SingleDecoder::<Value>::new(), body)
            .map(|value| (Some(value.to_string()), String::new(), String::new())),
        FfiShape::List => envelope::parse(&ListDecoder::<Value>::new(), body)
            .map(|page| (Some(Value::Array(page.items).to_string()), String::new(), page.extra)),
        FfiShape::Cursor => envelope::parse(&CursorDecoder::<Value>::new(), body)
            .map(|page| (Some(Value::Array(page.items).to_string()), page.sid, page.extra)),
    };

    match decoded {
        Ok((data_json, sid, extra)) => FfiEnvelopeResult::ok(data_json, &sid, &extra),
        Err(error) => {
            let (error, suppressed) = translate(client, error);
            FfiEnvelopeResult::from_error(error, suppressed)
        }
    }
}

fn translate(client: &ApiClient, mut error: ClientError) -> (ClientError, bool) {
    let suppressed = ErrorTranslator::new(client.context()).on_dispatch_error(&mut error);
    (error, suppressed)
}

// ---------------------------------------------------------------------------
// Error classification
// ---------------------------------------------------------------------------

/// Classify a transport failure reported by the host's HTTP engine.
///
/// `kind` is an `FfiFailureKind` discriminant; `status` is the HTTP status
/// or 0. `message` may be null. Returns null if `ctx` is null or `kind` is
/// unknown. Free with `tether_free_error`.
#[unsafe(no_mangle)]
pub extern "C" fn tether_classify_failure(
    ctx: *const FfiContext,
    kind: u32,
    status: u16,
    message: *const c_char,
) -> *mut FfiClientError {
    catch_unwind(AssertUnwindSafe(|| {
        if ctx.is_null() {
            return std::ptr::null_mut();
        }
        let Some(kind) = FfiFailureKind::from_raw(kind) else {
            return std::ptr::null_mut();
        };
        let ctx = unsafe { &*ctx };
        let mut failure = TransportFailure::new(kind.into(), c_str(message).unwrap_or(""));
        if status != 0 {
            failure.status = Some(status);
        }
        let translator = ErrorTranslator::new(ctx.inner.context());
        let (error, suppressed) = translate(&ctx.inner, translator.classify_transport_failure(&failure));
        FfiClientError::from_core(error, suppressed).into_raw()
    }))
    .unwrap_or(std::ptr::null_mut())
}

/// The error for a request the host canceled. Free with `tether_free_error`.
#[unsafe(no_mangle)]
pub extern "C" fn tether_canceled_error(ctx: *const FfiContext) -> *mut FfiClientError {
    catch_unwind(AssertUnwindSafe(|| {
        if ctx.is_null() {
            return std::ptr::null_mut();
        }
        let ctx = unsafe { &*ctx };
        let (error, suppressed) = translate(&ctx.inner, ClientError::canceled());
        FfiClientError::from_core(error, suppressed).into_raw()
    }))
    .unwrap_or(std::ptr::null_mut())
}

// ---------------------------------------------------------------------------
// Error book
// ---------------------------------------------------------------------------

/// Apply an error-code response body (a full envelope) to the error book.
///
/// Returns the number of entries applied, or -1 if an argument is null or
/// the body is not a valid error-code envelope. The book is unchanged on
/// failure.
#[unsafe(no_mangle)]
pub extern "C" fn tether_error_book_refresh(ctx: *const FfiContext, body: *const c_char) -> i32 {
    catch_unwind(AssertUnwindSafe(|| {
        if ctx.is_null() {
            return -1;
        }
        let Some(body) = c_str(body) else {
            return -1;
        };
        let ctx = unsafe { &*ctx };
        let book = ctx.inner.context().error_book();
        let applied = envelope::classify(body).map_err(|e| e.to_string()).and_then(|payload| {
            book.refresh(&payload).map_err(|e| e.to_string())
        });
        match applied {
            Ok(count) => i32::try_from(count).unwrap_or(i32::MAX),
            Err(e) => {
                warn!(error = %e, "error book refresh rejected");
                -1
            }
        }
    }))
    .unwrap_or(-1)
}

/// Look up the message for a server error code, falling back to the
/// configured server default. Returns null if `ctx` is null.
/// Free with `tether_free_string`.
#[unsafe(no_mangle)]
pub extern "C" fn tether_error_book_message(ctx: *const FfiContext, code: i32) -> *mut c_char {
    catch_unwind(AssertUnwindSafe(|| {
        if ctx.is_null() {
            return std::ptr::null_mut();
        }
        let ctx = unsafe { &*ctx };
        let context = ctx.inner.context();
        to_c_string(context.error_book().message(code, &context.config().messages.server_default))
    }))
    .unwrap_or(std::ptr::null_mut())
}

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

/// Free an `FfiHttpRequest` returned by any `tether_build_*` function.
/// Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn tether_free_request(req: *mut FfiHttpRequest) {
    if req.is_null() {
        return;
    }
    let _ = catch_unwind(|| {
        let req = unsafe { Box::from_raw(req) };
        free_c_string(req.path);
        free_c_string(req.body);
        if !req.headers.is_null() && req.headers_len > 0 {
            let headers = unsafe {
                Box::from_raw(std::ptr::slice_from_raw_parts_mut(req.headers, req.headers_len as usize))
            };
            for h in headers.iter() {
                free_c_string(h.key);
                free_c_string(h.value);
            }
        }
    });
}

/// Free an `FfiEnvelopeResult` returned by `tether_parse_envelope`.
/// Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn tether_free_result(result: *mut FfiEnvelopeResult) {
    if result.is_null() {
        return;
    }
    let _ = catch_unwind(|| {
        let result = unsafe { Box::from_raw(result) };
        if !result.error.is_null() {
            tether_free_error(result.error);
        }
        free_c_string(result.message);
        free_c_string(result.data_json);
        free_c_string(result.sid);
        free_c_string(result.extra);
    });
}

/// Free an `FfiClientError`. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn tether_free_error(error: *mut FfiClientError) {
    if error.is_null() {
        return;
    }
    let _ = catch_unwind(|| {
        let error = unsafe { Box::from_raw(error) };
        error.free_fields();
    });
}

/// Free a C string allocated by this library. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn tether_free_string(s: *mut c_char) {
    if !s.is_null() {
        let _ = catch_unwind(|| {
            free_c_string(s);
        });
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    fn context() -> *mut FfiContext {
        let ctx = tether_context_new(std::ptr::null(), None);
        assert!(!ctx.is_null());
        ctx
    }

    fn read(s: *const c_char) -> String {
        assert!(!s.is_null());
        unsafe { CStr::from_ptr(s) }.to_str().unwrap().to_string()
    }

    fn parse(ctx: *const FfiContext, shape: FfiShape, body: &str) -> *mut FfiEnvelopeResult {
        let body = CString::new(body).unwrap();
        let result = tether_parse_envelope(ctx, shape as u32, body.as_ptr());
        assert!(!result.is_null());
        result
    }

    extern "C" fn suppress_canceled(kind: FfiErrorKind, _code: i32) -> bool {
        kind == FfiErrorKind::Canceled
    }

    #[test]
    fn context_new_and_free() {
        let config = CString::new(r#"{"base_url":"http://api.test"}"#).unwrap();
        let ctx = tether_context_new(config.as_ptr(), None);
        assert!(!ctx.is_null());
        tether_context_free(ctx);
    }

    #[test]
    fn context_new_rejects_malformed_config() {
        let config = CString::new(r#"{"base_url":"#).unwrap();
        assert!(tether_context_new(config.as_ptr(), None).is_null());

        let config = CString::new(r#"{"base_url":""}"#).unwrap();
        assert!(tether_context_new(config.as_ptr(), None).is_null());
    }

    #[test]
    fn context_free_null_is_safe() {
        tether_context_free(std::ptr::null_mut());
    }

    #[test]
    fn build_error_book_returns_cacheable_get() {
        let ctx = context();
        let req = tether_build_error_book(ctx);
        assert!(!req.is_null());

        let req_ref = unsafe { &*req };
        assert!(matches!(req_ref.method, FfiHttpMethod::Get));
        assert_eq!(read(req_ref.path), "http://localhost:3000/config/error_code");
        assert!(req_ref.body.is_null());
        assert_eq!(req_ref.headers_len, 0);
        assert_eq!(req_ref.cache_max_age_secs, 600);

        tether_free_request(req);
        tether_context_free(ctx);
    }

    #[test]
    fn build_error_book_null_ctx_returns_null() {
        assert!(tether_build_error_book(std::ptr::null()).is_null());
    }

    #[test]
    fn parse_single_success() {
        let ctx = context();
        let result = parse(ctx, FfiShape::Single, r#"{"error":0,"data":"{\"name\":\"ada\"}"}"#);
        let r = unsafe { &*result };
        assert_eq!(r.status, FfiStatus::Ok);
        assert!(r.error.is_null());
        let value: Value = serde_json::from_str(&read(r.data_json)).unwrap();
        assert_eq!(value["name"], "ada");
        assert!(r.sid.is_null());
        assert!(r.extra.is_null());

        tether_free_result(result);
        tether_context_free(ctx);
    }

    #[test]
    fn parse_void_success_has_no_data() {
        let ctx = context();
        let result = parse(ctx, FfiShape::Void, r#"{"error":0,"data":""}"#);
        let r = unsafe { &*result };
        assert_eq!(r.status, FfiStatus::Ok);
        assert!(r.data_json.is_null());

        tether_free_result(result);
        tether_context_free(ctx);
    }

    #[test]
    fn parse_cursor_page() {
        let ctx = context();
        let result = parse(
            ctx,
            FfiShape::Cursor,
            r#"{"error":0,"data":{"sid":"c1","results":[{"id":1},{"id":2}],"total":5}}"#,
        );
        let r = unsafe { &*result };
        assert_eq!(r.status, FfiStatus::Ok);
        assert_eq!(read(r.sid), "c1");
        let items: Value = serde_json::from_str(&read(r.data_json)).unwrap();
        assert_eq!(items.as_array().unwrap().len(), 2);
        let extra: Value = serde_json::from_str(&read(r.extra)).unwrap();
        assert_eq!(extra, serde_json::json!({"total": 5}));

        tether_free_result(result);
        tether_context_free(ctx);
    }

    #[test]
    fn parse_list_bare_array() {
        let ctx = context();
        let result = parse(ctx, FfiShape::List, r#"{"error":0,"data":"[1,2,3]"}"#);
        let r = unsafe { &*result };
        assert_eq!(r.status, FfiStatus::Ok);
        assert_eq!(read(r.data_json), "[1,2,3]");
        assert!(r.extra.is_null());

        tether_free_result(result);
        tether_context_free(ctx);
    }

    #[test]
    fn parse_server_error_uses_error_book() {
        let ctx = context();
        let book = CString::new(r#"{"error":0,"data":"{\"1001\":\"Wrong password\"}"}"#).unwrap();
        assert_eq!(tether_error_book_refresh(ctx, book.as_ptr()), 1);

        let result = parse(ctx, FfiShape::Void, r#"{"error":1001,"data":"bad credentials"}"#);
        let r = unsafe { &*result };
        assert_eq!(r.status, FfiStatus::Error);
        let err = unsafe { &*r.error };
        assert_eq!(err.domain, FfiErrorDomain::Server);
        assert_eq!(err.kind, FfiErrorKind::Server);
        assert_eq!(err.code, 1001);
        assert_eq!(read(err.message), "bad credentials");
        assert_eq!(read(err.pretty_message), "Wrong password");
        assert!(!err.suppressed);

        tether_free_result(result);
        tether_context_free(ctx);
    }

    #[test]
    fn parse_malformed_body_is_data_error() {
        let ctx = context();
        let result = parse(ctx, FfiShape::Single, "<html>");
        let r = unsafe { &*result };
        assert_eq!(r.status, FfiStatus::Error);
        let err = unsafe { &*r.error };
        assert_eq!(err.domain, FfiErrorDomain::Client);
        assert_eq!(err.kind, FfiErrorKind::Data);
        assert!(read(err.message).starts_with("JSONException"));

        tether_free_result(result);
        tether_context_free(ctx);
    }

    #[test]
    fn parse_unknown_shape_is_invalid_arg() {
        let ctx = context();
        let body = CString::new("{}").unwrap();
        let result = tether_parse_envelope(ctx, 42, body.as_ptr());
        let r = unsafe { &*result };
        assert_eq!(r.status, FfiStatus::InvalidArg);
        assert!(!r.message.is_null());

        tether_free_result(result);
        tether_context_free(ctx);
    }

    #[test]
    fn parse_null_args_return_null_arg() {
        let body = CString::new("{}").unwrap();
        let result = tether_parse_envelope(std::ptr::null(), 0, body.as_ptr());
        assert_eq!(unsafe { &*result }.status, FfiStatus::NullArg);
        tether_free_result(result);

        let ctx = context();
        let result = tether_parse_envelope(ctx, 0, std::ptr::null());
        assert_eq!(unsafe { &*result }.status, FfiStatus::NullArg);
        tether_free_result(result);
        tether_context_free(ctx);
    }

    #[test]
    fn classify_failure_maps_server_status() {
        let ctx = context();
        let message = CString::new("HTTP 503").unwrap();
        let err = tether_classify_failure(ctx, FfiFailureKind::Server as u32, 503, message.as_ptr());
        assert!(!err.is_null());

        let e = unsafe { &*err };
        assert_eq!(e.domain, FfiErrorDomain::Server);
        assert_eq!(e.kind, FfiErrorKind::Server);
        assert_eq!(e.code, 10_503);
        assert_eq!(e.http_status, 503);
        assert_eq!(read(e.pretty_message), "Something went wrong");

        tether_free_error(err);
        tether_context_free(ctx);
    }

    #[test]
    fn classify_failure_timeout_without_message() {
        let ctx = context();
        let err = tether_classify_failure(ctx, FfiFailureKind::Timeout as u32, 0, std::ptr::null());
        let e = unsafe { &*err };
        assert_eq!(e.kind, FfiErrorKind::Timeout);
        assert_eq!(e.http_status, 0);
        assert_eq!(read(e.pretty_message), "Request timed out");

        tether_free_error(err);
        tether_context_free(ctx);
    }

    #[test]
    fn classify_failure_unknown_kind_returns_null() {
        let ctx = context();
        assert!(tether_classify_failure(ctx, 99, 0, std::ptr::null()).is_null());
        tether_context_free(ctx);
    }

    #[test]
    fn canceled_error_honors_host_suppression() {
        let ctx = tether_context_new(std::ptr::null(), Some(suppress_canceled));
        let err = tether_canceled_error(ctx);
        let e = unsafe { &*err };
        assert_eq!(e.kind, FfiErrorKind::Canceled);
        assert_eq!(e.code, -1);
        assert!(e.suppressed);
        assert_eq!(read(e.pretty_message), "Network unavailable");

        tether_free_error(err);
        tether_context_free(ctx);
    }

    #[test]
    fn error_book_refresh_rejects_bad_payload() {
        let ctx = context();
        let body = CString::new(r#"{"error":0,"data":"{\"abc\":\"x\"}"}"#).unwrap();
        assert_eq!(tether_error_book_refresh(ctx, body.as_ptr()), -1);
        assert_eq!(tether_error_book_refresh(ctx, std::ptr::null()), -1);
        tether_context_free(ctx);
    }

    #[test]
    fn error_book_message_falls_back_to_default() {
        let ctx = context();
        let msg = tether_error_book_message(ctx, 4242);
        assert_eq!(read(msg), "Something went wrong");
        tether_free_string(msg);
        tether_context_free(ctx);
    }

    #[test]
    fn free_request_null_is_safe() {
        tether_free_request(std::ptr::null_mut());
    }

    #[test]
    fn free_result_null_is_safe() {
        tether_free_result(std::ptr::null_mut());
    }

    #[test]
    fn free_error_null_is_safe() {
        tether_free_error(std::ptr::null_mut());
    }

    #[test]
    fn free_string_null_is_safe() {
        tether_free_string(std::ptr::null_mut());
    }
}
