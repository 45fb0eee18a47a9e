//! Translation of raw failures into `ClientError` values and routing of
//! those errors to the app.
//!
//! # Design
//! The translator is a thin view over the `ClientContext`: the catalog and
//! error book supply text, the registered `ClientHandler` decides on
//! suppression and receives whatever is left. Routing happens in two steps
//! because they run on different threads: `on_dispatch_error` runs on the
//! worker that classified the error, `on_post_error` on the owner's context
//! after the per-request handler had its chance.

use tracing::{debug, warn};

use crate::context::ClientContext;
use crate::error::{codes, ClientError, ErrorDomain, ErrorKind};
use crate::http::{FailureKind, TransportFailure};

#[derive(Debug, Clone, Copy)]
pub struct ErrorTranslator<'a> {
    context: &'a ClientContext,
}

impl<'a> ErrorTranslator<'a> {
    pub fn new(context: &'a ClientContext) -> Self {
        Self { context }
    }

    /// Map a transport-level failure into the taxonomy.
    pub fn classify_transport_failure(&self, failure: &TransportFailure) -> ClientError {
        classify_transport_failure(failure)
    }

    /// Fill in `pretty_message` and decide whether the error is suppressed.
    /// A suppressed error must not be forwarded anywhere else.
    pub fn on_dispatch_error(&self, error: &mut ClientError) -> bool {
        error.pretty_message = self.pretty_message(error);
        let suppressed = self.context.handler().suppress(error);
        if suppressed {
            debug!(code = error.code, kind = ?error.kind, "error suppressed");
        }
        suppressed
    }

    /// Final sink. Closed errors stop here.
    pub fn on_post_error(&self, error: &ClientError) {
        if error.is_closed() {
            return;
        }
        warn!(code = error.code, kind = ?error.kind, message = %error.message, "unhandled client error");
        self.context.handler().on_handle_error(error);
    }

    fn pretty_message(&self, error: &ClientError) -> String {
        let catalog = &self.context.config().messages;
        match error.kind {
            ErrorKind::Canceled => catalog.network_unreachable.clone(),
            ErrorKind::Timeout => catalog.timeout.clone(),
            ErrorKind::Tls => catalog.insecure_channel.clone(),
            ErrorKind::Data | ErrorKind::ClientIo => catalog.connection_failed.clone(),
            ErrorKind::HttpStatus => catalog.service_rejected.clone(),
            ErrorKind::Server => self
                .context
                .error_book()
                .message(error.code, &catalog.server_default),
        }
    }
}

/// Pure mapping from transport failure categories to `ClientError`.
pub fn classify_transport_failure(failure: &TransportFailure) -> ClientError {
    let message = failure.message.clone();
    let status_code = |status: Option<u16>| codes::HTTP_STATUS_BASE + i32::from(status.unwrap_or(0));

    let error = match failure.kind {
        FailureKind::Unknown
        | FailureKind::Route
        | FailureKind::Host
        | FailureKind::Connect
        | FailureKind::Encode
        | FailureKind::Url
        | FailureKind::Params => ClientError::new(
            ErrorDomain::Client,
            ErrorKind::ClientIo,
            codes::IO_EXCEPTION,
            message,
        ),
        FailureKind::Timeout => ClientError::new(
            ErrorDomain::Client,
            ErrorKind::Timeout,
            codes::TIMEOUT_EXCEPTION,
            message,
        ),
        FailureKind::Tls => ClientError::new(
            ErrorDomain::Client,
            ErrorKind::Tls,
            codes::TLS_EXCEPTION,
            message,
        ),
        FailureKind::NotFound => ClientError::new(
            ErrorDomain::Client,
            ErrorKind::ClientIo,
            status_code(failure.status),
            message,
        ),
        FailureKind::Server => ClientError::new(
            ErrorDomain::Server,
            ErrorKind::Server,
            status_code(failure.status),
            message,
        ),
        FailureKind::Service => ClientError::new(
            ErrorDomain::Server,
            ErrorKind::HttpStatus,
            status_code(failure.status),
            message,
        ),
    };

    match failure.status {
        Some(status) => error.with_http_status(status),
        None => error,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::config::ClientConfig;
    use crate::context::ClientHandler;
    use crate::error_book::ErrorBook;

    #[derive(Default)]
    struct Recorder {
        suppress_canceled: bool,
        seen: Mutex<Vec<ClientError>>,
    }

    impl ClientHandler for Recorder {
        fn suppress(&self, error: &ClientError) -> bool {
            self.suppress_canceled && error.kind == ErrorKind::Canceled
        }

        fn on_handle_error(&self, error: &ClientError) {
            self.seen.lock().unwrap().push(error.clone());
        }
    }

    fn context(handler: Arc<Recorder>) -> Arc<ClientContext> {
        ClientContext::with_error_book(
            ClientConfig::default(),
            ErrorBook::with_entries([(1001, "Wrong password")]),
            handler,
        )
    }

    #[test]
    fn io_categories_map_to_client_io() {
        for kind in [
            FailureKind::Unknown,
            FailureKind::Route,
            FailureKind::Host,
            FailureKind::Connect,
            FailureKind::Encode,
            FailureKind::Url,
            FailureKind::Params,
        ] {
            let err = classify_transport_failure(&TransportFailure::new(kind, "boom"));
            assert_eq!(err.kind, ErrorKind::ClientIo, "{kind:?}");
            assert_eq!(err.domain, ErrorDomain::Client);
            assert_eq!(err.code, codes::IO_EXCEPTION);
            assert_eq!(err.message, "boom");
        }
    }

    #[test]
    fn timeout_and_tls_have_their_own_kinds() {
        let timeout = classify_transport_failure(&TransportFailure::new(FailureKind::Timeout, "t"));
        assert_eq!(timeout.kind, ErrorKind::Timeout);
        assert_eq!(timeout.code, codes::TIMEOUT_EXCEPTION);

        let tls = classify_transport_failure(&TransportFailure::new(FailureKind::Tls, "t"));
        assert_eq!(tls.kind, ErrorKind::Tls);
        assert_eq!(tls.code, codes::TLS_EXCEPTION);
    }

    #[test]
    fn status_failures_carry_the_status() {
        let not_found = classify_transport_failure(&TransportFailure::from_status(404, "").unwrap());
        assert_eq!(not_found.domain, ErrorDomain::Client);
        assert_eq!(not_found.kind, ErrorKind::ClientIo);
        assert_eq!(not_found.code, codes::HTTP_STATUS_BASE + 404);
        assert_eq!(not_found.http_status, Some(404));

        let server = classify_transport_failure(&TransportFailure::from_status(503, "").unwrap());
        assert_eq!(server.domain, ErrorDomain::Server);
        assert_eq!(server.kind, ErrorKind::Server);
        assert_eq!(server.code, codes::HTTP_STATUS_BASE + 503);
        assert_eq!(server.http_status, Some(503));
    }

    #[test]
    fn service_rejection_is_an_http_status_error() {
        let mut failure = TransportFailure::new(FailureKind::Service, "rejected");
        failure.status = Some(429);
        let err = classify_transport_failure(&failure);
        assert_eq!(err.domain, ErrorDomain::Server);
        assert_eq!(err.kind, ErrorKind::HttpStatus);
        assert_eq!(err.code, codes::HTTP_STATUS_BASE + 429);
    }

    #[test]
    fn dispatch_sets_pretty_message_by_kind() {
        let handler = Arc::new(Recorder::default());
        let ctx = context(handler);
        let translator = ErrorTranslator::new(&ctx);

        let mut err = ClientError::canceled();
        assert!(!translator.on_dispatch_error(&mut err));
        assert_eq!(err.pretty_message, "Network unavailable");

        let mut err = ClientError::data("null data");
        translator.on_dispatch_error(&mut err);
        assert_eq!(err.pretty_message, "Connection failed");
    }

    #[test]
    fn server_codes_are_looked_up_in_the_book() {
        let handler = Arc::new(Recorder::default());
        let ctx = context(handler);
        let translator = ErrorTranslator::new(&ctx);

        let mut known = ClientError::server(1001, "raw");
        translator.on_dispatch_error(&mut known);
        assert_eq!(known.pretty_message, "Wrong password");

        let mut unknown = ClientError::server(7, "raw");
        translator.on_dispatch_error(&mut unknown);
        assert_eq!(unknown.pretty_message, "Something went wrong");
    }

    #[test]
    fn handler_can_suppress() {
        let handler = Arc::new(Recorder {
            suppress_canceled: true,
            ..Recorder::default()
        });
        let ctx = context(handler);
        let translator = ErrorTranslator::new(&ctx);

        assert!(translator.on_dispatch_error(&mut ClientError::canceled()));
        assert!(!translator.on_dispatch_error(&mut ClientError::data("x")));
    }

    #[test]
    fn post_error_skips_closed_errors() {
        let handler = Arc::new(Recorder::default());
        let ctx = context(handler.clone());
        let translator = ErrorTranslator::new(&ctx);

        let open = ClientError::server(7, "bad thing");
        let mut closed = ClientError::server(8, "handled");
        closed.close();

        translator.on_post_error(&open);
        translator.on_post_error(&closed);

        let seen = handler.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].code, 7);
    }
}
