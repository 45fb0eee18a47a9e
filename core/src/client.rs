//! Request builder and issuer for envelope-speaking APIs.
//!
//! # Design
//! `ApiClient` holds the normalized `base_url` and the shared
//! `ClientContext`, nothing else. `build_*` methods produce `HttpRequest`
//! values without touching the network; `issue` runs the app's
//! `on_pre_request` hook and hands the request to the caller's `Transport`
//! together with a `TransportCallback`, usually an `EnvelopeCallback`.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, warn};
use url::form_urlencoded;

use crate::context::ClientContext;
use crate::envelope;
use crate::error::ClientError;
use crate::http::{
    CacheConfig, FailureKind, HttpMethod, HttpRequest, HttpResponse, Transport, TransportCallback,
    TransportFailure,
};
use crate::mailbox::{LifecycleMailbox, MailboxHandle};
use crate::translator::{classify_transport_failure, ErrorTranslator};

#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    context: Arc<ClientContext>,
}

impl ApiClient {
    pub fn new(context: Arc<ClientContext>) -> Self {
        Self {
            base_url: context.config().base_url.trim_end_matches('/').to_string(),
            context,
        }
    }

    pub fn context(&self) -> &Arc<ClientContext> {
        &self.context
    }

    /// Create a mailbox for `owner` with the configured pending mode.
    pub fn mailbox<O: Send + Sync + 'static>(&self, owner: &Arc<O>) -> LifecycleMailbox<O> {
        let mailbox = LifecycleMailbox::new(owner);
        mailbox.set_pending(self.context.config().pending_by_default);
        mailbox
    }

    /// Absolute URL for an API path. Leading slashes on `path` are ignored.
    pub fn api_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub fn build_get(&self, path: &str, params: &[(&str, &str)]) -> HttpRequest {
        let mut url = self.api_url(path);
        if !params.is_empty() {
            let query = form_urlencoded::Serializer::new(String::new())
                .extend_pairs(params)
                .finish();
            url.push('?');
            url.push_str(&query);
        }
        HttpRequest {
            method: HttpMethod::Get,
            path: url,
            headers: Vec::new(),
            body: None,
            cache: None,
        }
    }

    pub fn build_post<B: Serialize>(&self, path: &str, body: &B) -> Result<HttpRequest, ClientError> {
        let body = serde_json::to_string(body).map_err(|e| {
            classify_transport_failure(&TransportFailure::new(FailureKind::Encode, e.to_string()))
        })?;
        Ok(HttpRequest {
            method: HttpMethod::Post,
            path: self.api_url(path),
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: Some(body),
            cache: None,
        })
    }

    /// The error-code table request, cacheable for the configured TTL.
    pub fn build_error_book(&self) -> HttpRequest {
        let mut request = self.build_get(&self.context.config().error_code_path, &[]);
        request.cache = Some(CacheConfig::new(self.context.config().error_book_ttl()));
        request
    }

    pub fn issue(&self, transport: &dyn Transport, mut request: HttpRequest, callback: Box<dyn TransportCallback>) {
        self.context.handler().on_pre_request(&mut request);
        debug!(method = ?request.method, path = %request.path, "issuing request");
        transport.issue(request, callback);
    }

    /// Fetch the error-code table unless it was fetched within the TTL.
    /// Returns `false` when the refresh was skipped. A failed fetch reopens
    /// the window so the next call retries.
    pub fn refresh_error_book(&self, transport: &dyn Transport, mailbox: &MailboxHandle) -> bool {
        if !self.context.error_book_cache().try_claim(Instant::now()) {
            debug!("error book fresh, skipping refresh");
            return false;
        }
        let callback = ErrorBookRefresh {
            context: Arc::clone(&self.context),
            mailbox: mailbox.clone(),
        };
        self.issue(transport, self.build_error_book(), Box::new(callback));
        true
    }
}

/// Applies the fetched table on the worker thread; the book is shared and
/// internally locked. Only failures are routed through the mailbox.
struct ErrorBookRefresh {
    context: Arc<ClientContext>,
    mailbox: MailboxHandle,
}

impl ErrorBookRefresh {
    fn apply(self, response: HttpResponse) {
        let applied = envelope::classify(&response.body).and_then(|payload| {
            self.context
                .error_book()
                .refresh(&payload)
                .map_err(|e| ClientError::data(e.to_string()))
        });
        match applied {
            Ok(count) => debug!(count, "error book refreshed"),
            Err(error) => self.fail(error),
        }
    }

    fn fail(self, mut error: ClientError) {
        self.context.error_book_cache().invalidate();
        warn!(code = error.code, message = %error.message, "error book refresh failed");

        if ErrorTranslator::new(&self.context).on_dispatch_error(&mut error) {
            return;
        }
        let context = self.context;
        self.mailbox
            .post_once(move || ErrorTranslator::new(&context).on_post_error(&error));
    }
}

impl TransportCallback for ErrorBookRefresh {
    fn on_http_success(self: Box<Self>, response: HttpResponse) {
        match TransportFailure::from_status(response.status, &response.body) {
            Some(failure) => self.fail(classify_transport_failure(&failure)),
            None => self.apply(response),
        }
    }

    fn on_http_failed(self: Box<Self>, failure: TransportFailure) {
        self.fail(classify_transport_failure(&failure));
    }

    fn on_http_canceled(self: Box<Self>, _request: HttpRequest) {
        self.fail(ClientError::canceled());
    }
}
