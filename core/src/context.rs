//! The process-wide client context.
//!
//! Built once at startup and shared through `Arc`. It bundles the frozen
//! configuration, the refreshable `ErrorBook` and the single `ClientHandler`
//! that receives every unhandled error. Components take it by reference;
//! nothing looks it up globally.

use std::fmt;
use std::sync::Arc;

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::error_book::{ErrorBook, ErrorBookCache};
use crate::http::HttpRequest;

/// App-level hooks, registered once per process.
pub trait ClientHandler: Send + Sync {
    /// Last chance to adjust a request (auth headers, locale) before it is
    /// handed to the transport.
    fn on_pre_request(&self, _request: &mut HttpRequest) {}

    /// Return `true` to swallow an error before any per-request handler sees
    /// it, e.g. when an app-wide offline banner already covers it.
    fn suppress(&self, _error: &ClientError) -> bool {
        false
    }

    /// Final sink for errors that were neither suppressed nor closed.
    fn on_handle_error(&self, error: &ClientError);
}

/// A handler that drops every error. Useful for tools and tests that only
/// care about per-request outcomes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentHandler;

impl ClientHandler for SilentHandler {
    fn on_handle_error(&self, _error: &ClientError) {}
}

pub struct ClientContext {
    config: ClientConfig,
    error_book: ErrorBook,
    error_book_cache: ErrorBookCache,
    handler: Arc<dyn ClientHandler>,
}

impl ClientContext {
    pub fn new(config: ClientConfig, handler: Arc<dyn ClientHandler>) -> Arc<Self> {
        Self::with_error_book(config, ErrorBook::new(), handler)
    }

    pub fn with_error_book(
        config: ClientConfig,
        error_book: ErrorBook,
        handler: Arc<dyn ClientHandler>,
    ) -> Arc<Self> {
        let error_book_cache = ErrorBookCache::new(config.error_book_ttl());
        Arc::new(Self {
            config,
            error_book,
            error_book_cache,
            handler,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn error_book(&self) -> &ErrorBook {
        &self.error_book
    }

    pub fn error_book_cache(&self) -> &ErrorBookCache {
        &self.error_book_cache
    }

    pub fn handler(&self) -> &dyn ClientHandler {
        self.handler.as_ref()
    }
}

impl fmt::Debug for ClientContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientContext")
            .field("config", &self.config)
            .field("error_book_len", &self.error_book.len())
            .finish_non_exhaustive()
    }
}
