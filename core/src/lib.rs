//! Lifecycle-bound request plumbing for envelope-speaking HTTP APIs.
//!
//! # Overview
//! The core never performs I/O. `ApiClient` builds `HttpRequest` values and
//! hands them to a caller-supplied `Transport`; the transport reports back on
//! its own worker threads through a `TransportCallback`. `EnvelopeCallback`
//! classifies the `{"error": .., "data": ..}` envelope there and posts the
//! typed outcome to a `LifecycleMailbox`, which only delivers it while the
//! owning component is alive.
//!
//! # Design
//! - `LifecycleMailbox` is owned by one context and drained with `pump`;
//!   workers hold cloneable `MailboxHandle`s.
//! - `envelope` + `decoder` form the parse pipeline. `envelope::parse` runs
//!   it synchronously for hosts that do their own scheduling (see the FFI
//!   crate).
//! - Every failure is a `ClientError`. `ErrorTranslator` attaches the
//!   user-facing text and routes it through the app's `ClientHandler`.
//! - One `ClientContext` per process, shared by `Arc`.

pub mod callback;
pub mod client;
pub mod config;
pub mod context;
pub mod decoder;
pub mod envelope;
pub mod error;
pub mod error_book;
pub mod http;
pub mod mailbox;
pub mod translator;
pub mod types;

pub use callback::EnvelopeCallback;
pub use client::ApiClient;
pub use config::{ClientConfig, MessageCatalog};
pub use context::{ClientContext, ClientHandler, SilentHandler};
pub use decoder::{CursorDecoder, ListDecoder, PayloadDecoder, SingleDecoder, VoidDecoder};
pub use error::{codes, ClientError, ConfigError, ErrorBookError, ErrorDomain, ErrorKind, MailboxError};
pub use error_book::{ErrorBook, ErrorBookCache};
pub use http::{
    CacheConfig, FailureKind, HttpMethod, HttpRequest, HttpResponse, Transport, TransportCallback,
    TransportFailure,
};
pub use mailbox::{LifeState, LifecycleMailbox, Liveness, MailboxHandle, Message, Runnable, WILDCARD_TAG};
pub use translator::ErrorTranslator;
pub use types::{CursorPage, ListPage};
