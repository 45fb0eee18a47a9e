//! The transport callback that drives one request through the envelope
//! pipeline.
//!
//! # Design
//! `EnvelopeCallback` runs on the transport's worker thread: it classifies
//! and decodes the body there, lets the translator fill in and possibly
//! suppress errors, and then posts exactly one terminal closure (success or
//! error) to the owner's `MailboxHandle`. Whether that closure ever runs is
//! the mailbox's decision; a suspended owner gets it on `awake`, an exited
//! one never does.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::context::ClientContext;
use crate::decoder::{CursorDecoder, ListDecoder, PayloadDecoder, SingleDecoder, VoidDecoder};
use crate::envelope;
use crate::error::{codes, ClientError, ErrorDomain, ErrorKind};
use crate::http::{HttpRequest, HttpResponse, TransportCallback, TransportFailure};
use crate::mailbox::MailboxHandle;
use crate::translator::ErrorTranslator;
use crate::types::{CursorPage, ListPage};

type SuccessFn<T> = Box<dyn FnOnce(T) + Send>;

/// Per-request error hook. Returning `true` closes the error so the global
/// handler never sees it.
type ErrorFn = Box<dyn FnOnce(&mut ClientError) -> bool + Send>;

pub struct EnvelopeCallback<D: PayloadDecoder> {
    decoder: D,
    context: Arc<ClientContext>,
    mailbox: MailboxHandle,
    on_success: SuccessFn<D::Output>,
    on_error: Option<ErrorFn>,
}

impl<D: PayloadDecoder> EnvelopeCallback<D> {
    pub fn new(
        decoder: D,
        context: Arc<ClientContext>,
        mailbox: MailboxHandle,
        on_success: impl FnOnce(D::Output) + Send + 'static,
    ) -> Self {
        Self {
            decoder,
            context,
            mailbox,
            on_success: Box::new(on_success),
            on_error: None,
        }
    }

    pub fn on_error(mut self, on_error: impl FnOnce(&mut ClientError) -> bool + Send + 'static) -> Self {
        self.on_error = Some(Box::new(on_error));
        self
    }

    fn handle_body(self, body: &str) {
        match envelope::parse(&self.decoder, body) {
            Ok(output) => self.deliver_success(output),
            Err(error) => self.dispatch_error(error),
        }
    }

    fn deliver_success(self, output: D::Output) {
        let Self {
            context,
            mailbox,
            on_success,
            on_error,
            ..
        } = self;

        let posted = mailbox.post_once(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(move || on_success(output)));
            if let Err(panic) = outcome {
                let message = panic_message(panic.as_ref());
                warn!(%message, "success callback panicked");
                let mut error = ClientError::new(
                    ErrorDomain::Client,
                    ErrorKind::HttpStatus,
                    codes::HTTP_STATUS_BASE,
                    message,
                );
                if ErrorTranslator::new(&context).on_dispatch_error(&mut error) {
                    return;
                }
                finish_error(&context, on_error, error);
            }
        });
        if !posted {
            warn!("mailbox exited, dropping success result");
        }
    }

    fn dispatch_error(self, mut error: ClientError) {
        if ErrorTranslator::new(&self.context).on_dispatch_error(&mut error) {
            return;
        }
        debug!(code = error.code, kind = ?error.kind, "posting request error");

        let Self {
            context,
            mailbox,
            on_error,
            ..
        } = self;
        let posted = mailbox.post_once(move || finish_error(&context, on_error, error));
        if !posted {
            warn!("mailbox exited, dropping request error");
        }
    }
}

impl EnvelopeCallback<VoidDecoder> {
    pub fn void(
        context: Arc<ClientContext>,
        mailbox: MailboxHandle,
        on_success: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self::new(VoidDecoder, context, mailbox, move |()| on_success())
    }
}

impl<T: DeserializeOwned + Send + 'static> EnvelopeCallback<SingleDecoder<T>> {
    pub fn single(
        context: Arc<ClientContext>,
        mailbox: MailboxHandle,
        on_success: impl FnOnce(T) + Send + 'static,
    ) -> Self {
        Self::new(SingleDecoder::new(), context, mailbox, on_success)
    }
}

impl<T: DeserializeOwned + Send + 'static> EnvelopeCallback<ListDecoder<T>> {
    pub fn list(
        context: Arc<ClientContext>,
        mailbox: MailboxHandle,
        on_success: impl FnOnce(ListPage<T>) + Send + 'static,
    ) -> Self {
        Self::new(ListDecoder::new(), context, mailbox, on_success)
    }
}

impl<T: DeserializeOwned + Send + 'static> EnvelopeCallback<CursorDecoder<T>> {
    pub fn cursor(
        context: Arc<ClientContext>,
        mailbox: MailboxHandle,
        on_success: impl FnOnce(CursorPage<T>) + Send + 'static,
    ) -> Self {
        Self::new(CursorDecoder::new(), context, mailbox, on_success)
    }
}

impl<D: PayloadDecoder + 'static> TransportCallback for EnvelopeCallback<D> {
    fn on_http_success(self: Box<Self>, response: HttpResponse) {
        // Transports are expected to route non-envelope statuses through
        // `on_http_failed`; catch the ones that slip through.
        if let Some(failure) = TransportFailure::from_status(response.status, &response.body) {
            return self.on_http_failed(failure);
        }
        self.handle_body(&response.body);
    }

    fn on_http_failed(self: Box<Self>, failure: TransportFailure) {
        debug!(kind = ?failure.kind, status = ?failure.status, "transport failure");
        let error = ErrorTranslator::new(&self.context).classify_transport_failure(&failure);
        self.dispatch_error(error);
    }

    fn on_http_canceled(self: Box<Self>, request: HttpRequest) {
        debug!(path = %request.path, "request canceled");
        self.dispatch_error(ClientError::canceled());
    }
}

fn finish_error(context: &ClientContext, on_error: Option<ErrorFn>, mut error: ClientError) {
    if let Some(on_error) = on_error {
        if on_error(&mut error) {
            error.close();
        }
    }
    ErrorTranslator::new(context).on_post_error(&error);
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "success callback panicked".to_string()
    }
}
