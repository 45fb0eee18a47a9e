//! Server-supplied code to message table.
//!
//! The book starts empty (or seeded at startup) and is refreshed from the
//! error-code endpoint. A refresh overwrites the keys it carries and leaves
//! the others alone. Payloads are validated in full before any entry is
//! applied, so a bad payload never leaves the book half-updated.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::debug;

use crate::error::ErrorBookError;

#[derive(Debug, Default)]
pub struct ErrorBook {
    entries: RwLock<HashMap<i32, String>>,
}

impl ErrorBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a book pre-populated with `entries`.
    pub fn with_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (i32, S)>,
        S: Into<String>,
    {
        let map = entries.into_iter().map(|(code, msg)| (code, msg.into())).collect();
        Self {
            entries: RwLock::new(map),
        }
    }

    /// Apply a flat `{"<code>": "<message>"}` JSON object. Returns the number
    /// of entries written.
    pub fn refresh(&self, payload: &str) -> Result<usize, ErrorBookError> {
        let value: Value =
            serde_json::from_str(payload).map_err(|e| ErrorBookError::Malformed(e.to_string()))?;
        self.refresh_value(&value)
    }

    pub fn refresh_value(&self, value: &Value) -> Result<usize, ErrorBookError> {
        let object = value.as_object().ok_or(ErrorBookError::NotAnObject)?;

        let mut parsed = Vec::with_capacity(object.len());
        for (key, message) in object {
            let code: i32 = key
                .trim()
                .parse()
                .map_err(|_| ErrorBookError::InvalidCode(key.clone()))?;
            let text = match message {
                Value::String(s) => s.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            };
            parsed.push((code, text));
        }

        let count = parsed.len();
        self.entries.write().extend(parsed);
        debug!(count, "error book refreshed");
        Ok(count)
    }

    /// Message for `code`, or `default` when the book has no entry.
    pub fn message(&self, code: i32, default: &str) -> String {
        self.entries
            .read()
            .get(&code)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    pub fn contains(&self, code: i32) -> bool {
        self.entries.read().contains_key(&code)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// Time box for error-book refreshes: at most one fetch per `ttl`.
#[derive(Debug)]
pub struct ErrorBookCache {
    ttl: Duration,
    last_fetch: Mutex<Option<Instant>>,
}

impl ErrorBookCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            last_fetch: Mutex::new(None),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Claim the refresh slot at `now`. Returns `false` while the previous
    /// claim is younger than the TTL.
    pub fn try_claim(&self, now: Instant) -> bool {
        let mut last = self.last_fetch.lock();
        match *last {
            Some(at) if now.saturating_duration_since(at) < self.ttl => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }

    /// Forget the last claim so the next refresh goes out immediately.
    pub fn invalidate(&self) {
        *self.last_fetch.lock() = None;
    }
}
