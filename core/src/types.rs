//! Result shapes produced by the list decoders.
//!
//! `extra` keeps whatever the server sent next to the list (totals, flags)
//! as serialized JSON text, minus the keys the decoder consumed.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A list result with optional side data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListPage<T> {
    pub items: Vec<T>,
    /// Remaining envelope keys as JSON text; empty when the payload was a
    /// bare array.
    pub extra: String,
}

/// One page of a cursor-paginated list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorPage<T> {
    /// Opaque cursor to echo back for the next page. Empty when the server
    /// returned an empty page.
    pub sid: String,
    pub items: Vec<T>,
    pub extra: String,
}

impl<T> CursorPage<T> {
    pub fn empty() -> Self {
        Self {
            sid: String::new(),
            items: Vec::new(),
            extra: String::new(),
        }
    }

    pub fn has_more(&self) -> bool {
        !self.sid.is_empty()
    }
}

/// Parse an `extra` blob back into JSON. `None` when it is empty.
pub fn extra_json(extra: &str) -> Option<Value> {
    if extra.is_empty() {
        return None;
    }
    serde_json::from_str(extra).ok()
}
