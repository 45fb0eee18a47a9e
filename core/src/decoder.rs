//! Payload decoders: the variant-specific half of envelope parsing.
//!
//! A decoder gets the payload text that `envelope::classify` extracted and
//! returns `Ok(Some(output))` for a deliverable result, `Ok(None)` when the
//! payload holds nothing deliverable, or a `ClientError` when it is
//! malformed. Decoders run on the worker thread.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::envelope::{field_text, parse_json};
use crate::error::ClientError;
use crate::types::{CursorPage, ListPage};

pub const RESULTS_KEY: &str = "results";
pub const SID_KEY: &str = "sid";

pub trait PayloadDecoder: Send {
    type Output: Send + 'static;

    fn decode(&self, payload: &str) -> Result<Option<Self::Output>, ClientError>;
}

/// Ignores the payload. Always deliverable.
#[derive(Debug, Default, Clone, Copy)]
pub struct VoidDecoder;

impl PayloadDecoder for VoidDecoder {
    type Output = ();

    fn decode(&self, _payload: &str) -> Result<Option<()>, ClientError> {
        Ok(Some(()))
    }
}

/// Decodes the payload into a single `T`. JSON `null` is not deliverable.
///
/// A payload that is not valid JSON is retried as a plain string, so a
/// `SingleDecoder<String>` accepts `"data": "ok"`.
pub struct SingleDecoder<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> SingleDecoder<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for SingleDecoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned + Send + 'static> PayloadDecoder for SingleDecoder<T> {
    type Output = T;

    fn decode(&self, payload: &str) -> Result<Option<T>, ClientError> {
        let value = match parse_json(payload) {
            Ok(value) => value,
            Err(err) => {
                return serde_json::from_value(Value::String(payload.to_string()))
                    .map(Some)
                    .map_err(|_| err)
            }
        };
        decode_value(value)
    }
}

/// Decodes `{"results": [...], ...}` or a bare array into a `ListPage`.
pub struct ListDecoder<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> ListDecoder<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for ListDecoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned + Send + 'static> PayloadDecoder for ListDecoder<T> {
    type Output = ListPage<T>;

    fn decode(&self, payload: &str) -> Result<Option<ListPage<T>>, ClientError> {
        match parse_json(payload)? {
            Value::Object(mut object) => {
                let results = object.remove(RESULTS_KEY).ok_or_else(|| {
                    ClientError::data(format!("MissingFormatArgumentException: {RESULTS_KEY}"))
                })?;
                let items = decode_list(results)?;
                Ok(items.map(|items| ListPage {
                    items,
                    extra: extra_text(object),
                }))
            }
            other => Ok(decode_value(other)?.map(|items| ListPage {
                items,
                extra: String::new(),
            })),
        }
    }
}

/// Decodes a cursor page: `{"sid": ..., "results": ..., ...}`, or `{}` / `[]`
/// for an empty page.
pub struct CursorDecoder<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> CursorDecoder<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for CursorDecoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned + Send + 'static> PayloadDecoder for CursorDecoder<T> {
    type Output = CursorPage<T>;

    fn decode(&self, payload: &str) -> Result<Option<CursorPage<T>>, ClientError> {
        match parse_json(payload)? {
            Value::Object(object) if object.is_empty() => Ok(Some(CursorPage::empty())),
            Value::Array(array) if array.is_empty() => Ok(Some(CursorPage::empty())),
            Value::Object(mut object) => {
                let sid = match object.remove(SID_KEY) {
                    Some(Value::Null) | None => return Ok(None),
                    Some(sid) => field_text(&sid),
                };
                let Some(results) = object.remove(RESULTS_KEY) else {
                    return Ok(None);
                };
                let Some(items) = decode_list(results)? else {
                    return Ok(None);
                };
                Ok(Some(CursorPage {
                    sid,
                    items,
                    extra: extra_text(object),
                }))
            }
            _ => Ok(None),
        }
    }
}

fn decode_value<T: DeserializeOwned>(value: Value) -> Result<Option<T>, ClientError> {
    if value.is_null() {
        return Ok(None);
    }
    serde_json::from_value(value)
        .map(Some)
        .map_err(|e| ClientError::data(format!("JSONException: {e}")))
}

/// `results` may be an encoded JSON string or an inline array.
fn decode_list<T: DeserializeOwned>(results: Value) -> Result<Option<Vec<T>>, ClientError> {
    let value = match results {
        Value::String(text) => parse_json(&text)?,
        other => other,
    };
    decode_value(value)
}

fn extra_text(rest: Map<String, Value>) -> String {
    Value::Object(rest).to_string()
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;
    use crate::error::ErrorKind;
    use crate::types::extra_json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct User {
        name: String,
    }

    #[test]
    fn void_ignores_payload() {
        assert_eq!(VoidDecoder.decode("garbage").unwrap(), Some(()));
    }

    #[test]
    fn single_decodes_struct() {
        let user: Option<User> = SingleDecoder::<User>::new().decode(r#"{"name":"ada"}"#).unwrap();
        assert_eq!(user, Some(User { name: "ada".to_string() }));
    }

    #[test]
    fn single_accepts_bare_string_payload() {
        let s: Option<String> = SingleDecoder::<String>::new().decode("ok").unwrap();
        assert_eq!(s.as_deref(), Some("ok"));
    }

    #[test]
    fn single_null_is_not_deliverable() {
        let user: Option<User> = SingleDecoder::<User>::new().decode("null").unwrap();
        assert!(user.is_none());
    }

    #[test]
    fn single_type_mismatch_is_data_error() {
        let err = SingleDecoder::<User>::new().decode("[1]").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Data);
        assert!(err.message.starts_with("JSONException"));
    }

    #[test]
    fn list_with_results_keeps_extra() {
        let page = ListDecoder::<u32>::new()
            .decode(r#"{"results":"[1,2]","total":2}"#)
            .unwrap()
            .unwrap();
        assert_eq!(page.items, vec![1, 2]);
        assert_eq!(extra_json(&page.extra), Some(serde_json::json!({"total": 2})));
    }

    #[test]
    fn list_accepts_bare_array() {
        let page = ListDecoder::<u32>::new().decode("[3,4]").unwrap().unwrap();
        assert_eq!(page.items, vec![3, 4]);
        assert_eq!(page.extra, "");
    }

    #[test]
    fn list_object_without_results_is_data_error() {
        let err = ListDecoder::<u32>::new().decode(r#"{"total":2}"#).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Data);
        assert!(err.message.contains("results"));
    }

    #[test]
    fn cursor_page_strips_consumed_keys() {
        let page = CursorDecoder::<u32>::new()
            .decode(r#"{"sid":"abc","results":"[1,2,3]","total":9}"#)
            .unwrap()
            .unwrap();
        assert_eq!(page.sid, "abc");
        assert_eq!(page.items, vec![1, 2, 3]);
        assert_eq!(page.extra, r#"{"total":9}"#);
        assert!(page.has_more());
    }

    #[test]
    fn cursor_empty_object_and_array_are_empty_pages() {
        for payload in ["{}", "[]"] {
            let page = CursorDecoder::<u32>::new().decode(payload).unwrap().unwrap();
            assert_eq!(page, CursorPage::empty(), "{payload}");
            assert!(!page.has_more());
        }
    }

    #[test]
    fn cursor_without_sid_or_results_is_not_deliverable() {
        let decoder = CursorDecoder::<u32>::new();
        assert!(decoder.decode(r#"{"results":"[1]"}"#).unwrap().is_none());
        assert!(decoder.decode(r#"{"sid":"abc"}"#).unwrap().is_none());
        assert!(decoder.decode(r#"{"sid":null,"results":"[1]"}"#).unwrap().is_none());
        assert!(decoder.decode("[1]").unwrap().is_none());
    }

    #[test]
    fn cursor_malformed_results_is_data_error() {
        let err = CursorDecoder::<u32>::new()
            .decode(r#"{"sid":"a","results":"[oops"}"#)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Data);
    }
}
