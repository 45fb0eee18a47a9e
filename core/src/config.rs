//! Client configuration.
//!
//! # Design
//! Loaded once at startup (usually from a JSON blob shipped with the app)
//! and frozen inside the `ClientContext`. Every field has a default so a
//! config only needs to name what it changes. `MessageCatalog` plays the
//! role of the platform resource bundle: the user-facing text for each
//! error kind.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// User-facing text per error kind. Server codes are looked up in the
/// `ErrorBook` first and fall back to `server_default`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageCatalog {
    pub network_unreachable: String,
    pub timeout: String,
    pub insecure_channel: String,
    pub connection_failed: String,
    pub service_rejected: String,
    pub server_default: String,
}

impl Default for MessageCatalog {
    fn default() -> Self {
        Self {
            network_unreachable: "Network unavailable".to_string(),
            timeout: "Request timed out".to_string(),
            insecure_channel: "Insecure connection rejected".to_string(),
            connection_failed: "Connection failed".to_string(),
            service_rejected: "Service refused the request".to_string(),
            server_default: "Something went wrong".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    /// Relative path of the error-code endpoint.
    pub error_code_path: String,
    pub error_book_ttl_secs: u64,
    /// Whether new mailboxes buffer messages while suspended.
    pub pending_by_default: bool,
    pub messages: MessageCatalog,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            error_code_path: "config/error_code".to_string(),
            error_book_ttl_secs: 600,
            pending_by_default: true,
            messages: MessageCatalog::default(),
        }
    }
}

impl ClientConfig {
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = serde_json::from_str(raw)?;
        if config.base_url.trim().is_empty() {
            return Err(ConfigError::MissingBaseUrl);
        }
        Ok(config)
    }

    pub fn error_book_ttl(&self) -> Duration {
        Duration::from_secs(self.error_book_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let config = ClientConfig::from_json(r#"{"base_url":"https://api.example.com"}"#).unwrap();
        assert_eq!(config.base_url, "https://api.example.com");
        assert_eq!(config.error_code_path, "config/error_code");
        assert_eq!(config.error_book_ttl(), Duration::from_secs(600));
        assert!(config.pending_by_default);
        assert_eq!(config.messages, MessageCatalog::default());
    }

    #[test]
    fn nested_catalog_override() {
        let config =
            ClientConfig::from_json(r#"{"messages":{"timeout":"Too slow"}}"#).unwrap();
        assert_eq!(config.messages.timeout, "Too slow");
        assert_eq!(config.messages.connection_failed, "Connection failed");
    }

    #[test]
    fn empty_base_url_is_rejected() {
        let err = ClientConfig::from_json(r#"{"base_url":"  "}"#).unwrap_err();
        assert!(matches!(err, ConfigError::MissingBaseUrl));
    }

    #[test]
    fn malformed_json_is_rejected() {
        let err = ClientConfig::from_json("{not json").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
