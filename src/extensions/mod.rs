//! `Sec-WebSocket-Extensions` tokenizing and extension negotiation.
//!
//! A header value holds comma-separated offers, each a `;`-separated list of
//! `key[=value]` tokens whose first token names the extension:
//!
//! ```text
//! permessage-deflate; client_max_window_bits=10, permessage-deflate
//! ```
//!
//! This module only splits a value that has already been received; header
//! grammar beyond that belongs to the handshake layer.

pub mod deflate;

pub use deflate::{PERMESSAGE_DEFLATE, PermessageDeflateConfig, negotiate};

use std::fmt;

/// One `key[=value]` token of an extension offer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionParam {
    /// Token name (e.g., "client_max_window_bits").
    pub name: String,
    /// Optional value. None for flag tokens.
    pub value: Option<String>,
}

impl ExtensionParam {
    /// Create a token with a value.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
        }
    }

    /// Create a flag token (no value).
    pub fn flag(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }

    /// Parse a single token (e.g., "param=value", "param=\"value\"" or "param").
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        if let Some((name, value)) = s.split_once('=') {
            Self {
                name: name.trim().to_string(),
                value: Some(value.trim().trim_matches('"').to_string()),
            }
        } else {
            Self::flag(s)
        }
    }
}

impl fmt::Display for ExtensionParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(v) => write!(f, "{}={}", self.name, v),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Split a header value into offer groups of tokens.
///
/// Groups are separated by `,` and tokens by `;`. Empty tokens and empty
/// groups are skipped.
#[must_use]
pub fn parse_offers(header_value: &str) -> Vec<Vec<ExtensionParam>> {
    header_value
        .split(',')
        .map(|group| {
            group
                .split(';')
                .filter(|token| !token.trim().is_empty())
                .map(ExtensionParam::parse)
                .collect::<Vec<_>>()
        })
        .filter(|group| !group.is_empty())
        .collect()
}
