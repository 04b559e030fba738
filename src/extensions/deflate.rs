//! Permessage-deflate parameter negotiation (RFC 7692 Section 7).

use std::fmt;

use log::{debug, warn};

use crate::error::{Error, Result};
use crate::extensions::{ExtensionParam, parse_offers};

/// Extension token that opens a permessage-deflate offer.
pub const PERMESSAGE_DEFLATE: &str = "permessage-deflate";

/// Smallest LZ77 window exponent allowed by RFC 7692.
pub const MIN_WINDOW_BITS: u8 = 8;
/// Largest LZ77 window exponent allowed by RFC 7692.
pub const MAX_WINDOW_BITS: u8 = 15;
/// Window exponent used when a parameter carries no value.
pub const DEFAULT_WINDOW_BITS: u8 = 15;

const SERVER_NO_CONTEXT_TAKEOVER: &str = "server_no_context_takeover";
const CLIENT_NO_CONTEXT_TAKEOVER: &str = "client_no_context_takeover";
const SERVER_MAX_WINDOW_BITS: &str = "server_max_window_bits";
const CLIENT_MAX_WINDOW_BITS: &str = "client_max_window_bits";

/// Negotiated permessage-deflate parameters for one connection.
///
/// `Default` is the disabled configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermessageDeflateConfig {
    /// The extension is in use.
    pub enable: bool,
    /// Outgoing messages may be compressed.
    pub compression: bool,
    /// Incoming messages may be compressed.
    pub decompression: bool,
    /// The server keeps its LZ77 window across messages.
    pub server_context_takeover: bool,
    /// The client keeps its LZ77 window across messages.
    pub client_context_takeover: bool,
    /// Window exponent of the client's compressor.
    pub client_max_window_bits: u8,
    /// Window exponent of the server's compressor.
    pub server_max_window_bits: u8,
}

impl Default for PermessageDeflateConfig {
    fn default() -> Self {
        Self {
            enable: false,
            compression: false,
            decompression: false,
            server_context_takeover: false,
            client_context_takeover: false,
            client_max_window_bits: DEFAULT_WINDOW_BITS,
            server_max_window_bits: DEFAULT_WINDOW_BITS,
        }
    }
}

impl PermessageDeflateConfig {
    /// Enabled configuration with the RFC 7692 defaults: both directions
    /// compressed, both sides keeping context, 15-bit windows.
    #[must_use]
    pub const fn enabled() -> Self {
        Self {
            enable: true,
            compression: true,
            decompression: true,
            server_context_takeover: true,
            client_context_takeover: true,
            client_max_window_bits: DEFAULT_WINDOW_BITS,
            server_max_window_bits: DEFAULT_WINDOW_BITS,
        }
    }

    /// Set whether the server keeps its window across messages.
    #[must_use]
    pub const fn server_context_takeover(mut self, value: bool) -> Self {
        self.server_context_takeover = value;
        self
    }

    /// Set whether the client keeps its window across messages.
    #[must_use]
    pub const fn client_context_takeover(mut self, value: bool) -> Self {
        self.client_context_takeover = value;
        self
    }

    /// Set the server window exponent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedExtension`] if `bits` is outside 8..=15.
    pub fn server_max_window_bits(mut self, bits: u8) -> Result<Self> {
        self.server_max_window_bits = check_window_bits(SERVER_MAX_WINDOW_BITS, bits)?;
        Ok(self)
    }

    /// Set the client window exponent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedExtension`] if `bits` is outside 8..=15.
    pub fn client_max_window_bits(mut self, bits: u8) -> Result<Self> {
        self.client_max_window_bits = check_window_bits(CLIENT_MAX_WINDOW_BITS, bits)?;
        Ok(self)
    }

    /// Build a configuration from the tokens of one offer group.
    ///
    /// Token order inside the group does not matter. A group without a
    /// `permessage-deflate` token yields the disabled configuration, but its
    /// tokens are still validated.
    ///
    /// The `permessage-deflate` token alone turns on both directions with
    /// the RFC 7692 defaults. The other tokens only narrow a direction's
    /// window or drop its context takeover; none of them switches a
    /// direction off.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedExtension`] for an unknown token or a window
    /// value that is not an integer in 8..=15.
    pub fn from_params(params: &[ExtensionParam]) -> Result<Self> {
        let mut offered = false;
        let mut server_no_context = false;
        let mut client_no_context = false;
        let mut server_bits = None;
        let mut client_bits = None;

        for param in params {
            match param.name.as_str() {
                PERMESSAGE_DEFLATE => offered = true,
                SERVER_NO_CONTEXT_TAKEOVER => server_no_context = true,
                CLIENT_NO_CONTEXT_TAKEOVER => client_no_context = true,
                SERVER_MAX_WINDOW_BITS => {
                    server_bits = Some(parse_window_bits(&param.name, param.value.as_deref())?);
                }
                CLIENT_MAX_WINDOW_BITS => {
                    client_bits = Some(parse_window_bits(&param.name, param.value.as_deref())?);
                }
                other => {
                    warn!("rejecting extension token {:?}", other);
                    return Err(Error::UnsupportedExtension(param.to_string()));
                }
            }
        }

        if !offered {
            return Ok(Self::default());
        }

        let mut config = Self::enabled();
        config.server_context_takeover = !server_no_context;
        config.client_context_takeover = !client_no_context;
        if let Some(bits) = server_bits {
            config.server_max_window_bits = bits;
        }
        if let Some(bits) = client_bits {
            config.client_max_window_bits = bits;
        }

        Ok(config)
    }

    /// Render the parameters as a `Sec-WebSocket-Extensions` value.
    ///
    /// Parameters equal to the RFC defaults are omitted. The disabled
    /// configuration renders as an empty string.
    #[must_use]
    pub fn to_header_value(&self) -> String {
        if !self.enable {
            return String::new();
        }

        let mut params = vec![ExtensionParam::flag(PERMESSAGE_DEFLATE)];
        if !self.server_context_takeover {
            params.push(ExtensionParam::flag(SERVER_NO_CONTEXT_TAKEOVER));
        }
        if !self.client_context_takeover {
            params.push(ExtensionParam::flag(CLIENT_NO_CONTEXT_TAKEOVER));
        }
        if self.server_max_window_bits != DEFAULT_WINDOW_BITS {
            params.push(ExtensionParam::new(
                SERVER_MAX_WINDOW_BITS,
                self.server_max_window_bits.to_string(),
            ));
        }
        if self.client_max_window_bits != DEFAULT_WINDOW_BITS {
            params.push(ExtensionParam::new(
                CLIENT_MAX_WINDOW_BITS,
                self.client_max_window_bits.to_string(),
            ));
        }

        params
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl fmt::Display for PermessageDeflateConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_header_value())
    }
}

/// Negotiate permessage-deflate from a `Sec-WebSocket-Extensions` value.
///
/// Every offer group is parsed; the first one containing
/// `permessage-deflate` is the effective configuration. Without such a group
/// the result is the disabled configuration.
///
/// # Errors
///
/// Returns [`Error::UnsupportedExtension`] if any group contains an unknown
/// token or an invalid window value.
pub fn negotiate(header_value: &str) -> Result<PermessageDeflateConfig> {
    let mut effective = None;
    for group in parse_offers(header_value) {
        let config = PermessageDeflateConfig::from_params(&group)?;
        if effective.is_none() && config.enable {
            effective = Some(config);
        }
    }

    let config = effective.unwrap_or_default();
    debug!("negotiated permessage-deflate: {:?}", config);
    Ok(config)
}

fn check_window_bits(name: &str, bits: u8) -> Result<u8> {
    if (MIN_WINDOW_BITS..=MAX_WINDOW_BITS).contains(&bits) {
        Ok(bits)
    } else {
        Err(Error::UnsupportedExtension(format!(
            "{} must be {}-{}, got {}",
            name, MIN_WINDOW_BITS, MAX_WINDOW_BITS, bits
        )))
    }
}

fn parse_window_bits(name: &str, value: Option<&str>) -> Result<u8> {
    match value {
        None | Some("") => Ok(DEFAULT_WINDOW_BITS),
        Some(s) => {
            let bits: u8 = s.parse().map_err(|_| {
                Error::UnsupportedExtension(format!("invalid {} value: {}", name, s))
            })?;
            check_window_bits(name, bits)
        }
    }
}
