//! Remote endpoint description handed to a connection attempt
//!
//! The UMP endpoint name travels as a NUL-terminated string of at most
//! 98 bytes, so the name itself is capped at 97 bytes of UTF-8.

use thiserror::Error;

/// Largest endpoint name accepted, in UTF-8 bytes (98 with the terminator)
pub const MAX_ENDPOINT_NAME_BYTES: usize = 97;

/// Name announced when the user leaves the endpoint name blank
pub const DEFAULT_ENDPOINT_NAME: &str = "Nakama";

/// Endpoint validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EndpointError {
    #[error("remote host is empty")]
    EmptyHost,

    #[error("remote port must be between 1 and 65535")]
    InvalidPort,

    #[error("endpoint name is {0} bytes, the limit is 97")]
    NameTooLong(usize),
}

/// Immutable snapshot of where and as whom to connect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    port: u16,
    display_name: String,
}

impl Endpoint {
    /// Build an endpoint, truncating an oversized display name
    pub fn new(host: &str, port: u16, display_name: &str) -> Result<Self, EndpointError> {
        let host = host.trim();
        if host.is_empty() {
            return Err(EndpointError::EmptyHost);
        }
        if port == 0 {
            return Err(EndpointError::InvalidPort);
        }

        Ok(Self {
            host: host.to_string(),
            port,
            display_name: sanitize_display_name(display_name),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }
}

/// Strip newline and carriage-return characters from both ends
pub fn trim_line_breaks(name: &str) -> &str {
    name.trim_matches(|c| c == '\n' || c == '\r')
}

/// Check a name typed by the user, rejecting it if it is too long
pub fn validate_display_name(name: &str) -> Result<&str, EndpointError> {
    let trimmed = trim_line_breaks(name);
    if trimmed.len() > MAX_ENDPOINT_NAME_BYTES {
        return Err(EndpointError::NameTooLong(trimmed.len()));
    }
    Ok(trimmed)
}

/// Normalize a name before it is handed to the transport
///
/// Blank names fall back to [`DEFAULT_ENDPOINT_NAME`]. Oversized names are
/// cut at the last char boundary that fits.
pub fn sanitize_display_name(name: &str) -> String {
    let trimmed = trim_line_breaks(name);
    if trimmed.trim().is_empty() {
        return DEFAULT_ENDPOINT_NAME.to_string();
    }
    if trimmed.len() <= MAX_ENDPOINT_NAME_BYTES {
        return trimmed.to_string();
    }

    let mut end = MAX_ENDPOINT_NAME_BYTES;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    trimmed[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_endpoint_new() {
        let ep = Endpoint::new(" 10.0.0.5 ", 5504, "Studio").unwrap();
        assert_eq!(ep.host(), "10.0.0.5");
        assert_eq!(ep.port(), 5504);
        assert_eq!(ep.display_name(), "Studio");
    }

    #[test]
    fn test_endpoint_rejects_bad_host_and_port() {
        assert_eq!(Endpoint::new("  ", 5504, "x"), Err(EndpointError::EmptyHost));
        assert_eq!(Endpoint::new("host", 0, "x"), Err(EndpointError::InvalidPort));
    }

    #[test]
    fn test_name_trimming() {
        assert_eq!(sanitize_display_name("Studio\r\n"), "Studio");
        assert_eq!(sanitize_display_name("\nMy Synth"), "My Synth");
        // Inner and space padding is kept
        assert_eq!(sanitize_display_name(" My  Synth "), " My  Synth ");
        assert_eq!(sanitize_display_name(""), DEFAULT_ENDPOINT_NAME);
        assert_eq!(sanitize_display_name("  \r\n"), DEFAULT_ENDPOINT_NAME);
    }

    #[test]
    fn test_name_limit_boundary() {
        let at_limit = "a".repeat(97);
        assert_eq!(sanitize_display_name(&at_limit), at_limit);
        assert!(validate_display_name(&at_limit).is_ok());

        let over = "a".repeat(98);
        assert_eq!(sanitize_display_name(&over).len(), 97);
        assert_eq!(validate_display_name(&over), Err(EndpointError::NameTooLong(98)));
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        // 'é' is two bytes; 49 of them are 98 bytes
        let name = "é".repeat(49);
        let cut = sanitize_display_name(&name);
        assert_eq!(cut.len(), 96);
        assert_eq!(cut.chars().count(), 48);
    }

    proptest! {
        #[test]
        fn prop_sanitized_name_fits(name in ".{0,200}") {
            let cut = sanitize_display_name(&name);
            prop_assert!(cut.len() <= MAX_ENDPOINT_NAME_BYTES);
            prop_assert!(!cut.is_empty());
        }

        #[test]
        fn prop_short_names_pass_through(name in "[a-zA-Z0-9 ]{1,40}[a-zA-Z0-9]") {
            prop_assert_eq!(sanitize_display_name(&format!("{}\r\n", name)), name);
        }
    }
}
