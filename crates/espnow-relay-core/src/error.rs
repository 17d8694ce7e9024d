//! Top-level relay errors

use thiserror_no_std::Error;

use crate::config::ConfigError;
use crate::connectivity::ConnectivityError;

/// Context text carried by [`RelayError`]
pub type ErrorText = heapless::String<64>;

/// Top-level errors of the relay firmware
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error("Connectivity failed: {0}")]
    Connectivity(#[from] ConnectivityError),
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Radio error: {0}")]
    Radio(ErrorText),
    #[error("Relay queue consumer already taken")]
    ConsumerTaken,
}

impl RelayError {
    pub fn radio(context: &str) -> Self {
        Self::Radio(ErrorText::from_truncated(context))
    }
}

/// Build a bounded string from arbitrary text without failing.
pub trait FromTruncated<T> {
    fn from_truncated(value: T) -> Self;
}

impl<const N: usize> FromTruncated<&str> for heapless::String<N> {
    /// Keeps as many whole characters of `value` as fit.
    fn from_truncated(value: &str) -> Self {
        let mut out = heapless::String::new();
        for c in value.chars() {
            if out.push(c).is_err() {
                break;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_truncated_short_text() {
        let text = heapless::String::<8>::from_truncated("radio");
        assert_eq!(text.as_str(), "radio");
    }

    #[test]
    fn test_from_truncated_respects_char_boundaries() {
        let text = heapless::String::<5>::from_truncated("temp°C sensor");
        assert_eq!(text.as_str(), "temp");
    }

    #[test]
    fn test_relay_error_messages() {
        let err = RelayError::from(ConnectivityError::Timeout { waited_ms: 15000 });
        assert!(matches!(err, RelayError::Connectivity(_)));

        let err = RelayError::radio(
            "a context string that is considerably longer than sixty-four characters in total",
        );
        match err {
            RelayError::Radio(text) => assert_eq!(text.len(), 64),
            other => panic!("unexpected {other:?}"),
        }
    }
}
