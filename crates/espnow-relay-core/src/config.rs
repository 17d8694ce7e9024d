//! Relay configuration
//!
//! All strings borrow from the source they were deserialized from. The
//! firmware builds a `RelayConfig` from compile-time values; the simulator
//! deserializes one from a JSON file.

use embassy_time::Duration;
use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

use crate::delivery::{EndpointConfig, HostnameVerification};
use crate::endpoint::{Endpoint, EndpointError};

/// Longest SSID accepted by 802.11
pub const MAX_SSID_LEN: usize = 32;
/// Longest WPA2 passphrase
pub const MAX_PASSWORD_LEN: usize = 64;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("SSID must be 1 to 32 bytes, got {len}")]
    SsidLength { len: usize },
    #[error("password must be at most 64 bytes, got {len}")]
    PasswordLength { len: usize },
    #[error("endpoint URL: {0}")]
    Endpoint(#[from] EndpointError),
    #[error("{field} must be greater than zero")]
    ZeroTimeout { field: &'static str },
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(bound(deserialize = "'de: 'a"))]
pub struct RelayConfig<'a> {
    pub wifi: WifiConfig<'a>,
    pub endpoint: EndpointSettings<'a>,
    #[serde(default)]
    pub timing: TimingConfig,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WifiConfig<'a> {
    pub ssid: &'a str,
    #[serde(default)]
    pub password: &'a str,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EndpointSettings<'a> {
    pub url: &'a str,
    /// Accept a server certificate whose subject does not match the host.
    /// The chain is still validated.
    #[serde(default)]
    pub skip_hostname_check: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct TimingConfig {
    pub connect_wait_ms: u64,
    pub request_timeout_ms: u64,
    pub indicator_pulse_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            connect_wait_ms: 15_000,
            request_timeout_ms: 8_000,
            indicator_pulse_ms: 500,
        }
    }
}

impl TimingConfig {
    pub fn connect_wait(&self) -> Duration {
        Duration::from_millis(self.connect_wait_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn indicator_pulse(&self) -> Duration {
        Duration::from_millis(self.indicator_pulse_ms)
    }
}

impl<'a> RelayConfig<'a> {
    /// Check every field, returning the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ssid_len = self.wifi.ssid.len();
        if !(1..=MAX_SSID_LEN).contains(&ssid_len) {
            return Err(ConfigError::SsidLength { len: ssid_len });
        }
        if self.wifi.password.len() > MAX_PASSWORD_LEN {
            return Err(ConfigError::PasswordLength {
                len: self.wifi.password.len(),
            });
        }

        Endpoint::parse(self.endpoint.url)?;

        for (field, value) in [
            ("connect_wait_ms", self.timing.connect_wait_ms),
            ("request_timeout_ms", self.timing.request_timeout_ms),
            ("indicator_pulse_ms", self.timing.indicator_pulse_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroTimeout { field });
            }
        }

        Ok(())
    }

    /// Delivery settings for this configuration and the given DER trust anchor
    pub fn endpoint_config(&self, trust_anchor: &'a [u8]) -> EndpointConfig<'a> {
        EndpointConfig {
            url: self.endpoint.url,
            trust_anchor,
            hostname: if self.endpoint.skip_hostname_check {
                HostnameVerification::SkipCommonNameCheck
            } else {
                HostnameVerification::Verify
            },
            timeout: self.timing.request_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"{
        "wifi": { "ssid": "greenhouse", "password": "hunter22" },
        "endpoint": { "url": "https://relay.example.com/api/readings", "skip_hostname_check": true },
        "timing": { "connect_wait_ms": 20000, "request_timeout_ms": 5000, "indicator_pulse_ms": 100 }
    }"#;

    fn valid() -> RelayConfig<'static> {
        RelayConfig {
            wifi: WifiConfig {
                ssid: "greenhouse",
                password: "hunter22",
            },
            endpoint: EndpointSettings {
                url: "https://relay.example.com",
                skip_hostname_check: false,
            },
            timing: TimingConfig::default(),
        }
    }

    #[test]
    fn test_deserialize_full() {
        let config: RelayConfig = serde_json::from_str(FULL).unwrap();
        assert_eq!(config.wifi.ssid, "greenhouse");
        assert_eq!(config.endpoint.url, "https://relay.example.com/api/readings");
        assert!(config.endpoint.skip_hostname_check);
        assert_eq!(config.timing.connect_wait(), Duration::from_secs(20));
        assert_eq!(config.timing.indicator_pulse(), Duration::from_millis(100));
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_deserialize_applies_defaults() {
        let json = r#"{ "wifi": { "ssid": "open-net" }, "endpoint": { "url": "https://h" } }"#;
        let config: RelayConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.wifi.password, "");
        assert!(!config.endpoint.skip_hostname_check);
        assert_eq!(config.timing, TimingConfig::default());
        assert_eq!(config.timing.request_timeout(), Duration::from_secs(8));
    }

    #[test]
    fn test_validate_rejects_bad_fields() {
        let mut config = valid();
        config.wifi.ssid = "";
        assert_eq!(config.validate(), Err(ConfigError::SsidLength { len: 0 }));

        let mut config = valid();
        config.wifi.ssid = "this-ssid-is-definitely-over-32-bytes";
        assert!(matches!(config.validate(), Err(ConfigError::SsidLength { .. })));

        let mut config = valid();
        config.wifi.password = "0123456789012345678901234567890123456789012345678901234567890123456789";
        assert!(matches!(config.validate(), Err(ConfigError::PasswordLength { len: 70 })));

        let mut config = valid();
        config.endpoint.url = "http://relay.example.com";
        assert_eq!(
            config.validate(),
            Err(ConfigError::Endpoint(EndpointError::UnsupportedScheme))
        );

        let mut config = valid();
        config.timing.request_timeout_ms = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroTimeout {
                field: "request_timeout_ms"
            })
        );
    }

    #[test]
    fn test_endpoint_config_maps_hostname_policy() {
        let mut config = valid();
        let endpoint = config.endpoint_config(b"der");
        assert_eq!(endpoint.hostname, HostnameVerification::Verify);
        assert_eq!(endpoint.timeout, Duration::from_secs(8));
        assert_eq!(endpoint.trust_anchor, b"der");

        config.endpoint.skip_hostname_check = true;
        assert_eq!(
            config.endpoint_config(b"der").hostname,
            HostnameVerification::SkipCommonNameCheck
        );
    }
}
