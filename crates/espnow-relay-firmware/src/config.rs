//! Configuration baked in at build time from `.env` (see `build.rs`)

use espnow_relay_core::config::{EndpointSettings, RelayConfig, TimingConfig, WifiConfig};

include!(concat!(env!("OUT_DIR"), "/relay_config.rs"));

/// DER-encoded CA certificate the endpoint's chain must lead to
pub static TRUST_ANCHOR: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/trust_anchor.der"));
