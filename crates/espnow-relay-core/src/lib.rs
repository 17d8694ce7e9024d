//! Hardware-independent core library for espnow-relay
//!
//! This crate contains the platform-agnostic relay pipeline: the wire message
//! model, the bounded relay queue, the radio receive handler, the HTTPS
//! delivery client and task, and the Wi-Fi connectivity supervisor.
//!
//! It is `#![no_std]` so it compiles on both the ESP32-S3 firmware target and
//! desktop hosts (for the simulator and tests).

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod connectivity;
pub mod delivery;
pub mod endpoint;
pub mod error;
pub mod http;
pub mod indicator;
pub mod json;
pub mod message;
pub mod queue;
pub mod receive;
pub mod startup;
pub mod stats;

pub use connectivity::{ConnectivitySupervisor, NetworkEvent};
pub use delivery::{DeliveryClient, DeliveryTask, HttpsTransport};
pub use error::RelayError;
pub use message::SensorMessage;
pub use queue::{RELAY_QUEUE_CAPACITY, RelayQueue};
pub use receive::{PeerAddress, ReceiveHandler};
pub use stats::RelayStats;
