//! ESP32-S3 firmware-specific modules for espnow-relay
//!
//! This crate contains the hardware-bound half of the relay: esp-radio Wi-Fi
//! and ESP-NOW bring-up, the embassy-net stack, the embedded-tls transport
//! used by the delivery client, and the build-time configuration.

#![no_std]

extern crate alloc;

pub mod config;
pub mod radio;
pub mod rng;
pub mod tls;
pub mod wifi;
