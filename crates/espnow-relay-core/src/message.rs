//! Wire format for sensor samples sent by ESP-NOW peers.
//!
//! Peers transmit the raw in-memory image of a C struct:
//! - id: 4 bytes (i32)
//! - temperature: 4 bytes (f32)
//! - humidity: 4 bytes (f32)
//!
//! Both sides use the native layout of the same architecture, so fields are
//! read in native byte order with no framing, length prefix or checksum.

use thiserror_no_std::Error;

/// Size of one sensor message on the wire.
pub const MESSAGE_WIRE_SIZE: usize = core::mem::size_of::<SensorMessage>();

const _: () = assert!(MESSAGE_WIRE_SIZE == 12, "peer protocol fixes the record at 12 bytes");

/// Errors produced while decoding an inbound radio frame
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("payload is {actual} bytes, expected {expected}")]
    LengthMismatch { expected: usize, actual: usize },
}

/// One sensor sample relayed from a peer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SensorMessage {
    /// Identifier or class code assigned by the sending peer
    pub id: i32,
    /// Temperature reading
    pub temperature: f32,
    /// Relative humidity reading
    pub humidity: f32,
}

impl SensorMessage {
    pub const fn new(id: i32, temperature: f32, humidity: f32) -> Self {
        Self {
            id,
            temperature,
            humidity,
        }
    }

    /// Decodes a received payload.
    ///
    /// The payload must be exactly [`MESSAGE_WIRE_SIZE`] bytes; shorter or
    /// longer frames are rejected before any field is read.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let bytes: &[u8; MESSAGE_WIRE_SIZE] =
            payload
                .try_into()
                .map_err(|_| DecodeError::LengthMismatch {
                    expected: MESSAGE_WIRE_SIZE,
                    actual: payload.len(),
                })?;

        Ok(Self {
            id: i32::from_ne_bytes(word(bytes, 0)),
            temperature: f32::from_ne_bytes(word(bytes, 4)),
            humidity: f32::from_ne_bytes(word(bytes, 8)),
        })
    }

    /// Converts the message to the byte image a peer would transmit.
    pub fn to_bytes(&self) -> [u8; MESSAGE_WIRE_SIZE] {
        let mut bytes = [0u8; MESSAGE_WIRE_SIZE];
        bytes[0..4].copy_from_slice(&self.id.to_ne_bytes());
        bytes[4..8].copy_from_slice(&self.temperature.to_ne_bytes());
        bytes[8..12].copy_from_slice(&self.humidity.to_ne_bytes());
        bytes
    }
}

fn word(bytes: &[u8; MESSAGE_WIRE_SIZE], offset: usize) -> [u8; 4] {
    let mut out = [0u8; 4];
    out.copy_from_slice(&bytes[offset..offset + 4]);
    out
}
