//! `rand_core` adapter for the ESP32-S3 hardware random number generator

use esp_hal::rng::Rng;
use rand_core::{CryptoRng, RngCore};

/// Hardware RNG usable by the TLS handshake.
///
/// Output is only cryptographically strong while the radio is running, which
/// is always the case once Wi-Fi is up.
pub struct HardwareRng {
    rng: Rng,
}

impl HardwareRng {
    pub fn new() -> Self {
        Self { rng: Rng::new() }
    }

    /// Seed for the network stack's sequence numbers and ports
    pub fn seed(&mut self) -> u64 {
        self.next_u64()
    }
}

impl Default for HardwareRng {
    fn default() -> Self {
        Self::new()
    }
}

impl RngCore for HardwareRng {
    fn next_u32(&mut self) -> u32 {
        self.rng.random()
    }

    fn next_u64(&mut self) -> u64 {
        (u64::from(self.next_u32()) << 32) | u64::from(self.next_u32())
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(4) {
            let word = self.next_u32().to_le_bytes();
            chunk.copy_from_slice(&word[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

impl CryptoRng for HardwareRng {}
