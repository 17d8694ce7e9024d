//! Receive indicator
//!
//! The receive handler runs in a context that must not wait, so it only raises
//! a [`Signal`]. A dedicated task owns the output pin and turns each request
//! into one fixed-length pulse. Requests arriving while a pulse is active are
//! coalesced into a single follow-up pulse.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Timer};
use embedded_hal::digital::OutputPin;
use log::warn;

/// Default length of the pulse emitted per received frame
pub const DEFAULT_PULSE: Duration = Duration::from_millis(500);

/// Request line from the receive handler to the indicator task
pub struct IndicatorSignal {
    signal: Signal<CriticalSectionRawMutex, ()>,
}

impl IndicatorSignal {
    pub const fn new() -> Self {
        Self {
            signal: Signal::new(),
        }
    }

    /// Ask for a pulse. Never waits.
    pub fn request_pulse(&self) {
        self.signal.signal(());
    }

    /// Whether a pulse request is waiting to be served
    pub fn is_pending(&self) -> bool {
        self.signal.signaled()
    }
}

impl Default for IndicatorSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for one request, then drive `pin` high for `pulse`.
pub async fn pulse_once<P: OutputPin>(signal: &IndicatorSignal, pin: &mut P, pulse: Duration) {
    signal.signal.wait().await;

    if pin.set_high().is_err() {
        warn!("Indicator pin could not be driven high");
        return;
    }
    Timer::after(pulse).await;
    if pin.set_low().is_err() {
        warn!("Indicator pin could not be driven low");
    }
}

/// Indicator task body: serve pulse requests forever.
pub async fn run_indicator<P: OutputPin>(signal: &IndicatorSignal, mut pin: P, pulse: Duration) -> ! {
    loop {
        pulse_once(signal, &mut pin, pulse).await;
    }
}
