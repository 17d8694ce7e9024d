//! ESP-NOW receive path and receive indicator

use embassy_time::Duration;
use esp_hal::gpio::Output;
use esp_radio::esp_now::EspNow;
use espnow_relay_core::indicator::{IndicatorSignal, run_indicator};
use espnow_relay_core::receive::{PeerAddress, ReceiveHandler};
use log::info;

/// Hands every inbound ESP-NOW frame to the receive handler.
///
/// Spawned only after the station has an IP address.
#[embassy_executor::task]
pub async fn espnow_receive_task(mut esp_now: EspNow<'static>, handler: ReceiveHandler<'static>) {
    info!("ESP-NOW receive path active");
    loop {
        let frame = esp_now.receive_async().await;
        let _ = handler.on_frame(PeerAddress(frame.info.src_address), frame.data());
    }
}

/// Pulses the indicator LED once per received frame.
#[embassy_executor::task]
pub async fn indicator_task(signal: &'static IndicatorSignal, led: Output<'static>, pulse: Duration) {
    run_indicator(signal, led, pulse).await
}
