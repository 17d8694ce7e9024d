//! Wi-Fi station tasks
//!
//! The tasks here translate controller and IP stack events into
//! [`NetworkEvent`]s for the [`ConnectivitySupervisor`] and carry out the
//! actions it returns. They hold no connection state of their own.

use embassy_net::{Runner, Stack};
use embassy_time::{Duration, Timer};
use esp_radio::wifi::event::{self, EventExt};
use esp_radio::wifi::{ClientConfig, ModeConfig, WifiController, WifiDevice, WifiEvent};
use espnow_relay_core::config::WifiConfig;
use espnow_relay_core::connectivity::{ConnectivitySupervisor, NetworkEvent, SupervisorAction};
use log::{error, info, warn};

/// Pause between failed start or connect attempts
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Drives the embassy-net stack.
#[embassy_executor::task]
pub async fn net_task(mut runner: Runner<'static, WifiDevice<'static>>) {
    runner.run().await
}

/// Keeps the station associated, reconnecting after every disconnect.
#[embassy_executor::task]
pub async fn connection_task(
    mut controller: WifiController<'static>,
    supervisor: &'static ConnectivitySupervisor,
    credentials: WifiConfig<'static>,
) {
    let client = ClientConfig::default()
        .with_ssid(credentials.ssid.into())
        .with_password(credentials.password.into());
    if let Err(e) = controller.set_config(&ModeConfig::Client(client)) {
        error!("Wi-Fi station config rejected: {:?}", e);
        return;
    }

    // ESP-NOW peers must transmit on the channel of the access point.
    event::StaConnected::update_handler(|event| {
        info!("Receiver channel: {}", event.channel());
    });

    let mut action = SupervisorAction::None;
    loop {
        if !matches!(controller.is_started(), Ok(true)) {
            if let Err(e) = controller.start_async().await {
                error!("Wi-Fi start failed: {:?}", e);
                Timer::after(RETRY_DELAY).await;
                continue;
            }
            action = supervisor.handle_event(NetworkEvent::StationStarted).action;
        }

        match action {
            SupervisorAction::Connect => {
                let _ = supervisor.handle_event(NetworkEvent::ConnectIssued);
                match controller.connect_async().await {
                    Ok(()) => {
                        info!("Associated with {}", credentials.ssid);
                        controller.wait_for_event(WifiEvent::StaDisconnected).await;
                    }
                    Err(e) => warn!("Wi-Fi connect failed: {:?}", e),
                }
                action = supervisor.handle_event(NetworkEvent::StationDisconnected).action;
                Timer::after(RETRY_DELAY).await;
            }
            SupervisorAction::None => {
                controller.wait_for_event(WifiEvent::StaDisconnected).await;
                action = supervisor.handle_event(NetworkEvent::StationDisconnected).action;
            }
        }
    }
}

/// Reports DHCP address changes to the supervisor.
#[embassy_executor::task]
pub async fn ip_watch_task(stack: Stack<'static>, supervisor: &'static ConnectivitySupervisor) {
    loop {
        stack.wait_config_up().await;
        if let Some(config) = stack.config_v4() {
            let _ = supervisor.handle_event(NetworkEvent::IpAcquired(config.address.address()));
        }

        stack.wait_config_down().await;
        let _ = supervisor.handle_event(NetworkEvent::IpLost);
    }
}
