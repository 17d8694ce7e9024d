//! Startup gate for the receive path
//!
//! Nothing is received until the station has an IP address: the radio
//! receive task and the delivery task are only started once
//! [`activate_when_connected`] sees the first connection.

use embassy_time::Duration;
use log::{error, info};

use crate::connectivity::ConnectivitySupervisor;
use crate::error::RelayError;

/// Wait up to `timeout` for connectivity, then run `activate`.
///
/// On timeout `activate` is never called and the error is returned; the
/// caller is expected to keep running without relaying.
pub async fn activate_when_connected<R>(
    supervisor: &ConnectivitySupervisor,
    timeout: Duration,
    activate: impl FnOnce() -> R,
) -> Result<R, RelayError> {
    info!("Waiting up to {} ms for Wi-Fi", timeout.as_millis());

    if let Err(e) = supervisor.wait_connected(timeout).await {
        error!("{}; receive path stays inactive", e);
        return Err(e.into());
    }

    if let Some(address) = supervisor.address() {
        info!("Connected as {}, activating receive path", address);
    }
    Ok(activate())
}
