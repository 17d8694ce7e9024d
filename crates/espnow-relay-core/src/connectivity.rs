//! Wi-Fi station connectivity supervisor
//!
//! The supervisor does not talk to the radio itself. The firmware feeds it
//! [`NetworkEvent`]s from the Wi-Fi controller and the IP stack, and acts on
//! the [`SupervisorAction`] each event returns. Other tasks observe the
//! resulting state or wait for the first connection.
//!
//! | Event                 | From           | To             | Action    |
//! |-----------------------|----------------|----------------|-----------|
//! | `StationStarted`      | any            | `Connecting`   | `Connect` |
//! | `StationDisconnected` | any            | `Disconnected` | `Connect` |
//! | `ConnectIssued`       | `Disconnected` | `Connecting`   | none      |
//! | `IpAcquired`          | any            | `Connected`    | none      |
//! | `IpLost`              | `Connected`    | `Connecting`   | none      |
//!
//! Reaching `Connected` latches a one-way "IP acquired" flag and wakes the
//! task blocked in [`ConnectivitySupervisor::wait_connected`].

use core::cell::Cell;
use core::net::Ipv4Addr;
use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, with_timeout};
use log::{info, warn};
use thiserror_no_std::Error;

/// Default bound on the startup wait for the first IP address
pub const DEFAULT_CONNECT_WAIT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkEvent {
    /// The station interface came up
    StationStarted,
    /// The station lost (or failed to establish) its association
    StationDisconnected,
    /// A connect request was handed to the radio
    ConnectIssued,
    /// DHCP assigned an address
    IpAcquired(Ipv4Addr),
    /// The address was withdrawn while associated
    IpLost,
}

/// What the driver must do after an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorAction {
    None,
    /// Issue a station connect request
    Connect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: ConnectivityState,
    pub to: ConnectivityState,
    pub action: SupervisorAction,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityError {
    #[error("no IP address after {waited_ms} ms")]
    Timeout { waited_ms: u64 },
}

#[derive(Clone, Copy)]
struct Inner {
    state: ConnectivityState,
    address: Option<Ipv4Addr>,
}

pub struct ConnectivitySupervisor {
    inner: Mutex<CriticalSectionRawMutex, Cell<Inner>>,
    connected_once: AtomicBool,
    connected: Signal<CriticalSectionRawMutex, ()>,
}

impl ConnectivitySupervisor {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(Cell::new(Inner {
                state: ConnectivityState::Disconnected,
                address: None,
            })),
            connected_once: AtomicBool::new(false),
            connected: Signal::new(),
        }
    }

    /// Apply one event and return the transition it caused.
    pub fn handle_event(&self, event: NetworkEvent) -> Transition {
        let transition = self.inner.lock(|cell| {
            let mut inner = cell.get();
            let from = inner.state;

            let (to, action) = match event {
                NetworkEvent::StationStarted => (ConnectivityState::Connecting, SupervisorAction::Connect),
                NetworkEvent::StationDisconnected => {
                    inner.address = None;
                    (ConnectivityState::Disconnected, SupervisorAction::Connect)
                }
                NetworkEvent::ConnectIssued if from == ConnectivityState::Disconnected => {
                    (ConnectivityState::Connecting, SupervisorAction::None)
                }
                NetworkEvent::IpAcquired(address) => {
                    inner.address = Some(address);
                    (ConnectivityState::Connected, SupervisorAction::None)
                }
                NetworkEvent::IpLost if from == ConnectivityState::Connected => {
                    inner.address = None;
                    (ConnectivityState::Connecting, SupervisorAction::None)
                }
                NetworkEvent::ConnectIssued | NetworkEvent::IpLost => (from, SupervisorAction::None),
            };

            inner.state = to;
            cell.set(inner);
            Transition { from, to, action }
        });

        match event {
            NetworkEvent::StationStarted => info!("Wi-Fi station started, connecting"),
            NetworkEvent::StationDisconnected => warn!("Wi-Fi disconnected, reconnecting"),
            NetworkEvent::IpAcquired(address) => {
                info!("Got IP: {}", address);
                self.connected_once.store(true, Ordering::Release);
                self.connected.signal(());
            }
            NetworkEvent::IpLost if transition.from == ConnectivityState::Connected => {
                warn!("IP address lost")
            }
            _ => {}
        }

        transition
    }

    pub fn state(&self) -> ConnectivityState {
        self.inner.lock(|cell| cell.get().state)
    }

    /// Current IPv4 address, if connected
    pub fn address(&self) -> Option<Ipv4Addr> {
        self.inner.lock(|cell| cell.get().address)
    }

    /// Whether `Connected` has been reached at least once
    pub fn has_connected(&self) -> bool {
        self.connected_once.load(Ordering::Acquire)
    }

    /// Wait up to `timeout` for the first connection.
    ///
    /// Returns immediately if a connection was already made. Intended for a
    /// single waiter, the startup gate.
    pub async fn wait_connected(&self, timeout: Duration) -> Result<(), ConnectivityError> {
        let wait = async {
            while !self.has_connected() {
                self.connected.wait().await;
            }
        };

        with_timeout(timeout, wait)
            .await
            .map_err(|_| ConnectivityError::Timeout {
                waited_ms: timeout.as_millis(),
            })
    }
}

impl Default for ConnectivitySupervisor {
    fn default() -> Self {
        Self::new()
    }
}
