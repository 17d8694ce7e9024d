//! Desktop simulator for the espnow-relay pipeline.
//!
//! Runs the real receive handler, relay queue, delivery task and startup gate
//! from `espnow-relay-core` on host threads. A synthetic ESP-NOW peer sends
//! readings, and deliveries go to an in-memory HTTPS endpoint that speaks the
//! same HTTP/1.1 framing the firmware uses over TLS.
//!
//! # Usage
//!
//! ```text
//! espnow-relay-simulator [CONFIG.json] [--untrusted] [--offline]
//! ```
//!
//! | Flag          | Effect                                                    |
//! |---------------|-----------------------------------------------------------|
//! | `CONFIG.json` | Relay configuration (defaults to a built-in one)          |
//! | `--untrusted` | Endpoint presents a certificate outside the trust anchor  |
//! | `--offline`   | Wi-Fi never gets an address; the relay stays inactive     |
//!
//! Log level is taken from `RUST_LOG` (default `info`).

use std::fs;
use std::net::Ipv4Addr;
use std::time::Duration as StdDuration;

use embassy_time::{Duration, Timer};
use embedded_io_async::{ErrorKind, ErrorType, Read, Write};
use log::{debug, error, info};

use espnow_relay_core::config::RelayConfig;
use espnow_relay_core::connectivity::{ConnectivitySupervisor, NetworkEvent};
use espnow_relay_core::delivery::{DeliveryClient, DeliveryTask, HttpsTransport, TlsTarget, TransportError};
use espnow_relay_core::http::{self, Request, ResponseSummary};
use espnow_relay_core::indicator::{IndicatorSignal, run_indicator};
use espnow_relay_core::message::SensorMessage;
use espnow_relay_core::receive::{PeerAddress, ReceiveHandler};
use espnow_relay_core::startup::activate_when_connected;
use espnow_relay_core::{RelayQueue, RelayStats};

// ---------------------------------------------------------------------------
// Simulation constants
// ---------------------------------------------------------------------------

const DEFAULT_CONFIG: &str = r#"{
    "wifi": { "ssid": "simulated-ap", "password": "simulated-passphrase" },
    "endpoint": { "url": "https://relay.local/api/readings" },
    "timing": { "connect_wait_ms": 3000, "request_timeout_ms": 2000, "indicator_pulse_ms": 50 }
}"#;

/// Trust anchor the simulated endpoint's certificate chains to
const SIMULATOR_CA: &[u8] = b"espnow-relay simulator CA";
/// Anchor that the simulated endpoint does not chain to
const FOREIGN_CA: &[u8] = b"some other CA";

const PEER: PeerAddress = PeerAddress([0x24, 0x6f, 0x28, 0x9a, 0x11, 0x02]);

/// Time from station start to DHCP lease
const DHCP_DELAY: StdDuration = StdDuration::from_millis(300);
/// Round trip of one simulated HTTPS exchange
const ENDPOINT_LATENCY: Duration = Duration::from_millis(120);
/// Gap between regular peer transmissions
const PEER_INTERVAL: StdDuration = StdDuration::from_millis(250);
const PEER_READINGS: i32 = 12;

static RELAY_QUEUE: RelayQueue = RelayQueue::new();
static SUPERVISOR: ConnectivitySupervisor = ConnectivitySupervisor::new();
static STATS: RelayStats = RelayStats::new();
static INDICATOR: IndicatorSignal = IndicatorSignal::new();

// ---------------------------------------------------------------------------
// Simulated endpoint
// ---------------------------------------------------------------------------

/// One HTTP connection to the simulated endpoint.
///
/// Collects the request; on flush, prepares a `201 Created` response that
/// reports how many body bytes arrived.
struct LoopbackStream {
    request: Vec<u8>,
    response: Vec<u8>,
    read_pos: usize,
}

impl LoopbackStream {
    fn new() -> Self {
        Self {
            request: Vec::new(),
            response: Vec::new(),
            read_pos: 0,
        }
    }

    fn respond(&mut self) {
        let body_len = http::find_header_end(&self.request)
            .map(|end| self.request.len() - (end + 4))
            .unwrap_or(0);
        let body = format!("{{\"accepted\":true,\"bytes\":{body_len}}}");
        self.response = format!(
            "HTTP/1.1 201 Created\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        )
        .into_bytes();
        self.read_pos = 0;
    }
}

impl ErrorType for LoopbackStream {
    type Error = ErrorKind;
}

impl Read for LoopbackStream {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let remaining = &self.response[self.read_pos..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.read_pos += n;
        Ok(n)
    }
}

impl Write for LoopbackStream {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.request.extend_from_slice(buf);
        Ok(buf.len())
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        self.respond();
        Ok(())
    }
}

/// In-memory stand-in for the firmware's TLS transport.
struct LoopbackTransport {
    latency: Duration,
}

impl HttpsTransport for LoopbackTransport {
    async fn exchange(
        &mut self,
        target: &TlsTarget<'_>,
        request: &Request<'_>,
        body_out: &mut [u8],
    ) -> Result<ResponseSummary, TransportError> {
        // Handshake
        Timer::after(self.latency / 2).await;
        if target.trust_anchor != SIMULATOR_CA {
            return Err(TransportError::Certificate);
        }
        debug!("Simulated TLS session with {}:{}", target.host, target.port);

        let mut stream = LoopbackStream::new();
        let mut head = [0u8; 512];
        let summary = http::exchange(&mut stream, request, &mut head, body_out).await?;
        Timer::after(self.latency / 2).await;
        Ok(summary)
    }
}

// ---------------------------------------------------------------------------
// Simulated peripherals
// ---------------------------------------------------------------------------

/// Indicator LED that logs its level changes.
struct LogLed;

impl embedded_hal::digital::ErrorType for LogLed {
    type Error = core::convert::Infallible;
}

impl embedded_hal::digital::OutputPin for LogLed {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        debug!("LED off");
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        debug!("LED on");
        Ok(())
    }
}

/// Generates readings the way a peer sensor node would.
struct MockPeer {
    next_id: i32,
}

impl MockPeer {
    fn new() -> Self {
        Self { next_id: 1 }
    }

    fn next_frame(&mut self) -> [u8; 12] {
        let t = self.next_id as f32;
        let message = SensorMessage::new(
            self.next_id,
            22.0 + 2.5 * (t / 5.0).sin(),
            48.0 + 6.0 * (t / 7.0).cos(),
        );
        self.next_id += 1;
        message.to_bytes()
    }
}

/// Sends regular readings, one malformed frame, and a burst larger than the
/// relay queue.
fn run_peer(handler: ReceiveHandler<'static>) {
    let mut peer = MockPeer::new();

    for _ in 0..PEER_READINGS {
        let _ = handler.on_frame(PEER, &peer.next_frame());
        std::thread::sleep(PEER_INTERVAL);
    }

    info!("Peer: sending a truncated frame");
    let _ = handler.on_frame(PEER, &peer.next_frame()[..10]);

    let burst = RELAY_QUEUE.capacity() + 3;
    info!("Peer: sending a burst of {} frames", burst);
    for _ in 0..burst {
        let _ = handler.on_frame(PEER, &peer.next_frame());
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

struct Options {
    config_path: Option<String>,
    untrusted: bool,
    offline: bool,
}

fn parse_args() -> Options {
    let mut options = Options {
        config_path: None,
        untrusted: false,
        offline: false,
    };
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--untrusted" => options.untrusted = true,
            "--offline" => options.offline = true,
            _ => options.config_path = Some(arg),
        }
    }
    options
}

fn load_config(path: Option<&str>) -> Result<RelayConfig<'static>, String> {
    let text: &'static str = match path {
        Some(path) => fs::read_to_string(path)
            .map_err(|e| format!("reading {path}: {e}"))?
            .leak(),
        None => DEFAULT_CONFIG,
    };
    let config: RelayConfig<'static> = serde_json::from_str(text).map_err(|e| format!("parsing config: {e}"))?;
    config.validate().map_err(|e| format!("invalid config: {e}"))?;
    Ok(config)
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    info!("Starting espnow-relay simulator");

    let options = parse_args();
    let config = match load_config(options.config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };
    info!("SSID {:?}, endpoint {}", config.wifi.ssid, config.endpoint.url);

    // Wi-Fi bring-up
    let offline = options.offline;
    std::thread::spawn(move || {
        let _ = SUPERVISOR.handle_event(NetworkEvent::StationStarted);
        let _ = SUPERVISOR.handle_event(NetworkEvent::ConnectIssued);
        if offline {
            return;
        }
        std::thread::sleep(DHCP_DELAY);
        let _ = SUPERVISOR.handle_event(NetworkEvent::IpAcquired(Ipv4Addr::new(192, 168, 4, 20)));
    });

    let pulse = config.timing.indicator_pulse();
    std::thread::spawn(move || {
        embassy_futures::block_on(run_indicator(&INDICATOR, LogLed, pulse));
    });

    let trust_anchor = if options.untrusted { FOREIGN_CA } else { SIMULATOR_CA };
    let endpoint = config.endpoint_config(trust_anchor);
    let transport = LoopbackTransport {
        latency: ENDPOINT_LATENCY,
    };
    let client = match DeliveryClient::new(transport, &endpoint) {
        Ok(client) => client,
        Err(e) => {
            error!("Endpoint rejected: {}", e);
            std::process::exit(1);
        }
    };
    let Some(consumer) = RELAY_QUEUE.take_consumer() else {
        error!("Relay queue consumer already taken");
        std::process::exit(1);
    };

    let activated = embassy_futures::block_on(activate_when_connected(
        &SUPERVISOR,
        config.timing.connect_wait(),
        move || {
            let task = DeliveryTask::new(consumer, client, &STATS);
            std::thread::spawn(move || {
                embassy_futures::block_on(task.run());
            });

            let handler = ReceiveHandler::new(RELAY_QUEUE.producer(), &STATS).with_indicator(&INDICATOR);
            std::thread::spawn(move || run_peer(handler))
        },
    ));

    match activated {
        Ok(peer) => {
            let _ = peer.join();
            // Let the delivery task drain what is left.
            while !RELAY_QUEUE.is_empty() {
                std::thread::sleep(StdDuration::from_millis(50));
            }
            std::thread::sleep(StdDuration::from_millis(500));
        }
        Err(e) => error!("Simulation ended without relaying: {}", e),
    }

    info!("Relay stats: {}", STATS.snapshot());
    info!("Simulator exiting");
}
