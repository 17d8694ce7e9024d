#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use embassy_executor::Spawner;
use embassy_net::StackResources;
use embassy_time::{Duration, Timer};
use esp_hal::clock::CpuClock;
use esp_hal::gpio::{Level, Output, OutputConfig};
use esp_hal::peripherals::Peripherals;
use esp_hal::timer::timg::TimerGroup;
use espnow_relay_core::config::ConfigError;
use espnow_relay_core::connectivity::ConnectivitySupervisor;
use espnow_relay_core::delivery::{DeliveryClient, DeliveryTask};
use espnow_relay_core::indicator::IndicatorSignal;
use espnow_relay_core::receive::ReceiveHandler;
use espnow_relay_core::startup::activate_when_connected;
use espnow_relay_core::{RelayError, RelayQueue, RelayStats};
use espnow_relay_firmware::config::{RELAY_CONFIG, TRUST_ANCHOR};
use espnow_relay_firmware::radio::{espnow_receive_task, indicator_task};
use espnow_relay_firmware::rng::HardwareRng;
use espnow_relay_firmware::tls::{TlsBuffers, TlsTransport};
use espnow_relay_firmware::wifi::{connection_task, ip_watch_task, net_task};
use log::{error, info};
use static_cell::{ConstStaticCell, StaticCell};

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    loop {}
}

extern crate alloc;

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

/// How often relay counters are logged once running
const STATS_INTERVAL: Duration = Duration::from_secs(60);

static RELAY_QUEUE: RelayQueue = RelayQueue::new();
static SUPERVISOR: ConnectivitySupervisor = ConnectivitySupervisor::new();
static STATS: RelayStats = RelayStats::new();
static INDICATOR: IndicatorSignal = IndicatorSignal::new();

static RADIO: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();
static STACK_RESOURCES: StaticCell<StackResources<3>> = StaticCell::new();
static TLS_BUFFERS: ConstStaticCell<TlsBuffers> = ConstStaticCell::new(TlsBuffers::new());

#[embassy_executor::task]
async fn delivery_task(task: DeliveryTask<'static, TlsTransport<'static>>) {
    task.run().await
}

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    rtt_target::rtt_init_log!();

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 73744);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    info!("Embassy initialized!");

    if let Err(e) = start(spawner, peripherals).await {
        error!("Relay inactive: {}", e);
    }

    loop {
        Timer::after(STATS_INTERVAL).await;
        info!("Relay stats: {}", STATS.snapshot());
    }
}

/// Bring up networking, then activate the relay once Wi-Fi is connected.
async fn start(spawner: Spawner, peripherals: Peripherals) -> Result<(), RelayError> {
    RELAY_CONFIG.validate()?;
    info!("Relaying to {}", RELAY_CONFIG.endpoint.url);

    let radio = esp_radio::init().map_err(|_| RelayError::radio("radio controller init failed"))?;
    let radio = RADIO.init(radio);
    let (controller, interfaces) = esp_radio::wifi::new(radio, peripherals.WIFI, Default::default())
        .map_err(|_| RelayError::radio("Wi-Fi controller init failed"))?;

    let mut rng = HardwareRng::new();
    let (stack, runner) = embassy_net::new(
        interfaces.sta,
        embassy_net::Config::dhcpv4(Default::default()),
        STACK_RESOURCES.init(StackResources::new()),
        rng.seed(),
    );

    spawner.must_spawn(net_task(runner));
    spawner.must_spawn(connection_task(controller, &SUPERVISOR, RELAY_CONFIG.wifi));
    spawner.must_spawn(ip_watch_task(stack, &SUPERVISOR));

    // GPIO21 drives the receive LED; GPIO26-32 are taken by flash and PSRAM on the S3.
    let led = Output::new(peripherals.GPIO21, Level::Low, OutputConfig::default());
    spawner.must_spawn(indicator_task(&INDICATOR, led, RELAY_CONFIG.timing.indicator_pulse()));

    let endpoint = RELAY_CONFIG.endpoint_config(TRUST_ANCHOR);
    let transport = TlsTransport::new(stack, TLS_BUFFERS.take(), rng);
    let client = DeliveryClient::new(transport, &endpoint).map_err(ConfigError::from)?;
    let consumer = RELAY_QUEUE
        .take_consumer()
        .ok_or(RelayError::ConsumerTaken)?;
    let esp_now = interfaces.esp_now;

    activate_when_connected(&SUPERVISOR, RELAY_CONFIG.timing.connect_wait(), move || {
        spawner.must_spawn(delivery_task(DeliveryTask::new(consumer, client, &STATS)));

        let handler = ReceiveHandler::new(RELAY_QUEUE.producer(), &STATS).with_indicator(&INDICATOR);
        spawner.must_spawn(espnow_receive_task(esp_now, handler));
    })
    .await
}
