//! Proxima: WiFi presence detection node
//!
//! Sniffs 802.11 traffic in promiscuous mode, tracks every nearby device and
//! reports proximity events (ARRIVE, DEPART, INACTIVE) as NDJSON over serial.
//!
//! The driver callback only parses and queues frames; a periodic tick drains
//! the queue into the engine and sweeps stale devices.

#![no_std]
#![no_main]

use esp_backtrace as _;

esp_bootloader_esp_idf::esp_app_desc!();

use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::channel::Channel;
use embassy_time::{Duration, Instant, Timer};
use esp_hal::interrupt::software::SoftwareInterruptControl;
use esp_hal::timer::timg::TimerGroup;
use esp_hal::uart::{self, Uart};

use proxima::comm::{self, CommandChannel, LineReader, OutputChannel};
use proxima::protocol::{DeviceMessage, HostCommand, MsgBuffer, MAX_MSG_LEN, VERSION};
use proxima::sniffer::{PromiscuousRadio, WIFI_CHANNELS};
use proxima::{board, Device, DeviceEvent, Error, PacketCategory, PacketSniffer, Proxima};

/// Engine tick period
const TICK_MS: u64 = 100;

/// Time spent on each channel while hopping
const CHANNEL_DWELL_MS: u64 = 500;

/// Interval between unsolicited status reports
const STATUS_INTERVAL_SECS: u64 = 30;

// ── Static channels and shared state ─────────────────────────────────

/// Capture queue, fed from the radio callback
static SNIFFER: PacketSniffer = PacketSniffer::new();

/// Engine state, touched only from executor tasks
static ENGINE: Mutex<CriticalSectionRawMutex, RefCell<Proxima>> =
    Mutex::new(RefCell::new(Proxima::new()));

/// Static channel for serialized output messages
static OUTPUT_CHANNEL: OutputChannel = Channel::new();

/// Static channel for host commands
static CMD_CHANNEL: CommandChannel = Channel::new();

/// Whether sniffing is active (toggled by host Start/Stop commands)
static SCANNING: AtomicBool = AtomicBool::new(false);

fn uptime_millis_u32() -> u32 {
    (Instant::now().as_millis() & 0xFFFF_FFFF) as u32
}

/// Serialize a message and queue it for the output task. Drops on overflow.
fn send(msg: &DeviceMessage) {
    let mut buf = MsgBuffer::new();
    buf.resize_default(MAX_MSG_LEN).ok();
    if let Some(len) = comm::serialize_message(msg, &mut buf) {
        buf.truncate(len);
        let _ = OUTPUT_CHANNEL.try_send(buf);
    }
}

// ── Device handlers ──────────────────────────────────────────────────

fn on_active_device(device: &Device, event: DeviceEvent) {
    log::debug!("{} {} {} dBm", device.mac, event.as_str(), device.rssi);
}

fn on_proximate_device(device: &Device, event: DeviceEvent) {
    let mut buf = MsgBuffer::new();
    buf.resize_default(MAX_MSG_LEN).ok();
    if let Some(len) = comm::serialize_event(device, event, uptime_millis_u32(), &mut buf) {
        buf.truncate(len);
        let _ = OUTPUT_CHANNEL.try_send(buf);
    }
}

// ── Radio ────────────────────────────────────────────────────────────

/// Radio callback: runs in driver context. Parse and queue only.
fn sniffer_callback(pkt: esp_radio::wifi::sniffer::PromiscuousPkt<'_>) {
    let rssi = pkt.rx_cntl.rssi as i8;
    if let Some(category) = PacketCategory::of_frame(pkt.data) {
        SNIFFER.receive(pkt.data, rssi, category);
    }
}

/// esp-radio sniffer behind the engine's radio seam.
struct EspRadio {
    sniffer: esp_radio::wifi::Sniffer<'static>,
}

impl PromiscuousRadio for EspRadio {
    fn enable(&mut self) -> Result<(), Error> {
        self.sniffer.set_receive_cb(sniffer_callback);
        self.sniffer
            .set_promiscuous_mode(true)
            .map_err(|_| Error::Radio(-1))
    }

    fn disable(&mut self) -> Result<(), Error> {
        self.sniffer
            .set_promiscuous_mode(false)
            .map_err(|_| Error::Radio(-1))
    }
}

// FFI binding for WiFi channel control.
// The symbol is linked via esp-radio's WiFi driver.
unsafe extern "C" {
    fn esp_wifi_set_channel(primary: u8, second: u32) -> i32;
}

/// Cycles through 2.4 GHz channels while no local BSSID pins the node to one
/// network.
#[embassy_executor::task]
async fn wifi_channel_hop_task() {
    loop {
        for &ch in WIFI_CHANNELS {
            let pinned = ENGINE.lock(|e| e.borrow().local_bssid().is_some());
            if !pinned {
                unsafe {
                    esp_wifi_set_channel(ch, 0);
                }
            }
            Timer::after(Duration::from_millis(CHANNEL_DWELL_MS)).await;
        }
    }
}

// ── Entry point ──────────────────────────────────────────────────────

#[esp_rtos::main]
async fn main(spawner: embassy_executor::Spawner) {
    esp_println::logger::init_logger_from_env();

    let peripherals = esp_hal::init(esp_hal::Config::default());

    esp_alloc::heap_allocator!(size: board::HEAP_SIZE);

    // Start the RTOS: requires timer + software interrupt
    let timg0 = TimerGroup::new(peripherals.TIMG0);
    let sw_int = SoftwareInterruptControl::new(peripherals.SW_INTERRUPT);
    esp_rtos::start(timg0.timer0, sw_int.software_interrupt0);

    log::info!("Proxima v{} starting on {}", VERSION, board::BOARD_NAME);

    // Hold power on (M5StickC Plus2 needs GPIO4 HIGH to stay powered)
    #[cfg(feature = "board-m5stickc")]
    let _power_hold = esp_hal::gpio::Output::new(
        peripherals.GPIO4,
        esp_hal::gpio::Level::High,
        esp_hal::gpio::OutputConfig::default(),
    );

    ENGINE.lock(|e| {
        let mut engine = e.borrow_mut();
        engine.set_active_device_handler(on_active_device, true);
        let config = *engine.config();
        engine.set_proximate_device_handler(
            on_proximate_device,
            config.rssi_threshold,
            config.last_seen_timeout_ms,
            config.require_resolved_address,
        );
    });

    // ── Serial command input ───────────────────────────────────────────

    #[cfg(feature = "esp32")]
    let rx_pin = peripherals.GPIO3;
    #[cfg(feature = "esp32s3")]
    let rx_pin = peripherals.GPIO44;

    match Uart::new(
        peripherals.UART0,
        uart::Config::default().with_baudrate(comm::SERIAL_BAUD),
    ) {
        Ok(uart) => {
            spawner
                .spawn(serial_command_task(uart.with_rx(rx_pin).into_async()))
                .unwrap();
        }
        Err(e) => log::error!("UART init failed: {:?}", e),
    }

    // ── WiFi sniffer ───────────────────────────────────────────────────

    let (_wifi_controller, wifi_interfaces) =
        esp_radio::wifi::new(peripherals.WIFI, Default::default()).expect("WiFi init failed");

    let mut radio = EspRadio {
        sniffer: wifi_interfaces.sniffer,
    };

    match SNIFFER.start(&mut radio) {
        Ok(()) => SCANNING.store(true, Ordering::Relaxed),
        Err(e) => log::error!("Sniffer start failed: {}", e),
    }

    spawner.spawn(tick_task()).unwrap();
    spawner.spawn(output_serial_task()).unwrap();
    spawner.spawn(status_task()).unwrap();
    spawner.spawn(wifi_channel_hop_task()).unwrap();
    spawner.spawn(command_task(radio)).unwrap();

    log::info!("WiFi sniffer initialized in promiscuous mode");

    // The controller must outlive the sniffer
    let _keep = _wifi_controller;
    core::future::pending::<()>().await;
}

// ── Tasks ────────────────────────────────────────────────────────────

/// Drains the capture queue into the engine and sweeps stale devices.
#[embassy_executor::task]
async fn tick_task() {
    loop {
        Timer::after(Duration::from_millis(TICK_MS)).await;
        let now_ms = Instant::now().as_millis();

        // Lock per packet, never across the whole drain
        let mut processed = 0usize;
        while let Some(packet) = SNIFFER.next_packet() {
            ENGINE.lock(|e| e.borrow_mut().process(&packet, now_ms));
            processed += 1;
        }
        ENGINE.lock(|e| e.borrow_mut().sweep(now_ms));

        if processed > 0 {
            log::trace!("Processed {} packets", processed);
        }
    }
}

/// Serial output task: writes each queued NDJSON line to the console.
#[embassy_executor::task]
async fn output_serial_task() {
    let output_rx = OUTPUT_CHANNEL.receiver();

    loop {
        let msg = output_rx.receive().await;
        if let Ok(s) = core::str::from_utf8(&msg) {
            esp_println::println!("{}", s.trim_end());
        }
    }
}

fn send_status() {
    let (devices, proximate) = ENGINE.lock(|e| {
        let engine = e.borrow();
        (engine.device_count() as u16, engine.proximate_count() as u16)
    });

    send(&DeviceMessage::Status {
        scanning: SCANNING.load(Ordering::Relaxed),
        uptime: (Instant::now().as_millis() / 1000) as u32,
        devices,
        proximate,
        dropped: SNIFFER.dropped(),
        malformed: SNIFFER.malformed(),
        wifi: "sniffer",
        board: board::BOARD_NAME,
        version: VERSION,
    });
}

/// Periodic status reporting task
#[embassy_executor::task]
async fn status_task() {
    loop {
        Timer::after(Duration::from_secs(STATUS_INTERVAL_SECS)).await;
        send_status();
    }
}

/// Reads NDJSON host commands from UART0.
#[embassy_executor::task]
async fn serial_command_task(mut uart: Uart<'static, esp_hal::Async>) {
    let mut reader = LineReader::new();
    let mut chunk = [0u8; 64];

    loop {
        match uart.read_async(&mut chunk).await {
            Ok(n) => {
                for &byte in &chunk[..n] {
                    if let Some(line) = reader.feed(byte) {
                        if let Some(cmd) = comm::parse_command(line) {
                            let _ = CMD_CHANNEL.try_send(cmd);
                        }
                    }
                }
            }
            Err(e) => log::warn!("Serial read error: {:?}", e),
        }
    }
}

/// Host command processing task: applies commands to the engine, owns the
/// radio for start/stop, acknowledges every command.
#[embassy_executor::task]
async fn command_task(mut radio: EspRadio) {
    let cmd_rx = CMD_CHANNEL.receiver();

    loop {
        let cmd = cmd_rx.receive().await;

        let was_scanning = SCANNING.load(Ordering::Relaxed);
        let mut scanning = was_scanning;

        let applied =
            ENGINE.lock(|e| comm::handle_command(&cmd, &mut *e.borrow_mut(), &mut scanning));

        // The radio is driven outside the critical section
        let result = applied.and_then(|()| match (was_scanning, scanning) {
            (false, true) => SNIFFER.start(&mut radio),
            (true, false) => {
                ENGINE.lock(|e| e.borrow_mut().abandon_deferred());
                SNIFFER.stop(&mut radio)
            }
            _ => Ok(()),
        });

        if result.is_ok() {
            SCANNING.store(scanning, Ordering::Relaxed);
        }

        let mut buf = MsgBuffer::new();
        buf.resize_default(MAX_MSG_LEN).ok();
        if let Some(len) = comm::serialize_ack(&cmd, result, &mut buf) {
            buf.truncate(len);
            let _ = OUTPUT_CHANNEL.try_send(buf);
        }

        if matches!(cmd, HostCommand::GetStatus) {
            send_status();
        }
    }
}
