//! Proxima: ESP-IDF std firmware
//!
//! Thread-based implementation using FreeRTOS threads and std::sync::mpsc
//! channels. Same engine as the no_std Embassy firmware, plus station mode:
//! when built with `PROXIMA_SSID` (and optionally `PROXIMA_PASS`) the node
//! joins that network and pins classification to its BSSID.

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, SyncSender};
use std::sync::{Mutex, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::sys::{
    esp, esp_wifi_set_channel, esp_wifi_set_promiscuous, esp_wifi_set_promiscuous_rx_cb,
    esp_wifi_sta_get_ap_info, wifi_ap_record_t, wifi_promiscuous_pkt_t,
    wifi_promiscuous_pkt_type_t, wifi_second_chan_t_WIFI_SECOND_CHAN_NONE, EspError,
};
use esp_idf_svc::wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi};
use esp_idf_svc::{eventloop::EspSystemEventLoop, nvs::EspDefaultNvsPartition};

use proxima::comm::{self, LineReader};
use proxima::protocol::{DeviceMessage, HostCommand, MsgBuffer, MAX_MSG_LEN, VERSION};
use proxima::sniffer::{PromiscuousRadio, WIFI_CHANNELS};
use proxima::wifi::{Deferred, WifiStatus};
use proxima::{board, Device, DeviceEvent, Error, MacAddr, PacketCategory, PacketSniffer, Proxima};

const TICK_MS: u64 = 100;
const CHANNEL_DWELL_MS: u64 = 500;
const STATUS_INTERVAL_SECS: u64 = 30;
const WIFI_POLL_SECS: u64 = 1;

// ── Shared state ─────────────────────────────────────────────────────

static SNIFFER: PacketSniffer = PacketSniffer::new();
static ENGINE: Mutex<Proxima> = Mutex::new(Proxima::new());
static SCANNING: AtomicBool = AtomicBool::new(false);
static HOPPING: AtomicBool = AtomicBool::new(false);

/// Output sender, reachable from the plain-fn device handlers
static OUTPUT_TX: OnceLock<SyncSender<MsgBuffer>> = OnceLock::new();

/// Boot time: captured once in main, used for uptime calculation.
static BOOT_INSTANT: OnceLock<Instant> = OnceLock::new();

fn uptime() -> Duration {
    BOOT_INSTANT.get().map(|boot| boot.elapsed()).unwrap_or_default()
}

fn uptime_millis_u32() -> u32 {
    (uptime().as_millis() & 0xFFFF_FFFF) as u32
}

fn send(msg: &DeviceMessage) {
    let mut buf = MsgBuffer::new();
    buf.resize_default(MAX_MSG_LEN).ok();
    if let Some(len) = comm::serialize_message(msg, &mut buf) {
        buf.truncate(len);
        queue(buf);
    }
}

fn queue(buf: MsgBuffer) {
    if let Some(tx) = OUTPUT_TX.get() {
        let _ = tx.try_send(buf);
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
        queue(buf);
    }
}

// ── Deferred WiFi callbacks ──────────────────────────────────────────

fn announce_network(ssid: &str) {
    log::info!("Joined '{}', tracking its stations", ssid);
}

fn start_hopping() {
    if HOPPING.swap(true, Ordering::AcqRel) {
        return;
    }
    if let Err(e) = thread::Builder::new()
        .name("chanhop".into())
        .stack_size(2048)
        .spawn(channel_hop_thread)
    {
        log::error!("Channel hop thread spawn failed: {}", e);
    }
}

// ── Radio ────────────────────────────────────────────────────────────

/// WiFi promiscuous mode callback.
///
/// Runs in the WiFi driver task context (not ISR on ESP-IDF, but still
/// must be non-blocking). Parses and queues only.
unsafe extern "C" fn promisc_rx_cb(buf: *mut std::ffi::c_void, pkt_type: wifi_promiscuous_pkt_type_t) {
    let pkt = unsafe { &*(buf as *const wifi_promiscuous_pkt_t) };
    let rssi = pkt.rx_ctrl.rssi() as i8;
    let sig_len = pkt.rx_ctrl.sig_len() as usize;

    if sig_len == 0 {
        return;
    }

    // Safety: payload is `sig_len` bytes starting at pkt.payload
    let payload = unsafe { std::slice::from_raw_parts(pkt.payload.as_ptr(), sig_len) };
    SNIFFER.receive(payload, rssi, PacketCategory::from_driver_tag(pkt_type as u32));
}

fn radio_error(e: EspError) -> Error {
    Error::Radio(e.code())
}

/// ESP-IDF promiscuous mode behind the engine's radio seam.
struct IdfRadio;

impl PromiscuousRadio for IdfRadio {
    fn enable(&mut self) -> Result<(), Error> {
        unsafe {
            esp!(esp_wifi_set_promiscuous_rx_cb(Some(promisc_rx_cb))).map_err(radio_error)?;
            esp!(esp_wifi_set_promiscuous(true)).map_err(radio_error)
        }
    }

    fn disable(&mut self) -> Result<(), Error> {
        unsafe {
            esp!(esp_wifi_set_promiscuous(false)).map_err(radio_error)?;
            esp!(esp_wifi_set_promiscuous_rx_cb(None)).map_err(radio_error)
        }
    }
}

fn main() -> anyhow::Result<()> {
    // Bind the ESP-IDF logger to the `log` facade
    esp_idf_svc::log::EspLogger::initialize_default();

    let _ = BOOT_INSTANT.set(Instant::now());

    log::info!("Proxima v{} starting on {} (std)", VERSION, board::BOARD_NAME);

    // ── Peripherals ──────────────────────────────────────────────────

    let peripherals = Peripherals::take()?;
    let sys_loop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    // Hold power on (M5StickC Plus2)
    #[cfg(feature = "m5stickc")]
    let _power_hold = {
        use esp_idf_svc::hal::gpio::PinDriver;
        let mut p = PinDriver::output(peripherals.pins.gpio4)?;
        p.set_high()?;
        p
    };

    // ── Engine ───────────────────────────────────────────────────────

    {
        let mut engine = ENGINE.lock().map_err(|_| anyhow!("engine lock poisoned"))?;
        engine.set_active_device_handler(on_active_device, true);
        let config = *engine.config();
        engine.set_proximate_device_handler(
            on_proximate_device,
            config.rssi_threshold,
            config.last_seen_timeout_ms,
            config.require_resolved_address,
        );
    }

    // ── Channels and threads ─────────────────────────────────────────

    let (output_tx, output_rx) = mpsc::sync_channel::<MsgBuffer>(8);
    let (cmd_tx, cmd_rx) = mpsc::sync_channel::<HostCommand>(4);
    let _ = OUTPUT_TX.set(output_tx);

    thread::Builder::new()
        .name("output".into())
        .stack_size(4096)
        .spawn(move || output_thread(output_rx))?;

    thread::Builder::new()
        .name("command".into())
        .stack_size(4096)
        .spawn(move || command_thread(cmd_rx))?;

    thread::Builder::new()
        .name("stdin".into())
        .stack_size(4096)
        .spawn(move || stdin_thread(cmd_tx))?;

    thread::Builder::new()
        .name("tick".into())
        .stack_size(4096)
        .spawn(tick_thread)?;

    thread::Builder::new()
        .name("status".into())
        .stack_size(4096)
        .spawn(status_thread)?;

    log::info!("Worker threads spawned");

    // ── WiFi ─────────────────────────────────────────────────────────

    let mut wifi = BlockingWifi::wrap(
        EspWifi::new(peripherals.modem, sys_loop.clone(), Some(nvs))?,
        sys_loop,
    )?;

    let network = option_env!("PROXIMA_SSID");
    match network {
        Some(ssid) => {
            let password = option_env!("PROXIMA_PASS").unwrap_or("");
            wifi.set_configuration(&Configuration::Client(ClientConfiguration {
                ssid: ssid.try_into().map_err(|_| anyhow!("SSID too long"))?,
                password: password.try_into().map_err(|_| anyhow!("password too long"))?,
                auth_method: if password.is_empty() {
                    AuthMethod::None
                } else {
                    AuthMethod::WPA2Personal
                },
                ..Default::default()
            }))?;

            let mut engine = ENGINE.lock().map_err(|_| anyhow!("engine lock poisoned"))?;
            engine.once_wifi_status(WifiStatus::Connected, Deferred::with_str(announce_network, ssid));
        }
        None => {
            wifi.set_configuration(&Configuration::Client(Default::default()))?;
        }
    }

    wifi.start()?;
    if network.is_none() {
        start_hopping();
    }

    match ENGINE.lock() {
        Ok(mut engine) => match engine.start(&SNIFFER, &mut IdfRadio) {
            Ok(()) => SCANNING.store(true, Ordering::Relaxed),
            Err(e) => log::error!("Sniffer start failed: {}", e),
        },
        Err(_) => return Err(anyhow!("engine lock poisoned")),
    }
    log::info!("WiFi sniffer initialized in promiscuous mode");

    if let Some(ssid) = network {
        if let Err(e) = wifi.connect() {
            log::warn!("Could not join '{}': {}", ssid, e);
            report_status(WifiStatus::ConnectFailed);
            // Nothing to pin to; sweep every channel instead
            start_hopping();
        } else if let Err(e) = wifi.wait_netif_up() {
            log::warn!("Network interface did not come up: {}", e);
        }
    }

    // ── Station status loop ──────────────────────────────────────────

    let mut joined = false;
    loop {
        let status = match wifi.is_connected() {
            Ok(true) => WifiStatus::Connected,
            Ok(false) if joined => WifiStatus::ConnectionLost,
            Ok(false) => WifiStatus::Disconnected,
            Err(_) => WifiStatus::Idle,
        };

        if status == WifiStatus::Connected && !joined {
            joined = true;
            pin_to_access_point();
        } else if status == WifiStatus::ConnectionLost {
            joined = false;
            if let Ok(mut engine) = ENGINE.lock() {
                engine.set_local_bssid(None);
            }
            if let Err(e) = wifi.connect() {
                log::warn!("Reconnect failed: {}", e);
            }
        }

        report_status(status);
        thread::sleep(Duration::from_secs(WIFI_POLL_SECS));
    }
}

fn report_status(status: WifiStatus) {
    if let Ok(mut engine) = ENGINE.lock() {
        engine.on_wifi_status(status);
    }
}

/// Restrict classification to the access point we joined.
fn pin_to_access_point() {
    let mut info: wifi_ap_record_t = unsafe { std::mem::zeroed() };
    match unsafe { esp!(esp_wifi_sta_get_ap_info(&mut info)) } {
        Ok(()) => {
            if let Ok(mut engine) = ENGINE.lock() {
                engine.set_local_bssid(Some(MacAddr(info.bssid)));
            }
        }
        Err(e) => log::warn!("AP info unavailable: {}", e),
    }
}

// ── Channel hopping ──────────────────────────────────────────────────

fn channel_hop_thread() {
    loop {
        for &ch in WIFI_CHANNELS {
            let pinned = ENGINE
                .lock()
                .map(|e| e.local_bssid().is_some())
                .unwrap_or(false);
            if !pinned {
                unsafe {
                    esp_wifi_set_channel(ch, wifi_second_chan_t_WIFI_SECOND_CHAN_NONE);
                }
            }
            thread::sleep(Duration::from_millis(CHANNEL_DWELL_MS));
        }
    }
}

// ── Tick thread ──────────────────────────────────────────────────────

fn tick_thread() {
    loop {
        thread::sleep(Duration::from_millis(TICK_MS));
        let now_ms = uptime().as_millis() as u64;
        if let Ok(mut engine) = ENGINE.lock() {
            engine.poll(&SNIFFER, now_ms);
        }
    }
}

// ── Output thread ────────────────────────────────────────────────────

fn output_thread(output_rx: mpsc::Receiver<MsgBuffer>) {
    while let Ok(msg) = output_rx.recv() {
        if let Ok(s) = std::str::from_utf8(&msg) {
            println!("{}", s.trim_end());
        }
    }
}

// ── Status thread ────────────────────────────────────────────────────

fn send_status() {
    let Ok(engine) = ENGINE.lock() else {
        return;
    };
    let msg = DeviceMessage::Status {
        scanning: SCANNING.load(Ordering::Relaxed),
        uptime: uptime().as_secs() as u32,
        devices: engine.device_count() as u16,
        proximate: engine.proximate_count() as u16,
        dropped: SNIFFER.dropped(),
        malformed: SNIFFER.malformed(),
        wifi: engine.wifi_status().as_str(),
        board: board::BOARD_NAME,
        version: VERSION,
    };
    drop(engine);
    send(&msg);
}

fn status_thread() {
    loop {
        thread::sleep(Duration::from_secs(STATUS_INTERVAL_SECS));
        send_status();
    }
}

// ── Command input ────────────────────────────────────────────────────

fn stdin_thread(cmd_tx: SyncSender<HostCommand>) {
    let mut reader = LineReader::new();
    let mut stdin = std::io::stdin().lock();
    let mut chunk = [0u8; 64];

    loop {
        match stdin.read(&mut chunk) {
            Ok(0) => thread::sleep(Duration::from_millis(50)),
            Ok(n) => {
                for &byte in &chunk[..n] {
                    if let Some(line) = reader.feed(byte) {
                        if let Some(cmd) = comm::parse_command(line) {
                            let _ = cmd_tx.try_send(cmd);
                        }
                    }
                }
            }
            Err(e) => {
                log::warn!("stdin read error: {}", e);
                thread::sleep(Duration::from_millis(500));
            }
        }
    }
}

fn command_thread(cmd_rx: mpsc::Receiver<HostCommand>) {
    let mut radio = IdfRadio;

    while let Ok(cmd) = cmd_rx.recv() {
        let was_scanning = SCANNING.load(Ordering::Relaxed);
        let mut scanning = was_scanning;

        let result = match ENGINE.lock() {
            Ok(mut engine) => comm::handle_command(&cmd, &mut *engine, &mut scanning).and_then(|()| {
                match (was_scanning, scanning) {
                    (false, true) => engine.start(&SNIFFER, &mut radio),
                    (true, false) => engine.stop(&SNIFFER, &mut radio),
                    _ => Ok(()),
                }
            }),
            Err(_) => continue,
        };

        if result.is_ok() {
            SCANNING.store(scanning, Ordering::Relaxed);
        }

        let mut buf = MsgBuffer::new();
        buf.resize_default(MAX_MSG_LEN).ok();
        if let Some(len) = comm::serialize_ack(&cmd, result, &mut buf) {
            buf.truncate(len);
            queue(buf);
        }

        if matches!(cmd, HostCommand::GetStatus) {
            send_status();
        }
    }
}
