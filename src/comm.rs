/// Communication layer. NDJSON serialization and host command handling.
///
/// The node streams device events and status reports as newline-delimited
/// JSON. Commands arrive the same way and are applied to the engine here;
/// the firmware owns the transport and the radio.
use core::fmt::Write;
use core::net::Ipv4Addr;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

use crate::device::{Device, DeviceEvent};
use crate::engine::Proxima;
use crate::error::Error;
use crate::filter::{Direction, Filter, FilterTarget};
use crate::mac::{MacAddr, Oui};
use crate::protocol::{DeviceMessage, HostCommand, IpString, MsgBuffer, RawCommand, MAX_MSG_LEN};

/// Output channel for serialized messages on their way to the host
pub type OutputChannel = Channel<CriticalSectionRawMutex, MsgBuffer, 8>;

/// Command channel for host commands received over serial
pub type CommandChannel = Channel<CriticalSectionRawMutex, HostCommand, 4>;

/// Serial baud rate
pub const SERIAL_BAUD: u32 = 115200;

// ── Serialization helpers ──────────────────────────────────────────────

/// Serialize a DeviceMessage to JSON bytes and write to the output buffer.
/// Returns the number of bytes written, or None if serialization failed.
pub fn serialize_message(msg: &DeviceMessage, buf: &mut [u8]) -> Option<usize> {
    match serde_json_core::to_slice(msg, buf) {
        Ok(len) => {
            // Append newline for NDJSON
            if len < buf.len() {
                buf[len] = b'\n';
                Some(len + 1)
            } else {
                Some(len)
            }
        }
        Err(_) => None,
    }
}

/// Serialize a device event as a `device` message.
pub fn serialize_event(device: &Device, event: DeviceEvent, ts: u32, buf: &mut [u8]) -> Option<usize> {
    let mac = device.mac.to_mac_string();
    let ip = device.ip.map(format_ip);
    let msg = DeviceMessage::Device {
        mac: &mac,
        ip: ip.as_ref(),
        event: event.as_str(),
        state: device.state.as_str(),
        rssi: device.rssi,
        up: device.bytes_up,
        down: device.bytes_down,
        ssid: &device.ssid,
        ts,
    };
    serialize_message(&msg, buf)
}

/// Serialize an acknowledgement for `cmd`.
pub fn serialize_ack(cmd: &HostCommand, result: Result<(), Error>, buf: &mut [u8]) -> Option<usize> {
    let msg = DeviceMessage::Ack {
        cmd: cmd.as_str(),
        ok: result.is_ok(),
        error: result.err().map(|e| e.code()),
    };
    serialize_message(&msg, buf)
}

/// Dotted-quad text for an IPv4 address.
pub fn format_ip(ip: Ipv4Addr) -> IpString {
    let mut s = IpString::new();
    // 15 characters at most, always fits
    let _ = write!(s, "{}", ip);
    s
}

// ── Command parsing ────────────────────────────────────────────────────

/// Deserialize a HostCommand from a JSON byte slice.
pub fn parse_command(data: &[u8]) -> Option<HostCommand> {
    // Strip trailing newline/whitespace
    let trimmed = trim_trailing_whitespace(data);
    if trimmed.is_empty() {
        return None;
    }
    let (raw, _) = serde_json_core::from_slice::<RawCommand>(trimmed).ok()?;
    let cmd = raw.into_command();
    if cmd.is_none() {
        log::warn!("Rejected host command");
    }
    cmd
}

impl RawCommand {
    fn into_command(self) -> Option<HostCommand> {
        match self.cmd.as_str() {
            "start" => Some(HostCommand::Start),
            "stop" => Some(HostCommand::Stop),
            "status" => Some(HostCommand::GetStatus),
            "set_rssi" => Some(HostCommand::SetRssi { rssi: self.rssi? }),
            "set_timeout" => Some(HostCommand::SetTimeout {
                timeout_ms: self.timeout_ms?,
            }),
            "require_ip" => Some(HostCommand::RequireIp {
                enabled: self.enabled?,
            }),
            "set_bssid" => {
                let bssid = match &self.mac {
                    Some(text) => Some(text.parse::<MacAddr>().ok()?),
                    None => None,
                };
                Some(HostCommand::SetBssid { bssid })
            }
            "add_filter" => self.filter().map(HostCommand::AddFilter),
            "set_filter" => self.filter().map(HostCommand::SetFilter),
            "remove_filter" => self.target().map(HostCommand::RemoveFilter),
            "clear_filters" => Some(HostCommand::ClearFilters),
            _ => None,
        }
    }

    /// `mac` takes precedence over `oui` when both are given.
    fn target(&self) -> Option<FilterTarget> {
        if let Some(text) = &self.mac {
            return text.parse::<MacAddr>().ok().map(FilterTarget::from);
        }
        let oui = Oui::from_u32(self.oui?).ok()?;
        Some(oui.into())
    }

    fn filter(&self) -> Option<Filter> {
        let direction = match &self.dir {
            Some(d) => Direction::parse(d)?,
            None => Direction::Either,
        };
        Some(Filter::new(self.target()?, direction))
    }
}

// ── Command handling ───────────────────────────────────────────────────

/// Apply a host command to the engine. `Start`/`Stop` only flip `scanning`;
/// the caller owns the radio and starts or stops the sniffer.
pub fn handle_command<const N: usize>(
    cmd: &HostCommand,
    engine: &mut Proxima<N>,
    scanning: &mut bool,
) -> Result<(), Error> {
    match cmd {
        HostCommand::Start => {
            *scanning = true;
            log::info!("Scanning started by host command");
        }
        HostCommand::Stop => {
            *scanning = false;
            log::info!("Scanning stopped by host command");
        }
        HostCommand::GetStatus => {
            // Status message will be constructed by the caller with real counters
        }
        HostCommand::SetRssi { rssi } => engine.set_proximate_rssi_threshold(*rssi),
        HostCommand::SetTimeout { timeout_ms } => {
            engine.set_proximate_last_seen_timeout_ms(*timeout_ms)
        }
        HostCommand::RequireIp { enabled } => engine.set_require_resolved_address(*enabled),
        HostCommand::SetBssid { bssid } => engine.set_local_bssid(*bssid),
        HostCommand::AddFilter(filter) => engine.add_active_device_filter(*filter)?,
        HostCommand::SetFilter(filter) => engine.set_active_device_filter(*filter),
        HostCommand::RemoveFilter(target) => {
            let removed = engine.remove_active_device_filter(*target);
            log::info!("Removed {} filter(s)", removed);
        }
        HostCommand::ClearFilters => engine.remove_all_active_device_filters(),
    }
    Ok(())
}

// ── Serial NDJSON reader ───────────────────────────────────────────────

/// Serial NDJSON reader state machine.
/// Accumulates bytes until a newline is found, then yields the line.
pub struct LineReader {
    buf: [u8; MAX_MSG_LEN],
    pos: usize,
    overflowed: bool,
}

impl LineReader {
    pub const fn new() -> Self {
        Self {
            buf: [0; MAX_MSG_LEN],
            pos: 0,
            overflowed: false,
        }
    }

    /// Feed a byte into the reader. Returns a complete line (without newline)
    /// when one is detected. An over-long line is discarded whole.
    pub fn feed(&mut self, byte: u8) -> Option<&[u8]> {
        if byte == b'\n' || byte == b'\r' {
            let len = self.pos;
            let overflowed = self.overflowed;
            self.pos = 0;
            self.overflowed = false;
            if len > 0 && !overflowed {
                Some(&self.buf[..len])
            } else {
                None
            }
        } else if self.overflowed {
            None
        } else if self.pos < self.buf.len() {
            self.buf[self.pos] = byte;
            self.pos += 1;
            None
        } else {
            self.overflowed = true;
            None
        }
    }
}

impl Default for LineReader {
    fn default() -> Self {
        Self::new()
    }
}

fn trim_trailing_whitespace(data: &[u8]) -> &[u8] {
    let mut end = data.len();
    while end > 0 && data[end - 1].is_ascii_whitespace() {
        end -= 1;
    }
    &data[..end]
}
