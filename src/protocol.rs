/// JSON message protocol between a Proxima node and its host.
///
/// All messages are newline-delimited JSON (NDJSON).
/// Uses `heapless` types for no_std/no-alloc operation.
use heapless::{String, Vec};
use serde::{Deserialize, Serialize};

use crate::filter::{Filter, FilterTarget};
use crate::mac::MacAddr;

/// Maximum length for MAC address strings ("AA:BB:CC:DD:EE:FF")
pub type MacString = String<18>;

/// Maximum length for SSID strings
pub type NameString = String<33>;

/// Maximum length for dotted IPv4 strings ("255.255.255.255")
pub type IpString = String<16>;

fn is_empty_name(s: &&NameString) -> bool {
    s.is_empty()
}

/// Messages sent from the node to the host
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum DeviceMessage<'a> {
    /// A device event, as delivered to a device handler
    #[serde(rename = "device")]
    Device {
        mac: &'a MacString,
        /// ARP-resolved IPv4 address, if known
        #[serde(skip_serializing_if = "Option::is_none")]
        ip: Option<&'a IpString>,
        /// "UPLOAD", "DOWNLOAD", "ARRIVE", "DEPART", "INACTIVE"
        event: &'static str,
        /// "observed", "active", "proximate", "inactive"
        state: &'static str,
        rssi: i8,
        /// Payload bytes sent by the device
        up: u64,
        /// Payload bytes sent to the device
        down: u64,
        #[serde(skip_serializing_if = "is_empty_name")]
        ssid: &'a NameString,
        /// Uptime in milliseconds at the event
        ts: u32,
    },
    /// Node status report
    #[serde(rename = "status")]
    Status {
        scanning: bool,
        /// Uptime in seconds
        uptime: u32,
        /// Tracked device records
        devices: u16,
        /// Devices currently proximate
        proximate: u16,
        /// Frames lost to a full capture queue
        dropped: u32,
        /// Frames too short to parse
        malformed: u32,
        /// Station connection status
        wifi: &'static str,
        /// Board identifier
        board: &'static str,
        /// Firmware version
        version: &'static str,
    },
    /// Acknowledgement of a host command
    #[serde(rename = "ack")]
    Ack {
        cmd: &'static str,
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<&'static str>,
    },
}

/// Commands sent from the host to the node.
///
/// Deserialized manually via [`RawCommand`] in `comm::parse_command()` because
/// `serde_json_core` does not support internally tagged enums (`deserialize_any`).
#[derive(Debug, PartialEq)]
pub enum HostCommand {
    /// Start sniffing
    Start,
    /// Stop sniffing
    Stop,
    /// Request current status
    GetStatus,
    /// Set the proximity RSSI threshold (dBm)
    SetRssi { rssi: i8 },
    /// Set the last-seen timeout
    SetTimeout { timeout_ms: u32 },
    /// Require an ARP-resolved address for proximity
    RequireIp { enabled: bool },
    /// Restrict classification to one BSSID, or accept all when `None`
    SetBssid { bssid: Option<MacAddr> },
    /// Broaden the active-device filter chain
    AddFilter(Filter),
    /// Replace the active-device filter chain
    SetFilter(Filter),
    /// Remove filters for an address or prefix
    RemoveFilter(FilterTarget),
    /// Empty the active-device filter chain
    ClearFilters,
}

impl HostCommand {
    /// Wire name of the command, echoed in acknowledgements.
    pub fn as_str(&self) -> &'static str {
        match self {
            HostCommand::Start => "start",
            HostCommand::Stop => "stop",
            HostCommand::GetStatus => "status",
            HostCommand::SetRssi { .. } => "set_rssi",
            HostCommand::SetTimeout { .. } => "set_timeout",
            HostCommand::RequireIp { .. } => "require_ip",
            HostCommand::SetBssid { .. } => "set_bssid",
            HostCommand::AddFilter(_) => "add_filter",
            HostCommand::SetFilter(_) => "set_filter",
            HostCommand::RemoveFilter(_) => "remove_filter",
            HostCommand::ClearFilters => "clear_filters",
        }
    }
}

/// Wire format for host commands: flat struct that `serde_json_core` can
/// deserialize without `deserialize_any`. Converted to [`HostCommand`] in
/// `comm::parse_command()`.
#[derive(Deserialize)]
pub(crate) struct RawCommand {
    pub cmd: String<16>,
    #[serde(default)]
    pub rssi: Option<i8>,
    #[serde(default)]
    pub timeout_ms: Option<u32>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub mac: Option<MacString>,
    #[serde(default)]
    pub oui: Option<u32>,
    #[serde(default)]
    pub dir: Option<String<8>>,
}

/// Firmware version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum size of a serialized JSON message
pub const MAX_MSG_LEN: usize = 512;

/// Buffer type for serialized JSON messages
pub type MsgBuffer = Vec<u8, MAX_MSG_LEN>;
