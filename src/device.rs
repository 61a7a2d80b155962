/// Device records and the proximity state machine.
///
/// One [`Device`] per observed hardware address, held in a fixed-capacity
/// [`DeviceTable`]. Records are never removed: a device that stops
/// transmitting is marked [`ProximityState::Inactive`] so that its return is
/// recognized as the same device.
///
/// ```text
///   (no record) ──first frame──► Observed ──passes filter──► Active ⇄ Proximate
///                                                             │          │
///                                                             └─timeout──┴──► Inactive
/// ```
use core::net::Ipv4Addr;

use heapless::Vec;

use crate::config::ProximityConfig;
use crate::mac::MacAddr;
use crate::packet::{Packet, TrafficDirection};
use crate::protocol::NameString;

/// Default number of tracked devices
pub const DEVICE_TABLE_SIZE: usize = 64;

/// Events delivered to device handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEvent {
    /// Device sent a frame to its access point.
    Upload,
    /// Access point sent a frame to the device.
    Download,
    /// Device became proximate.
    Arrive,
    /// Device is no longer proximate but still being seen.
    Depart,
    /// Device has not been seen within the timeout.
    Inactive,
}

impl DeviceEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceEvent::Upload => "UPLOAD",
            DeviceEvent::Download => "DOWNLOAD",
            DeviceEvent::Arrive => "ARRIVE",
            DeviceEvent::Depart => "DEPART",
            DeviceEvent::Inactive => "INACTIVE",
        }
    }
}

/// Device event callback. Called from the consumer (tick) context only.
pub type DeviceHandler = fn(&Device, DeviceEvent);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProximityState {
    /// Tracked, but no frame has passed the active filter chain yet.
    Observed,
    /// Passes the filter chain; not proximate.
    Active,
    /// Active, at or above the RSSI threshold (and resolved, if required).
    Proximate,
    /// Not seen within the last-seen timeout.
    Inactive,
}

impl ProximityState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProximityState::Observed => "observed",
            ProximityState::Active => "active",
            ProximityState::Proximate => "proximate",
            ProximityState::Inactive => "inactive",
        }
    }
}

/// Everything known about one hardware address.
#[derive(Debug, Clone)]
pub struct Device {
    pub mac: MacAddr,
    /// Signal strength of the most recent frame (dBm).
    pub rssi: i8,
    /// Monotonic timestamp of the most recent frame.
    pub last_seen_ms: u64,
    /// IPv4 address resolved from ARP, if seen.
    pub ip: Option<Ipv4Addr>,
    pub bytes_up: u64,
    pub bytes_down: u64,
    pub frames: u32,
    /// Last SSID advertised or probed for.
    pub ssid: NameString,
    pub state: ProximityState,
}

impl Device {
    pub fn new(mac: MacAddr, rssi: i8, now_ms: u64) -> Self {
        Self {
            mac,
            rssi,
            last_seen_ms: now_ms,
            ip: None,
            bytes_up: 0,
            bytes_down: 0,
            frames: 0,
            ssid: NameString::new(),
            state: ProximityState::Observed,
        }
    }

    /// Refresh liveness from any frame transmitted by this device. A stale
    /// record is seen again, so it drops back to `Observed` until its next
    /// classification.
    pub fn touch(&mut self, packet: &Packet, now_ms: u64) {
        if self.state == ProximityState::Inactive {
            self.state = ProximityState::Observed;
        }
        self.rssi = packet.rssi;
        self.last_seen_ms = now_ms;
        self.frames = self.frames.saturating_add(1);
        if !packet.ssid.is_empty() {
            self.ssid.clone_from(&packet.ssid);
        }
    }

    /// Add a data frame's payload to the running totals.
    pub fn record_traffic(&mut self, packet: &Packet) -> Option<DeviceEvent> {
        let len = u64::from(packet.payload_len);
        match packet.direction {
            TrafficDirection::Upload => {
                self.bytes_up = self.bytes_up.saturating_add(len);
                Some(DeviceEvent::Upload)
            }
            TrafficDirection::Download => {
                self.bytes_down = self.bytes_down.saturating_add(len);
                Some(DeviceEvent::Download)
            }
            TrafficDirection::Unknown => None,
        }
    }

    /// Whether the current signal and resolution state qualify as proximate.
    pub fn is_near(&self, config: &ProximityConfig) -> bool {
        config.is_near(self.rssi) && (!config.require_resolved_address || self.ip.is_some())
    }

    /// Re-evaluate proximity for a device that passes the filter chain.
    /// Emits `Arrive` on entering proximity and `Depart` on leaving it.
    pub fn classify(&mut self, config: &ProximityConfig) -> Option<DeviceEvent> {
        let was_near = self.state == ProximityState::Proximate;
        let near = self.is_near(config);
        self.state = if near {
            ProximityState::Proximate
        } else {
            ProximityState::Active
        };

        match (was_near, near) {
            (false, true) => Some(DeviceEvent::Arrive),
            (true, false) => Some(DeviceEvent::Depart),
            _ => None,
        }
    }

    /// Re-check a proximate device after a liveness-only frame. Can demote
    /// to `Active` with `Depart`, never promotes.
    pub fn recheck(&mut self, config: &ProximityConfig) -> Option<DeviceEvent> {
        if self.state == ProximityState::Proximate && !self.is_near(config) {
            self.state = ProximityState::Active;
            return Some(DeviceEvent::Depart);
        }
        None
    }

    /// Mark the device inactive if it has gone stale. Emits `Inactive` once
    /// per transition, and only for devices that had passed the filter chain.
    pub fn expire(&mut self, config: &ProximityConfig, now_ms: u64) -> Option<DeviceEvent> {
        if self.state == ProximityState::Inactive || !config.is_stale(self.last_seen_ms, now_ms) {
            return None;
        }

        let previous = self.state;
        self.state = ProximityState::Inactive;
        match previous {
            ProximityState::Active | ProximityState::Proximate => Some(DeviceEvent::Inactive),
            _ => None,
        }
    }

    pub fn is_proximate(&self) -> bool {
        self.state == ProximityState::Proximate
    }
}

/// Fixed-capacity table of devices keyed by hardware address.
#[derive(Debug, Clone)]
pub struct DeviceTable<const N: usize = DEVICE_TABLE_SIZE> {
    devices: Vec<Device, N>,
}

impl<const N: usize> DeviceTable<N> {
    pub const fn new() -> Self {
        Self {
            devices: Vec::new(),
        }
    }

    pub fn get(&self, mac: &MacAddr) -> Option<&Device> {
        self.devices.iter().find(|d| d.mac == *mac)
    }

    pub fn get_mut(&mut self, mac: &MacAddr) -> Option<&mut Device> {
        self.devices.iter_mut().find(|d| d.mac == *mac)
    }

    /// Look up or create the record for `mac`. The flag is true when the
    /// record was created. `None` when the table is full; existing records
    /// are never evicted to make room.
    pub fn get_or_insert(
        &mut self,
        mac: MacAddr,
        rssi: i8,
        now_ms: u64,
    ) -> Option<(&mut Device, bool)> {
        if let Some(i) = self.devices.iter().position(|d| d.mac == mac) {
            return Some((&mut self.devices[i], false));
        }

        if self.devices.push(Device::new(mac, rssi, now_ms)).is_err() {
            log::warn!("Device table full ({} entries), ignoring {}", N, mac);
            return None;
        }
        log::debug!("New device {}", mac);
        self.devices.last_mut().map(|d| (d, true))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Device> {
        self.devices.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

impl<const N: usize> Default for DeviceTable<N> {
    fn default() -> Self {
        Self::new()
    }
}
