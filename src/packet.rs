/// Raw 802.11 frame parsing into a normalized [`Packet`].
///
/// Header fields are read at fixed offsets; management bodies (beacons,
/// probes) go through the ieee80211 crate for SSID extraction. Data frames
/// additionally yield payload length, upload/download direction from the DS
/// bits, and an ARP announcement when the payload is an unprotected
/// LLC/SNAP-encapsulated ARP packet.
///
/// Safe to call from ISR context (no allocation, no blocking). Frames shorter
/// than their category's minimum header produce `None`.
use core::net::Ipv4Addr;

use ieee80211::match_frames;
use ieee80211::mgmt_frame::{BeaconFrame, ProbeRequestFrame, ProbeResponseFrame};

use crate::mac::MacAddr;
use crate::protocol::NameString;

/// Management header: FC, duration, DA, SA, BSSID, sequence control.
pub const MGMT_HEADER_LEN: usize = 24;
/// Control frames we can attribute: FC, duration, RA, TA (RTS, PS-Poll, BlockAck).
pub const CTRL_HEADER_LEN: usize = 16;
/// Three-address data header.
pub const DATA_HEADER_LEN: usize = 24;
/// Four-address (WDS) data header.
pub const WDS_HEADER_LEN: usize = 30;
/// Anything else: FC, duration, addr1, addr2.
pub const MISC_HEADER_LEN: usize = 16;

const QOS_CONTROL_LEN: usize = 2;
const HT_CONTROL_LEN: usize = 4;

// Frame control flags (second byte)
const FLAG_TO_DS: u8 = 0x01;
const FLAG_FROM_DS: u8 = 0x02;
const FLAG_PROTECTED: u8 = 0x40;
const FLAG_ORDER: u8 = 0x80;

/// Data subtypes with bit 3 set carry a QoS control field.
const SUBTYPE_QOS: u8 = 0x08;

/// LLC/SNAP header announcing an ARP payload (EtherType 0x0806).
const LLC_SNAP_ARP: [u8; 8] = [0xAA, 0xAA, 0x03, 0x00, 0x00, 0x00, 0x08, 0x06];
/// Ethernet/IPv4 ARP body: htype, ptype, hlen, plen, op, sha, spa, tha, tpa.
const ARP_BODY_LEN: usize = 28;
const ARP_ETHERNET_IPV4: [u8; 6] = [0x00, 0x01, 0x08, 0x00, 6, 4];

/// Frame category, from the frame control type field or the driver's tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketCategory {
    Management,
    Control,
    Data,
    Other,
}

impl PacketCategory {
    /// Classify by the type bits (2..=3) of the first frame control byte.
    pub fn of_frame(frame: &[u8]) -> Option<Self> {
        let fc = *frame.first()?;
        Some(match (fc >> 2) & 0x3 {
            0 => PacketCategory::Management,
            1 => PacketCategory::Control,
            2 => PacketCategory::Data,
            _ => PacketCategory::Other,
        })
    }

    /// Map the ESP-IDF `wifi_promiscuous_pkt_type_t` tag.
    pub fn from_driver_tag(tag: u32) -> Self {
        match tag {
            0 => PacketCategory::Management,
            1 => PacketCategory::Control,
            2 => PacketCategory::Data,
            _ => PacketCategory::Other,
        }
    }

    /// Minimum frame length for this category.
    pub fn min_header_len(&self) -> usize {
        match self {
            PacketCategory::Management => MGMT_HEADER_LEN,
            PacketCategory::Control => CTRL_HEADER_LEN,
            PacketCategory::Data => DATA_HEADER_LEN,
            PacketCategory::Other => MISC_HEADER_LEN,
        }
    }
}

/// Finer frame classification, reported in output messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Beacon,
    ProbeRequest,
    ProbeResponse,
    Management,
    Control,
    Data,
    Other,
}

impl FrameKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameKind::Beacon => "beacon",
            FrameKind::ProbeRequest => "probe_req",
            FrameKind::ProbeResponse => "probe_resp",
            FrameKind::Management => "mgmt",
            FrameKind::Control => "ctrl",
            FrameKind::Data => "data",
            FrameKind::Other => "other",
        }
    }
}

/// Which way a data frame travels relative to the access point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrafficDirection {
    /// Station → access point (ToDS).
    Upload,
    /// Access point → station (FromDS).
    Download,
    /// Management/control frames, ad-hoc and WDS data.
    Unknown,
}

/// One parsed radio frame. Transient: consumed by a single update cycle.
#[derive(Debug, Clone)]
pub struct Packet {
    pub category: PacketCategory,
    pub kind: FrameKind,
    /// Original sender (SA). Transmitter address for control/other frames.
    pub src: MacAddr,
    /// Final recipient (DA). Receiver address for control/other frames.
    pub dst: MacAddr,
    pub bssid: Option<MacAddr>,
    pub rssi: i8,
    /// Bytes following the MAC header.
    pub payload_len: u16,
    pub direction: TrafficDirection,
    /// Sender protocol address, when the payload is an ARP packet.
    pub arp: Option<Ipv4Addr>,
    /// SSID from beacon/probe bodies, empty otherwise.
    pub ssid: NameString,
}

impl Packet {
    /// Parse a raw frame of the given category. `None` on truncated input.
    pub fn parse(frame: &[u8], rssi: i8, category: PacketCategory) -> Option<Packet> {
        if frame.len() < category.min_header_len() {
            return None;
        }
        match category {
            PacketCategory::Management => parse_management(frame, rssi),
            PacketCategory::Data => parse_data(frame, rssi),
            PacketCategory::Control => Some(parse_two_address(
                frame,
                rssi,
                category,
                FrameKind::Control,
                CTRL_HEADER_LEN,
            )),
            PacketCategory::Other => Some(parse_two_address(
                frame,
                rssi,
                category,
                FrameKind::Other,
                MISC_HEADER_LEN,
            )),
        }
    }

    /// Device → access point.
    pub fn is_upload(&self) -> bool {
        self.direction == TrafficDirection::Upload
    }

    /// Access point → device.
    pub fn is_download(&self) -> bool {
        self.direction == TrafficDirection::Download
    }

    /// The station this frame is about: sender for uploads, recipient for
    /// downloads, transmitter otherwise.
    pub fn station(&self) -> MacAddr {
        match self.direction {
            TrafficDirection::Download => self.dst,
            _ => self.src,
        }
    }
}

fn parse_management(frame: &[u8], rssi: i8) -> Option<Packet> {
    let dst = MacAddr::from_slice(frame, 4)?;
    let src = MacAddr::from_slice(frame, 10)?;
    let bssid = MacAddr::from_slice(frame, 16)?;
    let (kind, ssid) = classify_management(frame);

    Some(Packet {
        category: PacketCategory::Management,
        kind,
        src,
        dst,
        bssid: Some(bssid),
        rssi,
        payload_len: body_len(frame, MGMT_HEADER_LEN),
        direction: TrafficDirection::Unknown,
        arp: None,
        ssid,
    })
}

/// Beacons and probes carry an SSID element; other subtypes are plain management.
fn classify_management(frame: &[u8]) -> (FrameKind, NameString) {
    let result = match_frames! {
        frame,
        beacon = BeaconFrame<'_> => {
            (FrameKind::Beacon, name_string(beacon.body.ssid().unwrap_or("")))
        }
        probe_req = ProbeRequestFrame<'_> => {
            (FrameKind::ProbeRequest, name_string(probe_req.body.ssid().unwrap_or("")))
        }
        probe_resp = ProbeResponseFrame<'_> => {
            (FrameKind::ProbeResponse, name_string(probe_resp.body.ssid().unwrap_or("")))
        }
    };

    result.unwrap_or((FrameKind::Management, NameString::new()))
}

fn parse_data(frame: &[u8], rssi: i8) -> Option<Packet> {
    let subtype = frame[0] >> 4;
    let flags = frame[1];
    let to_ds = flags & FLAG_TO_DS != 0;
    let from_ds = flags & FLAG_FROM_DS != 0;

    let mut header_len = if to_ds && from_ds {
        WDS_HEADER_LEN
    } else {
        DATA_HEADER_LEN
    };
    if subtype & SUBTYPE_QOS != 0 {
        header_len += QOS_CONTROL_LEN;
        if flags & FLAG_ORDER != 0 {
            header_len += HT_CONTROL_LEN;
        }
    }
    if frame.len() < header_len {
        return None;
    }

    let addr1 = MacAddr::from_slice(frame, 4)?;
    let addr2 = MacAddr::from_slice(frame, 10)?;
    let addr3 = MacAddr::from_slice(frame, 16)?;

    let (src, dst, bssid, direction) = match (to_ds, from_ds) {
        (false, false) => (addr2, addr1, Some(addr3), TrafficDirection::Unknown),
        (true, false) => (addr2, addr3, Some(addr1), TrafficDirection::Upload),
        (false, true) => (addr3, addr1, Some(addr2), TrafficDirection::Download),
        (true, true) => (
            MacAddr::from_slice(frame, 24)?,
            addr3,
            None,
            TrafficDirection::Unknown,
        ),
    };

    let payload = &frame[header_len..];
    let arp = if flags & FLAG_PROTECTED == 0 {
        parse_arp(payload)
    } else {
        None
    };

    Some(Packet {
        category: PacketCategory::Data,
        kind: FrameKind::Data,
        src,
        dst,
        bssid,
        rssi,
        payload_len: body_len(frame, header_len),
        direction,
        arp,
        ssid: NameString::new(),
    })
}

fn parse_two_address(
    frame: &[u8],
    rssi: i8,
    category: PacketCategory,
    kind: FrameKind,
    header_len: usize,
) -> Packet {
    // Length already checked against header_len by the caller
    let mut dst = [0u8; 6];
    let mut src = [0u8; 6];
    dst.copy_from_slice(&frame[4..10]);
    src.copy_from_slice(&frame[10..16]);

    Packet {
        category,
        kind,
        src: MacAddr(src),
        dst: MacAddr(dst),
        bssid: None,
        rssi,
        payload_len: body_len(frame, header_len),
        direction: TrafficDirection::Unknown,
        arp: None,
        ssid: NameString::new(),
    }
}

/// Sender protocol address from an LLC/SNAP-encapsulated Ethernet/IPv4 ARP packet.
fn parse_arp(payload: &[u8]) -> Option<Ipv4Addr> {
    if payload.len() < LLC_SNAP_ARP.len() + ARP_BODY_LEN {
        return None;
    }
    if payload[..LLC_SNAP_ARP.len()] != LLC_SNAP_ARP {
        return None;
    }
    let arp = &payload[LLC_SNAP_ARP.len()..];
    if arp[..6] != ARP_ETHERNET_IPV4 {
        return None;
    }
    // op (2) + sha (6) precede spa
    let spa: [u8; 4] = arp[14..18].try_into().ok()?;
    Some(Ipv4Addr::from(spa))
}

fn body_len(frame: &[u8], header_len: usize) -> u16 {
    frame.len().saturating_sub(header_len).min(u16::MAX as usize) as u16
}

fn name_string(s: &str) -> NameString {
    let mut name = NameString::new();
    let _ = name.push_str(s);
    name
}
