/// Active-device filter chain.
///
/// Decides which observed devices are "active" (of interest). Each filter
/// matches either one exact hardware address or a manufacturer prefix, and
/// carries a traffic direction qualifier. The chain is a logical OR: an
/// address is active if any filter accepts it, and an empty chain accepts
/// everything.
use heapless::Vec;

use crate::device::Device;
use crate::error::Error;
use crate::mac::{MacAddr, Oui};
use crate::packet::TrafficDirection;

/// Maximum number of filters in a chain
pub const MAX_FILTERS: usize = 8;

/// Traffic direction a filter applies to, from the device's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Access point → device (download).
    Inbound,
    /// Device → access point (upload).
    Outbound,
    #[default]
    Either,
}

impl Direction {
    /// Frames without a known direction only satisfy `Either`.
    pub fn accepts(&self, traffic: TrafficDirection) -> bool {
        match self {
            Direction::Either => true,
            Direction::Inbound => traffic == TrafficDirection::Download,
            Direction::Outbound => traffic == TrafficDirection::Upload,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Inbound => "in",
            Direction::Outbound => "out",
            Direction::Either => "either",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "in" => Some(Direction::Inbound),
            "out" => Some(Direction::Outbound),
            "either" => Some(Direction::Either),
            _ => None,
        }
    }
}

/// What a filter compares the address against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterTarget {
    Address(MacAddr),
    Manufacturer(Oui),
}

impl FilterTarget {
    pub fn matches(&self, mac: &MacAddr) -> bool {
        match self {
            FilterTarget::Address(addr) => addr == mac,
            FilterTarget::Manufacturer(oui) => oui.matches(mac),
        }
    }
}

impl From<MacAddr> for FilterTarget {
    fn from(mac: MacAddr) -> Self {
        FilterTarget::Address(mac)
    }
}

impl From<&Device> for FilterTarget {
    fn from(device: &Device) -> Self {
        FilterTarget::Address(device.mac)
    }
}

impl From<Oui> for FilterTarget {
    fn from(oui: Oui) -> Self {
        FilterTarget::Manufacturer(oui)
    }
}

/// A single immutable filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Filter {
    pub target: FilterTarget,
    pub direction: Direction,
}

impl Filter {
    pub fn new(target: impl Into<FilterTarget>, direction: Direction) -> Self {
        Self {
            target: target.into(),
            direction,
        }
    }

    /// Exact address from text, e.g. `"AA:11:22:33:44:55"`.
    pub fn address(mac: &str, direction: Direction) -> Result<Self, Error> {
        Ok(Self::new(mac.parse::<MacAddr>()?, direction))
    }

    /// Manufacturer prefix from a 24-bit integer, e.g. `0xAA1122`.
    pub fn manufacturer(oui: u32, direction: Direction) -> Result<Self, Error> {
        Ok(Self::new(Oui::from_u32(oui)?, direction))
    }

    pub fn matches(&self, mac: &MacAddr, traffic: TrafficDirection) -> bool {
        self.direction.accepts(traffic) && self.target.matches(mac)
    }
}

/// Ordered OR-chain of filters.
#[derive(Debug, Clone, Default)]
pub struct FilterChain {
    filters: Vec<Filter, MAX_FILTERS>,
}

impl FilterChain {
    pub const fn new() -> Self {
        Self {
            filters: Vec::new(),
        }
    }

    /// Append a filter, broadening the chain.
    pub fn add(&mut self, filter: Filter) -> Result<(), Error> {
        if self.filters.contains(&filter) {
            return Ok(());
        }
        self.filters.push(filter).map_err(|_| Error::FilterChainFull)
    }

    /// Replace the whole chain with exactly one filter.
    pub fn set(&mut self, filter: Filter) {
        self.filters.clear();
        // Capacity is at least one after clear
        let _ = self.filters.push(filter);
    }

    /// Remove every filter with this target, whatever its direction.
    /// Returns how many were removed.
    pub fn remove(&mut self, target: &FilterTarget) -> usize {
        let before = self.filters.len();
        self.filters.retain(|f| f.target != *target);
        before - self.filters.len()
    }

    /// Empty the chain, reverting to match-everything.
    pub fn clear(&mut self) {
        self.filters.clear();
    }

    /// True if any filter accepts the address for this traffic direction,
    /// or if the chain is empty.
    pub fn matches(&self, mac: &MacAddr, traffic: TrafficDirection) -> bool {
        self.filters.is_empty() || self.filters.iter().any(|f| f.matches(mac, traffic))
    }

    /// True if some filter could accept the address in any direction.
    pub fn matches_address(&self, mac: &MacAddr) -> bool {
        self.filters.is_empty() || self.filters.iter().any(|f| f.target.matches(mac))
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Filter> {
        self.filters.iter()
    }
}
