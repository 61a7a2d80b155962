/// Hardware address → IPv4 address mapping learned from observed ARP traffic.
///
/// Insert/update only. Entries are independent of the device table and are
/// superseded by the next announcement for the same address. When full, the
/// oldest entry is overwritten.
use core::net::Ipv4Addr;

use heapless::Vec;

use crate::mac::MacAddr;
use crate::packet::Packet;

/// Default number of ARP mappings kept
pub const ARP_TABLE_SIZE: usize = 32;

#[derive(Debug, Clone)]
pub struct ArpTable<const N: usize = ARP_TABLE_SIZE> {
    entries: Vec<(MacAddr, Ipv4Addr), N>,
    /// Next slot to overwrite once the table is full.
    oldest: usize,
}

impl<const N: usize> ArpTable<N> {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            oldest: 0,
        }
    }

    /// Record the packet's ARP announcement, if it carries one.
    /// Returns true when the table changed.
    pub fn record_if_present(&mut self, packet: &Packet) -> bool {
        match packet.arp {
            Some(ip) => self.insert(packet.src, ip),
            None => false,
        }
    }

    /// Upsert a mapping. Returns true when the table changed.
    pub fn insert(&mut self, mac: MacAddr, ip: Ipv4Addr) -> bool {
        if let Some(entry) = self.entries.iter_mut().find(|(m, _)| *m == mac) {
            if entry.1 == ip {
                return false;
            }
            log::debug!("ARP {} moved {} -> {}", mac, entry.1, ip);
            entry.1 = ip;
            return true;
        }

        log::debug!("ARP {} is {}", mac, ip);
        if let Err(entry) = self.entries.push((mac, ip)) {
            if N == 0 {
                return false;
            }
            self.entries[self.oldest] = entry;
            self.oldest = (self.oldest + 1) % N;
        }
        true
    }

    pub fn lookup(&self, mac: &MacAddr) -> Option<Ipv4Addr> {
        self.entries
            .iter()
            .find(|(m, _)| m == mac)
            .map(|&(_, ip)| ip)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<const N: usize> Default for ArpTable<N> {
    fn default() -> Self {
        Self::new()
    }
}
