/// Promiscuous WiFi sniffer.
///
/// The radio driver's receive callback runs in ISR/driver context, so it only
/// parses the frame (bounded, no allocation) and pushes the resulting
/// [`Packet`] through a critical-section channel with `try_send`. The device
/// table, ARP table and filter chain are only touched later, from the tick
/// that drains the channel (see [`crate::engine::Proxima::poll`]).
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

use crate::error::Error;
use crate::packet::{Packet, PacketCategory};

/// Default depth of the callback → tick handoff queue
pub const PACKET_QUEUE_DEPTH: usize = 32;

/// WiFi channels a sniffer may be tuned to (2.4 GHz only, as ESP32/ESP32-S3
/// promiscuous mode is 2.4 GHz)
pub const WIFI_CHANNELS: &[u8] = &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13];

/// Platform hook for the radio's promiscuous receive mode.
///
/// Implementations install a receive callback that forwards every frame to
/// [`PacketSniffer::receive`].
pub trait PromiscuousRadio {
    /// Install the receive callback and enter promiscuous mode.
    fn enable(&mut self) -> Result<(), Error>;

    /// Leave promiscuous mode and uninstall the callback. No frame may be
    /// delivered once this returns.
    fn disable(&mut self) -> Result<(), Error>;
}

/// Owns the single receive-callback slot and the handoff queue.
pub struct PacketSniffer<const Q: usize = PACKET_QUEUE_DEPTH> {
    queue: Channel<CriticalSectionRawMutex, Packet, Q>,
    running: AtomicBool,
    dropped: AtomicU32,
    malformed: AtomicU32,
}

impl<const Q: usize> PacketSniffer<Q> {
    pub const fn new() -> Self {
        Self {
            queue: Channel::new(),
            running: AtomicBool::new(false),
            dropped: AtomicU32::new(0),
            malformed: AtomicU32::new(0),
        }
    }

    /// Claim the receive slot and switch the radio to promiscuous capture.
    pub fn start<R: PromiscuousRadio>(&self, radio: &mut R) -> Result<(), Error> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::SnifferBusy);
        }

        if let Err(e) = radio.enable() {
            self.running.store(false, Ordering::Release);
            log::error!("Promiscuous mode failed: {}", e);
            return Err(e);
        }

        log::info!("Sniffer started in promiscuous mode");
        Ok(())
    }

    /// Unregister from the radio and discard anything still queued.
    pub fn stop<R: PromiscuousRadio>(&self, radio: &mut R) -> Result<(), Error> {
        let result = radio.disable();
        self.running.store(false, Ordering::Release);
        while self.queue.try_receive().is_ok() {}
        log::info!("Sniffer stopped");
        result
    }

    /// Receive hook: call from the driver callback for every raw frame.
    ///
    /// Malformed frames are counted and dropped; so are frames arriving while
    /// the queue is full.
    pub fn receive(&self, frame: &[u8], rssi: i8, category: PacketCategory) {
        if !self.running.load(Ordering::Acquire) {
            return;
        }

        match Packet::parse(frame, rssi, category) {
            Some(packet) => {
                if self.queue.try_send(packet).is_err() {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
            None => {
                self.malformed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Take the oldest queued packet, if any. Consumer side.
    pub fn next_packet(&self) -> Option<Packet> {
        self.queue.try_receive().ok()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Frames lost because the queue was full.
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Frames shorter than their category's minimum header.
    pub fn malformed(&self) -> u32 {
        self.malformed.load(Ordering::Relaxed)
    }
}

impl<const Q: usize> Default for PacketSniffer<Q> {
    fn default() -> Self {
        Self::new()
    }
}
