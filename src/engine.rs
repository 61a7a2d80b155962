/// The presence engine: device table, ARP table, filter chain and the
/// per-packet pipeline that turns parsed frames into device events.
///
/// Two paths mutate the tables, both from the consumer (tick) context:
/// - per packet, via [`Proxima::process`] (or [`Proxima::poll`], which drains
///   a [`PacketSniffer`] queue first);
/// - per tick, via [`Proxima::sweep`], which marks stale devices inactive.
///
/// Traffic events (`Upload`/`Download`) go to the active-device handler,
/// proximity events (`Arrive`/`Depart`/`Inactive`) to the proximate-device
/// handler. A packet yields at most one event of each kind.
use core::net::Ipv4Addr;

use crate::arp::ArpTable;
use crate::config::ProximityConfig;
use crate::device::{Device, DeviceEvent, DeviceHandler, DeviceTable, ProximityState, DEVICE_TABLE_SIZE};
use crate::error::Error;
use crate::filter::{Filter, FilterChain, FilterTarget};
use crate::mac::MacAddr;
use crate::packet::{Packet, PacketCategory};
use crate::sniffer::{PacketSniffer, PromiscuousRadio};
use crate::wifi::{Deferred, StatusWatch, WifiStatus};

/// Events produced by one packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Outcome {
    pub traffic: Option<DeviceEvent>,
    pub proximity: Option<DeviceEvent>,
}

pub struct Proxima<const N: usize = DEVICE_TABLE_SIZE> {
    devices: DeviceTable<N>,
    arp: ArpTable,
    filters: FilterChain,
    config: ProximityConfig,
    local_bssid: Option<MacAddr>,
    active_handler: Option<DeviceHandler>,
    /// Active handler only sees devices passing the filter chain.
    active_inclusive: bool,
    proximate_handler: Option<DeviceHandler>,
    wifi: StatusWatch,
}

impl<const N: usize> Proxima<N> {
    pub const fn new() -> Self {
        Self::with_config(ProximityConfig::new())
    }

    pub const fn with_config(config: ProximityConfig) -> Self {
        Self {
            devices: DeviceTable::new(),
            arp: ArpTable::new(),
            filters: FilterChain::new(),
            config,
            local_bssid: None,
            active_handler: None,
            active_inclusive: true,
            proximate_handler: None,
            wifi: StatusWatch::new(),
        }
    }

    // ── Configuration ───────────────────────────────────────────────

    pub fn config(&self) -> &ProximityConfig {
        &self.config
    }

    pub fn set_proximate_rssi_threshold(&mut self, rssi: i8) {
        self.config.rssi_threshold = rssi;
        log::info!("Proximity threshold set to {} dBm", rssi);
    }

    pub fn set_proximate_last_seen_timeout_ms(&mut self, timeout_ms: u32) {
        self.config.last_seen_timeout_ms = timeout_ms;
        log::info!("Last-seen timeout set to {} ms", timeout_ms);
    }

    pub fn set_require_resolved_address(&mut self, required: bool) {
        self.config.require_resolved_address = required;
        log::info!("Resolved address required: {}", required);
    }

    /// Restrict device classification to data frames of one network.
    /// `None` accepts every BSSID.
    pub fn set_local_bssid(&mut self, bssid: Option<MacAddr>) {
        self.local_bssid = bssid;
        match bssid {
            Some(b) => log::info!("Local BSSID {}", b),
            None => log::info!("Local BSSID cleared"),
        }
    }

    pub fn local_bssid(&self) -> Option<MacAddr> {
        self.local_bssid
    }

    // ── Handlers ────────────────────────────────────────────────────

    /// Called with `Upload`/`Download` on every data frame of a device.
    /// When `inclusive`, only for devices passing the active filter chain.
    pub fn set_active_device_handler(&mut self, handler: DeviceHandler, inclusive: bool) {
        self.active_handler = Some(handler);
        self.active_inclusive = inclusive;
    }

    /// Called with `Arrive`/`Depart`/`Inactive`, configuring the proximity
    /// threshold, timeout and resolved-address requirement in one go.
    pub fn set_proximate_device_handler(
        &mut self,
        handler: DeviceHandler,
        rssi_threshold: i8,
        last_seen_timeout_ms: u32,
        require_resolved_address: bool,
    ) {
        self.proximate_handler = Some(handler);
        self.config = ProximityConfig {
            rssi_threshold,
            last_seen_timeout_ms,
            require_resolved_address,
        };
    }

    // ── Active-device filters ───────────────────────────────────────

    /// Broaden the chain with one more filter.
    pub fn add_active_device_filter(&mut self, filter: Filter) -> Result<(), Error> {
        self.filters.add(filter)?;
        self.reconcile_filters();
        Ok(())
    }

    /// Replace the chain with exactly this filter.
    pub fn set_active_device_filter(&mut self, filter: Filter) {
        self.filters.set(filter);
        self.reconcile_filters();
    }

    /// Remove filters for an address or manufacturer prefix. Returns how
    /// many were removed.
    pub fn remove_active_device_filter(&mut self, target: impl Into<FilterTarget>) -> usize {
        let removed = self.filters.remove(&target.into());
        if removed > 0 {
            self.reconcile_filters();
        }
        removed
    }

    /// Empty the chain; every device becomes eligible again.
    pub fn remove_all_active_device_filters(&mut self) {
        self.filters.clear();
    }

    pub fn filters(&self) -> &FilterChain {
        &self.filters
    }

    // ── Queries ─────────────────────────────────────────────────────

    pub fn device(&self, mac: &MacAddr) -> Option<&Device> {
        self.devices.get(mac)
    }

    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter()
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    pub fn is_proximate_device(&self, mac: &MacAddr) -> bool {
        self.devices.get(mac).is_some_and(Device::is_proximate)
    }

    pub fn proximate_count(&self) -> usize {
        self.devices.iter().filter(|d| d.is_proximate()).count()
    }

    pub fn resolved_address(&self, mac: &MacAddr) -> Option<Ipv4Addr> {
        self.arp.lookup(mac)
    }

    // ── Pipeline ────────────────────────────────────────────────────

    /// Parse a raw frame and process it. Malformed frames change nothing.
    pub fn handle_frame(
        &mut self,
        frame: &[u8],
        rssi: i8,
        category: PacketCategory,
        now_ms: u64,
    ) -> Outcome {
        match Packet::parse(frame, rssi, category) {
            Some(packet) => self.process(&packet, now_ms),
            None => {
                log::trace!("Dropped malformed {:?} frame ({} bytes)", category, frame.len());
                Outcome::default()
            }
        }
    }

    /// Run one packet through the device table, ARP table, filter chain and
    /// state machine, then dispatch the resulting events.
    pub fn process(&mut self, packet: &Packet, now_ms: u64) -> Outcome {
        self.arp.record_if_present(packet);

        let station = packet.station();
        if !self.classifies(packet) || station.is_group() {
            return self.refresh(station, packet, now_ms);
        }

        let passes = self.filters.matches(&station, packet.direction);
        let ip = self.arp.lookup(&station);
        let config = self.config;

        let Some((device, created)) = self.devices.get_or_insert(station, packet.rssi, now_ms)
        else {
            return Outcome::default();
        };

        device.touch(packet, now_ms);
        if ip.is_some() {
            device.ip = ip;
        }

        let traffic = device.record_traffic(packet);
        let proximity = if passes { device.classify(&config) } else { None };

        if created {
            log::info!("{} first seen at {} dBm", device.mac, device.rssi);
        }
        if let Some(event) = proximity {
            log::info!("{} {} at {} dBm", device.mac, event.as_str(), device.rssi);
        }

        if let (Some(handler), Some(event)) = (self.active_handler, traffic) {
            if passes || !self.active_inclusive {
                handler(device, event);
            }
        }
        if let (Some(handler), Some(event)) = (self.proximate_handler, proximity) {
            handler(device, event);
        }

        Outcome { traffic, proximity }
    }

    /// Mark every device unseen for longer than the timeout as inactive.
    /// Returns the number of `Inactive` events emitted.
    pub fn sweep(&mut self, now_ms: u64) -> usize {
        let mut expired = 0;
        for device in self.devices.iter_mut() {
            if let Some(event) = device.expire(&self.config, now_ms) {
                expired += 1;
                log::info!("{} {}", device.mac, event.as_str());
                if let Some(handler) = self.proximate_handler {
                    handler(device, event);
                }
            }
        }
        expired
    }

    /// One tick: drain everything the sniffer queued, then sweep.
    /// Returns the number of packets processed.
    pub fn poll<const Q: usize>(&mut self, sniffer: &PacketSniffer<Q>, now_ms: u64) -> usize {
        let mut processed = 0;
        while let Some(packet) = sniffer.next_packet() {
            self.process(&packet, now_ms);
            processed += 1;
        }
        self.sweep(now_ms);
        processed
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    pub fn start<R: PromiscuousRadio, const Q: usize>(
        &mut self,
        sniffer: &PacketSniffer<Q>,
        radio: &mut R,
    ) -> Result<(), Error> {
        sniffer.start(radio)
    }

    /// Unregister the sniffer and abandon any pending deferred callback.
    pub fn stop<R: PromiscuousRadio, const Q: usize>(
        &mut self,
        sniffer: &PacketSniffer<Q>,
        radio: &mut R,
    ) -> Result<(), Error> {
        self.abandon_deferred();
        sniffer.stop(radio)
    }

    /// Drop a pending `once_wifi_status` callback without running it. For
    /// callers that stop the sniffer themselves.
    pub fn abandon_deferred(&mut self) {
        self.wifi.cancel();
    }

    // ── WiFi status ─────────────────────────────────────────────────

    /// Run `callback` once, on the next status report equal to `status`.
    pub fn once_wifi_status(&mut self, status: WifiStatus, callback: Deferred) {
        self.wifi.once(status, callback);
    }

    /// Report the station's current status. Returns true if a deferred
    /// callback fired.
    pub fn on_wifi_status(&mut self, status: WifiStatus) -> bool {
        self.wifi.update(status)
    }

    pub fn wifi_status(&self) -> WifiStatus {
        self.wifi.current()
    }

    // ── Internals ───────────────────────────────────────────────────

    /// Only data frames on the local network (if one is set) drive roles.
    fn classifies(&self, packet: &Packet) -> bool {
        if packet.category != PacketCategory::Data {
            return false;
        }
        match self.local_bssid {
            Some(local) => packet.bssid == Some(local),
            None => true,
        }
    }

    /// Liveness-only update for an already tracked device. A weak frame
    /// still ends proximity.
    fn refresh(&mut self, station: MacAddr, packet: &Packet, now_ms: u64) -> Outcome {
        let Some(device) = self.devices.get_mut(&station) else {
            return Outcome::default();
        };
        device.touch(packet, now_ms);

        let proximity = device.recheck(&self.config);
        if let Some(event) = proximity {
            log::info!("{} {} at {} dBm", device.mac, event.as_str(), device.rssi);
            if let Some(handler) = self.proximate_handler {
                handler(device, event);
            }
        }

        Outcome {
            traffic: None,
            proximity,
        }
    }

    /// Demote devices that no filter in the chain can match any more.
    fn reconcile_filters(&mut self) {
        for device in self.devices.iter_mut() {
            let was = device.state;
            if !matches!(was, ProximityState::Active | ProximityState::Proximate) {
                continue;
            }
            if self.filters.matches_address(&device.mac) {
                continue;
            }

            device.state = ProximityState::Observed;
            if was == ProximityState::Proximate {
                log::info!("{} {} (filtered out)", device.mac, DeviceEvent::Depart.as_str());
                if let Some(handler) = self.proximate_handler {
                    handler(device, DeviceEvent::Depart);
                }
            }
        }
    }
}

impl<const N: usize> Default for Proxima<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SOCIAL_RSSI;
    use crate::filter::Direction;
    use crate::mac::Oui;
    use crate::packet::tests::{arp_payload, data_frame, probe_request, AP, STATION};
    use crate::sniffer::tests::MockRadio;
    use std::cell::RefCell;

    const OTHER: [u8; 6] = [0xBC, 0x00, 0x00, 0x00, 0x00, 0x01];

    thread_local! {
        static EVENTS: RefCell<std::vec::Vec<(&'static str, MacAddr, DeviceEvent)>> =
            RefCell::new(std::vec::Vec::new());
    }

    fn on_active(device: &Device, event: DeviceEvent) {
        EVENTS.with(|e| e.borrow_mut().push(("active", device.mac, event)));
    }

    fn on_proximate(device: &Device, event: DeviceEvent) {
        EVENTS.with(|e| e.borrow_mut().push(("proximate", device.mac, event)));
    }

    fn events() -> std::vec::Vec<(&'static str, MacAddr, DeviceEvent)> {
        EVENTS.with(|e| e.borrow().clone())
    }

    fn clear_events() {
        EVENTS.with(|e| e.borrow_mut().clear());
    }

    /// Engine with both handlers, threshold -30 dBm, 60 s timeout, local AP set.
    fn engine() -> Proxima<16> {
        let mut engine = Proxima::<16>::new();
        engine.set_active_device_handler(on_active, true);
        engine.set_proximate_device_handler(on_proximate, -30, 60_000, false);
        engine.set_local_bssid(Some(MacAddr(AP)));
        engine
    }

    fn upload(engine: &mut Proxima<16>, station: [u8; 6], rssi: i8, now_ms: u64) -> Outcome {
        let frame = data_frame(station, AP, true, &[0u8; 64]);
        engine.handle_frame(&frame, rssi, PacketCategory::Data, now_ms)
    }

    #[test]
    fn scenario_arrive_on_first_strong_frame() {
        let mut engine = engine();
        let outcome = upload(&mut engine, STATION, -25, 1_000);

        assert_eq!(outcome.traffic, Some(DeviceEvent::Upload));
        assert_eq!(outcome.proximity, Some(DeviceEvent::Arrive));

        let device = engine.device(&MacAddr(STATION)).unwrap();
        assert_eq!(device.state, ProximityState::Proximate);
        assert_eq!(device.bytes_up, 64);
        assert_eq!(device.rssi, -25);
        assert!(engine.is_proximate_device(&MacAddr(STATION)));

        assert_eq!(
            events(),
            vec![
                ("active", MacAddr(STATION), DeviceEvent::Upload),
                ("proximate", MacAddr(STATION), DeviceEvent::Arrive),
            ]
        );
    }

    #[test]
    fn scenario_depart_on_weak_signal() {
        let mut engine = engine();
        upload(&mut engine, STATION, -25, 1_000);
        clear_events();

        let outcome = upload(&mut engine, STATION, -65, 2_000);
        assert_eq!(outcome.proximity, Some(DeviceEvent::Depart));

        let device = engine.device(&MacAddr(STATION)).unwrap();
        assert_eq!(device.state, ProximityState::Active);
        assert_eq!(engine.device_count(), 1);
        assert!(events().contains(&("proximate", MacAddr(STATION), DeviceEvent::Depart)));
    }

    #[test]
    fn scenario_single_inactive_on_timeout() {
        let mut engine = engine();
        upload(&mut engine, STATION, -25, 1_000);
        clear_events();

        assert_eq!(engine.sweep(61_000), 0);
        assert_eq!(engine.sweep(61_001), 1);
        assert_eq!(engine.sweep(70_000), 0);
        assert_eq!(engine.sweep(500_000), 0);

        assert_eq!(
            events(),
            vec![("proximate", MacAddr(STATION), DeviceEvent::Inactive)]
        );
        let device = engine.device(&MacAddr(STATION)).unwrap();
        assert_eq!(device.state, ProximityState::Inactive);
    }

    #[test]
    fn rearrival_after_inactive_is_same_record() {
        let mut engine = engine();
        upload(&mut engine, STATION, -25, 1_000);
        upload(&mut engine, STATION, -25, 2_000);
        engine.sweep(100_000);

        let outcome = upload(&mut engine, STATION, -20, 110_000);
        assert_eq!(outcome.proximity, Some(DeviceEvent::Arrive));
        let device = engine.device(&MacAddr(STATION)).unwrap();
        assert_eq!(device.bytes_up, 192);
        assert_eq!(engine.device_count(), 1);
    }

    #[test]
    fn threshold_boundary_inclusive() {
        let mut engine = engine();
        assert_eq!(
            upload(&mut engine, STATION, -30, 0).proximity,
            Some(DeviceEvent::Arrive)
        );
        assert_eq!(upload(&mut engine, OTHER, -31, 0).proximity, None);
        assert!(engine.is_proximate_device(&MacAddr(STATION)));
        assert!(!engine.is_proximate_device(&MacAddr(OTHER)));
        assert_eq!(engine.proximate_count(), 1);
    }

    #[test]
    fn weak_first_frame_is_active_then_arrives() {
        let mut engine = engine();
        assert_eq!(upload(&mut engine, STATION, -70, 0).proximity, None);
        assert_eq!(
            engine.device(&MacAddr(STATION)).unwrap().state,
            ProximityState::Active
        );
        assert_eq!(
            upload(&mut engine, STATION, -29, 10).proximity,
            Some(DeviceEvent::Arrive)
        );
    }

    #[test]
    fn download_counts_for_station() {
        let mut engine = engine();
        let frame = data_frame(STATION, AP, false, &[0u8; 500]);
        let outcome = engine.handle_frame(&frame, -45, PacketCategory::Data, 0);
        assert_eq!(outcome.traffic, Some(DeviceEvent::Download));

        let device = engine.device(&MacAddr(STATION)).unwrap();
        assert_eq!(device.bytes_down, 500);
        assert_eq!(device.bytes_up, 0);
    }

    #[test]
    fn truncated_frame_changes_nothing() {
        let mut engine = engine();
        let frame = data_frame(STATION, AP, true, &[]);
        let outcome = engine.handle_frame(&frame[..20], -25, PacketCategory::Data, 0);

        assert_eq!(outcome, Outcome::default());
        assert_eq!(engine.device_count(), 0);
        assert!(events().is_empty());
    }

    #[test]
    fn foreign_network_frames_ignored() {
        let mut engine = engine();
        let foreign_ap = [0x02, 0xEE, 0xEE, 0xEE, 0xEE, 0xEE];
        let frame = data_frame(STATION, foreign_ap, true, &[0u8; 10]);
        let outcome = engine.handle_frame(&frame, -20, PacketCategory::Data, 0);

        assert_eq!(outcome, Outcome::default());
        assert_eq!(engine.device_count(), 0);
    }

    #[test]
    fn any_network_without_local_bssid() {
        let mut engine = engine();
        engine.set_local_bssid(None);
        let foreign_ap = [0x02, 0xEE, 0xEE, 0xEE, 0xEE, 0xEE];
        let frame = data_frame(STATION, foreign_ap, true, &[0u8; 10]);
        engine.handle_frame(&frame, -20, PacketCategory::Data, 0);
        assert!(engine.device(&MacAddr(STATION)).is_some());
    }

    #[test]
    fn management_frames_refresh_liveness_only() {
        let mut engine = engine();
        // RTS from an unknown station creates nothing
        let mut rts = vec![0xB4, 0x00, 0, 0];
        rts.extend_from_slice(&AP);
        rts.extend_from_slice(&STATION);
        engine.handle_frame(&rts, -20, PacketCategory::Control, 0);
        assert_eq!(engine.device_count(), 0);

        upload(&mut engine, STATION, -50, 1_000);
        let outcome = engine.handle_frame(&rts, -20, PacketCategory::Control, 50_000);
        assert_eq!(outcome, Outcome::default());

        let device = engine.device(&MacAddr(STATION)).unwrap();
        assert_eq!(device.last_seen_ms, 50_000);
        assert_eq!(device.rssi, -20);
        assert_eq!(device.state, ProximityState::Active);
        // Liveness refresh pushes the timeout out
        assert_eq!(engine.sweep(100_000), 0);
    }

    fn rts(station: [u8; 6]) -> std::vec::Vec<u8> {
        let mut frame = vec![0xB4, 0x00, 0, 0];
        frame.extend_from_slice(&AP);
        frame.extend_from_slice(&station);
        frame
    }

    #[test]
    fn weak_control_frame_departs_proximate_device() {
        let mut engine = engine();
        upload(&mut engine, STATION, -25, 0);
        assert!(engine.is_proximate_device(&MacAddr(STATION)));
        clear_events();

        let outcome = engine.handle_frame(&rts(STATION), -80, PacketCategory::Control, 10);
        assert_eq!(outcome.proximity, Some(DeviceEvent::Depart));
        assert_eq!(outcome.traffic, None);

        let device = engine.device(&MacAddr(STATION)).unwrap();
        assert_eq!(device.state, ProximityState::Active);
        assert_eq!(device.rssi, -80);
        assert!(!engine.is_proximate_device(&MacAddr(STATION)));
        assert_eq!(
            events(),
            vec![("proximate", MacAddr(STATION), DeviceEvent::Depart)]
        );

        // Strong liveness frames never promote
        let outcome = engine.handle_frame(&rts(STATION), -10, PacketCategory::Control, 20);
        assert_eq!(outcome, Outcome::default());
        assert!(!engine.is_proximate_device(&MacAddr(STATION)));
    }

    #[test]
    fn stale_filtered_device_revives_on_new_frame() {
        let mut engine = engine();
        engine.set_active_device_filter(Filter::new(MacAddr(STATION), Direction::Either));

        upload(&mut engine, OTHER, -20, 0);
        assert_eq!(engine.sweep(60_001), 0);
        assert_eq!(
            engine.device(&MacAddr(OTHER)).unwrap().state,
            ProximityState::Inactive
        );

        upload(&mut engine, OTHER, -20, 70_000);
        assert_eq!(
            engine.device(&MacAddr(OTHER)).unwrap().state,
            ProximityState::Observed
        );

        // Liveness-only frames revive too
        engine.sweep(140_000);
        engine.handle_frame(&rts(OTHER), -20, PacketCategory::Control, 150_000);
        let other = engine.device(&MacAddr(OTHER)).unwrap();
        assert_eq!(other.state, ProximityState::Observed);
        assert_eq!(other.last_seen_ms, 150_000);
        assert!(events().is_empty());

        engine.remove_all_active_device_filters();
        let outcome = upload(&mut engine, OTHER, -20, 160_000);
        assert_eq!(outcome.proximity, Some(DeviceEvent::Arrive));
    }

    #[test]
    fn probe_request_records_ssid() {
        let mut engine = engine();
        upload(&mut engine, STATION, -40, 0);
        assert!(engine.device(&MacAddr(STATION)).unwrap().ssid.is_empty());

        let frame = probe_request(STATION, "CoffeeShop");
        let outcome = engine.handle_frame(&frame, -40, PacketCategory::Management, 100);
        assert_eq!(outcome, Outcome::default());

        let device = engine.device(&MacAddr(STATION)).unwrap();
        assert_eq!(device.ssid.as_str(), "CoffeeShop");
        assert_eq!(device.last_seen_ms, 100);
        assert_eq!(device.state, ProximityState::Active);

        // A wildcard probe keeps the last named SSID
        let wildcard = probe_request(STATION, "");
        engine.handle_frame(&wildcard, -40, PacketCategory::Management, 200);
        assert_eq!(
            engine.device(&MacAddr(STATION)).unwrap().ssid.as_str(),
            "CoffeeShop"
        );
    }

    #[test]
    fn manufacturer_filter_selects_active_devices() {
        let mut engine = engine();
        engine
            .add_active_device_filter(Filter::manufacturer(0xAA1122, Direction::Either).unwrap())
            .unwrap();

        upload(&mut engine, STATION, -20, 0);
        upload(&mut engine, OTHER, -20, 0);

        assert_eq!(
            engine.device(&MacAddr(STATION)).unwrap().state,
            ProximityState::Proximate
        );
        let other = engine.device(&MacAddr(OTHER)).unwrap();
        assert_eq!(other.state, ProximityState::Observed);
        assert_eq!(other.bytes_up, 64);
        assert!(events().iter().all(|(_, mac, _)| *mac == MacAddr(STATION)));
    }

    #[test]
    fn exclusive_active_handler_sees_everything() {
        let mut engine = engine();
        engine.set_active_device_handler(on_active, false);
        engine.set_active_device_filter(Filter::new(MacAddr(STATION), Direction::Either));

        upload(&mut engine, OTHER, -80, 0);
        assert_eq!(
            events(),
            vec![("active", MacAddr(OTHER), DeviceEvent::Upload)]
        );
    }

    #[test]
    fn outbound_filter_ignores_downloads() {
        let mut engine = engine();
        engine.set_active_device_filter(Filter::new(MacAddr(STATION), Direction::Outbound));

        let down = data_frame(STATION, AP, false, &[0u8; 10]);
        let outcome = engine.handle_frame(&down, -20, PacketCategory::Data, 0);
        assert_eq!(outcome.proximity, None);
        assert!(events().is_empty());

        let outcome = upload(&mut engine, STATION, -20, 10);
        assert_eq!(outcome.proximity, Some(DeviceEvent::Arrive));
    }

    #[test]
    fn removing_filter_departs_proximate_device() {
        let mut engine = engine();
        engine.set_active_device_filter(Filter::new(MacAddr(STATION), Direction::Either));
        engine
            .add_active_device_filter(Filter::new(MacAddr(OTHER), Direction::Either))
            .unwrap();
        upload(&mut engine, STATION, -20, 0);
        clear_events();

        assert_eq!(engine.remove_active_device_filter(MacAddr(STATION)), 1);
        assert_eq!(
            events(),
            vec![("proximate", MacAddr(STATION), DeviceEvent::Depart)]
        );
        assert_eq!(
            engine.device(&MacAddr(STATION)).unwrap().state,
            ProximityState::Observed
        );

        // Unknown prefix removes nothing
        assert_eq!(
            engine.remove_active_device_filter(Oui::from_u32(0x123456).unwrap()),
            0
        );
    }

    #[test]
    fn remove_all_filters_twice() {
        let mut engine = engine();
        engine.set_active_device_filter(Filter::new(MacAddr(STATION), Direction::Either));
        engine.remove_all_active_device_filters();
        assert!(engine.filters().is_empty());
        engine.remove_all_active_device_filters();
        assert!(engine.filters().is_empty());

        upload(&mut engine, OTHER, -20, 0);
        assert!(engine.is_proximate_device(&MacAddr(OTHER)));
    }

    #[test]
    fn resolved_address_required_for_proximity() {
        let mut engine = engine();
        engine.set_require_resolved_address(true);

        assert_eq!(upload(&mut engine, STATION, -20, 0).proximity, None);

        let frame = data_frame(STATION, AP, true, &arp_payload(STATION, [192, 168, 4, 2]));
        let outcome = engine.handle_frame(&frame, -20, PacketCategory::Data, 10);
        assert_eq!(outcome.proximity, Some(DeviceEvent::Arrive));

        let device = engine.device(&MacAddr(STATION)).unwrap();
        assert_eq!(device.ip, Some(Ipv4Addr::new(192, 168, 4, 2)));
        assert_eq!(
            engine.resolved_address(&MacAddr(STATION)),
            Some(Ipv4Addr::new(192, 168, 4, 2))
        );
    }

    #[test]
    fn configuration_setters_are_independent() {
        let mut engine = Proxima::<4>::new();
        engine.set_proximate_rssi_threshold(SOCIAL_RSSI);
        engine.set_proximate_last_seen_timeout_ms(5_000);
        assert_eq!(engine.config().rssi_threshold, SOCIAL_RSSI);
        assert_eq!(engine.config().last_seen_timeout_ms, 5_000);
        assert!(!engine.config().require_resolved_address);

        engine.set_require_resolved_address(true);
        assert_eq!(engine.config().rssi_threshold, SOCIAL_RSSI);
        assert!(engine.config().require_resolved_address);
    }

    #[test]
    fn poll_drains_sniffer_then_sweeps() {
        let sniffer = PacketSniffer::<8>::new();
        let mut radio = MockRadio::default();
        let mut engine = engine();
        engine.start(&sniffer, &mut radio).unwrap();

        let frame = data_frame(STATION, AP, true, &[0u8; 64]);
        sniffer.receive(&frame, -25, PacketCategory::Data);
        sniffer.receive(&frame[..10], -25, PacketCategory::Data);
        sniffer.receive(&frame, -26, PacketCategory::Data);

        assert_eq!(engine.poll(&sniffer, 1_000), 2);
        let device = engine.device(&MacAddr(STATION)).unwrap();
        assert_eq!(device.bytes_up, 128);
        assert_eq!(device.frames, 2);
        assert!(device.is_proximate());

        assert_eq!(engine.poll(&sniffer, 70_000), 0);
        assert_eq!(
            engine.device(&MacAddr(STATION)).unwrap().state,
            ProximityState::Inactive
        );
    }

    #[test]
    fn stop_abandons_deferred_callback() {
        fn never() {
            panic!("deferred callback must not run after stop");
        }

        let sniffer = PacketSniffer::<8>::new();
        let mut radio = MockRadio::default();
        let mut engine = engine();
        engine.start(&sniffer, &mut radio).unwrap();
        engine.once_wifi_status(WifiStatus::Connected, Deferred::Call(never));

        engine.stop(&sniffer, &mut radio).unwrap();
        assert!(!sniffer.is_running());
        assert!(!engine.on_wifi_status(WifiStatus::Connected));
        assert_eq!(engine.wifi_status(), WifiStatus::Connected);
    }
}
