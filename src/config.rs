/// Proximity thresholds and runtime configuration.

/// Distance bands as RSSI thresholds (dBm). Less negative is closer.
pub const INTIMATE_RSSI: i8 = -15;
pub const PERSONAL_RSSI: i8 = -30;
pub const SOCIAL_RSSI: i8 = -60;
pub const PUBLIC_RSSI: i8 = -120;

/// Default time without frames before a device is inactive.
pub const DEFAULT_LAST_SEEN_TIMEOUT_MS: u32 = 60_000;

/// Proximity classification settings. Each field is independently settable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProximityConfig {
    /// Signal at or above this (dBm) counts as proximate.
    pub rssi_threshold: i8,
    /// A device unseen for longer than this is inactive.
    pub last_seen_timeout_ms: u32,
    /// Proximate additionally requires an ARP-resolved IPv4 address.
    pub require_resolved_address: bool,
}

impl ProximityConfig {
    pub const fn new() -> Self {
        Self {
            rssi_threshold: PERSONAL_RSSI,
            last_seen_timeout_ms: DEFAULT_LAST_SEEN_TIMEOUT_MS,
            require_resolved_address: false,
        }
    }

    /// Inclusive: a signal equal to the threshold is proximate.
    pub fn is_near(&self, rssi: i8) -> bool {
        rssi >= self.rssi_threshold
    }

    /// Strictly past the timeout: exactly `last_seen_timeout_ms` is still live.
    pub fn is_stale(&self, last_seen_ms: u64, now_ms: u64) -> bool {
        now_ms.saturating_sub(last_seen_ms) > u64::from(self.last_seen_timeout_ms)
    }
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ProximityConfig::default();
        assert_eq!(config.rssi_threshold, PERSONAL_RSSI);
        assert_eq!(config.last_seen_timeout_ms, 60_000);
        assert!(!config.require_resolved_address);
    }

    #[test]
    fn threshold_is_inclusive() {
        let config = ProximityConfig::new();
        assert!(config.is_near(-30));
        assert!(config.is_near(-29));
        assert!(!config.is_near(-31));
    }

    #[test]
    fn timeout_boundary() {
        let config = ProximityConfig::new();
        assert!(!config.is_stale(1_000, 61_000));
        assert!(config.is_stale(1_000, 61_001));
        // Clock behind last-seen never counts as stale
        assert!(!config.is_stale(5_000, 1_000));
    }

    #[test]
    fn bands_classify_in_order() {
        let mut config = ProximityConfig::new();
        config.rssi_threshold = SOCIAL_RSSI;
        assert!(config.is_near(INTIMATE_RSSI));
        assert!(config.is_near(PERSONAL_RSSI));
        assert!(!config.is_near(PUBLIC_RSSI));
    }
}
