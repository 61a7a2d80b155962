/// WiFi connection status tracking and one-shot deferred callbacks.
///
/// Association itself belongs to the platform. The platform reports each
/// status it observes through [`StatusWatch::update`]; a callback registered
/// with [`StatusWatch::once`] fires on the first update whose status equals
/// the awaited one, then is discarded. Nothing here blocks.
use heapless::String;

/// Capacity of a string payload carried by a deferred callback
pub const PAYLOAD_STR_LEN: usize = 64;

/// Connection status, as reported by the station interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiStatus {
    Idle,
    NoSsidAvailable,
    ScanCompleted,
    Connected,
    ConnectFailed,
    ConnectionLost,
    Disconnected,
}

impl WifiStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WifiStatus::Idle => "idle",
            WifiStatus::NoSsidAvailable => "no_ssid",
            WifiStatus::ScanCompleted => "scan_completed",
            WifiStatus::Connected => "connected",
            WifiStatus::ConnectFailed => "connect_failed",
            WifiStatus::ConnectionLost => "connection_lost",
            WifiStatus::Disconnected => "disconnected",
        }
    }
}

/// A callback together with the payload it is invoked with.
#[derive(Clone)]
pub enum Deferred {
    Call(fn()),
    WithStr(fn(&str), String<PAYLOAD_STR_LEN>),
    WithBool(fn(bool), bool),
    WithFn(fn(fn()), fn()),
}

impl core::fmt::Debug for Deferred {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Deferred::Call(_) => f.write_str("Call"),
            Deferred::WithStr(_, s) => write!(f, "WithStr({s:?})"),
            Deferred::WithBool(_, b) => write!(f, "WithBool({b})"),
            Deferred::WithFn(..) => f.write_str("WithFn"),
        }
    }
}

impl Deferred {
    /// Build a string-payload callback. The payload is truncated to capacity.
    pub fn with_str(callback: fn(&str), payload: &str) -> Self {
        let mut s = String::new();
        for c in payload.chars() {
            if s.push(c).is_err() {
                break;
            }
        }
        Deferred::WithStr(callback, s)
    }

    pub fn invoke(self) {
        match self {
            Deferred::Call(f) => f(),
            Deferred::WithStr(f, payload) => f(payload.as_str()),
            Deferred::WithBool(f, payload) => f(payload),
            Deferred::WithFn(f, payload) => f(payload),
        }
    }
}

/// Tracks the current status and at most one pending deferred callback.
#[derive(Debug, Clone)]
pub struct StatusWatch {
    current: WifiStatus,
    pending: Option<(WifiStatus, Deferred)>,
}

impl StatusWatch {
    pub const fn new() -> Self {
        Self {
            current: WifiStatus::Idle,
            pending: None,
        }
    }

    pub fn current(&self) -> WifiStatus {
        self.current
    }

    /// Register a one-shot callback for `status`, replacing any pending one.
    pub fn once(&mut self, status: WifiStatus, callback: Deferred) {
        if self.pending.is_some() {
            log::debug!("Replacing pending WiFi status callback");
        }
        self.pending = Some((status, callback));
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Drop the pending callback without invoking it.
    pub fn cancel(&mut self) {
        self.pending = None;
    }

    /// Record the latest status and fire the pending callback if it matches.
    /// Returns true when a callback was invoked.
    pub fn update(&mut self, status: WifiStatus) -> bool {
        if status != self.current {
            log::info!("WiFi {} -> {}", self.current.as_str(), status.as_str());
            self.current = status;
        }

        match self.pending.take() {
            Some((awaited, callback)) if awaited == status => {
                callback.invoke();
                true
            }
            other => {
                self.pending = other;
                false
            }
        }
    }
}

impl Default for StatusWatch {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    thread_local! {
        static CALLS: RefCell<std::vec::Vec<std::string::String>> = RefCell::new(std::vec::Vec::new());
    }

    fn calls() -> std::vec::Vec<std::string::String> {
        CALLS.with(|c| c.borrow().clone())
    }

    fn plain() {
        CALLS.with(|c| c.borrow_mut().push("plain".into()));
    }

    fn with_str(s: &str) {
        CALLS.with(|c| c.borrow_mut().push(format!("str:{s}")));
    }

    fn with_bool(b: bool) {
        CALLS.with(|c| c.borrow_mut().push(format!("bool:{b}")));
    }

    fn with_fn(f: fn()) {
        CALLS.with(|c| c.borrow_mut().push("fn".into()));
        f();
    }

    #[test]
    fn fires_once_on_matching_status() {
        let mut watch = StatusWatch::new();
        watch.once(WifiStatus::Connected, Deferred::Call(plain));

        assert!(!watch.update(WifiStatus::Disconnected));
        assert!(watch.has_pending());
        assert!(watch.update(WifiStatus::Connected));
        assert!(!watch.has_pending());
        assert!(!watch.update(WifiStatus::Connected));

        assert_eq!(calls(), vec!["plain"]);
        assert_eq!(watch.current(), WifiStatus::Connected);
    }

    #[test]
    fn payload_variants() {
        let mut watch = StatusWatch::new();
        watch.once(WifiStatus::Connected, Deferred::with_str(with_str, "home"));
        watch.update(WifiStatus::Connected);
        watch.once(WifiStatus::ConnectFailed, Deferred::WithBool(with_bool, false));
        watch.update(WifiStatus::ConnectFailed);
        watch.once(WifiStatus::Connected, Deferred::WithFn(with_fn, plain));
        watch.update(WifiStatus::Connected);

        assert_eq!(calls(), vec!["str:home", "bool:false", "fn", "plain"]);
    }

    #[test]
    fn cancel_abandons_callback() {
        let mut watch = StatusWatch::new();
        watch.once(WifiStatus::Connected, Deferred::Call(plain));
        watch.cancel();
        assert!(!watch.update(WifiStatus::Connected));
        assert!(calls().is_empty());
    }

    #[test]
    fn str_payload_truncated() {
        let long = "x".repeat(PAYLOAD_STR_LEN + 10);
        match Deferred::with_str(with_str, &long) {
            Deferred::WithStr(_, s) => assert_eq!(s.len(), PAYLOAD_STR_LEN),
            _ => unreachable!(),
        }
    }
}
