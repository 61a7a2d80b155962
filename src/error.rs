/// Errors surfaced to callers of the library.
///
/// Malformed radio frames are not errors: the capture stream is noisy by
/// nature, so parsing yields `None` and the frame is dropped.
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// Text is not six colon-separated uppercase hex byte pairs.
    #[error("invalid hardware address")]
    InvalidAddress,

    /// Manufacturer prefix does not fit in 24 bits.
    #[error("manufacturer prefix {0:#x} exceeds 24 bits")]
    InvalidOui(u32),

    /// The active-device filter chain has no free slot.
    #[error("filter chain is full")]
    FilterChainFull,

    /// Another sniffer already holds the driver's receive callback.
    #[error("packet sniffer already running")]
    SnifferBusy,

    /// The radio driver rejected a promiscuous mode change.
    #[error("radio driver error {0}")]
    Radio(i32),
}

impl Error {
    /// Short machine-readable code, used in host acknowledgements.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidAddress => "invalid_address",
            Error::InvalidOui(_) => "invalid_oui",
            Error::FilterChainFull => "filter_chain_full",
            Error::SnifferBusy => "sniffer_busy",
            Error::Radio(_) => "radio",
        }
    }
}
