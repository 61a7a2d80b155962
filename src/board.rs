/// Hardware constants for supported boards.
///
/// Selected at compile time via the `board-*` feature flags so that both
/// firmware binaries and host tools agree on the board identity.

#[cfg(feature = "board-xiao")]
mod hw {
    pub const BOARD_NAME: &str = "xiao_esp32s3";
    /// Heap reserved for the WiFi driver
    pub const HEAP_SIZE: usize = 96 * 1024;
}

#[cfg(feature = "board-m5stickc")]
mod hw {
    pub const BOARD_NAME: &str = "m5stickc_plus2";
    pub const HEAP_SIZE: usize = 64 * 1024;
}

#[cfg(not(any(feature = "board-xiao", feature = "board-m5stickc")))]
mod hw {
    pub const BOARD_NAME: &str = "unknown";
    pub const HEAP_SIZE: usize = 64 * 1024;
}

pub use hw::*;
