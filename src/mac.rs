/// Hardware (link-layer) addresses and manufacturer prefixes.
///
/// Textual form is strict: six colon-separated uppercase hex byte pairs,
/// e.g. `AA:BB:CC:DD:EE:FF`. Anything else fails to convert.
use core::fmt;
use core::str::FromStr;

use crate::error::Error;
use crate::protocol::MacString;

/// Length of "AA:BB:CC:DD:EE:FF"
const MAC_TEXT_LEN: usize = 17;

/// 6-byte link-layer identifier. Equality is byte-exact.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const BROADCAST: MacAddr = MacAddr([0xFF; 6]);

    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Copy an address out of a frame at `offset`. `None` if the slice is short.
    pub fn from_slice(frame: &[u8], offset: usize) -> Option<Self> {
        let bytes: [u8; 6] = frame.get(offset..offset + 6)?.try_into().ok()?;
        Some(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    /// Organizationally unique identifier (leading 3 bytes).
    pub fn oui(&self) -> Oui {
        Oui([self.0[0], self.0[1], self.0[2]])
    }

    /// Group (broadcast or multicast) address. I/G bit set.
    pub fn is_group(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    /// Render into a fixed-capacity string.
    pub fn to_mac_string(&self) -> MacString {
        let mut buf = MacString::new();
        format_mac(&self.0, &mut buf);
        buf
    }
}

impl FromStr for MacAddr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.as_bytes();
        if raw.len() != MAC_TEXT_LEN {
            return Err(Error::InvalidAddress);
        }

        let mut bytes = [0u8; 6];
        for (i, byte) in bytes.iter_mut().enumerate() {
            let pos = i * 3;
            if i < 5 && raw[pos + 2] != b':' {
                return Err(Error::InvalidAddress);
            }
            let hi = hex_digit(raw[pos]).ok_or(Error::InvalidAddress)?;
            let lo = hex_digit(raw[pos + 1]).ok_or(Error::InvalidAddress)?;
            *byte = (hi << 4) | lo;
        }
        Ok(Self(bytes))
    }
}

/// Uppercase hex only.
fn hex_digit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MacAddr({self})")
    }
}

impl From<[u8; 6]> for MacAddr {
    fn from(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }
}

/// Manufacturer prefix: the leading 3 bytes of a hardware address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Oui(pub [u8; 3]);

impl Oui {
    /// Build from a 24-bit integer, e.g. `0xAA1122` → `AA:11:22`.
    pub fn from_u32(oui: u32) -> Result<Self, Error> {
        if oui > 0x00FF_FFFF {
            return Err(Error::InvalidOui(oui));
        }
        let [_, a, b, c] = oui.to_be_bytes();
        Ok(Self([a, b, c]))
    }

    pub fn to_u32(self) -> u32 {
        u32::from_be_bytes([0, self.0[0], self.0[1], self.0[2]])
    }

    pub fn matches(&self, mac: &MacAddr) -> bool {
        mac.oui() == *self
    }

    /// The prefix as a full address with zeroed device bytes.
    pub fn to_mac(self) -> MacAddr {
        MacAddr([self.0[0], self.0[1], self.0[2], 0, 0, 0])
    }
}

/// Format a 6-byte MAC address into "AA:BB:CC:DD:EE:FF" string
pub fn format_mac(mac: &[u8; 6], buf: &mut MacString) {
    use core::fmt::Write;
    let _ = write!(
        buf,
        "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_valid_address() {
        let mac: MacAddr = "AA:11:22:33:44:55".parse().unwrap();
        assert_eq!(mac, MacAddr([0xAA, 0x11, 0x22, 0x33, 0x44, 0x55]));
    }

    #[test]
    fn text_round_trip_preserves_form() {
        for text in [
            "00:00:00:00:00:00",
            "FF:FF:FF:FF:FF:FF",
            "AA:11:22:33:44:55",
            "0A:B0:C1:D2:E3:F4",
        ] {
            let mac: MacAddr = text.parse().unwrap();
            assert_eq!(mac.to_mac_string().as_str(), text);
        }
    }

    #[test]
    fn rejects_lowercase() {
        assert_eq!(
            "aa:11:22:33:44:55".parse::<MacAddr>(),
            Err(Error::InvalidAddress)
        );
    }

    #[test]
    fn rejects_wrong_separator() {
        assert!("AA-11-22-33-44-55".parse::<MacAddr>().is_err());
        assert!("AA:11:22:33:44-55".parse::<MacAddr>().is_err());
    }

    #[test]
    fn rejects_wrong_length() {
        assert!("".parse::<MacAddr>().is_err());
        assert!("AA:11:22:33:44".parse::<MacAddr>().is_err());
        assert!("AA:11:22:33:44:55:".parse::<MacAddr>().is_err());
        assert!("A:11:22:33:44:55".parse::<MacAddr>().is_err());
    }

    #[test]
    fn rejects_non_hex() {
        assert!("AG:11:22:33:44:55".parse::<MacAddr>().is_err());
        assert!("AA:11:22:33:44:5Z".parse::<MacAddr>().is_err());
    }

    #[test]
    fn display_matches_mac_string() {
        let mac = MacAddr([0xB4, 0x1E, 0x52, 0xAB, 0xCD, 0xEF]);
        let mut s = MacString::new();
        core::fmt::write(&mut s, format_args!("{mac}")).unwrap();
        assert_eq!(s, mac.to_mac_string());
    }

    #[test]
    fn oui_from_u32() {
        let oui = Oui::from_u32(0xAA1122).unwrap();
        assert_eq!(oui, Oui([0xAA, 0x11, 0x22]));
        assert_eq!(oui.to_u32(), 0xAA1122);
        assert_eq!(oui.to_mac(), MacAddr([0xAA, 0x11, 0x22, 0, 0, 0]));
    }

    #[test]
    fn oui_over_24_bits_rejected() {
        assert_eq!(
            Oui::from_u32(0x0100_0000),
            Err(Error::InvalidOui(0x0100_0000))
        );
    }

    #[test]
    fn oui_matches_leading_bytes_only() {
        let oui = Oui::from_u32(0xAA1122).unwrap();
        assert!(oui.matches(&"AA:11:22:33:44:55".parse().unwrap()));
        assert!(oui.matches(&"AA:11:22:00:00:00".parse().unwrap()));
        assert!(!oui.matches(&"BB:00:00:00:00:01".parse().unwrap()));
    }

    #[test]
    fn group_bit() {
        assert!(MacAddr::BROADCAST.is_group());
        assert!(MacAddr([0x01, 0x00, 0x5E, 0, 0, 1]).is_group());
        assert!(!MacAddr([0xAA, 0x11, 0x22, 0x33, 0x44, 0x55]).is_group());
    }

    #[test]
    fn from_slice_bounds() {
        let frame = [0u8, 1, 2, 3, 4, 5, 6, 7];
        assert_eq!(
            MacAddr::from_slice(&frame, 2),
            Some(MacAddr([2, 3, 4, 5, 6, 7]))
        );
        assert_eq!(MacAddr::from_slice(&frame, 3), None);
    }
}
