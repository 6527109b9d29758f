//! Short MAC identifiers and the mesh SSID encoding (spec §3, §6).
//!
//! A node is addressed mesh-wide by the last three bytes of its hardware
//! MAC, rendered as six uppercase hex characters. The SSID a node's
//! SoftAP advertises packs both the current root's short MAC and this
//! node's tree level into a single string a scanner can parse without
//! joining.

use std::fmt;

pub const BROADCAST_SHORT_MAC: &str = "FFFFFF";
pub const ROOT_SENTINEL_SHORT_MAC: &str = "000000";

/// Six uppercase hex characters identifying a node mesh-wide.
///
/// Invariant `SHORTMAC`: always exactly 6 ASCII bytes in `[0-9A-F]`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShortMac([u8; 6]);

impl ShortMac {
    /// Derive a short MAC from the last three bytes of a hardware MAC.
    pub fn from_hw_mac(mac: [u8; 6]) -> Self {
        let mut out = [0u8; 6];
        for (i, byte) in mac[3..6].iter().enumerate() {
            out[i * 2] = HEX_DIGITS[(byte >> 4) as usize];
            out[i * 2 + 1] = HEX_DIGITS[(byte & 0x0f) as usize];
        }
        ShortMac(out)
    }

    /// Parse six hex characters already in short-MAC form.
    pub fn parse(s: &str) -> Option<Self> {
        let bytes = s.as_bytes();
        if bytes.len() != 6 || !bytes.iter().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let mut out = [0u8; 6];
        for (i, b) in bytes.iter().enumerate() {
            out[i] = b.to_ascii_uppercase();
        }
        Some(ShortMac(out))
    }

    pub fn broadcast() -> Self {
        ShortMac::parse(BROADCAST_SHORT_MAC).unwrap()
    }

    pub fn root_sentinel() -> Self {
        ShortMac::parse(ROOT_SENTINEL_SHORT_MAC).unwrap()
    }

    pub fn is_broadcast(&self) -> bool {
        self.as_str() == BROADCAST_SHORT_MAC
    }

    pub fn as_str(&self) -> &str {
        // SAFETY: constructed only from ASCII hex digits above.
        std::str::from_utf8(&self.0).expect("ShortMac is always ASCII")
    }
}

impl fmt::Display for ShortMac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for ShortMac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ShortMac({})", self.as_str())
    }
}

const HEX_DIGITS: [u8; 16] = *b"0123456789ABCDEF";

const LEVEL_ALPHABET: &[u8; 62] =
    b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Encode a tree level (0..=61) as the single base-62 digit used on the
/// wire, per spec §3.
pub fn encode_level(level: u8) -> Option<char> {
    LEVEL_ALPHABET.get(level as usize).map(|&b| b as char)
}

/// Decode a base-62 level digit back into a tree level.
pub fn decode_level(c: char) -> Option<u8> {
    let b = c as u32;
    match b {
        0x30..=0x39 => Some((b - 0x30) as u8),           // '0'..'9'
        0x41..=0x5A => Some((b - 0x41 + 10) as u8),      // 'A'..'Z'
        0x61..=0x7A => Some((b - 0x61 + 36) as u8),      // 'a'..'z'
        _ => None,
    }
}

/// The mesh SSID, parsed or composed: `"<prefix>_<root_short_mac>_<level>"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ssid {
    pub prefix: String,
    pub root_short_mac: ShortMac,
    pub level: u8,
}

impl Ssid {
    pub fn format(prefix: &str, root_short_mac: ShortMac, level: u8) -> Option<String> {
        let level_char = encode_level(level)?;
        let ssid = format!("{}_{}_{}", prefix, root_short_mac, level_char);
        if ssid.len() > 32 {
            return None;
        }
        Some(ssid)
    }

    /// Parse an observed SSID against an expected prefix. Returns `None`
    /// if the SSID does not belong to this mesh deployment.
    pub fn parse(ssid: &str, expected_prefix: &str) -> Option<Ssid> {
        let rest = ssid.strip_prefix(expected_prefix)?.strip_prefix('_')?;
        let bytes = rest.as_bytes();
        // rest must be exactly "<6 hex chars>_<level char>"
        if bytes.len() != 8 || bytes[6] != b'_' {
            return None;
        }
        let root_short_mac = ShortMac::parse(&rest[0..6])?;
        let level = decode_level(rest.as_bytes()[7] as char)?;
        Some(Ssid {
            prefix: expected_prefix.to_string(),
            root_short_mac,
            level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_encoding_is_a_bijection_on_0_61() {
        for level in 0u8..=61 {
            let c = encode_level(level).expect("encodable");
            let back = decode_level(c).expect("decodable");
            assert_eq!(level, back, "level {level} round-tripped to {back}");
        }
    }

    #[test]
    fn decode_level_rejects_out_of_alphabet_chars() {
        assert_eq!(decode_level('_'), None);
        assert_eq!(decode_level('!'), None);
    }

    #[test]
    fn short_mac_from_hw_mac_takes_last_three_bytes() {
        let mac = ShortMac::from_hw_mac([0x11, 0x22, 0xAA, 0xBB, 0xCC, 0xDD]);
        assert_eq!(mac.as_str(), "AABBCC");
    }

    #[test]
    fn ssid_roundtrip_for_every_valid_level() {
        let mac = ShortMac::parse("AABBCC").unwrap();
        for level in 0u8..=61 {
            let ssid = Ssid::format("FsrMesh", mac, level).unwrap();
            let parsed = Ssid::parse(&ssid, "FsrMesh").unwrap();
            assert_eq!(parsed.root_short_mac, mac);
            assert_eq!(parsed.level, level);
        }
    }

    #[test]
    fn ssid_parse_rejects_foreign_prefix() {
        let ssid = Ssid::format("FsrMesh", ShortMac::parse("AABBCC").unwrap(), 0).unwrap();
        assert!(Ssid::parse(&ssid, "OtherMesh").is_none());
    }
}
