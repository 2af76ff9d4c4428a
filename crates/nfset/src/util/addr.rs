//! Address parsing, formatting and classification.

use std::net::IpAddr;

/// Error type for address parsing.
#[derive(Debug, thiserror::Error)]
pub enum AddrError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid MAC address: {0}")]
    InvalidMac(String),
}

pub type Result<T> = std::result::Result<T, AddrError>;

/// A set entry given as text, after classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryValue {
    /// IPv4 or IPv6 address.
    Ip(IpAddr),
    /// Hardware address.
    Mac([u8; 6]),
}

/// Parse an IP address from string.
pub fn parse_addr(s: &str) -> Result<IpAddr> {
    s.parse()
        .map_err(|_| AddrError::InvalidAddress(s.to_string()))
}

/// Parse a MAC address from string.
///
/// Accepts six colon-separated groups of one or two hex digits.
pub fn parse_mac(s: &str) -> Result<[u8; 6]> {
    let mut mac = [0u8; 6];
    let mut parts = s.split(':');

    for byte in mac.iter_mut() {
        let part = parts
            .next()
            .filter(|p| (1..=2).contains(&p.len()) && p.bytes().all(|b| b.is_ascii_hexdigit()))
            .ok_or_else(|| AddrError::InvalidMac(s.to_string()))?;
        *byte = u8::from_str_radix(part, 16).map_err(|_| AddrError::InvalidMac(s.to_string()))?;
    }

    if parts.next().is_some() {
        return Err(AddrError::InvalidMac(s.to_string()));
    }

    Ok(mac)
}

/// Format a MAC address.
pub fn format_mac(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}

/// Decide whether `s` is an IP address or a MAC address.
///
/// Addresses win: a string is only tried as a MAC if it does not parse as
/// an IP address.
pub fn classify(s: &str) -> Option<EntryValue> {
    if let Ok(addr) = parse_addr(s) {
        return Some(EntryValue::Ip(addr));
    }
    parse_mac(s).ok().map(EntryValue::Mac)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn test_parse_addr() {
        assert_eq!(
            parse_addr("192.168.1.1").unwrap(),
            IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1))
        );
        assert_eq!(parse_addr("::1").unwrap(), IpAddr::V6(Ipv6Addr::LOCALHOST));
        assert!(parse_addr("192.168.1").is_err());
    }

    #[test]
    fn test_parse_mac() {
        let mac = parse_mac("aa:bb:cc:dd:ee:ff").unwrap();
        assert_eq!(mac, [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
        assert_eq!(parse_mac("0:1:2:a:B:c").unwrap(), [0, 1, 2, 0xa, 0xb, 0xc]);
    }

    #[test]
    fn test_parse_mac_rejects() {
        for bad in [
            "",
            "aa:bb:cc:dd:ee",
            "aa:bb:cc:dd:ee:ff:00",
            "aa:bb:cc:dd:ee:fff",
            "aa:bb:cc:dd:ee:+f",
            "aa:bb:cc:dd::ff",
            "gg:bb:cc:dd:ee:ff",
            "aa-bb-cc-dd-ee-ff",
        ] {
            assert!(parse_mac(bad).is_err(), "{bad:?} accepted");
        }
    }

    #[test]
    fn test_format_mac() {
        assert_eq!(
            format_mac(&[0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]),
            "aa:bb:cc:dd:ee:ff"
        );
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            classify("10.0.0.1"),
            Some(EntryValue::Ip(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))))
        );
        assert!(matches!(classify("fe80::1"), Some(EntryValue::Ip(IpAddr::V6(_)))));
        assert_eq!(
            classify("01:02:03:04:05:06"),
            Some(EntryValue::Mac([1, 2, 3, 4, 5, 6]))
        );
        assert_eq!(classify("example.com"), None);
        assert_eq!(classify(""), None);
    }

    #[test]
    fn test_classify_prefers_address() {
        // Six groups without "::" is not IPv6, so it is a MAC.
        assert_eq!(classify("1:2:3:4:5:6"), Some(EntryValue::Mac([1, 2, 3, 4, 5, 6])));
        // With "::" it parses as IPv6 first.
        assert!(matches!(classify("1:2:3:4:5:6::"), Some(EntryValue::Ip(IpAddr::V6(_)))));
    }
}
