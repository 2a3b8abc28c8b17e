//! Address classification
//!
//! Decides whether a resolved or literal address is one the shield refuses
//! to connect to. The ranges are checked by hand because the std helpers
//! for global/documentation addresses are not stable.

use crate::IpCategory;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Unwraps an IPv4-mapped IPv6 address (`::ffff:a.b.c.d`) to IPv4
///
/// Every other address is returned unchanged. IPv4-compatible addresses
/// (`::a.b.c.d`) are deliberately not unwrapped; they are classified as
/// reserved instead.
pub fn canonical_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(v6),
        },
        v4 => v4,
    }
}

/// Classifies an address, returning the blocking category if it is forbidden
///
/// # Arguments
///
/// * `ip` - The address to classify (mapped IPv6 is unwrapped first)
///
/// # Returns
///
/// * `Some(IpCategory)` - The address must not be contacted
/// * `None` - The address is publicly routable
///
/// # Examples
///
/// ```
/// use network_shield::destination::classify_ip;
/// use network_shield::IpCategory;
///
/// assert_eq!(classify_ip("127.0.0.1".parse().unwrap()), Some(IpCategory::Loopback));
/// assert_eq!(classify_ip("::ffff:10.1.2.3".parse().unwrap()), Some(IpCategory::Private));
/// assert_eq!(classify_ip("93.184.216.34".parse().unwrap()), None);
/// ```
pub fn classify_ip(ip: IpAddr) -> Option<IpCategory> {
    match canonical_ip(ip) {
        IpAddr::V4(v4) => classify_v4(v4),
        IpAddr::V6(v6) => classify_v6(v6),
    }
}

fn classify_v4(ip: Ipv4Addr) -> Option<IpCategory> {
    let [a, b, c, _] = ip.octets();

    if ip.is_unspecified() {
        return Some(IpCategory::Unspecified);
    }
    if ip.is_loopback() {
        return Some(IpCategory::Loopback);
    }
    // 100.64.0.0/10 is carrier-grade NAT space, as internal as RFC1918
    if ip.is_private() || (a == 100 && (64..128).contains(&b)) {
        return Some(IpCategory::Private);
    }
    if ip.is_link_local() {
        return Some(IpCategory::LinkLocal);
    }
    if ip.is_multicast() {
        return Some(IpCategory::Multicast);
    }

    let reserved = a == 0
        || (a == 192 && b == 0 && c == 0)
        || (a == 192 && b == 0 && c == 2)
        || (a == 198 && (b == 18 || b == 19))
        || (a == 198 && b == 51 && c == 100)
        || (a == 203 && b == 0 && c == 113)
        || a >= 240;
    if reserved {
        return Some(IpCategory::Reserved);
    }

    None
}

fn classify_v6(ip: Ipv6Addr) -> Option<IpCategory> {
    let segments = ip.segments();

    if ip.is_unspecified() {
        return Some(IpCategory::Unspecified);
    }
    if ip.is_loopback() {
        return Some(IpCategory::Loopback);
    }
    if ip.is_multicast() {
        return Some(IpCategory::Multicast);
    }
    match segments[0] & 0xffc0 {
        0xfe80 => return Some(IpCategory::LinkLocal),
        0xfec0 => return Some(IpCategory::SiteLocal),
        _ => {}
    }
    if segments[0] & 0xfe00 == 0xfc00 {
        return Some(IpCategory::Private);
    }

    // NAT64 (64:ff9b::/96) and 6to4 (2002::/16) carry an IPv4 destination
    if segments[..6] == [0x64, 0xff9b, 0, 0, 0, 0] {
        return classify_v4(embedded_v4(segments[6], segments[7]));
    }
    if segments[0] == 0x2002 {
        return classify_v4(embedded_v4(segments[1], segments[2]));
    }

    let reserved = (segments[0] == 0x2001 && segments[1] == 0x0db8)
        || segments[..4] == [0x0100, 0, 0, 0]
        // IPv4-compatible ::a.b.c.d, deprecated
        || segments[..6] == [0, 0, 0, 0, 0, 0];
    if reserved {
        return Some(IpCategory::Reserved);
    }

    None
}

fn embedded_v4(high: u16, low: u16) -> Ipv4Addr {
    let [a, b] = high.to_be_bytes();
    let [c, d] = low.to_be_bytes();
    Ipv4Addr::new(a, b, c, d)
}
