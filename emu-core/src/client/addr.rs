//! IPv6 address derivation from a client's link-layer address.

use crate::client::binding::RouterSnapshot;
use emu_packets::MacAddr;
use std::net::Ipv6Addr;

pub const LINK_LOCAL_PREFIX: [u8; 8] = [0xfe, 0x80, 0, 0, 0, 0, 0, 0];

/// The only prefix length stateless autoconfiguration accepts.
pub const SLAAC_PREFIX_LEN: u8 = 64;

/// Modified EUI-64 interface identifier: universal/local bit flipped, `ff:fe` in the middle.
pub fn eui64_interface_id(mac: MacAddr) -> [u8; 8] {
    let m = mac.bytes;
    [m[0] ^ 0x02, m[1], m[2], 0xff, 0xfe, m[3], m[4], m[5]]
}

fn with_interface_id(prefix: &[u8], mac: MacAddr) -> Ipv6Addr {
    let mut octets = [0u8; 16];
    octets[..8].copy_from_slice(&prefix[..8]);
    octets[8..].copy_from_slice(&eui64_interface_id(mac));
    Ipv6Addr::from(octets)
}

pub fn link_local(mac: MacAddr) -> Ipv6Addr {
    with_interface_id(&LINK_LOCAL_PREFIX, mac)
}

/// The advertised prefix as a /64, if the router gave a usable one.
fn slaac_prefix(router: &RouterSnapshot) -> Option<[u8; 16]> {
    if router.prefix_len == SLAAC_PREFIX_LEN && !router.prefix.is_unspecified() {
        Some(router.prefix.octets())
    } else {
        None
    }
}

/// Stateless autoconfigured address under the advertised prefix. `None` without a router
/// snapshot, with a prefix length other than 64, or with a zero prefix.
pub fn slaac(mac: MacAddr, router: Option<&RouterSnapshot>) -> Option<Ipv6Addr> {
    let prefix = slaac_prefix(router?)?;
    Some(with_interface_id(&prefix, mac))
}

/// Whether `ip` falls inside the link-local /64 or the advertised /64.
pub fn is_on_link(ip: &Ipv6Addr, router: Option<&RouterSnapshot>) -> bool {
    let octets = ip.octets();
    if octets[..8] == LINK_LOCAL_PREFIX {
        return true;
    }
    match router {
        Some(router) if router.prefix_len == SLAAC_PREFIX_LEN => {
            router.prefix.octets()[..8] == octets[..8]
        }
        _ => false,
    }
}

/// Recovers the MAC from a link-local (fe80::/10) address built with EUI-64.
pub fn extract_mac(ip: &Ipv6Addr) -> Option<MacAddr> {
    let o = ip.octets();
    if o[0] != 0xfe || o[1] & 0xc0 != 0x80 {
        return None;
    }
    extract_only_mac(ip)
}

/// Recovers the MAC from any EUI-64 interface identifier, whatever the prefix.
pub fn extract_only_mac(ip: &Ipv6Addr) -> Option<MacAddr> {
    let o = ip.octets();
    if o[11] != 0xff || o[12] != 0xfe {
        return None;
    }
    Some(MacAddr::new([o[8] ^ 0x02, o[9], o[10], o[13], o[14], o[15]]))
}
