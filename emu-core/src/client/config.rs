use emu_packets::MacAddr;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Default L3 MTU for clients and for IPv6 until a router advertises one.
pub const DEFAULT_MTU: u16 = 1500;

/// Number of priority entries carried per client, one per tag slot the emulator may emit.
pub const PBIT_LIST_LEN: usize = 5;

/// 802.1p priority applied to each emitted tag, outermost first.
pub type PbitList = [u8; PBIT_LIST_LEN];

/// Identity and addressing of one emulated client, fixed when the client is added.
///
/// Fields are set with the chaining setters below:
///
/// ```
/// # use emu_core::client::ClientConfig;
/// # use emu_packets::MacAddr;
/// let config = ClientConfig::new(MacAddr::new([0, 0, 1, 0, 0, 1]))
///     .ipv4("16.0.0.1".parse().unwrap())
///     .dg_ipv4("16.0.0.254".parse().unwrap())
///     .force_ipv4_gateway(MacAddr::new([0, 0, 1, 0, 0, 0xfe]));
/// assert!(config.ipv4_forced_dg_mac.is_some());
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    pub mac: MacAddr,
    pub ipv4: Ipv4Addr,
    pub ipv4_mask: Ipv4Addr,
    pub dg_ipv4: Ipv4Addr,
    pub mtu: u16,
    pub ipv6: Ipv6Addr,
    pub dg_ipv6: Ipv6Addr,
    /// When set, the IPv4 gateway MAC is never learned, this one is used.
    pub ipv4_forced_dg_mac: Option<MacAddr>,
    /// When set, the IPv6 gateway MAC is never learned, this one is used.
    pub ipv6_forced_dg_mac: Option<MacAddr>,
    pub pbits: PbitList,
}

impl ClientConfig {
    pub fn new(mac: MacAddr) -> Self {
        ClientConfig {
            mac,
            ipv4: Ipv4Addr::UNSPECIFIED,
            ipv4_mask: Ipv4Addr::BROADCAST,
            dg_ipv4: Ipv4Addr::UNSPECIFIED,
            mtu: DEFAULT_MTU,
            ipv6: Ipv6Addr::UNSPECIFIED,
            dg_ipv6: Ipv6Addr::UNSPECIFIED,
            ipv4_forced_dg_mac: None,
            ipv6_forced_dg_mac: None,
            pbits: [0; PBIT_LIST_LEN],
        }
    }

    pub fn ipv4(self, ipv4: Ipv4Addr) -> Self {
        ClientConfig { ipv4, ..self }
    }

    pub fn ipv4_mask(self, ipv4_mask: Ipv4Addr) -> Self {
        ClientConfig { ipv4_mask, ..self }
    }

    pub fn dg_ipv4(self, dg_ipv4: Ipv4Addr) -> Self {
        ClientConfig { dg_ipv4, ..self }
    }

    /// A zero MTU keeps the default.
    pub fn mtu(self, mtu: u16) -> Self {
        if mtu == 0 {
            return self;
        }
        ClientConfig { mtu, ..self }
    }

    pub fn ipv6(self, ipv6: Ipv6Addr) -> Self {
        ClientConfig { ipv6, ..self }
    }

    pub fn dg_ipv6(self, dg_ipv6: Ipv6Addr) -> Self {
        ClientConfig { dg_ipv6, ..self }
    }

    pub fn force_ipv4_gateway(self, mac: MacAddr) -> Self {
        ClientConfig {
            ipv4_forced_dg_mac: Some(mac),
            ..self
        }
    }

    pub fn force_ipv6_gateway(self, mac: MacAddr) -> Self {
        ClientConfig {
            ipv6_forced_dg_mac: Some(mac),
            ..self
        }
    }

    pub fn pbits(self, pbits: PbitList) -> Self {
        ClientConfig { pbits, ..self }
    }
}
