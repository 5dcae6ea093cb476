use crate::client::config::DEFAULT_MTU;
use emu_packets::MacAddr;
use std::net::Ipv6Addr;

/// Gateway MAC for one address family, written by the ARP / neighbor discovery modules.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AddressBinding {
    pub resolved: bool,
    pub mac: MacAddr,
}

impl AddressBinding {
    pub fn unresolved() -> Self {
        AddressBinding::default()
    }

    pub fn resolved(mac: MacAddr) -> Self {
        AddressBinding {
            resolved: true,
            mac,
        }
    }

    /// The MAC, if it has been learned.
    pub fn mac(&self) -> Option<MacAddr> {
        if self.resolved {
            Some(self.mac)
        } else {
            None
        }
    }
}

/// What the last IPv6 router advertisement told the client. Replaced wholesale on every
/// advertisement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouterSnapshot {
    /// Zero means the advertisement carried no MTU option.
    pub mtu: u16,
    pub router_mac: MacAddr,
    pub prefix: Ipv6Addr,
    pub prefix_len: u8,
    /// Address of the router itself.
    pub ipv6: Ipv6Addr,
}

impl Default for RouterSnapshot {
    fn default() -> Self {
        RouterSnapshot {
            mtu: DEFAULT_MTU,
            router_mac: MacAddr::ZERO,
            prefix: Ipv6Addr::UNSPECIFIED,
            prefix_len: 0,
            ipv6: Ipv6Addr::UNSPECIFIED,
        }
    }
}
