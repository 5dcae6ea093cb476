use crate::client::binding::{AddressBinding, RouterSnapshot};
use crate::client::config::ClientConfig;
use emu_packets::MacAddr;
use std::fmt;
use std::net::Ipv6Addr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
}

impl AddressFamily {
    pub const ALL: [AddressFamily; 2] = [AddressFamily::Ipv4, AddressFamily::Ipv6];

    pub fn resolved_bit(self) -> ResolvedMask {
        match self {
            AddressFamily::Ipv4 => ResolvedMask::IPV4,
            AddressFamily::Ipv6 => ResolvedMask::IPV6,
        }
    }
}

/// One bit per address family whose gateway MAC is known.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ResolvedMask(u8);

impl ResolvedMask {
    pub const EMPTY: ResolvedMask = ResolvedMask(0);
    pub const IPV4: ResolvedMask = ResolvedMask(0x01);
    pub const IPV6: ResolvedMask = ResolvedMask(0x02);
    pub const ALL: ResolvedMask = ResolvedMask(0x03);

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: ResolvedMask) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: ResolvedMask) {
        self.0 |= other.0;
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn is_family_resolved(self, family: AddressFamily) -> bool {
        self.contains(family.resolved_bit())
    }
}

impl fmt::Debug for ResolvedMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResolvedMask({:#04x})", self.0)
    }
}

/// Read-only view deciding whether a client's gateway MACs are known.
///
/// Precedence per family is forced MAC, then the explicitly bound gateway, then (IPv6 only)
/// the router learned from advertisements.
pub struct GatewayResolver<'a> {
    config: &'a ClientConfig,
    ipv4_dgw: &'a AddressBinding,
    ipv6_dgw: &'a AddressBinding,
    router: Option<&'a RouterSnapshot>,
}

impl<'a> GatewayResolver<'a> {
    pub fn new(
        config: &'a ClientConfig,
        ipv4_dgw: &'a AddressBinding,
        ipv6_dgw: &'a AddressBinding,
        router: Option<&'a RouterSnapshot>,
    ) -> Self {
        GatewayResolver {
            config,
            ipv4_dgw,
            ipv6_dgw,
            router,
        }
    }

    pub fn client_mac(&self) -> MacAddr {
        self.config.mac
    }

    pub fn ipv4_gateway_mac(&self) -> Option<MacAddr> {
        self.config.ipv4_forced_dg_mac.or_else(|| self.ipv4_dgw.mac())
    }

    pub fn ipv6_gateway_mac(&self) -> Option<MacAddr> {
        self.config
            .ipv6_forced_dg_mac
            .or_else(|| self.ipv6_dgw.mac())
            .or_else(|| self.router.map(|router| router.router_mac))
    }

    pub fn gateway_mac(&self, family: AddressFamily) -> Option<MacAddr> {
        match family {
            AddressFamily::Ipv4 => self.ipv4_gateway_mac(),
            AddressFamily::Ipv6 => self.ipv6_gateway_mac(),
        }
    }

    /// IPv6 gateway address with its MAC. A configured gateway address needs a forced or
    /// bound MAC; without one, the advertising router is used.
    pub fn ipv6_gateway(&self) -> Option<(Ipv6Addr, MacAddr)> {
        if !self.config.dg_ipv6.is_unspecified() {
            let mac = self
                .config
                .ipv6_forced_dg_mac
                .or_else(|| self.ipv6_dgw.mac())?;
            return Some((self.config.dg_ipv6, mac));
        }
        self.router.map(|router| (router.ipv6, router.router_mac))
    }
}
