//! One emulated endpoint: its addressing, its gateway bindings and the state of resolving
//! their MAC addresses.

mod addr;
pub use self::addr::*;

mod binding;
pub use self::binding::*;

mod config;
pub use self::config::*;

mod resolve;
pub use self::resolve::*;

mod resolver;
pub use self::resolver::*;

mod transport;
pub use self::transport::*;

use crate::error::ClientError;
use crate::plugin::{ClientEvent, ClientPlugin, NotificationSink, PluginSet};
use crate::timer::Timer;
use crate::tunnel::{tag_bytes, TunnelKey};
use emu_packets::{IpProtocol, Ipv4Header, MacAddr, IPV4_ETHER_TYPE};
use std::net::{Ipv4Addr, Ipv6Addr};

/// IPv4 header defaults for frames a client originates.
const IPV4_TTL: u8 = 128;
const IPV4_IDENTIFICATION: u16 = 0xcc;

pub struct Client {
    config: ClientConfig,
    ipv4_dgw: AddressBinding,
    ipv6_dgw: AddressBinding,
    ipv6_router: Option<RouterSnapshot>,
    dhcp_ipv6: Ipv6Addr,
    address_state: ClientAddressState,
    plugins: PluginSet,
    transport: Option<Box<dyn ClientTransport>>,
}

/// Point-in-time copy of a client's addressing, for display.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientInfo {
    pub mac: MacAddr,
    pub ipv4: Ipv4Addr,
    pub dg_ipv4: Ipv4Addr,
    pub mtu: u16,
    pub ipv4_dgw: AddressBinding,
    pub ipv4_forced_dg_mac: Option<MacAddr>,
    pub ipv6_local: Ipv6Addr,
    pub ipv6_slaac: Option<Ipv6Addr>,
    pub ipv6: Ipv6Addr,
    pub dg_ipv6: Ipv6Addr,
    pub dhcp_ipv6: Ipv6Addr,
    pub ipv6_dgw: AddressBinding,
    pub ipv6_forced_dg_mac: Option<MacAddr>,
    pub ipv6_router: Option<RouterSnapshot>,
    pub resolved: ResolvedMask,
    pub plugins: Vec<String>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        Client {
            config,
            ipv4_dgw: AddressBinding::unresolved(),
            ipv6_dgw: AddressBinding::unresolved(),
            ipv6_router: None,
            dhcp_ipv6: Ipv6Addr::UNSPECIFIED,
            address_state: ClientAddressState::new(),
            plugins: PluginSet::new(),
            transport: None,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub(crate) fn config_mut(&mut self) -> &mut ClientConfig {
        &mut self.config
    }

    pub fn mac(&self) -> MacAddr {
        self.config.mac
    }

    pub fn ipv4_gateway(&self) -> &AddressBinding {
        &self.ipv4_dgw
    }

    pub fn ipv6_gateway(&self) -> &AddressBinding {
        &self.ipv6_dgw
    }

    pub fn router(&self) -> Option<&RouterSnapshot> {
        self.ipv6_router.as_ref()
    }

    /// Written by the ARP module once the gateway answers.
    pub fn set_ipv4_gateway(&mut self, binding: AddressBinding) {
        self.ipv4_dgw = binding;
    }

    /// Written by the neighbor discovery module.
    pub fn set_ipv6_gateway(&mut self, binding: AddressBinding) {
        self.ipv6_dgw = binding;
    }

    /// Replaces the router snapshot with what the latest advertisement said.
    pub fn set_router_snapshot(&mut self, router: Option<RouterSnapshot>) {
        self.ipv6_router = router;
    }

    pub fn dhcp_ipv6(&self) -> Ipv6Addr {
        self.dhcp_ipv6
    }

    pub(crate) fn set_dhcp_ipv6(&mut self, ip: Ipv6Addr) {
        self.dhcp_ipv6 = ip;
    }

    pub fn resolver(&self) -> GatewayResolver<'_> {
        GatewayResolver::new(
            &self.config,
            &self.ipv4_dgw,
            &self.ipv6_dgw,
            self.ipv6_router.as_ref(),
        )
    }

    pub fn address_state(&self) -> &ClientAddressState {
        &self.address_state
    }

    pub fn register_plugin(&mut self, plugin: Box<dyn ClientPlugin>) {
        self.plugins.register(plugin);
    }

    pub fn plugin_names(&self) -> Vec<String> {
        self.plugins.names()
    }

    pub fn start_resolve(&mut self, timer: &mut dyn Timer) {
        let resolver = GatewayResolver::new(
            &self.config,
            &self.ipv4_dgw,
            &self.ipv6_dgw,
            self.ipv6_router.as_ref(),
        );
        self.address_state.start(&resolver, timer, &mut self.plugins);
    }

    /// Runs when the resolution timer fires.
    pub fn on_resolve_tick(&mut self, timer: &mut dyn Timer) {
        let resolver = GatewayResolver::new(
            &self.config,
            &self.ipv4_dgw,
            &self.ipv6_dgw,
            self.ipv6_router.as_ref(),
        );
        self.address_state.on_tick(&resolver, timer, &mut self.plugins);
    }

    pub fn resolve_phase(&self, timer: &dyn Timer) -> ResolvePhase {
        self.address_state.phase(timer)
    }

    pub fn ipv6_local_link(&self) -> Ipv6Addr {
        link_local(self.config.mac)
    }

    pub fn ipv6_slaac(&self) -> Option<Ipv6Addr> {
        slaac(self.config.mac, self.ipv6_router.as_ref())
    }

    /// Whether `ip` is inside the link-local prefix or the advertised prefix.
    pub fn is_valid_prefix(&self, ip: &Ipv6Addr) -> bool {
        is_on_link(ip, self.ipv6_router.as_ref())
    }

    /// Source address for traffic this client originates: DHCP, then static, then SLAAC.
    pub fn source_ipv6(&self) -> Result<Ipv6Addr, ClientError> {
        if !self.dhcp_ipv6.is_unspecified() {
            return Ok(self.dhcp_ipv6);
        }
        if !self.config.ipv6.is_unspecified() {
            return Ok(self.config.ipv6);
        }
        self.ipv6_slaac().ok_or(ClientError::NoSourceIpv6 {
            mac: self.config.mac,
        })
    }

    /// Same as [`source_ipv6`], for callers that already know an address exists (a static
    /// address was configured, or a router prefix was accepted).
    ///
    /// # Panics
    ///
    /// Panics when the client has no DHCP, static or SLAAC address.
    ///
    /// [`source_ipv6`]: Client::source_ipv6
    pub fn resolve_source_ipv6(&self) -> Ipv6Addr {
        match self.source_ipv6() {
            Ok(ip) => ip,
            Err(e) => panic!("{}", e),
        }
    }

    /// Gateway address: the configured one, else the advertising router's.
    pub fn resolve_dg_ipv6(&self) -> Option<Ipv6Addr> {
        if !self.config.dg_ipv6.is_unspecified() {
            return Some(self.config.dg_ipv6);
        }
        self.ipv6_router
            .as_ref()
            .map(|router| router.ipv6)
            .filter(|ip| !ip.is_unspecified())
    }

    /// Gateway address together with its MAC.
    pub fn resolve_dgv6(&self) -> Option<(Ipv6Addr, MacAddr)> {
        self.resolver().ipv6_gateway()
    }

    /// True for the configured gateway and for the advertising router, even when both are set.
    pub fn is_dg_ipv6(&self, ip: &Ipv6Addr) -> bool {
        if ip.is_unspecified() {
            return false;
        }
        let dg = self.config.dg_ipv6;
        (!dg.is_unspecified() && *ip == dg)
            || self
                .ipv6_router
                .as_ref()
                .map_or(false, |router| router.ipv6 == *ip)
    }

    pub fn owns_ipv6(&self, ip: &Ipv6Addr) -> bool {
        if ip.is_unspecified() {
            return false;
        }
        *ip == self.dhcp_ipv6
            || *ip == self.config.ipv6
            || *ip == self.ipv6_local_link()
            || self.ipv6_slaac().as_ref() == Some(ip)
    }

    /// The advertised MTU, or the default until a router gave one.
    pub fn ipv6_mtu(&self) -> u16 {
        match &self.ipv6_router {
            Some(router) if router.mtu != 0 => router.mtu,
            _ => DEFAULT_MTU,
        }
    }

    /// Ethernet header for a frame this client originates inside the namespace `key`.
    /// Unicast frames leave the destination zeroed for the caller to fill in.
    pub fn l2_header(&self, key: &TunnelKey, broadcast: bool, next_ether_type: u16) -> Vec<u8> {
        let dst = if broadcast {
            MacAddr::BROADCAST
        } else {
            MacAddr::ZERO
        };
        let tags = tag_bytes(key, &self.config.pbits);
        let mut header = Vec::with_capacity(14 + tags.len());
        header.extend_from_slice(&dst.bytes);
        header.extend_from_slice(&self.config.mac.bytes);
        header.extend_from_slice(&tags);
        header.extend_from_slice(&next_ether_type.to_be_bytes());
        header
    }

    /// Ethernet plus IPv4 header addressed from the client to its gateway. Returns the bytes
    /// and the offset of the IPv4 header.
    ///
    /// The total length field is 20, the header alone, and the checksum is computed over
    /// that. Whoever appends a payload must rewrite the total length and the checksum.
    pub fn ipv4_header(
        &self,
        key: &TunnelKey,
        broadcast: bool,
        protocol: IpProtocol,
    ) -> (Vec<u8>, usize) {
        let mut header = self.l2_header(key, broadcast, IPV4_ETHER_TYPE);
        let offset = header.len();

        let mut ipv4 = Ipv4Header::new();
        ipv4.set_ttl(IPV4_TTL);
        ipv4.set_identification(IPV4_IDENTIFICATION);
        ipv4.set_protocol(protocol);
        ipv4.set_src_addr(self.config.ipv4);
        ipv4.set_dest_addr(self.config.dg_ipv4);
        ipv4.set_checksum();

        header.extend_from_slice(ipv4.as_bytes());
        (header, offset)
    }

    pub fn is_unicast_to_me(&self, frame: &[u8]) -> bool {
        frame.len() > 6 && frame[..6] == self.config.mac.bytes
    }

    /// Changes the IPv4 gateway address and tells the plugins.
    pub fn update_dg_ipv4(&mut self, new: Ipv4Addr) {
        let old = self.config.dg_ipv4;
        self.config.dg_ipv4 = new;
        self.plugins
            .notify(&ClientEvent::Ipv4GatewayUpdated { old, new });
    }

    pub fn info(&self) -> ClientInfo {
        ClientInfo {
            mac: self.config.mac,
            ipv4: self.config.ipv4,
            dg_ipv4: self.config.dg_ipv4,
            mtu: self.config.mtu,
            ipv4_dgw: self.ipv4_dgw,
            ipv4_forced_dg_mac: self.config.ipv4_forced_dg_mac,
            ipv6_local: self.ipv6_local_link(),
            ipv6_slaac: self.ipv6_slaac(),
            ipv6: self.config.ipv6,
            dg_ipv6: self.config.dg_ipv6,
            dhcp_ipv6: self.dhcp_ipv6,
            ipv6_dgw: self.ipv6_dgw,
            ipv6_forced_dg_mac: self.config.ipv6_forced_dg_mac,
            ipv6_router: self.ipv6_router.clone(),
            resolved: self.address_state.mask(),
            plugins: self.plugins.names(),
        }
    }

    /// Binds the client to the transport it sends through. Only one binding is allowed.
    pub fn bind_transport(&mut self, transport: Box<dyn ClientTransport>) -> Result<(), ClientError> {
        if self.transport.is_some() {
            return Err(ClientError::TransportAlreadyBound(self.config.mac));
        }
        self.transport = Some(transport);
        Ok(())
    }

    pub fn transport<T: ClientTransport>(&self) -> Option<&T> {
        self.transport.as_ref()?.as_any().downcast_ref::<T>()
    }

    pub fn transport_mut<T: ClientTransport>(&mut self) -> Option<&mut T> {
        self.transport.as_mut()?.as_any_mut().downcast_mut::<T>()
    }

    pub fn transport_name(&self) -> Option<&str> {
        self.transport.as_ref().map(|t| t.name())
    }

    /// Teardown: the resolution timer goes first, then the plugins, then the transport.
    pub fn on_remove(&mut self, timer: &mut dyn Timer) {
        self.address_state.stop(timer);
        self.plugins.on_remove();
        if let Some(mut transport) = self.transport.take() {
            transport.on_remove();
        }
    }
}
