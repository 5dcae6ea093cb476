//! A namespace is one tunnel key's worth of clients: every client in it sends and receives
//! with the same virtual port and tag stack.

mod table;
pub use self::table::*;

use crate::client::{Client, ClientConfig, ResolvePhase};
use crate::error::ClientError;
use crate::timer::TimerWheel;
use crate::tunnel::TunnelKey;
use emu_packets::MacAddr;
use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::Duration;
use tracing::debug;

/// Client counters of one namespace.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClientStats {
    pub add_clients: u64,
    pub remove_clients: u64,
    pub active_clients: u64,
}

pub struct Namespace {
    key: TunnelKey,
    clients: ClientTable<Client>,
    by_mac: HashMap<MacAddr, ClientId>,
    by_ipv4: HashMap<Ipv4Addr, ClientId>,
    wheel: TimerWheel,
    stats: ClientStats,
}

impl Namespace {
    /// `tick` is the wall-clock length of one [`advance`](Namespace::advance) step.
    pub fn new(key: TunnelKey, tick: Duration) -> Self {
        Namespace {
            key,
            clients: ClientTable::new(),
            by_mac: HashMap::new(),
            by_ipv4: HashMap::new(),
            wheel: TimerWheel::new(tick),
            stats: ClientStats::default(),
        }
    }

    pub fn key(&self) -> &TunnelKey {
        &self.key
    }

    pub fn vport(&self) -> u16 {
        self.key.vport()
    }

    pub fn stats(&self) -> ClientStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Ticks elapsed since the namespace was created.
    pub fn now(&self) -> u64 {
        self.wheel.now()
    }

    pub fn timer_wheel(&self) -> &TimerWheel {
        &self.wheel
    }

    /// Adds a client. MAC addresses must be unique, as must non-zero IPv4 addresses.
    /// Resolution does not start until [`start_resolve`](Namespace::start_resolve).
    pub fn add_client(&mut self, config: ClientConfig) -> Result<ClientId, ClientError> {
        if self.by_mac.contains_key(&config.mac) {
            return Err(ClientError::DuplicateMac(config.mac));
        }
        let ipv4 = config.ipv4;
        if !ipv4.is_unspecified() && self.by_ipv4.contains_key(&ipv4) {
            return Err(ClientError::DuplicateIpv4(ipv4));
        }

        let mac = config.mac;
        let id = self.clients.insert(Client::new(config));
        self.by_mac.insert(mac, id);
        if !ipv4.is_unspecified() {
            self.by_ipv4.insert(ipv4, id);
        }
        self.stats.add_clients += 1;
        self.stats.active_clients += 1;
        debug!(namespace = %self.key, client = %mac, ?id, "client added");
        Ok(id)
    }

    /// Removes a client. Its resolution timer is cancelled before its plugins and transport
    /// are torn down, whatever state resolution was in.
    pub fn remove_client(&mut self, id: ClientId) -> Result<Client, ClientError> {
        let client = self
            .clients
            .get_mut(id)
            .ok_or(ClientError::UnknownClient(id))?;
        client.on_remove(&mut self.wheel.handle(id));

        let mac = client.mac();
        let ipv4 = client.config().ipv4;
        self.by_mac.remove(&mac);
        if self.by_ipv4.get(&ipv4) == Some(&id) {
            self.by_ipv4.remove(&ipv4);
        }
        self.stats.remove_clients += 1;
        self.stats.active_clients -= 1;
        debug!(namespace = %self.key, client = %mac, ?id, "client removed");
        self.clients
            .remove(id)
            .ok_or(ClientError::UnknownClient(id))
    }

    pub fn client(&self, id: ClientId) -> Option<&Client> {
        self.clients.get(id)
    }

    pub fn client_mut(&mut self, id: ClientId) -> Option<&mut Client> {
        self.clients.get_mut(id)
    }

    pub fn client_by_mac(&self, mac: &MacAddr) -> Option<(ClientId, &Client)> {
        let id = *self.by_mac.get(mac)?;
        self.clients.get(id).map(|client| (id, client))
    }

    pub fn client_by_ipv4(&self, ipv4: &Ipv4Addr) -> Option<(ClientId, &Client)> {
        let id = *self.by_ipv4.get(ipv4)?;
        self.clients.get(id).map(|client| (id, client))
    }

    /// Clients in the order they were added.
    pub fn iter(&self) -> impl Iterator<Item = (ClientId, &Client)> {
        self.clients.iter()
    }

    pub fn start_resolve(&mut self, id: ClientId) -> Result<(), ClientError> {
        let client = self
            .clients
            .get_mut(id)
            .ok_or(ClientError::UnknownClient(id))?;
        client.start_resolve(&mut self.wheel.handle(id));
        Ok(())
    }

    pub fn resolve_phase(&self, id: ClientId) -> Option<ResolvePhase> {
        let client = self.clients.get(id)?;
        Some(client.address_state().phase_for(self.wheel.is_armed(id)))
    }

    /// Moves time forward `ticks` ticks, running each expired resolution timer in turn.
    /// Returns how many timers fired.
    pub fn advance(&mut self, ticks: u64) -> usize {
        let mut fired = 0;
        for _ in 0..ticks {
            for id in self.wheel.expire() {
                if let Some(client) = self.clients.get_mut(id) {
                    client.on_resolve_tick(&mut self.wheel.handle(id));
                    fired += 1;
                }
            }
        }
        fired
    }

    /// Changes a client's IPv4 address and re-indexes it.
    pub fn update_client_ipv4(&mut self, id: ClientId, ipv4: Ipv4Addr) -> Result<(), ClientError> {
        if !ipv4.is_unspecified() {
            if let Some(&owner) = self.by_ipv4.get(&ipv4) {
                if owner != id {
                    return Err(ClientError::DuplicateIpv4(ipv4));
                }
            }
        }
        let client = self
            .clients
            .get_mut(id)
            .ok_or(ClientError::UnknownClient(id))?;
        let old = client.config().ipv4;
        client.config_mut().ipv4 = ipv4;

        if self.by_ipv4.get(&old) == Some(&id) {
            self.by_ipv4.remove(&old);
        }
        if !ipv4.is_unspecified() {
            self.by_ipv4.insert(ipv4, id);
        }
        Ok(())
    }

    pub fn update_client_dg_ipv4(&mut self, id: ClientId, dg: Ipv4Addr) -> Result<(), ClientError> {
        self.clients
            .get_mut(id)
            .ok_or(ClientError::UnknownClient(id))?
            .update_dg_ipv4(dg);
        Ok(())
    }

    pub fn update_client_ipv6(&mut self, id: ClientId, ipv6: Ipv6Addr) -> Result<(), ClientError> {
        self.clients
            .get_mut(id)
            .ok_or(ClientError::UnknownClient(id))?
            .config_mut()
            .ipv6 = ipv6;
        Ok(())
    }

    pub fn update_client_dhcp_ipv6(
        &mut self,
        id: ClientId,
        ipv6: Ipv6Addr,
    ) -> Result<(), ClientError> {
        self.clients
            .get_mut(id)
            .ok_or(ClientError::UnknownClient(id))?
            .set_dhcp_ipv6(ipv6);
        Ok(())
    }
}
