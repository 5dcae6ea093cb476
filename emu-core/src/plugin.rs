use crate::client::ResolvedMask;
use std::net::Ipv4Addr;

/// Change notifications a client emits to the protocol modules attached to it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientEvent {
    /// At least one more address family learned its gateway MAC. Carries the mask before and
    /// after the tick that resolved it.
    GatewayMacResolved { old: ResolvedMask, new: ResolvedMask },
    Ipv4GatewayUpdated { old: Ipv4Addr, new: Ipv4Addr },
}

/// Fire-and-forget receiver of client events. Nothing is acknowledged or retried.
pub trait NotificationSink {
    fn notify(&mut self, event: &ClientEvent);
}

/// A protocol module attached to one client (ARP, neighbor discovery, DHCP, ...).
pub trait ClientPlugin: Send {
    fn name(&self) -> &str;

    fn on_event(&mut self, event: &ClientEvent);

    /// Called once when the owning client is removed, after its resolution timer is gone.
    fn on_remove(&mut self) {}
}

/// The plugins of one client, notified in registration order.
#[derive(Default)]
pub struct PluginSet {
    plugins: Vec<Box<dyn ClientPlugin>>,
}

impl PluginSet {
    pub fn new() -> Self {
        PluginSet::default()
    }

    pub fn register(&mut self, plugin: Box<dyn ClientPlugin>) {
        self.plugins.push(plugin);
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.plugins.iter().map(|p| p.name().to_string()).collect()
    }

    /// Tears every plugin down and forgets it.
    pub fn on_remove(&mut self) {
        for mut plugin in self.plugins.drain(..) {
            plugin.on_remove();
        }
    }
}

impl NotificationSink for PluginSet {
    fn notify(&mut self, event: &ClientEvent) {
        for plugin in self.plugins.iter_mut() {
            plugin.on_event(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl ClientPlugin for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        fn on_event(&mut self, event: &ClientEvent) {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}:{:?}", self.name, event));
        }

        fn on_remove(&mut self) {
            self.log.lock().unwrap().push(format!("{}:removed", self.name));
        }
    }

    #[test]
    fn fan_out_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut set = PluginSet::new();
        set.register(Box::new(Recorder {
            name: "arp",
            log: Arc::clone(&log),
        }));
        set.register(Box::new(Recorder {
            name: "ipv6",
            log: Arc::clone(&log),
        }));
        assert_eq!(set.names(), vec!["arp", "ipv6"]);

        set.notify(&ClientEvent::GatewayMacResolved {
            old: ResolvedMask::EMPTY,
            new: ResolvedMask::IPV4,
        });
        set.on_remove();
        assert!(set.is_empty());

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 4);
        assert!(log[0].starts_with("arp:GatewayMacResolved"));
        assert!(log[1].starts_with("ipv6:GatewayMacResolved"));
        assert_eq!(log[2], "arp:removed");
        assert_eq!(log[3], "ipv6:removed");
    }
}
