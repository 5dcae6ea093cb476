use crate::error::TransportError;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Socket path prefix for ipc endpoints; the port and `.ipc` are appended.
pub const DEFAULT_IPC_PREFIX: &str = "/tmp/emu";

/// Environment switch turning tunnel-key rewriting on.
pub const TUNNEL_REWRITE_ENV: &str = "EMU_TUNNEL_REWRITE";

pub const DEFAULT_RX_QUEUE_DEPTH: usize = 256;
pub const DEFAULT_RX_RETRY_BACKOFF: Duration = Duration::from_millis(10);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EndpointKind {
    Ipc { prefix: PathBuf },
    Tcp { host: String },
}

/// One side of one direction of the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Endpoint {
    Ipc(PathBuf),
    Tcp { host: String, port: u16 },
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Ipc(path) => write!(f, "ipc://{}", path.display()),
            Endpoint::Tcp { host, port } => write!(f, "tcp://{}:{}", host, port),
        }
    }
}

/// Whether this side listens or dials. The proxy listens, the emulator dials.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Bind,
    Connect,
}

/// Endpoints of both directions as seen from one side.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoints {
    pub rx: Endpoint,
    pub tx: Endpoint,
    pub role: Role,
}

#[derive(Clone, Debug)]
pub struct TransportConfig {
    pub port: u16,
    pub kind: EndpointKind,
    pub proxy_mode: bool,
    pub tunnel_rewrite: bool,
    pub rx_queue_depth: usize,
    pub rx_retry_backoff: Duration,
}

impl TransportConfig {
    pub fn new(port: u16) -> Self {
        TransportConfig {
            port,
            kind: EndpointKind::Ipc {
                prefix: PathBuf::from(DEFAULT_IPC_PREFIX),
            },
            proxy_mode: false,
            tunnel_rewrite: false,
            rx_queue_depth: DEFAULT_RX_QUEUE_DEPTH,
            rx_retry_backoff: DEFAULT_RX_RETRY_BACKOFF,
        }
    }

    pub fn ipc(self, prefix: impl Into<PathBuf>) -> Self {
        TransportConfig {
            kind: EndpointKind::Ipc {
                prefix: prefix.into(),
            },
            ..self
        }
    }

    pub fn tcp(self, host: impl Into<String>) -> Self {
        TransportConfig {
            kind: EndpointKind::Tcp { host: host.into() },
            ..self
        }
    }

    pub fn proxy_mode(self, proxy_mode: bool) -> Self {
        TransportConfig { proxy_mode, ..self }
    }

    pub fn tunnel_rewrite(self, tunnel_rewrite: bool) -> Self {
        TransportConfig {
            tunnel_rewrite,
            ..self
        }
    }

    pub fn rx_queue_depth(self, rx_queue_depth: usize) -> Self {
        assert!(rx_queue_depth > 0, "rx_queue_depth must be positive");
        TransportConfig {
            rx_queue_depth,
            ..self
        }
    }

    pub fn rx_retry_backoff(self, rx_retry_backoff: Duration) -> Self {
        TransportConfig {
            rx_retry_backoff,
            ..self
        }
    }

    /// Turns rewriting on when the environment asks for it.
    pub fn from_env(self) -> Self {
        let enabled = rewrite_enabled(env::var(TUNNEL_REWRITE_ENV).ok().as_deref());
        TransportConfig {
            tunnel_rewrite: self.tunnel_rewrite || enabled,
            ..self
        }
    }

    pub fn endpoint(&self, port: u16) -> Endpoint {
        match &self.kind {
            EndpointKind::Ipc { prefix } => {
                let mut path = prefix.clone().into_os_string();
                path.push(format!("-{}.ipc", port));
                Endpoint::Ipc(PathBuf::from(path))
            }
            EndpointKind::Tcp { host } => Endpoint::Tcp {
                host: host.clone(),
                port,
            },
        }
    }

    /// The emulator receives on `port` and sends on `port + 1`; the proxy the other way
    /// round.
    pub fn endpoints(&self) -> Result<Endpoints, TransportError> {
        let paired = self
            .port
            .checked_add(1)
            .ok_or(TransportError::PortRange(self.port))?;
        let (rx, tx, role) = if self.proxy_mode {
            (paired, self.port, Role::Bind)
        } else {
            (self.port, paired, Role::Connect)
        };
        Ok(Endpoints {
            rx: self.endpoint(rx),
            tx: self.endpoint(tx),
            role,
        })
    }
}

/// `yes`, `1` and `true` (any case) enable; anything else, or nothing, disables.
pub fn rewrite_enabled(value: Option<&str>) -> bool {
    match value {
        Some(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "yes" | "1" | "true"),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emulator_endpoints() {
        let endpoints = TransportConfig::new(4510).endpoints().unwrap();
        assert_eq!(endpoints.role, Role::Connect);
        assert_eq!(endpoints.rx.to_string(), "ipc:///tmp/emu-4510.ipc");
        assert_eq!(endpoints.tx.to_string(), "ipc:///tmp/emu-4511.ipc");
    }

    #[test]
    fn proxy_swaps_ports() {
        let endpoints = TransportConfig::new(4510)
            .tcp("127.0.0.1")
            .proxy_mode(true)
            .endpoints()
            .unwrap();
        assert_eq!(endpoints.role, Role::Bind);
        assert_eq!(endpoints.rx.to_string(), "tcp://127.0.0.1:4511");
        assert_eq!(endpoints.tx.to_string(), "tcp://127.0.0.1:4510");
    }

    #[test]
    fn last_port_rejected() {
        assert!(matches!(
            TransportConfig::new(u16::MAX).endpoints(),
            Err(TransportError::PortRange(u16::MAX))
        ));
    }

    #[test]
    fn rewrite_switch_values() {
        assert!(rewrite_enabled(Some("yes")));
        assert!(rewrite_enabled(Some("1")));
        assert!(rewrite_enabled(Some("TRUE")));
        assert!(!rewrite_enabled(Some("no")));
        assert!(!rewrite_enabled(Some("")));
        assert!(!rewrite_enabled(None));
    }

    #[test]
    fn defaults() {
        let config = TransportConfig::new(1);
        assert_eq!(config.rx_queue_depth, DEFAULT_RX_QUEUE_DEPTH);
        assert_eq!(config.rx_retry_backoff, DEFAULT_RX_RETRY_BACKOFF);
        assert!(!config.proxy_mode);
        assert!(!config.tunnel_rewrite);
    }
}
