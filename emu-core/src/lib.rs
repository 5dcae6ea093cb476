//! Client side of the emulator: per-client gateway MAC resolution, the namespaces that hold
//! clients, and the tunnel keys that tie a namespace to a virtual port and VLAN tag stack.

/// Emulated clients: configuration, gateway bindings, address derivation and the resolution
/// state machine that decides when unicast traffic may flow.
pub mod client;

/// Typed errors for client, tunnel and translation table operations.
pub mod error;
pub use self::error::*;

/// Collections of clients sharing one tunnel key, with the timer wheel that drives them.
pub mod namespace;

/// Event fan-out from a client to the protocol modules attached to it.
pub mod plugin;

/// Per-frame processors.
pub mod processor;

/// Shared tables consulted while frames are in flight.
pub mod state;

/// Timer trait and the tick wheel behind it.
pub mod timer;

/// Tunnel keys and the codec between keys and VLAN tag stacks.
pub mod tunnel;

/// Test helpers, public so that crates on top of this one can use them.
pub mod utils;
