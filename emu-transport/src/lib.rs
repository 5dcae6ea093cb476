//! Frame transport between the emulator and the packet I/O process: batch framing, the
//! channels carrying batches, and the receive worker feeding the emulator's packet handler.

/// Message channels: stream sockets over an ipc path or tcp, and an in-process pair.
pub mod channel;

pub mod config;
pub use self::config::*;

pub mod error;
pub use self::error::*;

/// Wireshark K12 text dumps of every frame crossing the transport.
pub mod k12;

/// Frame buffers and the pool they come from.
pub mod mbuf;

mod rx;

pub mod stats;

/// The transport itself.
pub mod veth;
pub use self::veth::*;

/// Bit-exact batch framing.
pub mod wire;
