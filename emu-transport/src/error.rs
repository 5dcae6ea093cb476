use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("cannot bind {endpoint}")]
    Bind {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    #[error("cannot resolve {endpoint}")]
    Resolve {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    /// The transport uses `port` and `port + 1`.
    #[error("port {0} leaves no room for the paired port")]
    PortRange(u16),

    #[error("receive worker already started")]
    AlreadyStarted,

    #[error("cannot spawn receive worker")]
    Spawn(#[source] io::Error),
}

/// Why an inbound message was rejected. A rejected message delivers none of its packets.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    #[error("message of {len} bytes is shorter than a batch header")]
    TooShort { len: usize },

    #[error("bad batch magic {0:#06x}")]
    BadBatchMagic(u16),

    #[error("packet {index}: header runs past the end of the message")]
    TruncatedPacketHeader { index: usize },

    #[error("packet {index}: bad packet magic {magic:#04x}")]
    BadPacketMagic { index: usize, magic: u8 },

    #[error("packet {index}: {declared} byte payload, {available} bytes left")]
    TruncatedPayload {
        index: usize,
        declared: usize,
        available: usize,
    },
}
