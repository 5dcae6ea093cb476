use crate::namespace::ClientId;
use emu_packets::MacAddr;
use std::net::Ipv4Addr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// None of the DHCP, static, or SLAAC addresses is available.
    #[error("no IPv6 source address for client {mac}")]
    NoSourceIpv6 { mac: MacAddr },

    #[error("a client with MAC {0} already exists")]
    DuplicateMac(MacAddr),

    #[error("a client with IPv4 {0} already exists")]
    DuplicateIpv4(Ipv4Addr),

    #[error("unknown client {0:?}")]
    UnknownClient(ClientId),

    #[error("client {0} is already bound to a transport")]
    TransportAlreadyBound(MacAddr),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TunnelError {
    #[error("frame of {len} bytes is shorter than an Ethernet header")]
    FrameTooShort { len: usize },

    #[error("frame carries more than {max} stacked VLAN tags")]
    TooManyTags { max: usize },

    #[error("frame ends inside a VLAN tag at offset {offset}")]
    TruncatedTag { offset: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranslationError {
    #[error("translation for {0} already exists")]
    Exists(String),

    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },
}
