use crate::IpProtocol;
use std::net::Ipv4Addr;

pub const IPV4_HEADER_LEN: usize = 20;

/// An option-less IPv4 header built in place. The total length starts out covering the
/// header alone; a caller that appends a payload patches that field and calls
/// [`set_checksum`](Ipv4Header::set_checksum) again.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ipv4Header {
    bytes: [u8; IPV4_HEADER_LEN],
}

impl Ipv4Header {
    pub fn new() -> Self {
        let mut bytes = [0; IPV4_HEADER_LEN];
        bytes[0] = 0x45;
        bytes[2..4].copy_from_slice(&(IPV4_HEADER_LEN as u16).to_be_bytes());
        Ipv4Header { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn set_ttl(&mut self, ttl: u8) {
        self.bytes[8] = ttl;
    }

    pub fn set_identification(&mut self, id: u16) {
        self.bytes[4..6].copy_from_slice(&id.to_be_bytes());
    }

    pub fn set_protocol(&mut self, protocol: IpProtocol) {
        self.bytes[9] = protocol.into();
    }

    pub fn set_src_addr(&mut self, addr: Ipv4Addr) {
        self.bytes[12..16].copy_from_slice(&addr.octets());
    }

    pub fn set_dest_addr(&mut self, addr: Ipv4Addr) {
        self.bytes[16..20].copy_from_slice(&addr.octets());
    }

    /// Recomputes the header checksum over the current fields.
    pub fn set_checksum(&mut self) {
        self.bytes[10..12].copy_from_slice(&[0, 0]);
        let checksum = !ones_complement_sum(&self.bytes);
        self.bytes[10..12].copy_from_slice(&checksum.to_be_bytes());
    }

    pub fn validate_checksum(&self) -> bool {
        ones_complement_sum(&self.bytes) == 0xFFFF
    }
}

impl Default for Ipv4Header {
    fn default() -> Self {
        Ipv4Header::new()
    }
}

fn ones_complement_sum(data: &[u8]) -> u16 {
    let mut sum = data
        .chunks_exact(2)
        .fold(0u32, |acc, x| acc + u32::from(u16::from_be_bytes([x[0], x[1]])));
    while sum > 0xFFFF {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    sum as u16
}
