use emu_packets::{MacAddr, VlanTag, IPV4_ETHER_TYPE};

/// An Ethernet II frame with the given tag stack (outermost first) and payload.
pub fn tagged_frame(
    dst: MacAddr,
    src: MacAddr,
    tags: &[VlanTag],
    ether_type: u16,
    payload: &[u8],
) -> Vec<u8> {
    let mut frame = Vec::with_capacity(14 + tags.len() * 4 + payload.len());
    frame.extend_from_slice(&dst.bytes);
    frame.extend_from_slice(&src.bytes);
    for tag in tags {
        frame.extend_from_slice(&tag.to_bytes());
    }
    frame.extend_from_slice(&ether_type.to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// A broadcast IPv4-typed frame carrying `payload`, tagged with the given VLAN ids.
pub fn frame_with_vlans(vids: &[u16], payload: &[u8]) -> Vec<u8> {
    let tags: Vec<VlanTag> = vids.iter().map(|&vid| VlanTag::new(vid)).collect();
    tagged_frame(
        MacAddr::BROADCAST,
        MacAddr::new([0, 0, 1, 0, 0, 1]),
        &tags,
        IPV4_ETHER_TYPE,
        payload,
    )
}

/// `len` bytes of a recognisable pattern, for checking payloads survive a trip intact.
pub fn pattern_payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
