use crate::client::PbitList;
use crate::error::TunnelError;
use crate::tunnel::key::{TunnelKey, MAX_VLAN_TAGS};
use emu_packets::{VlanTag, VlanTags, ETHER_TYPE_OFFSET, VLAN_TAG_LEN};

/// Reads the tag stack of `frame` into a key for virtual port `vport`.
///
/// Frames with more tags than a key can hold are rejected rather than truncated.
pub fn decode(frame: &[u8], vport: u16) -> Result<TunnelKey, TunnelError> {
    let (tags, _) = tag_stack(frame)?;
    Ok(TunnelKey::from_tags(vport, &tags))
}

/// Wire bytes of the key's tags, priority taken from `pbits` by slot.
pub fn tag_bytes(key: &TunnelKey, pbits: &PbitList) -> Vec<u8> {
    let tags = key.tags();
    let mut bytes = Vec::with_capacity(tags.len() * VLAN_TAG_LEN);
    for (tag, &pcp) in tags.into_iter().zip(pbits.iter()) {
        bytes.extend_from_slice(&tag.with_pcp(pcp).to_bytes());
    }
    bytes
}

/// Replaces the tag stack of `frame` with the tags of `key`.
///
/// Both MAC addresses and everything from the next-layer EtherType on are kept as they are.
/// The frame grows or shrinks by four bytes per tag added or removed; length fields inside the
/// payload are the caller's concern.
pub fn encode(key: &TunnelKey, frame: &[u8], pbits: &PbitList) -> Result<Vec<u8>, TunnelError> {
    let (_, ether_type_offset) = tag_stack(frame)?;
    let tags = tag_bytes(key, pbits);
    let tail = &frame[ether_type_offset..];

    let mut out = Vec::with_capacity(ETHER_TYPE_OFFSET + tags.len() + tail.len());
    out.extend_from_slice(&frame[..ETHER_TYPE_OFFSET]);
    out.extend_from_slice(&tags);
    out.extend_from_slice(tail);
    Ok(out)
}

/// The tags of `frame`, outermost first, and the offset of the EtherType after them.
fn tag_stack(frame: &[u8]) -> Result<(Vec<VlanTag>, usize), TunnelError> {
    if frame.len() < ETHER_TYPE_OFFSET + 2 {
        return Err(TunnelError::FrameTooShort { len: frame.len() });
    }
    let mut walk = VlanTags::new(frame);
    let mut tags = Vec::with_capacity(MAX_VLAN_TAGS);
    while let Some(tag) = walk.next() {
        let tag = tag.map_err(|_| TunnelError::TruncatedTag {
            offset: walk.ether_type_offset(),
        })?;
        if tags.len() == MAX_VLAN_TAGS {
            return Err(TunnelError::TooManyTags {
                max: MAX_VLAN_TAGS,
            });
        }
        tags.push(tag);
    }
    Ok((tags, walk.ether_type_offset()))
}
