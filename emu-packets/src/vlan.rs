use crate::*;
use std::convert::TryInto;

/// Bytes a single stacked tag adds to an Ethernet II header.
pub const VLAN_TAG_LEN: usize = 4;

/// Offset of the outermost EtherType field, right after both MAC addresses.
pub const ETHER_TYPE_OFFSET: usize = 12;

pub fn is_tag_ether_type(ether_type: u16) -> bool {
    ether_type == VLAN_ETHER_TYPE || ether_type == QINQ_ETHER_TYPE
}

/// One 802.1Q / 802.1ad tag: the tag protocol identifier followed by the tag control
/// information (3 bits priority, 1 bit drop eligible, 12 bits VLAN id).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct VlanTag {
    pub tpid: u16,
    pub tci: u16,
}

impl VlanTag {
    /// A customer tag with priority 0.
    pub fn new(vid: u16) -> VlanTag {
        VlanTag {
            tpid: VLAN_ETHER_TYPE,
            tci: vid & 0x0FFF,
        }
    }

    /// Builds a tag from the 32-bit word found on the wire (TPID in the high half).
    pub fn from_word(word: u32) -> VlanTag {
        VlanTag {
            tpid: (word >> 16) as u16,
            tci: word as u16,
        }
    }

    pub fn to_word(self) -> u32 {
        (u32::from(self.tpid) << 16) | u32::from(self.tci)
    }

    pub fn vid(self) -> u16 {
        self.tci & 0x0FFF
    }

    pub fn pcp(self) -> u8 {
        (self.tci >> 13) as u8
    }

    pub fn with_pcp(self, pcp: u8) -> VlanTag {
        VlanTag {
            tpid: self.tpid,
            tci: (self.tci & 0x1FFF) | ((u16::from(pcp) << 13) & 0xE000),
        }
    }

    pub fn to_bytes(self) -> [u8; VLAN_TAG_LEN] {
        self.to_word().to_be_bytes()
    }
}

/// Walks the tag stack of an Ethernet II frame, outermost tag first.
///
/// Iteration stops at the first EtherType that is not a tag protocol identifier. A tag that
/// runs past the end of the buffer yields an error and ends the walk.
pub struct VlanTags<'a> {
    data: &'a [u8],
    offset: usize,
    done: bool,
}

impl<'a> VlanTags<'a> {
    pub fn new(data: &'a [u8]) -> VlanTags<'a> {
        VlanTags {
            data,
            offset: ETHER_TYPE_OFFSET,
            done: false,
        }
    }

    /// Offset of the EtherType field following the tags consumed so far. Once the iterator
    /// returned `None`, this is the offset of the next-layer EtherType.
    pub fn ether_type_offset(&self) -> usize {
        self.offset
    }

    fn ether_type_at(&self, offset: usize) -> Option<u16> {
        self.data
            .get(offset..offset + 2)
            .map(|b| u16::from_be_bytes(b.try_into().unwrap()))
    }
}

impl<'a> Iterator for VlanTags<'a> {
    type Item = Result<VlanTag, &'static str>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let ether_type = match self.ether_type_at(self.offset) {
            Some(ether_type) => ether_type,
            None => {
                self.done = true;
                return Some(Err("Frame ends before its EtherType"));
            }
        };
        if !is_tag_ether_type(ether_type) {
            self.done = true;
            return None;
        }
        // The tag control field and the EtherType after it must both be present.
        if self.data.len() < self.offset + VLAN_TAG_LEN + 2 {
            self.done = true;
            return Some(Err("Frame ends inside a VLAN tag"));
        }
        let tci = u16::from_be_bytes(
            self.data[self.offset + 2..self.offset + 4]
                .try_into()
                .unwrap(),
        );
        self.offset += VLAN_TAG_LEN;
        Some(Ok(VlanTag {
            tpid: ether_type,
            tci,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(tags: &[u32], inner: u16) -> Vec<u8> {
        let mut data = vec![0xff; 6];
        data.extend_from_slice(&[1, 2, 3, 4, 5, 6]);
        for tag in tags {
            data.extend_from_slice(&tag.to_be_bytes());
        }
        data.extend_from_slice(&inner.to_be_bytes());
        data
    }

    #[test]
    fn untagged_frame_has_no_tags() {
        let data = header(&[], IPV4_ETHER_TYPE);
        let mut tags = VlanTags::new(&data);
        assert!(tags.next().is_none());
        assert_eq!(tags.ether_type_offset(), 12);
    }

    #[test]
    fn walks_stacked_tags_in_order() {
        let data = header(&[0x88A8_0064, 0x8100_a0c8], IPV6_ETHER_TYPE);
        let mut tags = VlanTags::new(&data);
        let outer = tags.next().unwrap().unwrap();
        let inner = tags.next().unwrap().unwrap();
        assert!(tags.next().is_none());

        assert_eq!(outer.tpid, QINQ_ETHER_TYPE);
        assert_eq!(outer.vid(), 100);
        assert_eq!(inner.vid(), 200);
        assert_eq!(inner.pcp(), 5);
        assert_eq!(tags.ether_type_offset(), 20);
    }

    #[test]
    fn truncated_tag_is_an_error() {
        let mut data = header(&[0x8100_0064], IPV4_ETHER_TYPE);
        data.truncate(15);
        let mut tags = VlanTags::new(&data);
        assert!(tags.next().unwrap().is_err());
        assert!(tags.next().is_none());
    }

    #[test]
    fn pcp_is_replaced_without_touching_vid() {
        let tag = VlanTag::from_word(0x8100_e123).with_pcp(2);
        assert_eq!(tag.vid(), 0x123);
        assert_eq!(tag.pcp(), 2);
        assert_eq!(tag.to_word(), 0x8100_4123);
    }
}
