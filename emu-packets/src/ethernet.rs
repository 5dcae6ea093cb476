use crate::*;
use std::borrow::Cow;
use std::convert::TryInto;

#[derive(Clone, Debug)]
pub struct EthernetFrame {
    pub data: PacketData,
    /// Offset of the EtherType naming the payload, after any stacked tags.
    pub ether_type_offset: usize,
    pub payload_offset: usize,
}

impl EthernetFrame {
    pub fn from_buffer(frame: PacketData) -> Result<EthernetFrame, &'static str> {
        // Ethernet II frames must be at least the header, which is 14bytes
        // 0                    6                    12          12+4n        14+4n
        // |---6 byte Dest_MAC--|---6 byte Src_MAC---|--n tags--|--EtherType--|
        if frame.len() < 14 {
            return Err("Frame is less than the minimum of 14 bytes");
        }

        let mut tags = VlanTags::new(&frame);
        for tag in &mut tags {
            tag?;
        }
        let ether_type_offset = tags.ether_type_offset();

        Ok(EthernetFrame {
            data: frame,
            ether_type_offset,
            payload_offset: ether_type_offset + 2,
        })
    }

    pub fn dest_mac(&self) -> MacAddr {
        MacAddr::new(self.data[0..6].try_into().unwrap())
    }

    pub fn src_mac(&self) -> MacAddr {
        MacAddr::new(self.data[6..12].try_into().unwrap())
    }

    pub fn set_dest_mac(&mut self, mac: MacAddr) {
        self.data[..6].copy_from_slice(&mac.bytes[..6]);
    }

    pub fn set_src_mac(&mut self, mac: MacAddr) {
        self.data[6..12].copy_from_slice(&mac.bytes[..6]);
    }

    /// EtherType of the payload, after skipping any tags.
    pub fn ether_type(&self) -> u16 {
        u16::from_be_bytes(
            self.data[self.ether_type_offset..self.ether_type_offset + 2]
                .try_into()
                .unwrap(),
        )
    }

    pub fn set_ether_type(&mut self, ether_type: u16) {
        let offset = self.ether_type_offset;
        self.data[offset..offset + 2].copy_from_slice(&ether_type.to_be_bytes());
    }

    /// The stacked tags in wire order. Tags were validated when the frame was built.
    pub fn vlan_tags(&self) -> Vec<VlanTag> {
        VlanTags::new(&self.data).filter_map(Result::ok).collect()
    }

    /// Replaces the tag stack, keeping both MAC addresses and everything from the
    /// payload EtherType onward.
    pub fn set_vlan_tags(&mut self, tags: &[VlanTag]) {
        let tail = self.data.split_off(self.ether_type_offset);
        self.data.truncate(ETHER_TYPE_OFFSET);
        self.data.reserve_exact(tags.len() * VLAN_TAG_LEN + tail.len());
        for tag in tags {
            self.data.extend_from_slice(&tag.to_bytes());
        }
        self.ether_type_offset = self.data.len();
        self.payload_offset = self.ether_type_offset + 2;
        self.data.extend(tail);
    }

    // This gives you a cow of a slice of the payload.
    pub fn payload(&self) -> Cow<[u8]> {
        Cow::from(&self.data[self.payload_offset..])
    }

    pub fn set_payload(&mut self, payload: &[u8]) {
        self.data.truncate(self.payload_offset);
        self.data.reserve_exact(payload.len());
        self.data.extend(payload);
    }
}

/// EthernetFrames are considered the same if they carry the same bytes.
impl PartialEq for EthernetFrame {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl Eq for EthernetFrame {}
