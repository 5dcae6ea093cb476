use emu_packets::{VlanTag, VLAN_ETHER_TYPE};
use std::convert::TryInto;
use std::fmt;
use std::str::FromStr;

/// Tag stack capacity of a key.
pub const MAX_VLAN_TAGS: usize = 2;

const KEY_LEN: usize = 2 + 4 * MAX_VLAN_TAGS;

/// Priority bits are not part of a key; they are applied again when a frame is tagged.
const PCP_MASK: u32 = 0xE000;

/// Decoded form of a [`TunnelKey`]. Each VLAN slot holds the full tag word (TPID in the high
/// half, TCI in the low half); zero means the slot is empty. Occupied slots come first.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TunnelData {
    pub vport: u16,
    pub vlans: [u32; MAX_VLAN_TAGS],
}

/// Fixed-size lookup key for a routing domain: virtual port, then up to two tag words with
/// their priority bits cleared, all big-endian.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TunnelKey([u8; KEY_LEN]);

impl TunnelKey {
    pub fn new(data: &TunnelData) -> TunnelKey {
        let mut key = [0u8; KEY_LEN];
        key[0..2].copy_from_slice(&data.vport.to_be_bytes());
        let occupied = data.vlans.iter().filter(|&&word| word != 0);
        for (slot, word) in occupied.enumerate() {
            let start = 2 + slot * 4;
            key[start..start + 4].copy_from_slice(&(word & !PCP_MASK).to_be_bytes());
        }
        TunnelKey(key)
    }

    /// Key for a port and tag stack, outermost tag first. Tags past the capacity are ignored.
    pub fn from_tags(vport: u16, tags: &[VlanTag]) -> TunnelKey {
        let mut data = TunnelData {
            vport,
            ..TunnelData::default()
        };
        for (slot, tag) in data.vlans.iter_mut().zip(tags) {
            *slot = tag.to_word();
        }
        TunnelKey::new(&data)
    }

    pub fn data(&self) -> TunnelData {
        let mut data = TunnelData {
            vport: self.vport(),
            ..TunnelData::default()
        };
        for (slot, word) in data.vlans.iter_mut().enumerate() {
            let start = 2 + slot * 4;
            *word = u32::from_be_bytes(self.0[start..start + 4].try_into().unwrap());
        }
        data
    }

    pub fn vport(&self) -> u16 {
        u16::from_be_bytes([self.0[0], self.0[1]])
    }

    /// Occupied tags, outermost first, priority 0.
    pub fn tags(&self) -> Vec<VlanTag> {
        self.data()
            .vlans
            .iter()
            .filter(|&&word| word != 0)
            .map(|&word| VlanTag::from_word(word))
            .collect()
    }

    pub fn vlan_ids(&self) -> Vec<u16> {
        self.tags().into_iter().map(VlanTag::vid).collect()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// `vport`, `vport/vid` or `vport/vid,vid`. A tag other than 802.1Q is written with its
/// protocol id in hex: `vport/88a8:100,200`.
impl fmt::Display for TunnelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.vport())?;
        for (i, tag) in self.tags().into_iter().enumerate() {
            f.write_str(if i == 0 { "/" } else { "," })?;
            if tag.tpid != VLAN_ETHER_TYPE {
                write!(f, "{:04x}:", tag.tpid)?;
            }
            write!(f, "{}", tag.vid())?;
        }
        Ok(())
    }
}

impl FromStr for TunnelKey {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (vport, tags) = match s.find('/') {
            Some(slash) => (&s[..slash], Some(&s[slash + 1..])),
            None => (s, None),
        };
        let vport = vport.parse::<u16>().map_err(|_| "invalid virtual port")?;

        let mut parsed = Vec::new();
        if let Some(tags) = tags {
            for tag in tags.split(',') {
                if parsed.len() == MAX_VLAN_TAGS {
                    return Err("too many VLAN tags");
                }
                parsed.push(parse_tag(tag.trim())?);
            }
        }
        Ok(TunnelKey::from_tags(vport, &parsed))
    }
}

fn parse_tag(s: &str) -> Result<VlanTag, &'static str> {
    let (tpid, vid) = match s.find(':') {
        Some(colon) => {
            let tpid = u16::from_str_radix(&s[..colon], 16).map_err(|_| "invalid tag protocol id")?;
            (tpid, &s[colon + 1..])
        }
        None => (VLAN_ETHER_TYPE, s),
    };
    let vid = vid.parse::<u16>().map_err(|_| "invalid VLAN id")?;
    if vid == 0 || vid > 0x0FFF {
        return Err("VLAN id out of range");
    }
    Ok(VlanTag {
        tpid,
        tci: vid,
    })
}
