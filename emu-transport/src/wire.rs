//! Batch framing between the emulator and the packet I/O process.
//!
//! ```text
//! batch   := header packet*
//! header  := u32 BE  (0xBEEF << 16) | count
//! packet  := u32 BE  (0xAA << 24) | (vport & 0xff) << 16 | len, then len bytes
//! ```

use crate::error::ParseError;
use std::convert::TryInto;

pub const BATCH_MAGIC: u16 = 0xBEEF;
pub const PACKET_MAGIC: u8 = 0xAA;

pub const BATCH_HEADER_LEN: usize = 4;
pub const PACKET_HEADER_LEN: usize = 4;

/// A batch is flushed once it holds this many packets.
pub const MAX_BATCH_PACKETS: usize = 64;

/// A batch is flushed before its payload would reach this many bytes.
pub const MAX_BATCH_BYTES: usize = 32 * 1024;

/// Largest payload the 16-bit length field can describe.
pub const MAX_FRAME_LEN: usize = 0xFFFF;

pub fn batch_header(count: u16) -> [u8; BATCH_HEADER_LEN] {
    ((u32::from(BATCH_MAGIC) << 16) | u32::from(count)).to_be_bytes()
}

/// Only the low byte of `vport` fits on the wire.
pub fn packet_header(vport: u16, len: u16) -> [u8; PACKET_HEADER_LEN] {
    let word = (u32::from(PACKET_MAGIC) << 24) | (u32::from(vport & 0xFF) << 16) | u32::from(len);
    word.to_be_bytes()
}

/// One packet of a parsed batch, borrowing from the message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WirePacket<'a> {
    pub vport: u8,
    pub data: &'a [u8],
}

/// Parses a whole batch. Any defect rejects the entire message, so callers never see part of
/// a malformed batch. Bytes after the last declared packet are ignored.
pub fn parse_batch(msg: &[u8]) -> Result<Vec<WirePacket<'_>>, ParseError> {
    if msg.len() < BATCH_HEADER_LEN {
        return Err(ParseError::TooShort { len: msg.len() });
    }
    let header = read_u32(msg, 0);
    let magic = (header >> 16) as u16;
    if magic != BATCH_MAGIC {
        return Err(ParseError::BadBatchMagic(magic));
    }
    let count = (header & 0xFFFF) as usize;

    let mut packets = Vec::with_capacity(count);
    let mut offset = BATCH_HEADER_LEN;
    for index in 0..count {
        if msg.len() < offset + PACKET_HEADER_LEN {
            return Err(ParseError::TruncatedPacketHeader { index });
        }
        let header = read_u32(msg, offset);
        let magic = (header >> 24) as u8;
        if magic != PACKET_MAGIC {
            return Err(ParseError::BadPacketMagic { index, magic });
        }
        let vport = (header >> 16) as u8;
        let len = (header & 0xFFFF) as usize;
        let start = offset + PACKET_HEADER_LEN;
        if msg.len() < start + len {
            return Err(ParseError::TruncatedPayload {
                index,
                declared: len,
                available: msg.len() - start,
            });
        }
        packets.push(WirePacket {
            vport,
            data: &msg[start..start + len],
        });
        offset = start + len;
    }
    Ok(packets)
}

fn read_u32(msg: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes(msg[offset..offset + 4].try_into().unwrap())
}

/// Accumulates packets into one batch message.
#[derive(Debug, Default)]
pub struct BatchWriter {
    buf: Vec<u8>,
    count: u16,
}

impl BatchWriter {
    pub fn new() -> Self {
        BatchWriter {
            buf: Vec::with_capacity(MAX_BATCH_BYTES + BATCH_HEADER_LEN),
            count: 0,
        }
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.buf.extend_from_slice(&batch_header(0));
        self.count = 0;
    }

    /// Appends one packet. `data` must fit the 16-bit length field.
    pub fn push(&mut self, vport: u16, data: &[u8]) {
        assert!(data.len() <= MAX_FRAME_LEN, "frame too long for the wire");
        if self.buf.is_empty() {
            self.clear();
        }
        self.buf
            .extend_from_slice(&packet_header(vport, data.len() as u16));
        self.buf.extend_from_slice(data);
        self.count += 1;
    }

    pub fn count(&self) -> u16 {
        self.count
    }

    /// The finished message, header patched with the packet count.
    pub fn finish(&mut self) -> &[u8] {
        if self.buf.is_empty() {
            self.clear();
        }
        let header = batch_header(self.count);
        self.buf[..BATCH_HEADER_LEN].copy_from_slice(&header);
        &self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout() {
        assert_eq!(batch_header(2), [0xBE, 0xEF, 0x00, 0x02]);
        assert_eq!(packet_header(0x0103, 0x0040), [0xAA, 0x03, 0x00, 0x40]);
    }

    #[test]
    fn writer_then_parse() {
        let mut writer = BatchWriter::new();
        writer.push(1, &[1, 2, 3]);
        writer.push(2, &[]);
        writer.push(3, &[9; 70]);
        let msg = writer.finish().to_vec();
        assert_eq!(&msg[..4], &[0xBE, 0xEF, 0, 3]);
        assert_eq!(msg.len(), 4 + 3 * 4 + 3 + 70);

        let packets = parse_batch(&msg).unwrap();
        assert_eq!(packets.len(), 3);
        assert_eq!(packets[0], WirePacket { vport: 1, data: &[1, 2, 3] });
        assert!(packets[1].data.is_empty());
        assert_eq!(packets[2].vport, 3);
        assert_eq!(packets[2].data.len(), 70);
    }

    #[test]
    fn empty_batch() {
        let mut writer = BatchWriter::new();
        assert_eq!(writer.finish(), &[0xBE, 0xEF, 0, 0]);
        assert!(parse_batch(&batch_header(0)).unwrap().is_empty());
    }

    #[test]
    fn rejects_short_and_bad_magic() {
        assert_eq!(parse_batch(&[0xBE, 0xEF]), Err(ParseError::TooShort { len: 2 }));
        assert_eq!(
            parse_batch(&[0xDE, 0xAD, 0, 0]),
            Err(ParseError::BadBatchMagic(0xDEAD))
        );

        let mut msg = batch_header(1).to_vec();
        msg.extend_from_slice(&[0xAB, 0, 0, 0]);
        assert_eq!(
            parse_batch(&msg),
            Err(ParseError::BadPacketMagic { index: 0, magic: 0xAB })
        );
    }

    #[test]
    fn count_beyond_message_rejects_everything() {
        let mut writer = BatchWriter::new();
        writer.push(1, &[0; 10]);
        writer.push(1, &[0; 10]);
        let mut msg = writer.finish().to_vec();
        // claim a third packet
        msg[3] = 3;
        assert_eq!(
            parse_batch(&msg),
            Err(ParseError::TruncatedPacketHeader { index: 2 })
        );

        msg[3] = 2;
        msg.truncate(msg.len() - 1);
        assert_eq!(
            parse_batch(&msg),
            Err(ParseError::TruncatedPayload {
                index: 1,
                declared: 10,
                available: 9,
            })
        );
    }
}
