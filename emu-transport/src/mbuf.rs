use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// A frame buffer tagged with its virtual port. It may be made of several segments; only a
/// contiguous (single-segment) buffer can be put on the wire.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Mbuf {
    vport: u16,
    segs: Vec<Vec<u8>>,
}

impl Mbuf {
    pub fn vport(&self) -> u16 {
        self.vport
    }

    pub fn set_vport(&mut self, vport: u16) {
        self.vport = vport;
    }

    pub fn is_contiguous(&self) -> bool {
        self.segs.len() <= 1
    }

    pub fn pkt_len(&self) -> usize {
        self.segs.iter().map(Vec::len).sum()
    }

    /// Appends to the last segment.
    pub fn append(&mut self, bytes: &[u8]) {
        match self.segs.last_mut() {
            Some(seg) => seg.extend_from_slice(bytes),
            None => self.segs.push(bytes.to_vec()),
        }
    }

    /// Chains a new segment, making the buffer non-contiguous.
    pub fn append_segment(&mut self, bytes: Vec<u8>) {
        self.segs.push(bytes);
    }

    /// The bytes of a contiguous buffer.
    ///
    /// # Panics
    ///
    /// Panics on a chained buffer; normalise it with [`MbufPool::contiguous`] first.
    pub fn data(&self) -> &[u8] {
        assert!(self.is_contiguous(), "mbuf should be contiguous");
        self.segs.first().map(Vec::as_slice).unwrap_or(&[])
    }

    /// # Panics
    ///
    /// Panics on a chained buffer, like [`data`](Mbuf::data).
    pub fn data_mut(&mut self) -> &mut [u8] {
        assert!(self.is_contiguous(), "mbuf should be contiguous");
        match self.segs.first_mut() {
            Some(seg) => seg.as_mut_slice(),
            None => &mut [],
        }
    }

    /// Every segment in order, copied into one vector.
    pub fn to_vec(&self) -> Vec<u8> {
        self.segs.concat()
    }
}

/// Source of frame buffers. Every buffer handed out comes back through [`free`].
///
/// [`free`]: MbufPool::free
pub trait MbufPool: Send + Sync {
    fn alloc(&self, capacity: usize) -> Mbuf;

    /// A single-segment copy of `m`. The original is left to the caller to free.
    fn contiguous(&self, m: &Mbuf) -> Mbuf;

    fn free(&self, m: Mbuf);
}

/// Heap-backed pool that keeps count of outstanding buffers.
#[derive(Debug, Default)]
pub struct HeapPool {
    in_use: AtomicUsize,
    allocated: AtomicU64,
}

impl HeapPool {
    pub fn new() -> Self {
        HeapPool::default()
    }

    /// Buffers handed out and not yet freed.
    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Relaxed)
    }

    pub fn allocated(&self) -> u64 {
        self.allocated.load(Ordering::Relaxed)
    }
}

impl MbufPool for HeapPool {
    fn alloc(&self, capacity: usize) -> Mbuf {
        self.in_use.fetch_add(1, Ordering::Relaxed);
        self.allocated.fetch_add(1, Ordering::Relaxed);
        Mbuf {
            vport: 0,
            segs: vec![Vec::with_capacity(capacity)],
        }
    }

    fn contiguous(&self, m: &Mbuf) -> Mbuf {
        let mut copy = self.alloc(m.pkt_len());
        copy.vport = m.vport;
        copy.append(&m.to_vec());
        copy
    }

    fn free(&self, m: Mbuf) {
        drop(m);
        self.in_use.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contiguous_copy() {
        let pool = HeapPool::new();
        let mut m = pool.alloc(8);
        m.set_vport(3);
        m.append(&[1, 2]);
        m.append_segment(vec![3, 4]);
        assert!(!m.is_contiguous());
        assert_eq!(m.pkt_len(), 4);

        let c = pool.contiguous(&m);
        assert!(c.is_contiguous());
        assert_eq!(c.data(), &[1, 2, 3, 4]);
        assert_eq!(c.vport(), 3);
        assert_eq!(pool.in_use(), 2);

        pool.free(m);
        pool.free(c);
        assert_eq!(pool.in_use(), 0);
        assert_eq!(pool.allocated(), 2);
    }

    #[test]
    #[should_panic(expected = "contiguous")]
    fn chained_data_panics() {
        let mut m = HeapPool::new().alloc(0);
        m.append_segment(vec![1]);
        m.data();
    }

    #[test]
    fn data_mut_edits_in_place() {
        let pool = HeapPool::new();
        let mut m = pool.alloc(4);
        m.append(&[0; 4]);
        m.data_mut()[0] = 7;
        assert_eq!(m.data(), &[7, 0, 0, 0]);
        pool.free(m);
    }
}
