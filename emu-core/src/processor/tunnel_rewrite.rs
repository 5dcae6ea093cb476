use crate::client::{PbitList, PBIT_LIST_LEN};
use crate::processor::Processor;
use crate::state::TranslationTable;
use crate::tunnel;
use std::sync::Arc;
use tracing::trace;

/// A frame together with the virtual port it travels on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaggedFrame {
    pub vport: u16,
    pub data: Vec<u8>,
}

impl TaggedFrame {
    pub fn new(vport: u16, data: Vec<u8>) -> Self {
        TaggedFrame { vport, data }
    }
}

/// Moves frames between the local and the routed tunnel-key domain.
///
/// Frames arriving on the routed virtual port are mapped back to their local key, every other
/// frame is mapped to its routed key. Frames without a table entry, and frames whose tag stack
/// cannot be read, are dropped.
///
/// Priority bits come from the one list given to [`pbits`](TunnelRewrite::pbits) and apply to
/// every frame in both directions. The destination client's own list, which
/// `Client::l2_header` uses, is not consulted here.
pub struct TunnelRewrite {
    table: Arc<TranslationTable>,
    routed_vport: u16,
    pbits: PbitList,
    forwarded: u64,
    misses: u64,
    errors: u64,
}

impl TunnelRewrite {
    pub fn new(table: Arc<TranslationTable>, routed_vport: u16) -> Self {
        TunnelRewrite {
            table,
            routed_vport,
            pbits: [0; PBIT_LIST_LEN],
            forwarded: 0,
            misses: 0,
            errors: 0,
        }
    }

    /// Priority written into the rewritten tags, outermost first.
    pub fn pbits(self, pbits: PbitList) -> Self {
        TunnelRewrite { pbits, ..self }
    }

    pub fn routed_vport(&self) -> u16 {
        self.routed_vport
    }

    pub fn forwarded(&self) -> u64 {
        self.forwarded
    }

    /// Frames dropped for lack of a table entry.
    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// Frames dropped because their tag stack could not be decoded.
    pub fn errors(&self) -> u64 {
        self.errors
    }
}

impl Processor for TunnelRewrite {
    type Input = TaggedFrame;
    type Output = TaggedFrame;

    fn process(&mut self, frame: Self::Input) -> Option<Self::Output> {
        let key = match tunnel::decode(&frame.data, frame.vport) {
            Ok(key) => key,
            Err(e) => {
                trace!(vport = frame.vport, error = %e, "undecodable tag stack");
                self.errors += 1;
                return None;
            }
        };
        let target = if frame.vport == self.routed_vport {
            self.table.local_for(&key)
        } else {
            self.table.routed_for(&key)
        };
        let target = match target {
            Some(target) => target,
            None => {
                trace!(key = %key, "no translation");
                self.misses += 1;
                return None;
            }
        };
        match tunnel::encode(&target, &frame.data, &self.pbits) {
            Ok(data) => {
                self.forwarded += 1;
                Some(TaggedFrame::new(target.vport(), data))
            }
            Err(e) => {
                trace!(error = %e, "rewrite failed");
                self.errors += 1;
                None
            }
        }
    }
}
