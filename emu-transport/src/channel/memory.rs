use super::{Close, CloseHandle, MessageRx, MessageTx};
use crossbeam::channel::{self, Receiver, Sender};
use std::io;
use std::sync::{Arc, Mutex, PoisonError};

/// An in-process channel, for tests and for running both sides in one process.
pub fn channel() -> (MemoryTx, MemoryRx) {
    let (data_tx, data_rx) = channel::unbounded();
    let (closed_tx, closed_rx) = channel::bounded(0);
    (
        MemoryTx { data: data_tx },
        MemoryRx {
            data: data_rx,
            closed: closed_rx,
            closer: Arc::new(MemoryCloser {
                signal: Mutex::new(Some(closed_tx)),
            }),
        },
    )
}

pub struct MemoryTx {
    data: Sender<Vec<u8>>,
}

impl MessageTx for MemoryTx {
    fn send_msg(&mut self, msg: &[u8]) -> io::Result<()> {
        self.data
            .send(msg.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "receiver gone"))
    }
}

pub struct MemoryRx {
    data: Receiver<Vec<u8>>,
    closed: Receiver<()>,
    closer: Arc<MemoryCloser>,
}

struct MemoryCloser {
    signal: Mutex<Option<Sender<()>>>,
}

impl Close for MemoryCloser {
    fn close(&self) {
        // Dropping the only sender disconnects `closed`, waking any select on it.
        self.signal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

impl MessageRx for MemoryRx {
    fn recv_msg(&mut self) -> io::Result<Vec<u8>> {
        crossbeam::channel::select! {
            recv(self.data) -> msg => {
                msg.map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "sender gone"))
            }
            recv(self.closed) -> _ => {
                Err(io::Error::new(io::ErrorKind::NotConnected, "channel closed"))
            }
        }
    }

    fn close_handle(&self) -> CloseHandle {
        self.closer.clone()
    }
}
