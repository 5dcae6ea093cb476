//! Message channels: reliable, ordered delivery of whole binary messages between two fixed
//! endpoints.

mod memory;
pub use self::memory::*;

mod stream;
pub use self::stream::*;

use std::io;
use std::sync::Arc;

/// Sending half of a channel. Messages arrive whole and in order.
pub trait MessageTx: Send {
    fn send_msg(&mut self, msg: &[u8]) -> io::Result<()>;
}

/// Receiving half of a channel. `recv_msg` blocks until a message arrives or the channel
/// breaks.
pub trait MessageRx: Send {
    fn recv_msg(&mut self) -> io::Result<Vec<u8>>;

    /// A handle that unblocks `recv_msg` from another thread. After `close`, every receive
    /// fails promptly.
    fn close_handle(&self) -> CloseHandle;
}

pub trait Close: Send + Sync {
    fn close(&self);
}

pub type CloseHandle = Arc<dyn Close>;
