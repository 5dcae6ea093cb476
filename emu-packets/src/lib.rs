//! Byte-level views over emulated Ethernet frames.
//!
//! Nothing in this crate performs I/O; it only reads and writes the header fields the
//! emulation core needs to address clients and re-tag frames.

mod types;
pub use self::types::*;

mod ethernet;
pub use self::ethernet::*;

mod vlan;
pub use self::vlan::*;

mod ipv4;
pub use self::ipv4::*;
