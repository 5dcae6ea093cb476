//! Tunnel keys: the virtual port plus VLAN tag stack that places a frame in a routing
//! domain, and the codec moving frames between key and wire form.

mod codec;
pub use self::codec::*;

mod key;
pub use self::key::*;
