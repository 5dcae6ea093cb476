mod tunnel_rewrite;
pub use self::tunnel_rewrite::*;

/// A per-frame transformation. Returning `None` drops the frame.
pub trait Processor {
    type Input: Send + Clone;
    type Output: Send + Clone;

    fn process(&mut self, packet: Self::Input) -> Option<Self::Output>;
}
