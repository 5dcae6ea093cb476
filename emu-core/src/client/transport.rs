use std::any::Any;

/// The packet path a client sends through.
///
/// A client is bound to at most one transport, chosen when the client is wired up; callers get
/// the concrete type back with [`Client::transport`](super::Client::transport).
pub trait ClientTransport: Any + Send {
    fn name(&self) -> &str;

    /// Called when the owning client is removed, after its plugins were torn down.
    fn on_remove(&mut self) {}

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}
