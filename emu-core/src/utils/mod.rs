/// Helpers for tests in this crate and in crates built on it.
pub mod test;
