//! Caches of server-owned state.

pub mod optimistic;

pub use optimistic::{OptimisticCache, Transaction};
