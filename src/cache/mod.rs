//! Local content cache.
//!
//! [`MemoryStore`] implements both cache traits the repositories consume, so a
//! single store instance can back posts and terms at once.

mod lock;
mod store;

pub use store::MemoryStore;
