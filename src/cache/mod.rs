//! Cache layer in front of the evaluation service
//!
//! [`ExpiringCache`] is the generic keyed store with per-entry TTL and
//! in-flight fetch coalescing. [`CacheStore`] binds three partitions of it
//! (users, per-user posts, per-post comments) to a [`RemoteSource`](crate::source::RemoteSource).

mod expiring;
mod store;

pub use expiring::{CacheEntry, ExpiringCache};
pub use store::CacheStore;
