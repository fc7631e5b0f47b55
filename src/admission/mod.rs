//! Admission control: checks that run before any capability executes.
//!
//! - [`RateLimiter`] — requests per identity per minute.
//! - [`ConnectionTracker`] — concurrent streams per identity.

pub mod connection_tracker;
pub mod rate_limiter;

pub use connection_tracker::{ConnectionSlot, ConnectionTracker};
pub use rate_limiter::{CounterStore, MemoryCacheStore, NullStore, RateLimiter};
