//! Retry and backoff policy.
//!
//! Holds the backoff schedule grammar and the per-connection retry counters
//! so the connection state machine and the failure classifier share one
//! notion of "attempts remaining".

mod policy;
mod schedule;

pub use policy::RetryPolicy;
pub use schedule::{Schedule, Slot};
