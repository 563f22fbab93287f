//! Lifecycle management of cellular data bearers.
//!
//! Each [`connection`] is an actor owning one bearer from request through
//! setup, retry, the active period and teardown. The [`registry`] routes
//! consumers to connections and bearer events back to them. Setup failures
//! are turned into retry decisions by [`classify`] and [`retry`], and
//! successful setups into a published [`link`] state.

pub mod classify;
pub mod config;
pub mod connection;
pub mod error;
pub mod link;
pub mod logging;
pub mod profile;
pub mod radio;
pub mod registry;
pub mod retry;
pub mod transport;

pub use connection::{ConnectionContext, ConnectionHandle};
pub use registry::ConnectionRegistry;
