//! Link state of a bearer and what it exposes to consumers.

mod capability;
mod derive;
mod state;

pub use capability::{Capability, CapabilitySet};
pub use derive::{derive_link, derive_partial, DeriveContext};
pub use state::{LinkAddress, LinkDiff, LinkSnapshot, LinkState, ProxyInfo, Route};
