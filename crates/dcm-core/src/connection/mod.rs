//! One cellular data connection: the actor that owns a bearer and the
//! handle consumers and the registry use to reach it.

mod actor;
mod context;
mod event;
mod handle;
mod ids;
mod request;
mod status;

pub use context::ConnectionContext;
pub use handle::ConnectionHandle;
pub use ids::{ConnectionId, ConsumerId, Tag};
pub use request::{
    BearerNotice, ConnectRequest, ConnectResult, ConsumerRef, DisconnectRequest, DisconnectResult,
};
pub use status::{ConnectionState, ConnectionStatus, FailureRecord};
