//! Error types shared across the core.

use crate::classify::FailCause;
use crate::connection::{ConnectionId, ConsumerId};
use thiserror::Error;

/// Failure reported by a [`BearerTransport`](crate::transport::BearerTransport) call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The transport refused to attempt the command at all.
    #[error("command rejected by transport: {cause}")]
    CommandRejected { cause: FailCause },
    /// Legacy failure without a structured status; the cause must be
    /// fetched separately.
    #[error("setup failed without a status code")]
    NoStatus,
    #[error("transport i/o: {0}")]
    Io(String),
}

/// Failure surfaced to a consumer whose connect request could not be satisfied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("connection {connection} failed for consumer {consumer}: {cause}")]
pub struct ConnectFailure {
    pub cause: FailCause,
    pub connection: ConnectionId,
    pub consumer: ConsumerId,
}

/// A retry schedule string that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("empty schedule")]
    Empty,
    #[error("bad number '{0}'")]
    BadNumber(String),
    #[error("unknown key '{0}'")]
    UnknownKey(String),
    #[error("repeat count must be at least 1 in '{0}'")]
    ZeroRepeat(String),
    #[error("schedule expands to more than {0} slots")]
    TooLong(usize),
}

/// Why a setup response could not be turned into a usable link.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("response carries failure status {0}")]
    Status(FailCause),
    #[error("no interface name")]
    NoInterface,
    #[error("no addresses")]
    NoAddresses,
    #[error("bad address '{0}'")]
    BadAddress(String),
    #[error("bad dns '{0}'")]
    BadDns(String),
    #[error("bad gateway '{0}'")]
    BadGateway(String),
    #[error("both dns entries are 0.0.0.0")]
    NullDns,
    #[error("no profile bound to the connection")]
    Unbound,
}
