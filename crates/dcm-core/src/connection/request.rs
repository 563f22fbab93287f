//! Requests handed to a connection and the notices it sends back.

use super::ids::{ConnectionId, ConsumerId};
use crate::classify::FailCause;
use crate::error::ConnectFailure;
use crate::link::LinkSnapshot;
use crate::profile::{ApnType, BearerProfile};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Outcome of a connect request: the link on success.
pub type ConnectResult = Result<LinkSnapshot, ConnectFailure>;
pub type DisconnectResult = Result<(), ConnectFailure>;

/// Unsolicited updates a consumer receives about its bearer.
#[derive(Debug, Clone, PartialEq)]
pub enum BearerNotice {
    Connected {
        connection: ConnectionId,
        link: LinkSnapshot,
    },
    /// The bearer dropped and a retry is scheduled.
    Retrying { connection: ConnectionId },
    Disconnected {
        connection: ConnectionId,
        cause: FailCause,
        reason: Option<String>,
    },
    Suspended {
        connection: ConnectionId,
        suspended: bool,
    },
    LinkChanged {
        connection: ConnectionId,
        link: LinkSnapshot,
    },
}

impl BearerNotice {
    pub fn connection(&self) -> ConnectionId {
        match self {
            BearerNotice::Connected { connection, .. }
            | BearerNotice::Retrying { connection }
            | BearerNotice::Disconnected { connection, .. }
            | BearerNotice::Suspended { connection, .. }
            | BearerNotice::LinkChanged { connection, .. } => *connection,
        }
    }
}

/// A consumer as the connection sees it.
#[derive(Debug, Clone)]
pub struct ConsumerRef {
    pub id: ConsumerId,
    /// Traffic class the consumer asked for; drives its capability grant.
    pub apn_type: ApnType,
    pub notices: Option<mpsc::UnboundedSender<BearerNotice>>,
}

impl ConsumerRef {
    pub fn new(id: ConsumerId, apn_type: ApnType) -> Self {
        Self {
            id,
            apn_type,
            notices: None,
        }
    }

    pub fn with_notices(mut self, tx: mpsc::UnboundedSender<BearerNotice>) -> Self {
        self.notices = Some(tx);
        self
    }
}

#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub consumer: ConsumerRef,
    pub profile: Arc<BearerProfile>,
    /// Retry budget for the first bring-up; the schedule's bound is
    /// restored once the bearer is up.
    pub initial_max_retry: Option<u32>,
    /// Keep retrying when data registration or RAT change while retrying.
    pub retry_on_service_change: bool,
    pub retry_forever: bool,
    /// Free-form reason, passed to the transport and to the classifier.
    pub reason: Option<String>,
}

impl ConnectRequest {
    pub fn new(consumer: ConsumerRef, profile: Arc<BearerProfile>) -> Self {
        Self {
            consumer,
            profile,
            initial_max_retry: None,
            retry_on_service_change: false,
            retry_forever: false,
            reason: None,
        }
    }

    pub fn initial_max_retry(mut self, n: u32) -> Self {
        self.initial_max_retry = Some(n);
        self
    }

    pub fn retry_on_service_change(mut self, yes: bool) -> Self {
        self.retry_on_service_change = yes;
        self
    }

    pub fn retry_forever(mut self, yes: bool) -> Self {
        self.retry_forever = yes;
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectRequest {
    pub consumer: ConsumerId,
    /// `radio-turned-off` and `pdp-reset` change the teardown reason sent
    /// to the modem.
    pub reason: Option<String>,
}

impl DisconnectRequest {
    pub fn new(consumer: ConsumerId) -> Self {
        Self {
            consumer,
            reason: None,
        }
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}
