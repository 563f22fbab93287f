use super::ids::{ConnectionId, Tag};
use crate::classify::FailCause;
use crate::link::{CapabilitySet, LinkSnapshot, LinkState};
use crate::transport::BearerId;
use serde::Serialize;
use std::fmt;
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionState {
    #[default]
    Inactive,
    Activating,
    Retrying,
    Active,
    Disconnecting,
    /// Tearing down a bearer whose setup returned unusable addressing.
    DisconnectingAfterSetupError,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Inactive => "inactive",
            ConnectionState::Activating => "activating",
            ConnectionState::Retrying => "retrying",
            ConnectionState::Active => "active",
            ConnectionState::Disconnecting => "disconnecting",
            ConnectionState::DisconnectingAfterSetupError => "disconnecting-after-setup-error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    pub cause: FailCause,
    pub at: SystemTime,
}

/// Snapshot of a connection, republished after every event the actor
/// processes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionStatus {
    pub id: ConnectionId,
    pub state: ConnectionState,
    pub tag: Tag,
    pub bearer: Option<BearerId>,
    /// APN of the bound profile.
    pub apn: Option<String>,
    pub link: LinkSnapshot,
    pub capabilities: CapabilitySet,
    pub consumers: usize,
    pub attempts: u32,
    pub last_failure: Option<FailureRecord>,
    /// Cause of the failure being handled right now (`fallback-retry` while a
    /// background retry is pending).
    pub cause: FailCause,
    pub roaming: bool,
    pub suspended: bool,
    pub created: SystemTime,
    pub connected_at: Option<SystemTime>,
    pub disposed: bool,
}

impl ConnectionStatus {
    pub fn initial(id: ConnectionId) -> Self {
        Self {
            id,
            state: ConnectionState::Inactive,
            tag: Tag::default(),
            bearer: None,
            apn: None,
            link: LinkState::empty_snapshot(),
            capabilities: CapabilitySet::default(),
            consumers: 0,
            attempts: 0,
            last_failure: None,
            cause: FailCause::None,
            roaming: false,
            suspended: false,
            created: SystemTime::now(),
            connected_at: None,
            disposed: false,
        }
    }

    pub fn is_inactive(&self) -> bool {
        self.state == ConnectionState::Inactive
    }
}
