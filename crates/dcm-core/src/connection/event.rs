//! Mailbox entries of a connection actor.

use super::ids::Tag;
use super::request::{ConnectRequest, ConnectResult, DisconnectRequest, DisconnectResult};
use crate::config::FailBringUp;
use crate::error::TransportError;
use crate::link::{LinkAddress, ProxyInfo};
use crate::radio::ServiceState;
use crate::transport::SetupResponse;
use tokio::sync::oneshot;

/// Which setup stream a completion belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SetupKind {
    /// Bring-up driven from Activating.
    Initial,
    /// Background upgrade after a partial success, issued while Active.
    Fallback,
}

#[derive(Debug)]
pub(crate) enum Event {
    Connect {
        req: ConnectRequest,
        reply: oneshot::Sender<ConnectResult>,
    },
    Disconnect {
        req: DisconnectRequest,
        reply: oneshot::Sender<DisconnectResult>,
    },
    DisconnectAll {
        reason: Option<String>,
        reply: Option<oneshot::Sender<DisconnectResult>>,
    },
    Reset {
        reply: Option<oneshot::Sender<()>>,
    },
    Dispose {
        reply: Option<oneshot::Sender<()>>,
    },
    TearDownNow,

    SetupDone {
        tag: Tag,
        kind: SetupKind,
        result: Result<SetupResponse, TransportError>,
    },
    LastCauseDone {
        tag: Tag,
        kind: SetupKind,
        result: Result<i32, TransportError>,
    },
    TeardownDone {
        tag: Tag,
        result: Result<(), TransportError>,
    },
    RetryTimer {
        tag: Tag,
    },
    FallbackTimer {
        tag: Tag,
    },
    LostConnection {
        tag: Tag,
    },

    ServiceState(ServiceState),
    Roaming(bool),
    VoiceCall(bool),
    Bandwidth {
        down_kbps: u32,
    },
    AddressRemoved(LinkAddress),
    LinkChanged(SetupResponse),
    HttpProxy(Option<ProxyInfo>),
    InjectFailures(FailBringUp),
}

impl Event {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Event::Connect { .. } => "connect",
            Event::Disconnect { .. } => "disconnect",
            Event::DisconnectAll { .. } => "disconnect-all",
            Event::Reset { .. } => "reset",
            Event::Dispose { .. } => "dispose",
            Event::TearDownNow => "tear-down-now",
            Event::SetupDone { .. } => "setup-done",
            Event::LastCauseDone { .. } => "last-cause-done",
            Event::TeardownDone { .. } => "teardown-done",
            Event::RetryTimer { .. } => "retry-timer",
            Event::FallbackTimer { .. } => "fallback-timer",
            Event::LostConnection { .. } => "lost-connection",
            Event::ServiceState(_) => "service-state",
            Event::Roaming(_) => "roaming",
            Event::VoiceCall(_) => "voice-call",
            Event::Bandwidth { .. } => "bandwidth",
            Event::AddressRemoved(_) => "address-removed",
            Event::LinkChanged(_) => "link-changed",
            Event::HttpProxy(_) => "http-proxy",
            Event::InjectFailures(_) => "inject-failures",
        }
    }

    /// Tag carried by completions and timers.
    pub(crate) fn tag(&self) -> Option<Tag> {
        match self {
            Event::SetupDone { tag, .. }
            | Event::LastCauseDone { tag, .. }
            | Event::TeardownDone { tag, .. }
            | Event::RetryTimer { tag }
            | Event::FallbackTimer { tag }
            | Event::LostConnection { tag } => Some(*tag),
            _ => None,
        }
    }
}
