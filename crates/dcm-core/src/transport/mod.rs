//! Boundary to the radio subsystem and the system timer facility.
//!
//! The connection actor only talks to these traits. Every call returns a
//! boxed future; the actor spawns it and receives the result later as a
//! tagged mailbox event, so no handler ever blocks on the transport.

mod alarm;
mod scripted;

pub use alarm::{AlarmFuture, AlarmPrecision, AlarmScheduler, TokioAlarms};
pub use scripted::{ScriptedSetup, ScriptedTransport, TransportCall};

use crate::classify::FailCause;
use crate::error::TransportError;
use crate::profile::{AuthMode, BearerProfile, PdpProtocol};
use crate::radio::RadioTech;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

pub type TransportFuture<T> = Pin<Box<dyn Future<Output = Result<T, TransportError>> + Send + 'static>>;

/// Radio-level identifier of an established bearer (the modem's call id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BearerId(pub i32);

impl fmt::Display for BearerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Arguments of one bearer setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupParams {
    pub rat: RadioTech,
    pub profile: Arc<BearerProfile>,
    pub auth: AuthMode,
    pub protocol: PdpProtocol,
    pub reason: Option<String>,
}

/// Network-suggested retry timing carried on a failed setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetryHint {
    AfterMs(u64),
    Never,
}

impl RetryHint {
    /// `Some(delay)` to retry, `None` for "do not retry".
    pub fn delay(self) -> Option<Duration> {
        match self {
            RetryHint::AfterMs(ms) => Some(Duration::from_millis(ms)),
            RetryHint::Never => None,
        }
    }
}

/// Result of a setup call. `status` is [`FailCause::None`] on success.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SetupResponse {
    pub bearer_id: BearerId,
    pub status: FailCause,
    pub iface: String,
    /// `addr` or `addr/prefix`.
    pub addresses: Vec<String>,
    pub dnses: Vec<String>,
    pub gateways: Vec<String>,
    pub pcscf: Vec<String>,
    pub mtu: Option<u32>,
    pub suggested_retry: Option<RetryHint>,
}

/// Teardown reason passed down to the modem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeactivateReason {
    #[default]
    Normal,
    RadioOff,
    PdpReset,
}

impl DeactivateReason {
    /// Map a consumer's free-form disconnect reason.
    pub fn from_reason(reason: Option<&str>) -> Self {
        match reason {
            Some("radio-turned-off") => DeactivateReason::RadioOff,
            Some("pdp-reset") => DeactivateReason::PdpReset,
            _ => DeactivateReason::Normal,
        }
    }
}

/// The radio subsystem as seen by a connection.
pub trait BearerTransport: Send + Sync + fmt::Debug {
    fn setup_bearer(&self, params: SetupParams) -> TransportFuture<SetupResponse>;

    fn teardown_bearer(&self, bearer: BearerId, reason: DeactivateReason) -> TransportFuture<()>;

    /// Last failure code, for legacy setups that fail without a status.
    fn last_failure_cause(&self, bearer: Option<BearerId>) -> TransportFuture<i32>;

    /// Ask the radio stack to restart (fire-and-forget).
    fn request_restart(&self);
}
