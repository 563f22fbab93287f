//! Deterministic in-process transport driven by a script of setup outcomes.
//!
//! Used by the test suites and by `dcm simulate`. Every call is recorded so
//! callers can assert on what the state machine asked the radio to do.

use super::{BearerId, BearerTransport, DeactivateReason, SetupParams, SetupResponse, TransportFuture};
use crate::classify::FailCause;
use crate::error::TransportError;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Outcome of one scripted setup call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum ScriptedSetup {
    /// Reply with this response (a zero bearer id is replaced by a fresh one).
    Respond(SetupResponse),
    /// Refuse the command outright.
    Reject {
        #[serde(default = "radio_not_available")]
        cause: FailCause,
    },
    /// Fail without status; `last_failure_cause` then reports `last_cause`.
    Legacy { last_cause: i32 },
    /// Never complete.
    Hang,
}

fn radio_not_available() -> FailCause {
    FailCause::RadioNotAvailable
}

impl ScriptedSetup {
    /// A successful IPv4 setup on `rmnet0`.
    pub fn ok() -> Self {
        ScriptedSetup::Respond(ScriptedTransport::ok_response())
    }

    /// A failed setup with `cause`.
    pub fn fail(cause: FailCause) -> Self {
        ScriptedSetup::Respond(SetupResponse {
            status: cause,
            ..SetupResponse::default()
        })
    }
}

/// A call received by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Setup(SetupParams),
    Teardown {
        bearer: BearerId,
        reason: DeactivateReason,
    },
    LastFailure(Option<BearerId>),
    Restart,
}

#[derive(Debug, Default)]
struct ScriptState {
    setups: VecDeque<ScriptedSetup>,
    last_causes: VecDeque<i32>,
    calls: Vec<TransportCall>,
    next_bearer: i32,
    hang_teardown: bool,
}

#[derive(Debug, Default)]
pub struct ScriptedTransport {
    state: Mutex<ScriptState>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(script: impl IntoIterator<Item = ScriptedSetup>) -> Self {
        let t = Self::new();
        t.push_setups(script);
        t
    }

    pub fn ok_response() -> SetupResponse {
        SetupResponse {
            iface: "rmnet0".to_string(),
            addresses: vec!["10.0.0.2/24".to_string()],
            dnses: vec!["10.0.0.53".to_string(), "10.0.1.53".to_string()],
            gateways: vec!["10.0.0.1".to_string()],
            ..SetupResponse::default()
        }
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push_setup(&self, setup: ScriptedSetup) {
        self.lock().setups.push_back(setup);
    }

    pub fn push_setups(&self, script: impl IntoIterator<Item = ScriptedSetup>) {
        self.lock().setups.extend(script);
    }

    /// Make teardowns never complete (to observe the Disconnecting state).
    pub fn set_hang_teardown(&self, hang: bool) {
        self.lock().hang_teardown = hang;
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.lock().calls.clone()
    }

    pub fn setup_calls(&self) -> Vec<SetupParams> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                TransportCall::Setup(p) => Some(p.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn teardowns(&self) -> Vec<(BearerId, DeactivateReason)> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                TransportCall::Teardown { bearer, reason } => Some((*bearer, *reason)),
                _ => None,
            })
            .collect()
    }

    pub fn restarts(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| matches!(c, TransportCall::Restart))
            .count()
    }

    pub fn remaining_script(&self) -> usize {
        self.lock().setups.len()
    }
}

impl BearerTransport for ScriptedTransport {
    fn setup_bearer(&self, params: SetupParams) -> TransportFuture<SetupResponse> {
        let mut st = self.lock();
        st.calls.push(TransportCall::Setup(params));
        let step = st.setups.pop_front().unwrap_or_else(ScriptedSetup::ok);
        match step {
            ScriptedSetup::Respond(mut response) => {
                if response.status.is_none() && response.bearer_id == BearerId(0) {
                    st.next_bearer += 1;
                    response.bearer_id = BearerId(st.next_bearer);
                }
                Box::pin(async move { Ok::<_, TransportError>(response) })
            }
            ScriptedSetup::Reject { cause } => {
                Box::pin(async move { Err::<SetupResponse, _>(TransportError::CommandRejected { cause }) })
            }
            ScriptedSetup::Legacy { last_cause } => {
                st.last_causes.push_back(last_cause);
                Box::pin(async { Err::<SetupResponse, _>(TransportError::NoStatus) })
            }
            ScriptedSetup::Hang => Box::pin(std::future::pending::<Result<SetupResponse, TransportError>>()),
        }
    }

    fn teardown_bearer(&self, bearer: BearerId, reason: DeactivateReason) -> TransportFuture<()> {
        let mut st = self.lock();
        st.calls.push(TransportCall::Teardown { bearer, reason });
        if st.hang_teardown {
            return Box::pin(std::future::pending::<Result<(), TransportError>>());
        }
        Box::pin(async { Ok::<(), TransportError>(()) })
    }

    fn last_failure_cause(&self, bearer: Option<BearerId>) -> TransportFuture<i32> {
        let mut st = self.lock();
        st.calls.push(TransportCall::LastFailure(bearer));
        let code = st.last_causes.pop_front().unwrap_or(0);
        Box::pin(async move { Ok::<_, TransportError>(code) })
    }

    fn request_restart(&self) {
        self.lock().calls.push(TransportCall::Restart);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{ApnType, AuthMode, BearerProfile, PdpProtocol};
    use crate::radio::RadioTech;
    use std::sync::Arc;

    fn params() -> SetupParams {
        SetupParams {
            rat: RadioTech::Lte,
            profile: Arc::new(BearerProfile::new("internet", &[ApnType::Default])),
            auth: AuthMode::None,
            protocol: PdpProtocol::Ip,
            reason: None,
        }
    }

    #[tokio::test]
    async fn empty_script_succeeds_with_fresh_bearer_ids() {
        let t = ScriptedTransport::new();
        let a = t.setup_bearer(params()).await.unwrap();
        let b = t.setup_bearer(params()).await.unwrap();
        assert_eq!(a.bearer_id, BearerId(1));
        assert_eq!(b.bearer_id, BearerId(2));
        assert_eq!(t.setup_calls().len(), 2);
    }

    #[tokio::test]
    async fn legacy_failure_feeds_last_cause() {
        let t = ScriptedTransport::with_script([ScriptedSetup::Legacy { last_cause: 0x1A }]);
        assert_eq!(t.setup_bearer(params()).await, Err(TransportError::NoStatus));
        assert_eq!(t.last_failure_cause(None).await, Ok(0x1A));
        assert_eq!(t.last_failure_cause(None).await, Ok(0));
    }

    #[test]
    fn script_from_toml() {
        #[derive(Deserialize)]
        struct S {
            setups: Vec<ScriptedSetup>,
        }
        let s: S = toml::from_str(
            r#"
            [[setups]]
            outcome = "reject"

            [[setups]]
            outcome = "respond"
            status = "signal-lost"

            [[setups]]
            outcome = "hang"
            "#,
        )
        .unwrap();
        assert_eq!(
            s.setups,
            vec![
                ScriptedSetup::Reject {
                    cause: FailCause::RadioNotAvailable
                },
                ScriptedSetup::fail(FailCause::SignalLost),
                ScriptedSetup::Hang,
            ]
        );
    }
}
