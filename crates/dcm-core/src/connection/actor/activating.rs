use super::{Actor, Alarm, Exit};
use crate::classify::{FailCause, FailureDisposition};
use crate::connection::event::{Event, SetupKind};
use crate::connection::status::ConnectionState;
use crate::error::{LinkError, TransportError};
use crate::transport::{AlarmPrecision, BearerId, DeactivateReason, RetryHint, SetupResponse};
use std::sync::Arc;
use std::time::Duration;

impl Actor {
    pub(super) fn on_activating(&mut self, ev: Event) -> Option<Event> {
        match ev {
            ev @ (Event::Connect { .. } | Event::ServiceState(_) | Event::AddressRemoved(_)) => {
                tracing::debug!(connection = %self.id, event = ev.name(), "deferred until setup completes");
                self.deferred.push(ev);
                None
            }
            Event::SetupDone {
                tag,
                kind: SetupKind::Initial,
                result,
            } if tag == self.tag => {
                self.on_setup_done(result);
                None
            }
            Event::LastCauseDone {
                tag,
                kind: SetupKind::Initial,
                result,
            } if tag == self.tag => {
                self.on_setup_failure(legacy_cause(result), None, None);
                None
            }
            other => Some(other),
        }
    }

    fn on_setup_done(&mut self, result: Result<SetupResponse, TransportError>) {
        let response = match result {
            Ok(response) => response,
            Err(TransportError::CommandRejected { cause }) => {
                tracing::info!(connection = %self.id, %cause, "setup rejected by transport");
                self.cause = cause;
                self.go_inactive(Exit::Failed(cause));
                return;
            }
            Err(TransportError::NoStatus) => {
                self.query_last_cause(SetupKind::Initial);
                return;
            }
            Err(e @ TransportError::Io(_)) => {
                tracing::warn!(connection = %self.id, "setup failed: {e}");
                self.on_setup_failure(FailCause::ErrorUnspecified, None, None);
                return;
            }
        };

        if !response.status.is_none() {
            self.on_setup_failure(response.status, response.suggested_retry, Some(&response));
            return;
        }
        match self.derive(&response, false) {
            Ok(link) => {
                tracing::info!(
                    connection = %self.id,
                    bearer = %response.bearer_id,
                    iface = %response.iface,
                    "bearer up"
                );
                self.bearer = Some(response.bearer_id);
                self.link = Arc::new(link);
                self.cause = FailCause::None;
                self.transition(ConnectionState::Active);
            }
            Err(e) => self.unacceptable(response.bearer_id, e),
        }
    }

    /// `response` is present when the failure came with a setup response,
    /// which is what makes a partial success usable.
    fn on_setup_failure(
        &mut self,
        cause: FailCause,
        hint: Option<RetryHint>,
        response: Option<&SetupResponse>,
    ) {
        self.cause = cause;
        let reason = self.bring_up.as_ref().and_then(|b| b.reason.as_deref());
        let disposition = self.ctx.classifier.classify(cause, &self.retry, reason);
        tracing::debug!(
            connection = %self.id,
            %cause,
            ?disposition,
            attempts = self.retry.attempts(),
            "setup failed"
        );

        match (disposition, response) {
            (FailureDisposition::PartialSuccess, Some(response)) => self.accept_partial(response),
            (FailureDisposition::PartialSuccess, None) => {
                self.schedule_retry(cause, hint, None, AlarmPrecision::Approximate)
            }
            (FailureDisposition::RestartTransport, _) => {
                tracing::warn!(connection = %self.id, %cause, "asking the radio to restart");
                self.ctx.transport.request_restart();
                self.go_inactive(Exit::Failed(cause));
            }
            (FailureDisposition::Permanent, _) => {
                tracing::info!(connection = %self.id, %cause, "permanent failure");
                self.go_inactive(Exit::Failed(cause));
            }
            (FailureDisposition::Retry { delay, precision }, _) => {
                self.schedule_retry(cause, hint, delay, precision)
            }
        }
    }

    /// A network hint wins over everything; `Never` ends the attempt.
    fn schedule_retry(
        &mut self,
        cause: FailCause,
        hint: Option<RetryHint>,
        delay: Option<Duration>,
        precision: AlarmPrecision,
    ) {
        let delay = match hint {
            Some(hint) => hint.delay(),
            None => delay.or_else(|| self.retry.next_delay()),
        };
        match delay {
            Some(delay) => {
                self.start_alarm(delay, precision, Alarm::Retry);
                self.transition(ConnectionState::Retrying);
            }
            None => {
                tracing::info!(connection = %self.id, %cause, attempts = self.retry.attempts(), "not retrying");
                self.go_inactive(Exit::Failed(cause));
            }
        }
    }

    /// Bring the single family that came up into service and, while the
    /// budget allows, keep trying for the other one in the background.
    fn accept_partial(&mut self, response: &SetupResponse) {
        match self.derive(response, true) {
            Ok(link) => {
                self.bearer = Some(response.bearer_id);
                self.link = Arc::new(link);
                match self.retry.next_delay() {
                    Some(delay) => {
                        tracing::info!(
                            connection = %self.id,
                            cause = %response.status,
                            "partial success, retrying the other family in the background"
                        );
                        self.cause = FailCause::FallbackRetry;
                        self.start_alarm(delay, AlarmPrecision::Approximate, Alarm::Fallback);
                    }
                    None => self.cause = FailCause::None,
                }
                self.transition(ConnectionState::Active);
            }
            Err(e) => self.unacceptable(response.bearer_id, e),
        }
    }

    /// Setup succeeded on the radio but the parameters are unusable.
    pub(super) fn unacceptable(&mut self, bearer: BearerId, err: LinkError) {
        tracing::info!(connection = %self.id, %bearer, "setup returned unusable parameters: {err}");
        self.cause = FailCause::UnacceptableNetworkParameter;
        self.issue_teardown(Some(bearer), DeactivateReason::Normal);
        self.transition(ConnectionState::DisconnectingAfterSetupError);
    }
}

/// Cause reported by the legacy last-cause query. Anything that can't be
/// read counts as unknown.
pub(super) fn legacy_cause(result: Result<i32, TransportError>) -> FailCause {
    match result.map(FailCause::from_code) {
        Ok(FailCause::None) | Err(_) => FailCause::Unknown,
        Ok(cause) => cause,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_cause_maps_unreadable_to_unknown() {
        assert_eq!(legacy_cause(Ok(0)), FailCause::Unknown);
        assert_eq!(legacy_cause(Err(TransportError::Io("gone".into()))), FailCause::Unknown);
        assert_eq!(legacy_cause(Ok(FailCause::LostConnection.code())), FailCause::LostConnection);
    }
}
