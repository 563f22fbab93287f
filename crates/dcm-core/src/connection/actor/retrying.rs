use super::{Actor, Exit, Outgoing};
use crate::classify::FailCause;
use crate::connection::event::{Event, SetupKind};
use crate::connection::status::ConnectionState;
use crate::radio::ServiceState;

impl Actor {
    pub(super) fn on_retrying(&mut self, ev: Event) -> Option<Event> {
        match ev {
            Event::ServiceState(service) => self.on_retrying_service(service),
            Event::RetryTimer { tag } if tag == self.tag => {
                if !self.env.service.in_service() {
                    tracing::info!(connection = %self.id, "retry due while out of service");
                    self.go_inactive(Exit::Failed(FailCause::LostConnection));
                } else {
                    self.retry.record_attempt();
                    tracing::debug!(connection = %self.id, attempt = self.retry.attempts(), "retrying setup");
                    self.issue_setup(SetupKind::Initial);
                    self.transition(ConnectionState::Activating);
                }
                None
            }
            Event::Connect { req, reply } => {
                if !self.compatible(&req) {
                    self.reject_connect(&req, reply, FailCause::UnacceptableNetworkParameter);
                } else if self.ctx.classifier.survives_service_change(self.cause)
                    && self.retry.has_remaining()
                {
                    tracing::debug!(connection = %self.id, consumer = %req.consumer.id, "joining the scheduled retry");
                    self.add_consumer(req.consumer, Some(reply));
                } else {
                    // Earlier waiters stay and are answered by the new attempt.
                    self.accept(req, reply);
                }
                None
            }
            Event::Disconnect { req, reply } => {
                let known = self.remove_consumer(req.consumer);
                if known && self.consumers.is_empty() {
                    self.disconnect_replies.push(reply);
                    self.go_inactive(Exit::Disconnected { reason: req.reason });
                } else {
                    self.outbox.push(Outgoing::Disconnect(reply, Ok(())));
                }
                None
            }
            Event::DisconnectAll { reply, .. } => {
                if let Some(reply) = reply {
                    self.outbox.push(Outgoing::Disconnect(reply, Ok(())));
                }
                self.go_inactive(Exit::Failed(FailCause::LostConnection));
                None
            }
            other => Some(other),
        }
    }

    /// Give up on a changed data registration or RAT, unless the cause or
    /// the request says otherwise. The new state is recorded either way.
    fn on_retrying_service(&mut self, service: ServiceState) -> Option<Event> {
        let changed = service.drs_or_rat_differs(&self.env.service);
        let sticky = self.ctx.classifier.survives_service_change(self.cause);
        let keep = self.bring_up.as_ref().map_or(false, |b| b.retry_on_service_change);
        if changed && !sticky && !keep {
            tracing::info!(
                connection = %self.id,
                from = %self.env.service.rat,
                to = %service.rat,
                "service changed while retrying"
            );
            self.go_inactive(Exit::Failed(FailCause::LostConnection));
        }
        Some(Event::ServiceState(service))
    }
}
