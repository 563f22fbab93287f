use super::{Actor, Exit};
use crate::classify::FailCause;
use crate::connection::event::Event;
use crate::radio::ServiceState;
use crate::transport::DeactivateReason;
use std::sync::Arc;

impl Actor {
    /// Behaviour shared by every state, reached when the state's own
    /// handler passes on an event.
    pub(super) fn on_default(&mut self, ev: Event) {
        match ev {
            ev @ (Event::Connect { .. } | Event::Disconnect { .. } | Event::DisconnectAll { .. }) => {
                tracing::debug!(connection = %self.id, state = %self.state, event = ev.name(), "deferred");
                self.deferred.push(ev);
            }
            Event::Reset { reply } => {
                tracing::info!(connection = %self.id, state = %self.state, "reset");
                self.go_inactive(Exit::Failed(FailCause::ResetByController));
                self.ack(reply);
            }
            Event::Dispose { reply } => self.dispose(reply),
            Event::TearDownNow => self.tear_down_now(),
            ev @ (Event::SetupDone { .. }
            | Event::LastCauseDone { .. }
            | Event::TeardownDone { .. }
            | Event::RetryTimer { .. }
            | Event::FallbackTimer { .. }
            | Event::LostConnection { .. }) => {
                tracing::debug!(
                    connection = %self.id,
                    state = %self.state,
                    event = ev.name(),
                    tag = ?ev.tag(),
                    current = %self.tag,
                    "stale or unexpected completion ignored"
                );
            }
            Event::ServiceState(service) => self.track_service(service),
            Event::Roaming(roaming) => self.env.roaming = roaming,
            Event::VoiceCall(active) => {
                self.env.voice_call = active;
                self.refresh_suspended();
            }
            ev @ (Event::Bandwidth { .. } | Event::AddressRemoved(_) | Event::LinkChanged(_)) => {
                tracing::debug!(connection = %self.id, state = %self.state, event = ev.name(), "ignored while not active");
            }
            Event::HttpProxy(proxy) => {
                self.link = Arc::new(self.link.with_http_proxy(proxy));
            }
            Event::InjectFailures(fault) => {
                tracing::info!(connection = %self.id, count = fault.count, cause = %fault.cause, "bring-up failures armed");
                self.fail_bring_up = Some(fault);
            }
        }
    }

    fn track_service(&mut self, service: ServiceState) {
        if service.rat != self.env.service.rat && !self.link.is_empty() {
            self.link = Arc::new(self.link.with_tcp_buffer_sizes(service.rat.tcp_buffer_sizes()));
        }
        tracing::debug!(connection = %self.id, rat = %service.rat, reg = ?service.data_reg, "service state");
        self.env.service = service;
        self.refresh_suspended();
    }

    /// Release the current bearer without waiting for the result or leaving
    /// the current state.
    fn tear_down_now(&mut self) {
        let Some(bearer) = self.bearer else {
            tracing::debug!(connection = %self.id, "immediate teardown without a bearer");
            return;
        };
        tracing::info!(connection = %self.id, %bearer, "immediate teardown");
        let fut = self.ctx.transport.teardown_bearer(bearer, DeactivateReason::Normal);
        let id = self.id;
        tokio::spawn(async move {
            if let Err(e) = fut.await {
                tracing::warn!(connection = %id, "immediate teardown failed: {e}");
            }
        });
    }
}
