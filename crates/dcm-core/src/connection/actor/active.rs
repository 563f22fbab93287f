use super::activating::legacy_cause;
use super::{queue_notice, Actor, Alarm, Outgoing};
use crate::classify::{FailCause, FailureDisposition};
use crate::connection::event::{Event, SetupKind};
use crate::connection::ids::ConsumerId;
use crate::connection::request::BearerNotice;
use crate::connection::status::ConnectionState;
use crate::error::TransportError;
use crate::link::{LinkAddress, LinkState};
use crate::transport::{AlarmPrecision, BearerId, DeactivateReason, SetupResponse};
use std::sync::Arc;

/// Disconnect reason given to consumers dropped after router
/// advertisement failed on an IPv6-only link.
pub(crate) const RA_FAILED: &str = "ra-failed";

impl Actor {
    pub(super) fn on_active(&mut self, ev: Event) -> Option<Event> {
        match ev {
            Event::Connect { req, reply } => {
                if !self.compatible(&req) {
                    self.reject_connect(&req, reply, FailCause::UnacceptableNetworkParameter);
                    return None;
                }
                tracing::debug!(
                    connection = %self.id,
                    consumer = %req.consumer.id,
                    consumers = self.consumers.len() + 1,
                    "sharing active bearer"
                );
                let link = self.link.clone();
                queue_notice(
                    &mut self.outbox,
                    &req.consumer,
                    BearerNotice::Connected {
                        connection: self.id,
                        link: link.clone(),
                    },
                );
                self.add_consumer(req.consumer, None);
                self.outbox.push(Outgoing::Connect(reply, Ok(link)));
                None
            }
            Event::Disconnect { req, reply } => {
                if !self.consumers.contains_key(&req.consumer) {
                    tracing::debug!(connection = %self.id, consumer = %req.consumer, "disconnect from unknown consumer");
                    self.outbox.push(Outgoing::Disconnect(reply, Ok(())));
                } else if self.consumers.len() == 1 {
                    self.remove_consumer(req.consumer);
                    self.disconnect_replies.push(reply);
                    self.begin_disconnect(req.reason);
                } else {
                    self.remove_consumer(req.consumer);
                    self.outbox.push(Outgoing::Disconnect(reply, Ok(())));
                }
                None
            }
            Event::DisconnectAll { reason, reply } => {
                if let Some(reply) = reply {
                    self.disconnect_replies.push(reply);
                }
                self.begin_disconnect(reason);
                None
            }
            Event::LostConnection { tag } if tag == self.tag => {
                self.lose_connection();
                None
            }
            // The tag survives Active -> Retrying -> Active, so a background
            // retry only counts while one is outstanding.
            Event::FallbackTimer { tag } if tag == self.tag && self.fallback_pending() => {
                if self.env.service.in_service() {
                    self.retry.record_attempt();
                    self.issue_setup(SetupKind::Fallback);
                } else {
                    tracing::debug!(connection = %self.id, "fallback retry due while out of service, dropped");
                    self.cause = FailCause::None;
                }
                None
            }
            Event::SetupDone {
                tag,
                kind: SetupKind::Fallback,
                result,
            } if tag == self.tag && self.fallback_pending() => {
                self.on_fallback_done(result);
                None
            }
            Event::LastCauseDone {
                tag,
                kind: SetupKind::Fallback,
                result,
            } if tag == self.tag && self.fallback_pending() => {
                self.on_fallback_failure(legacy_cause(result));
                None
            }
            Event::AddressRemoved(addr) => {
                self.on_address_removed(addr);
                None
            }
            Event::LinkChanged(response) => {
                self.on_link_changed(response);
                None
            }
            Event::Bandwidth { down_kbps } => {
                self.down_override = Some(down_kbps);
                None
            }
            other => Some(other),
        }
    }

    fn fallback_pending(&self) -> bool {
        self.cause == FailCause::FallbackRetry
    }

    fn begin_disconnect(&mut self, reason: Option<String>) {
        let deactivate = DeactivateReason::from_reason(reason.as_deref());
        tracing::info!(connection = %self.id, ?reason, "disconnecting");
        self.disconnect_reason = reason;
        self.issue_teardown(self.bearer, deactivate);
        self.transition(ConnectionState::Disconnecting);
    }

    fn on_fallback_done(&mut self, result: Result<SetupResponse, TransportError>) {
        let response = match result {
            Ok(response) => response,
            Err(TransportError::NoStatus) => {
                self.query_last_cause(SetupKind::Fallback);
                return;
            }
            Err(e) => {
                tracing::info!(connection = %self.id, "fallback setup failed, keeping the current link: {e}");
                self.cause = FailCause::None;
                return;
            }
        };
        if !response.status.is_none() {
            self.on_fallback_failure(response.status);
            return;
        }
        match self.derive(&response, false) {
            Ok(link) => {
                tracing::info!(connection = %self.id, bearer = %response.bearer_id, "fallback retry brought up both families");
                self.adopt_bearer(response.bearer_id);
                self.set_link(link);
                self.cause = FailCause::None;
                self.retry.reset();
            }
            Err(e) => {
                tracing::info!(connection = %self.id, "fallback response unusable, keeping the current link: {e}");
                self.cause = FailCause::None;
            }
        }
    }

    fn on_fallback_failure(&mut self, cause: FailCause) {
        let reason = self.bring_up.as_ref().and_then(|b| b.reason.as_deref());
        let disposition = self.ctx.classifier.classify(cause, &self.retry, reason);
        let next = match disposition {
            FailureDisposition::PartialSuccess => self.retry.next_delay(),
            _ => None,
        };
        match next {
            Some(delay) => {
                tracing::debug!(connection = %self.id, %cause, "still partial, rearming fallback retry");
                self.cause = FailCause::FallbackRetry;
                self.start_alarm(delay, AlarmPrecision::Approximate, Alarm::Fallback);
            }
            None => {
                tracing::info!(connection = %self.id, %cause, ?disposition, "fallback retry stopped");
                self.cause = FailCause::None;
            }
        }
    }

    fn adopt_bearer(&mut self, bearer: BearerId) {
        if self.bearer != Some(bearer) {
            self.bearer = Some(bearer);
            self.registry.insert_bearer(bearer, self.id);
        }
    }

    /// Only meaningful for an IPv6 address of an IPv6-capable profile with
    /// no usable IPv4 to fall back on.
    fn on_address_removed(&mut self, addr: LinkAddress) {
        let wants_v6 = self
            .profile
            .as_ref()
            .map_or(false, |p| p.protocol.wants_ipv6());
        if !addr.is_ipv6() || !wants_v6 || self.link.has_usable_ipv4() {
            tracing::debug!(connection = %self.id, address = %addr.addr, "address removal doesn't affect the bearer");
            return;
        }
        if !self.link.addresses.contains(&addr) {
            tracing::debug!(connection = %self.id, address = %addr.addr, "removed address not on this link");
            return;
        }

        let addresses = self
            .link
            .addresses
            .iter()
            .filter(|a| **a != addr)
            .copied()
            .collect();
        self.link = Arc::new(LinkState {
            addresses,
            ..(*self.link).clone()
        });

        let victims: Vec<ConsumerId> = self
            .consumers
            .values()
            .filter(|c| !c.consumer.apn_type.is_signalling())
            .map(|c| c.consumer.id)
            .collect();
        tracing::info!(
            connection = %self.id,
            address = %addr.addr,
            dropped = victims.len(),
            "router advertisement failed, dropping consumers"
        );
        for id in victims {
            if let Some(c) = self.consumers.remove(&id) {
                self.registry.unroute(id, self.id);
                queue_notice(
                    &mut self.outbox,
                    &c.consumer,
                    BearerNotice::Disconnected {
                        connection: self.id,
                        cause: FailCause::None,
                        reason: Some(RA_FAILED.to_string()),
                    },
                );
            }
        }
        if self.consumers.is_empty() {
            self.begin_disconnect(Some(RA_FAILED.to_string()));
        }
    }

    fn on_link_changed(&mut self, response: SetupResponse) {
        if Some(response.bearer_id) != self.bearer {
            tracing::debug!(connection = %self.id, bearer = %response.bearer_id, "link update for another bearer");
            return;
        }
        if !response.status.is_none() {
            tracing::info!(connection = %self.id, cause = %response.status, "bearer reported down");
            self.lose_connection();
            return;
        }
        let fresh = match self.derive(&response, false) {
            Ok(link) => link,
            Err(e) => {
                tracing::warn!(connection = %self.id, "ignoring unusable link update: {e}");
                return;
            }
        };
        let diff = self.link.diff(&fresh);
        if diff.is_empty() {
            return;
        }
        if !diff.removed.is_empty() {
            tracing::info!(connection = %self.id, removed = diff.removed.len(), "addresses withdrawn by link update");
            self.lose_connection();
        } else {
            tracing::debug!(connection = %self.id, ?diff, "link updated");
            self.set_link(fresh);
        }
    }
}
