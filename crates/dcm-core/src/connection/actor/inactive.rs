use super::{Actor, Outgoing};
use crate::classify::FailCause;
use crate::connection::event::Event;

impl Actor {
    pub(super) fn on_inactive(&mut self, ev: Event) -> Option<Event> {
        match ev {
            Event::Connect { req, reply } => {
                if self.compatible(&req) {
                    self.accept(req, reply);
                } else {
                    self.reject_connect(&req, reply, FailCause::UnacceptableNetworkParameter);
                }
                None
            }
            Event::Disconnect { req, reply } => {
                tracing::debug!(connection = %self.id, consumer = %req.consumer, "disconnect while inactive");
                self.outbox.push(Outgoing::Disconnect(reply, Ok(())));
                None
            }
            Event::DisconnectAll { reply, .. } => {
                if let Some(reply) = reply {
                    self.outbox.push(Outgoing::Disconnect(reply, Ok(())));
                }
                None
            }
            Event::Reset { reply } => {
                self.ack(reply);
                None
            }
            other => Some(other),
        }
    }
}
