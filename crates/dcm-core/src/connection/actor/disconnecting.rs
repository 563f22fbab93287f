use super::{Actor, Exit};
use crate::classify::FailCause;
use crate::connection::event::Event;

impl Actor {
    pub(super) fn on_disconnecting(&mut self, ev: Event) -> Option<Event> {
        match ev {
            Event::TeardownDone { tag, result } if tag == self.tag => {
                if let Err(e) = result {
                    tracing::warn!(connection = %self.id, "teardown failed: {e}");
                }
                let reason = self.disconnect_reason.take();
                self.go_inactive(Exit::Disconnected { reason });
                None
            }
            other => Some(other),
        }
    }

    pub(super) fn on_disconnecting_after_error(&mut self, ev: Event) -> Option<Event> {
        match ev {
            Event::TeardownDone { tag, result } if tag == self.tag => {
                if let Err(e) = result {
                    tracing::warn!(connection = %self.id, "teardown after setup error failed: {e}");
                }
                self.go_inactive(Exit::Failed(FailCause::UnacceptableNetworkParameter));
                None
            }
            other => Some(other),
        }
    }
}
