use super::actor::Actor;
use super::context::ConnectionContext;
use super::event::Event;
use super::ids::{ConnectionId, ConsumerId};
use super::request::{ConnectRequest, ConnectResult, DisconnectRequest, DisconnectResult};
use super::status::ConnectionStatus;
use crate::classify::FailCause;
use crate::config::FailBringUp;
use crate::error::ConnectFailure;
use crate::link::{CapabilitySet, LinkAddress, LinkSnapshot, ProxyInfo};
use crate::radio::{RadioEnv, ServiceState};
use crate::registry::RegistryView;
use crate::transport::{BearerId, SetupResponse};
use tokio::sync::{mpsc, oneshot, watch};

/// Cheap, cloneable front of a connection actor.
///
/// Requests are answered through the returned futures; notifications are
/// fire-and-forget. Queries read the status the actor published after its
/// last event and never wait on the actor.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    mailbox: mpsc::UnboundedSender<Event>,
    status: watch::Receiver<ConnectionStatus>,
}

impl ConnectionHandle {
    /// Start a connection that isn't attached to a registry.
    pub fn spawn(id: ConnectionId, ctx: ConnectionContext) -> Self {
        Self::spawn_with(id, ctx, RegistryView::default(), RadioEnv::default())
    }

    pub(crate) fn spawn_with(
        id: ConnectionId,
        ctx: ConnectionContext,
        registry: RegistryView,
        env: RadioEnv,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::initial(id));
        let actor = Actor::new(id, ctx, registry, env, tx.downgrade(), status_tx);
        tokio::spawn(actor.run(rx));
        Self {
            id,
            mailbox: tx,
            status: status_rx,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub(crate) fn post(&self, ev: Event) {
        if let Err(e) = self.mailbox.send(ev) {
            tracing::debug!(connection = %self.id, event = e.0.name(), "connection gone, event dropped");
        }
    }

    fn disposed(&self, consumer: ConsumerId) -> ConnectFailure {
        ConnectFailure {
            cause: FailCause::ConnectionDisposed,
            connection: self.id,
            consumer,
        }
    }

    /// Resolves once the bearer is up (or the request failed).
    pub async fn connect(&self, req: ConnectRequest) -> ConnectResult {
        let consumer = req.consumer.id;
        let (reply, rx) = oneshot::channel();
        self.post(Event::Connect { req, reply });
        rx.await.unwrap_or_else(|_| Err(self.disposed(consumer)))
    }

    /// Resolves once the consumer is released; for the last consumer that
    /// is after the bearer is torn down.
    pub async fn disconnect(&self, req: DisconnectRequest) -> DisconnectResult {
        let consumer = req.consumer;
        let (reply, rx) = oneshot::channel();
        self.post(Event::Disconnect { req, reply });
        rx.await.unwrap_or_else(|_| Err(self.disposed(consumer)))
    }

    pub async fn disconnect_all(&self, reason: Option<String>) -> DisconnectResult {
        let (reply, rx) = oneshot::channel();
        self.post(Event::DisconnectAll {
            reason,
            reply: Some(reply),
        });
        rx.await
            .unwrap_or_else(|_| Err(self.disposed(ConsumerId::CONTROLLER)))
    }

    /// Drop everything and return to Inactive without a teardown.
    pub async fn reset(&self) {
        let (reply, rx) = oneshot::channel();
        self.post(Event::Reset { reply: Some(reply) });
        let _ = rx.await;
    }

    pub async fn dispose(&self) {
        let (reply, rx) = oneshot::channel();
        self.post(Event::Dispose { reply: Some(reply) });
        let _ = rx.await;
    }

    pub fn tear_down_now(&self) {
        self.post(Event::TearDownNow);
    }

    pub fn set_http_proxy(&self, proxy: Option<ProxyInfo>) {
        self.post(Event::HttpProxy(proxy));
    }

    pub fn notify_service_state(&self, service: ServiceState) {
        self.post(Event::ServiceState(service));
    }

    pub fn notify_roaming(&self, roaming: bool) {
        self.post(Event::Roaming(roaming));
    }

    pub fn notify_voice_call(&self, active: bool) {
        self.post(Event::VoiceCall(active));
    }

    pub fn notify_bandwidth(&self, down_kbps: u32) {
        self.post(Event::Bandwidth { down_kbps });
    }

    pub fn notify_address_removed(&self, addr: LinkAddress) {
        self.post(Event::AddressRemoved(addr));
    }

    /// The bearer was reported gone. Tagged with the epoch the caller last
    /// saw, so a report that raced a reconnect is dropped.
    pub fn notify_lost_connection(&self) {
        let tag = self.status.borrow().tag;
        self.post(Event::LostConnection { tag });
    }

    pub fn notify_link_changed(&self, response: SetupResponse) {
        self.post(Event::LinkChanged(response));
    }

    /// Fail the next `fault.count` bring-ups with `fault.cause`.
    pub fn inject_bring_up_failures(&self, fault: FailBringUp) {
        self.post(Event::InjectFailures(fault));
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status.borrow().clone()
    }

    /// True once the actor has been disposed or its task is gone.
    pub fn is_disposed(&self) -> bool {
        self.status.borrow().disposed || self.mailbox.is_closed()
    }

    pub fn is_inactive(&self) -> bool {
        self.status.borrow().is_inactive()
    }

    pub fn current_link_state(&self) -> LinkSnapshot {
        self.status.borrow().link.clone()
    }

    pub fn current_capabilities(&self) -> CapabilitySet {
        self.status.borrow().capabilities.clone()
    }

    pub fn bearer_id(&self) -> Option<BearerId> {
        self.status.borrow().bearer
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    /// Wait until a published status satisfies `pred`. Returns the last
    /// status if the actor stops first.
    pub async fn wait_for(&self, mut pred: impl FnMut(&ConnectionStatus) -> bool) -> ConnectionStatus {
        let mut rx = self.status.clone();
        if let Ok(status) = rx.wait_for(|s| pred(s)).await {
            return status.clone();
        }
        self.status()
    }
}
