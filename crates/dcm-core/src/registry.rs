//! Index of live connections.
//!
//! The registry hands out connection ids, finds the connection serving an
//! APN (creating it on first use), remembers which connection each consumer
//! was routed to, and maps radio bearer ids back to connections so that
//! unsolicited bearer events reach the right actor. Connections keep their
//! bearer entry and consumer routes current themselves through a
//! [`RegistryView`], and take themselves out when disposed.

use crate::classify::FailCause;
use crate::connection::{
    ConnectRequest, ConnectResult, ConnectionContext, ConnectionHandle, ConnectionId,
    ConnectionStatus, ConsumerId, DisconnectRequest, DisconnectResult,
};
use crate::radio::{RadioEnv, ServiceState};
use crate::transport::BearerId;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError, Weak};

#[derive(Debug, Default)]
struct RegistryState {
    next_id: u32,
    connections: BTreeMap<ConnectionId, ConnectionHandle>,
    /// Lowercased APN to the connection bound to it.
    by_apn: HashMap<String, ConnectionId>,
    bearers: HashMap<BearerId, ConnectionId>,
    routes: HashMap<ConsumerId, ConnectionId>,
    env: RadioEnv,
}

impl RegistryState {
    fn forget_bearers_of(&mut self, id: ConnectionId) {
        self.bearers.retain(|_, c| *c != id);
    }
}

/// A connection's view of the registry: its bearer entry, the routes of
/// its consumers, and its own listing.
///
/// Holds the registry weakly; once the registry is gone, or for a
/// connection spawned on its own, updates are no-ops.
#[derive(Debug, Clone, Default)]
pub struct RegistryView {
    state: Weak<Mutex<RegistryState>>,
}

impl RegistryView {
    fn with_state(&self, f: impl FnOnce(&mut RegistryState)) {
        if let Some(state) = self.state.upgrade() {
            let mut st = state.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut st);
        }
    }

    /// Map `bearer` to `id`, replacing whatever `id` had before.
    pub(crate) fn insert_bearer(&self, bearer: BearerId, id: ConnectionId) {
        self.with_state(|st| {
            st.forget_bearers_of(id);
            st.bearers.insert(bearer, id);
        });
    }

    pub(crate) fn remove_bearer(&self, id: ConnectionId) {
        self.with_state(|st| st.forget_bearers_of(id));
    }

    /// Route later disconnects of `consumer` to `id`.
    pub(crate) fn route(&self, consumer: ConsumerId, id: ConnectionId) {
        self.with_state(|st| {
            st.routes.insert(consumer, id);
        });
    }

    /// Forget the route of a consumer `id` no longer serves. A route that
    /// already points elsewhere is left alone.
    pub(crate) fn unroute(&self, consumer: ConsumerId, id: ConnectionId) {
        self.with_state(|st| {
            if st.routes.get(&consumer) == Some(&id) {
                st.routes.remove(&consumer);
            }
        });
    }

    /// Drop every trace of `id`; the next request for its APN gets a new
    /// connection.
    pub(crate) fn forget(&self, id: ConnectionId) {
        self.with_state(|st| {
            if st.connections.remove(&id).is_some() {
                tracing::debug!(connection = %id, "connection left the registry");
            }
            st.by_apn.retain(|_, c| *c != id);
            st.routes.retain(|_, c| *c != id);
            st.forget_bearers_of(id);
        });
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionRegistry {
    ctx: ConnectionContext,
    state: Arc<Mutex<RegistryState>>,
}

impl ConnectionRegistry {
    pub fn new(ctx: ConnectionContext) -> Self {
        Self {
            ctx,
            state: Arc::new(Mutex::new(RegistryState {
                next_id: 1,
                ..RegistryState::default()
            })),
        }
    }

    pub fn context(&self) -> &ConnectionContext {
        &self.ctx
    }

    /// Route `req` to the connection for its APN and wait for the result.
    ///
    /// A connection stays bound to its APN for its whole life, so
    /// concurrent requests for different APNs never share one.
    pub async fn connect(&self, req: ConnectRequest) -> ConnectResult {
        let handle = {
            let mut st = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            let key = req.profile.apn.to_ascii_lowercase();
            let existing = st
                .by_apn
                .get(&key)
                .and_then(|id| st.connections.get(id))
                .filter(|h| !h.is_disposed())
                .cloned();
            let handle = match existing {
                Some(handle) => handle,
                None => {
                    let id = ConnectionId(st.next_id);
                    st.next_id += 1;
                    let view = RegistryView {
                        state: Arc::downgrade(&self.state),
                    };
                    let handle = ConnectionHandle::spawn_with(id, self.ctx.clone(), view, st.env);
                    tracing::debug!(connection = %id, apn = %req.profile.apn, "new connection");
                    st.connections.insert(id, handle.clone());
                    st.by_apn.insert(key, id);
                    handle
                }
            };
            st.routes.insert(req.consumer.id, handle.id());
            handle
        };
        handle.connect(req).await
    }

    /// Release `req.consumer` from the connection it was routed to. A
    /// consumer that was never routed is already disconnected.
    pub async fn disconnect(&self, req: DisconnectRequest) -> DisconnectResult {
        let handle = {
            let mut st = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            let routed = st.routes.remove(&req.consumer);
            routed.and_then(|id| st.connections.get(&id).cloned())
        };
        match handle {
            Some(handle) => handle.disconnect(req).await,
            None => {
                tracing::debug!(consumer = %req.consumer, "disconnect for unrouted consumer");
                Ok(())
            }
        }
    }

    pub fn get(&self, id: ConnectionId) -> Option<ConnectionHandle> {
        let st = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        st.connections.get(&id).cloned()
    }

    pub fn by_apn(&self, apn: &str) -> Option<ConnectionHandle> {
        let st = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        st.by_apn
            .get(&apn.to_ascii_lowercase())
            .and_then(|id| st.connections.get(id))
            .cloned()
    }

    /// The connection currently serving `consumer`, if any.
    pub fn route_of(&self, consumer: ConsumerId) -> Option<ConnectionHandle> {
        let st = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        st.routes
            .get(&consumer)
            .and_then(|id| st.connections.get(id))
            .cloned()
    }

    pub fn by_bearer(&self, bearer: BearerId) -> Option<ConnectionHandle> {
        let st = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        st.bearers
            .get(&bearer)
            .and_then(|id| st.connections.get(id))
            .cloned()
    }

    pub fn connections(&self) -> Vec<ConnectionHandle> {
        let st = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        st.connections.values().cloned().collect()
    }

    pub fn statuses(&self) -> Vec<ConnectionStatus> {
        self.connections().iter().map(|h| h.status()).collect()
    }

    /// Forward an unsolicited "bearer gone" report. Returns false when no
    /// connection owns `bearer`.
    pub fn on_bearer_lost(&self, bearer: BearerId) -> bool {
        match self.by_bearer(bearer) {
            Some(handle) => {
                tracing::info!(connection = %handle.id(), %bearer, "bearer lost");
                handle.notify_lost_connection();
                true
            }
            None => {
                tracing::debug!(%bearer, "loss reported for unknown bearer");
                false
            }
        }
    }

    pub fn broadcast_service_state(&self, service: ServiceState) {
        for handle in self.update_env(|env| env.service = service) {
            handle.notify_service_state(service);
        }
    }

    pub fn broadcast_roaming(&self, roaming: bool) {
        for handle in self.update_env(|env| env.roaming = roaming) {
            handle.notify_roaming(roaming);
        }
    }

    pub fn broadcast_voice_call(&self, active: bool) {
        for handle in self.update_env(|env| env.voice_call = active) {
            handle.notify_voice_call(active);
        }
    }

    /// Record the new environment for connections created later and return
    /// the current ones.
    fn update_env(&self, f: impl FnOnce(&mut RadioEnv)) -> Vec<ConnectionHandle> {
        let mut st = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut st.env);
        st.connections.values().cloned().collect()
    }

    /// Dispose every connection and empty the registry. Pending requests
    /// fail with [`FailCause::ConnectionDisposed`].
    pub async fn dispose_all(&self) {
        let handles: Vec<ConnectionHandle> = {
            let mut st = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            st.by_apn.clear();
            st.routes.clear();
            st.bearers.clear();
            std::mem::take(&mut st.connections).into_values().collect()
        };
        tracing::info!(
            connections = handles.len(),
            cause = %FailCause::ConnectionDisposed,
            "disposing all connections"
        );
        for handle in handles {
            handle.dispose().await;
        }
    }
}
