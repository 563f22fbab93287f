//! The per-connection state machine.
//!
//! One actor owns everything about one bearer and runs on its own task. It
//! takes exactly one mailbox entry at a time and handles it to completion;
//! handlers never await. Transport calls and alarms are spawned and come
//! back later as events carrying the tag that was current when they were
//! issued. A tag mismatch is the only cancellation there is.
//!
//! Each entry goes to the current state's handler first. Whatever that
//! handler hands back falls through to the shared behaviour in `default.rs`.
//! Events a state can't answer yet are deferred and put back at the front
//! of the queue right after the next transition.

mod activating;
mod active;
mod default;
mod disconnecting;
mod inactive;
mod retrying;


use super::context::ConnectionContext;
use super::event::{Event, SetupKind};
use super::ids::{ConnectionId, ConsumerId, Tag};
use super::request::{BearerNotice, ConnectRequest, ConnectResult, ConsumerRef, DisconnectResult};
use super::status::{ConnectionState, ConnectionStatus, FailureRecord};
use crate::classify::FailCause;
use crate::config::FailBringUp;
use crate::error::{ConnectFailure, LinkError};
use crate::link::{derive_link, derive_partial, CapabilitySet, DeriveContext, LinkSnapshot, LinkState};
use crate::profile::{ApnType, BearerProfile};
use crate::radio::{RadioEnv, RadioTech};
use crate::registry::RegistryView;
use crate::retry::RetryPolicy;
use crate::transport::{AlarmPrecision, BearerId, DeactivateReason, RetryHint, SetupParams, SetupResponse};
use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{mpsc, oneshot, watch};

/// How the next entry into Inactive settles outstanding requests.
#[derive(Debug)]
enum Exit {
    /// Pending connects fail with the cause; consumers that were already
    /// served are told the bearer is gone.
    Failed(FailCause),
    /// The bearer was released on request.
    Disconnected { reason: Option<String> },
}

struct Consumer {
    consumer: ConsumerRef,
    /// Completion of a connect that hasn't been answered yet.
    reply: Option<oneshot::Sender<ConnectResult>>,
}

/// The request that drove the current bring-up.
#[derive(Debug, Clone)]
struct BringUp {
    reason: Option<String>,
    retry_on_service_change: bool,
    rat: RadioTech,
}

/// Replies held back until the status of the dispatch is published.
enum Outgoing {
    Connect(oneshot::Sender<ConnectResult>, ConnectResult),
    Disconnect(oneshot::Sender<DisconnectResult>, DisconnectResult),
    Ack(oneshot::Sender<()>),
    Notice(mpsc::UnboundedSender<BearerNotice>, BearerNotice),
}

#[derive(Debug, Clone, Copy)]
enum Alarm {
    Retry,
    Fallback,
}

pub(crate) struct Actor {
    id: ConnectionId,
    ctx: ConnectionContext,
    registry: RegistryView,
    mailbox: mpsc::WeakUnboundedSender<Event>,
    status: watch::Sender<ConnectionStatus>,

    state: ConnectionState,
    tag: Tag,
    bearer: Option<BearerId>,
    created: SystemTime,
    connected_at: Option<SystemTime>,
    profile: Option<Arc<BearerProfile>>,
    bring_up: Option<BringUp>,
    link: LinkSnapshot,
    consumers: BTreeMap<ConsumerId, Consumer>,
    retry: RetryPolicy,
    cause: FailCause,
    last_failure: Option<FailureRecord>,
    env: RadioEnv,
    down_override: Option<u32>,
    suspended: bool,
    fail_bring_up: Option<FailBringUp>,

    local: VecDeque<Event>,
    deferred: Vec<Event>,
    pending_transition: Option<ConnectionState>,
    exit: Exit,
    disconnect_reason: Option<String>,
    disconnect_replies: Vec<oneshot::Sender<DisconnectResult>>,
    outbox: Vec<Outgoing>,
    disposed: bool,
}

impl Actor {
    pub(crate) fn new(
        id: ConnectionId,
        ctx: ConnectionContext,
        registry: RegistryView,
        env: RadioEnv,
        mailbox: mpsc::WeakUnboundedSender<Event>,
        status: watch::Sender<ConnectionStatus>,
    ) -> Self {
        let fail_bring_up = ctx.config.fault.fail_bring_up;
        Self {
            id,
            ctx,
            registry,
            mailbox,
            status,
            state: ConnectionState::Inactive,
            tag: Tag::default(),
            bearer: None,
            created: SystemTime::now(),
            connected_at: None,
            profile: None,
            bring_up: None,
            link: LinkState::empty_snapshot(),
            consumers: BTreeMap::new(),
            retry: RetryPolicy::default(),
            cause: FailCause::None,
            last_failure: None,
            env,
            down_override: None,
            suspended: false,
            fail_bring_up,
            local: VecDeque::new(),
            deferred: Vec::new(),
            pending_transition: None,
            exit: Exit::Disconnected { reason: None },
            disconnect_reason: None,
            disconnect_replies: Vec::new(),
            outbox: Vec::new(),
            disposed: false,
        }
    }

    pub(crate) async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Event>) {
        tracing::debug!(connection = %self.id, "connection actor started");
        self.publish();
        loop {
            let ev = match self.local.pop_front() {
                Some(ev) => ev,
                None => match rx.recv().await {
                    Some(ev) => ev,
                    None => break,
                },
            };
            self.dispatch(ev);
            self.apply_transitions();
            self.publish();
            self.flush();
            if self.disposed {
                break;
            }
        }

        rx.close();
        let mut leftovers: Vec<Event> = self.local.drain(..).collect();
        leftovers.append(&mut self.deferred);
        while let Ok(ev) = rx.try_recv() {
            leftovers.push(ev);
        }
        for ev in leftovers {
            self.refuse(ev);
        }
        self.flush();
        tracing::debug!(connection = %self.id, "connection actor stopped");
    }

    fn dispatch(&mut self, ev: Event) {
        tracing::trace!(connection = %self.id, state = %self.state, event = ev.name(), "dispatch");
        let unhandled = match self.state {
            ConnectionState::Inactive => self.on_inactive(ev),
            ConnectionState::Activating => self.on_activating(ev),
            ConnectionState::Retrying => self.on_retrying(ev),
            ConnectionState::Active => self.on_active(ev),
            ConnectionState::Disconnecting => self.on_disconnecting(ev),
            ConnectionState::DisconnectingAfterSetupError => self.on_disconnecting_after_error(ev),
        };
        if let Some(ev) = unhandled {
            self.on_default(ev);
        }
    }

    fn transition(&mut self, to: ConnectionState) {
        self.pending_transition = Some(to);
    }

    fn go_inactive(&mut self, exit: Exit) {
        self.exit = exit;
        self.transition(ConnectionState::Inactive);
    }

    /// Run enter actions until the state settles. Deferred events go back
    /// to the front of the queue, in the order they were deferred.
    fn apply_transitions(&mut self) {
        while let Some(to) = self.pending_transition.take() {
            let from = self.state;
            self.state = to;
            tracing::debug!(connection = %self.id, tag = %self.tag, "{} -> {}", from, to);
            match to {
                ConnectionState::Inactive => self.enter_inactive(),
                ConnectionState::Retrying => self.enter_retrying(),
                ConnectionState::Active => self.enter_active(),
                _ => {}
            }
            for ev in self.deferred.drain(..).rev() {
                self.local.push_front(ev);
            }
        }
    }

    fn enter_inactive(&mut self) {
        self.tag = self.tag.next();
        let exit = std::mem::replace(&mut self.exit, Exit::Disconnected { reason: None });
        let (cause, reason) = match exit {
            Exit::Failed(cause) => (cause, None),
            Exit::Disconnected { reason } => (FailCause::None, reason),
        };
        if !cause.is_none() {
            tracing::info!(connection = %self.id, %cause, "connection failed");
            self.last_failure = Some(FailureRecord {
                cause,
                at: SystemTime::now(),
            });
        }

        let id = self.id;
        for (consumer_id, c) in std::mem::take(&mut self.consumers) {
            self.registry.unroute(consumer_id, id);
            match c.reply {
                Some(reply) => {
                    let cause = if cause.is_none() {
                        FailCause::Cancelled
                    } else {
                        cause
                    };
                    let failure = self.failure(cause, consumer_id);
                    self.outbox.push(Outgoing::Connect(reply, Err(failure)));
                }
                None => queue_notice(
                    &mut self.outbox,
                    &c.consumer,
                    BearerNotice::Disconnected {
                        connection: id,
                        cause,
                        reason: reason.clone(),
                    },
                ),
            }
        }
        for reply in std::mem::take(&mut self.disconnect_replies) {
            self.outbox.push(Outgoing::Disconnect(reply, Ok(())));
        }

        self.registry.remove_bearer(self.id);
        if cause != FailCause::LostConnection {
            self.retry.reset();
        }
        self.bearer = None;
        self.profile = None;
        self.bring_up = None;
        self.link = LinkState::empty_snapshot();
        self.cause = FailCause::None;
        self.connected_at = None;
        self.suspended = false;
        self.down_override = None;
        self.disconnect_reason = None;
    }

    fn enter_retrying(&mut self) {
        let requested_rat = self
            .bring_up
            .as_ref()
            .map(|b| b.rat)
            .unwrap_or(self.env.service.rat);
        let moved = requested_rat != self.env.service.rat || !self.env.service.in_service();
        if moved && !self.ctx.classifier.survives_service_change(self.cause) {
            tracing::info!(
                connection = %self.id,
                requested = %requested_rat,
                current = %self.env.service.rat,
                "service changed since the request, not retrying"
            );
            self.go_inactive(Exit::Failed(FailCause::LostConnection));
            return;
        }
        let id = self.id;
        self.notify_all(BearerNotice::Retrying { connection: id });
        self.registry.remove_bearer(self.id);
        self.bearer = None;
    }

    fn enter_active(&mut self) {
        if self.cause != FailCause::FallbackRetry {
            self.retry.reset();
        }
        self.retry.restore_max();
        self.connected_at = Some(SystemTime::now());
        if let Some(bearer) = self.bearer {
            self.registry.insert_bearer(bearer, self.id);
        }
        self.suspended = self.env.data_suspended();

        let link = self.link.clone();
        for c in self.consumers.values_mut() {
            if let Some(reply) = c.reply.take() {
                self.outbox.push(Outgoing::Connect(reply, Ok(link.clone())));
            }
        }
        let id = self.id;
        self.notify_all(BearerNotice::Connected {
            connection: id,
            link,
        });
    }

    fn failure(&self, cause: FailCause, consumer: ConsumerId) -> ConnectFailure {
        ConnectFailure {
            cause,
            connection: self.id,
            consumer,
        }
    }

    fn ack(&mut self, reply: Option<oneshot::Sender<()>>) {
        if let Some(reply) = reply {
            self.outbox.push(Outgoing::Ack(reply));
        }
    }

    fn notify_all(&mut self, notice: BearerNotice) {
        for c in self.consumers.values() {
            queue_notice(&mut self.outbox, &c.consumer, notice.clone());
        }
    }

    /// Whether `req` can share this connection's bearer.
    fn compatible(&self, req: &ConnectRequest) -> bool {
        let bound = self.profile.as_ref().unwrap_or(&req.profile);
        bound.same_bearer(&req.profile) && bound.can_handle(req.consumer.apn_type)
    }

    fn reject_connect(
        &mut self,
        req: &ConnectRequest,
        reply: oneshot::Sender<ConnectResult>,
        cause: FailCause,
    ) {
        tracing::info!(
            connection = %self.id,
            consumer = %req.consumer.id,
            state = %self.state,
            %cause,
            "connect rejected"
        );
        if !self.consumers.contains_key(&req.consumer.id) {
            self.registry.unroute(req.consumer.id, self.id);
        }
        let failure = self.failure(cause, req.consumer.id);
        self.outbox.push(Outgoing::Connect(reply, Err(failure)));
    }

    /// Bind `req` and start a bring-up under a new epoch with a fresh
    /// retry budget.
    fn accept(&mut self, req: ConnectRequest, reply: oneshot::Sender<ConnectResult>) {
        let profile = self.profile.get_or_insert_with(|| req.profile.clone()).clone();
        self.tag = self.tag.next();
        self.bring_up = Some(BringUp {
            reason: req.reason.clone(),
            retry_on_service_change: req.retry_on_service_change,
            rat: self.env.service.rat,
        });
        self.configure_retry(&profile, req.consumer.apn_type);
        self.retry.reset();
        if let Some(n) = req.initial_max_retry {
            self.retry.set_current_max(n);
        }
        if req.retry_forever {
            self.retry.set_retry_forever(true);
        }
        self.cause = FailCause::None;
        self.last_failure = None;
        tracing::info!(
            connection = %self.id,
            tag = %self.tag,
            consumer = %req.consumer.id,
            apn = %profile.apn,
            "connect accepted"
        );
        self.add_consumer(req.consumer, Some(reply));
        self.issue_setup(SetupKind::Initial);
        self.transition(ConnectionState::Activating);
    }

    /// Default-capable profiles use the default schedule. Otherwise a bearer
    /// serving IMS or emergency, for the requester or anyone already
    /// attached, gets no retries.
    fn configure_retry(&mut self, profile: &BearerProfile, requested: ApnType) {
        let cfg = &self.ctx.config.retry;
        let signalling = requested.is_signalling()
            || self
                .consumers
                .values()
                .any(|c| c.consumer.apn_type.is_signalling());
        let spec = if profile.can_handle(ApnType::Default) {
            &cfg.default_schedule
        } else if signalling {
            tracing::debug!(connection = %self.id, "signalling bearer, no retries");
            self.retry.configure_fixed(0, 2000, 1000);
            return;
        } else {
            &cfg.secondary_schedule
        };
        if !self.retry.configure(spec) {
            tracing::warn!(connection = %self.id, schedule = %spec, "malformed retry schedule, using fallback");
            let f = cfg.fallback;
            self.retry
                .configure_fixed(f.max_retries, f.delay_ms, f.randomization_ms);
        }
    }

    fn add_consumer(&mut self, consumer: ConsumerRef, reply: Option<oneshot::Sender<ConnectResult>>) {
        let id = consumer.id;
        self.registry.route(id, self.id);
        if let Some(old) = self.consumers.insert(id, Consumer { consumer, reply }) {
            if let Some(stale) = old.reply {
                let failure = self.failure(FailCause::Cancelled, id);
                self.outbox.push(Outgoing::Connect(stale, Err(failure)));
            }
        }
    }

    /// Drop a consumer; an unanswered connect of theirs is cancelled.
    /// Returns whether the consumer was known.
    fn remove_consumer(&mut self, id: ConsumerId) -> bool {
        match self.consumers.remove(&id) {
            Some(c) => {
                self.registry.unroute(id, self.id);
                if let Some(reply) = c.reply {
                    let failure = self.failure(FailCause::Cancelled, id);
                    self.outbox.push(Outgoing::Connect(reply, Err(failure)));
                }
                true
            }
            None => false,
        }
    }

    fn post(&self, ev: Event) {
        if let Some(tx) = self.mailbox.upgrade() {
            let _ = tx.send(ev);
        }
    }

    /// Await `fut` off the actor and deliver its output as an event.
    fn spawn_reply<T, F, W>(&self, fut: F, wrap: W)
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
        W: FnOnce(T) -> Event + Send + 'static,
    {
        let mailbox = self.mailbox.clone();
        tokio::spawn(async move {
            let out = fut.await;
            if let Some(tx) = mailbox.upgrade() {
                let _ = tx.send(wrap(out));
            }
        });
    }

    fn issue_setup(&mut self, kind: SetupKind) {
        let tag = self.tag;
        if let Some(fault) = self.fail_bring_up.as_mut().filter(|f| f.count > 0) {
            fault.count -= 1;
            let response = SetupResponse {
                status: fault.cause,
                suggested_retry: fault.suggested_retry_ms.map(RetryHint::AfterMs),
                ..SetupResponse::default()
            };
            tracing::info!(
                connection = %self.id,
                cause = %fault.cause,
                remaining = fault.count,
                "injected bring-up failure"
            );
            self.post(Event::SetupDone {
                tag,
                kind,
                result: Ok(response),
            });
            return;
        }

        let Some(profile) = self.profile.clone() else {
            tracing::warn!(connection = %self.id, "setup requested without a bound profile");
            return;
        };
        let params = SetupParams {
            rat: self.env.service.rat,
            auth: profile.effective_auth(),
            protocol: profile.protocol_for(self.env.roaming),
            reason: self.bring_up.as_ref().and_then(|b| b.reason.clone()),
            profile,
        };
        tracing::debug!(
            connection = %self.id,
            %tag,
            ?kind,
            apn = %params.profile.apn,
            attempt = self.retry.attempts(),
            "setting up bearer"
        );
        let fut = self.ctx.transport.setup_bearer(params);
        self.spawn_reply(fut, move |result| Event::SetupDone { tag, kind, result });
    }

    fn query_last_cause(&mut self, kind: SetupKind) {
        let tag = self.tag;
        tracing::debug!(connection = %self.id, %tag, "setup failed without status, asking for last cause");
        let fut = self.ctx.transport.last_failure_cause(self.bearer);
        self.spawn_reply(fut, move |result| Event::LastCauseDone { tag, kind, result });
    }

    /// Release `bearer`. With the radio off there is nothing to release
    /// and the completion is posted straight away.
    fn issue_teardown(&mut self, bearer: Option<BearerId>, reason: DeactivateReason) {
        let tag = self.tag;
        let radio_up = self.env.service.radio_on || self.env.service.rat == RadioTech::Iwlan;
        match bearer {
            Some(bearer) if radio_up => {
                tracing::debug!(connection = %self.id, %tag, %bearer, ?reason, "tearing down bearer");
                let fut = self.ctx.transport.teardown_bearer(bearer, reason);
                self.spawn_reply(fut, move |result| Event::TeardownDone { tag, result });
            }
            _ => {
                tracing::debug!(connection = %self.id, %tag, "nothing to tear down on the radio");
                self.post(Event::TeardownDone { tag, result: Ok(()) });
            }
        }
    }

    fn start_alarm(&self, delay: Duration, precision: AlarmPrecision, alarm: Alarm) {
        let tag = self.tag;
        tracing::debug!(
            connection = %self.id,
            %tag,
            delay_ms = delay.as_millis() as u64,
            ?precision,
            ?alarm,
            "arming alarm"
        );
        let fut = self.ctx.alarms.sleep(delay, precision);
        self.spawn_reply(fut, move |()| match alarm {
            Alarm::Retry => Event::RetryTimer { tag },
            Alarm::Fallback => Event::FallbackTimer { tag },
        });
    }

    fn derive(&self, response: &SetupResponse, partial: bool) -> Result<LinkState, LinkError> {
        let profile = self.profile.as_deref().ok_or(LinkError::Unbound)?;
        let ctx = DeriveContext {
            profile,
            rat: self.env.service.rat,
            config: &self.ctx.config.link,
            http_proxy: self.link.http_proxy.as_ref(),
        };
        if partial {
            derive_partial(response, &ctx)
        } else {
            derive_link(response, &ctx)
        }
    }

    fn set_link(&mut self, link: LinkState) {
        self.link = Arc::new(link);
        let id = self.id;
        let link = self.link.clone();
        self.notify_all(BearerNotice::LinkChanged {
            connection: id,
            link,
        });
    }

    /// The bearer went away under an Active connection.
    fn lose_connection(&mut self) {
        self.cause = FailCause::LostConnection;
        match self.retry.next_delay() {
            Some(delay) => {
                tracing::info!(connection = %self.id, delay_ms = delay.as_millis() as u64, "bearer lost, retrying");
                self.start_alarm(delay, AlarmPrecision::Approximate, Alarm::Retry);
                self.transition(ConnectionState::Retrying);
            }
            None => {
                tracing::info!(connection = %self.id, "bearer lost, no retries left");
                self.go_inactive(Exit::Failed(FailCause::LostConnection));
            }
        }
    }

    fn refresh_suspended(&mut self) {
        if self.state != ConnectionState::Active {
            return;
        }
        let now = self.env.data_suspended();
        if now != self.suspended {
            self.suspended = now;
            let id = self.id;
            self.notify_all(BearerNotice::Suspended {
                connection: id,
                suspended: now,
            });
        }
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::derive(
            self.profile.as_deref(),
            self.consumers.values().map(|c| c.consumer.apn_type),
            self.env.service.rat,
            self.env.roaming,
            self.down_override,
        )
    }

    fn publish(&self) {
        let status = ConnectionStatus {
            id: self.id,
            state: self.state,
            tag: self.tag,
            bearer: self.bearer,
            apn: self.profile.as_ref().map(|p| p.apn.clone()),
            link: self.link.clone(),
            capabilities: self.capabilities(),
            consumers: self.consumers.len(),
            attempts: self.retry.attempts(),
            last_failure: self.last_failure,
            cause: self.cause,
            roaming: self.env.roaming,
            suspended: self.suspended,
            created: self.created,
            connected_at: self.connected_at,
            disposed: self.disposed,
        };
        self.status.send_replace(status);
    }

    fn flush(&mut self) {
        for out in self.outbox.drain(..) {
            match out {
                Outgoing::Connect(tx, result) => {
                    let _ = tx.send(result);
                }
                Outgoing::Disconnect(tx, result) => {
                    let _ = tx.send(result);
                }
                Outgoing::Ack(tx) => {
                    let _ = tx.send(());
                }
                Outgoing::Notice(tx, notice) => {
                    let _ = tx.send(notice);
                }
            }
        }
    }

    fn dispose(&mut self, reply: Option<oneshot::Sender<()>>) {
        tracing::info!(connection = %self.id, state = %self.state, "disposing connection");
        let id = self.id;
        for (consumer_id, c) in std::mem::take(&mut self.consumers) {
            match c.reply {
                Some(reply) => {
                    let failure = self.failure(FailCause::ConnectionDisposed, consumer_id);
                    self.outbox.push(Outgoing::Connect(reply, Err(failure)));
                }
                None => queue_notice(
                    &mut self.outbox,
                    &c.consumer,
                    BearerNotice::Disconnected {
                        connection: id,
                        cause: FailCause::ConnectionDisposed,
                        reason: None,
                    },
                ),
            }
        }
        for reply in std::mem::take(&mut self.disconnect_replies) {
            let failure = self.failure(FailCause::ConnectionDisposed, ConsumerId::CONTROLLER);
            self.outbox.push(Outgoing::Disconnect(reply, Err(failure)));
        }
        self.registry.forget(self.id);
        // The final status describes a released connection.
        self.state = ConnectionState::Inactive;
        self.tag = self.tag.next();
        self.bearer = None;
        self.profile = None;
        self.bring_up = None;
        self.link = LinkState::empty_snapshot();
        self.cause = FailCause::None;
        self.connected_at = None;
        self.suspended = false;
        self.disposed = true;
        self.ack(reply);
    }

    /// Answer a request that arrived after dispose.
    fn refuse(&mut self, ev: Event) {
        match ev {
            Event::Connect { req, reply } => {
                let failure = self.failure(FailCause::ConnectionDisposed, req.consumer.id);
                self.outbox.push(Outgoing::Connect(reply, Err(failure)));
            }
            Event::Disconnect { req, reply } => {
                let failure = self.failure(FailCause::ConnectionDisposed, req.consumer);
                self.outbox.push(Outgoing::Disconnect(reply, Err(failure)));
            }
            Event::DisconnectAll { reply: Some(reply), .. } => {
                let failure = self.failure(FailCause::ConnectionDisposed, ConsumerId::CONTROLLER);
                self.outbox.push(Outgoing::Disconnect(reply, Err(failure)));
            }
            Event::Reset { reply } | Event::Dispose { reply } => self.ack(reply),
            other => {
                tracing::debug!(connection = %self.id, event = other.name(), "dropped after dispose");
            }
        }
    }
}

fn queue_notice(outbox: &mut Vec<Outgoing>, consumer: &ConsumerRef, notice: BearerNotice) {
    if let Some(tx) = &consumer.notices {
        outbox.push(Outgoing::Notice(tx.clone(), notice));
    }
}
