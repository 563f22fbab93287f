//! Integration tests: routing through the connection registry.

mod common;

use common::rig::{self, request, settle, Rig};
use dcm_core::classify::FailCause;
use dcm_core::connection::{ConnectionState, ConsumerId, DisconnectRequest};
use dcm_core::profile::{ApnType, BearerProfile};
use dcm_core::radio::{RadioTech, ServiceState};
use dcm_core::transport::{BearerId, ScriptedSetup};
use dcm_core::ConnectionRegistry;
use std::sync::Arc;

fn registry(script: impl IntoIterator<Item = ScriptedSetup>) -> (Rig, ConnectionRegistry) {
    let rig = Rig::new(script);
    let registry = ConnectionRegistry::new(rig.ctx.clone());
    (rig, registry)
}

#[tokio::test(start_paused = true)]
async fn same_apn_shares_one_connection() {
    let (rig, registry) = registry([]);
    registry.connect(request(1, rig::internet())).await.unwrap();
    let upper = Arc::new(BearerProfile::new("INTERNET", &[ApnType::Default]));
    registry.connect(request(2, upper)).await.unwrap();

    let connections = registry.connections();
    assert_eq!(connections.len(), 1);
    assert_eq!(connections[0].status().consumers, 2);
    assert_eq!(rig.transport.setup_calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn different_apns_get_separate_connections() {
    let (_rig, registry) = registry([]);
    let (a, b) = tokio::join!(
        registry.connect(request(1, rig::internet())),
        registry.connect(request(2, rig::mms())),
    );
    a.unwrap();
    b.unwrap();

    let internet = registry.by_apn("internet").unwrap();
    let mms = registry.by_apn("MMS.carrier").unwrap();
    assert_ne!(internet.id(), mms.id());
    assert_ne!(internet.bearer_id(), mms.bearer_id());
    assert_eq!(registry.statuses().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn bearer_index_follows_the_connection() {
    let (_rig, registry) = registry([]);
    registry.connect(request(1, rig::internet())).await.unwrap();
    let handle = registry.by_apn("internet").unwrap();
    let bearer = handle.bearer_id().unwrap();
    assert_eq!(registry.by_bearer(bearer).map(|h| h.id()), Some(handle.id()));

    registry
        .disconnect(DisconnectRequest::new(ConsumerId(1)))
        .await
        .unwrap();
    assert!(handle.is_inactive());
    assert!(registry.by_bearer(bearer).is_none());
    assert!(registry.get(handle.id()).is_some());
}

#[tokio::test(start_paused = true)]
async fn bearer_loss_is_routed_to_its_owner() {
    let (_rig, registry) = registry([]);
    registry.connect(request(1, rig::internet())).await.unwrap();
    let handle = registry.by_apn("internet").unwrap();

    assert!(!registry.on_bearer_lost(BearerId(99)));
    assert!(registry.on_bearer_lost(BearerId(1)));
    let retrying = handle
        .wait_for(|s| s.state == ConnectionState::Retrying)
        .await;
    assert_eq!(retrying.cause, FailCause::LostConnection);
    assert!(registry.by_bearer(BearerId(1)).is_none());

    let active = handle
        .wait_for(|s| s.state == ConnectionState::Active)
        .await;
    let bearer = active.bearer.unwrap();
    assert_eq!(registry.by_bearer(bearer).map(|h| h.id()), Some(handle.id()));
}

#[tokio::test(start_paused = true)]
async fn unrouted_disconnect_succeeds() {
    let (rig, registry) = registry([]);
    registry
        .disconnect(DisconnectRequest::new(ConsumerId(42)))
        .await
        .unwrap();
    assert!(registry.connections().is_empty());
    assert!(rig.transport.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn broadcasts_reach_existing_and_later_connections() {
    let (_rig, registry) = registry([]);
    registry.connect(request(1, rig::internet())).await.unwrap();
    registry.broadcast_roaming(true);
    registry.broadcast_service_state(ServiceState {
        rat: RadioTech::Hspap,
        ..ServiceState::default()
    });
    settle().await;

    let internet = registry.by_apn("internet").unwrap();
    let status = internet.status();
    assert!(status.roaming);
    assert_eq!(status.capabilities.down_kbps, RadioTech::Hspap.bandwidth_kbps().1);

    registry.connect(request(2, rig::mms())).await.unwrap();
    let mms = registry.by_apn("mms.carrier").unwrap();
    assert!(mms.status().roaming);
    assert_eq!(
        mms.current_link_state().tcp_buffer_sizes.as_deref(),
        RadioTech::Hspap.tcp_buffer_sizes()
    );
}

#[tokio::test(start_paused = true)]
async fn dispose_all_fails_pending_requests() {
    let (_rig, registry) = registry([ScriptedSetup::Hang]);
    let r = registry.clone();
    let pending = tokio::spawn(async move { r.connect(request(1, rig::internet())).await });
    settle().await;

    registry.dispose_all().await;
    let err = pending.await.unwrap().unwrap_err();
    assert_eq!(err.cause, FailCause::ConnectionDisposed);
    assert!(registry.connections().is_empty());
}

#[tokio::test(start_paused = true)]
async fn disposed_connection_is_replaced_on_next_connect() {
    let (rig, registry) = registry([]);
    registry.connect(request(1, rig::internet())).await.unwrap();
    let first = registry.by_apn("internet").unwrap();
    first.dispose().await;
    assert!(first.is_disposed());
    assert!(registry.get(first.id()).is_none());
    assert!(registry.by_apn("internet").is_none());
    assert!(registry.route_of(ConsumerId(1)).is_none());

    registry.connect(request(2, rig::internet())).await.unwrap();
    let second = registry.by_apn("internet").unwrap();
    assert_ne!(second.id(), first.id());
    assert_eq!(second.status().state, ConnectionState::Active);
    assert_eq!(registry.connections().len(), 1);
    assert_eq!(rig.transport.setup_calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn routes_go_away_with_the_consumer() {
    let rig = Rig::with_config(
        [ScriptedSetup::fail(FailCause::MissingUnknownApn)],
        rig::config("max_retries=0,1000"),
    );
    let registry = ConnectionRegistry::new(rig.ctx.clone());
    let err = registry
        .connect(request(1, rig::internet()))
        .await
        .unwrap_err();
    assert_eq!(err.cause, FailCause::MissingUnknownApn);
    assert!(registry.route_of(ConsumerId(1)).is_none());

    registry.connect(request(2, rig::internet())).await.unwrap();
    let handle = registry.route_of(ConsumerId(2)).unwrap();
    assert!(registry.on_bearer_lost(handle.bearer_id().unwrap()));
    handle.wait_for(|s| s.is_inactive()).await;
    assert!(registry.route_of(ConsumerId(2)).is_none());
    assert_eq!(registry.connections().len(), 1);
}
