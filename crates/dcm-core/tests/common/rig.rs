//! Test rig for connection integration tests: a scripted transport, alarms
//! that record what was armed, and the usual profiles.

use dcm_core::config::DcmConfig;
use dcm_core::connection::{
    BearerNotice, ConnectRequest, ConnectionContext, ConnectionHandle, ConnectionId, ConsumerId,
    ConsumerRef,
};
use dcm_core::profile::{ApnType, BearerProfile, PdpProtocol};
use dcm_core::transport::{
    AlarmFuture, AlarmPrecision, AlarmScheduler, ScriptedSetup, ScriptedTransport, SetupResponse,
};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;

pub const SCHEDULE: &str = "max_retries=3,1000,2000,4000";

/// Alarms on the tokio clock that remember every arming.
#[derive(Debug, Default)]
pub struct RecordingAlarms {
    armed: Mutex<Vec<(Duration, AlarmPrecision)>>,
}

impl RecordingAlarms {
    pub fn armed(&self) -> Vec<(Duration, AlarmPrecision)> {
        self.armed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn delays_ms(&self) -> Vec<u64> {
        self.armed()
            .into_iter()
            .map(|(d, _)| d.as_millis() as u64)
            .collect()
    }
}

impl AlarmScheduler for RecordingAlarms {
    fn sleep(&self, delay: Duration, precision: AlarmPrecision) -> AlarmFuture {
        self.armed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((delay, precision));
        Box::pin(tokio::time::sleep(delay))
    }
}

pub struct Rig {
    pub transport: Arc<ScriptedTransport>,
    pub alarms: Arc<RecordingAlarms>,
    pub ctx: ConnectionContext,
}

impl Rig {
    pub fn new(script: impl IntoIterator<Item = ScriptedSetup>) -> Self {
        Self::with_config(script, config(SCHEDULE))
    }

    pub fn with_config(script: impl IntoIterator<Item = ScriptedSetup>, cfg: DcmConfig) -> Self {
        let transport = Arc::new(ScriptedTransport::with_script(script));
        let alarms = Arc::new(RecordingAlarms::default());
        let ctx = ConnectionContext::new(transport.clone(), cfg).with_alarms(alarms.clone());
        Self {
            transport,
            alarms,
            ctx,
        }
    }

    pub fn spawn(&self) -> ConnectionHandle {
        ConnectionHandle::spawn(ConnectionId(1), self.ctx.clone())
    }
}

pub fn config(schedule: &str) -> DcmConfig {
    let mut cfg = DcmConfig::default();
    cfg.retry.default_schedule = schedule.to_string();
    cfg
}

pub fn internet() -> Arc<BearerProfile> {
    Arc::new(BearerProfile::new("internet", &[ApnType::Default, ApnType::Supl]))
}

pub fn dual_stack() -> Arc<BearerProfile> {
    let mut p = BearerProfile::new("internet", &[ApnType::Default, ApnType::Supl]);
    p.protocol = PdpProtocol::Ipv4v6;
    Arc::new(p)
}

pub fn mms() -> Arc<BearerProfile> {
    Arc::new(BearerProfile::new("mms.carrier", &[ApnType::Mms]))
}

pub fn ims() -> Arc<BearerProfile> {
    let mut p = BearerProfile::new("ims", &[ApnType::Ims]);
    p.protocol = PdpProtocol::Ipv6;
    Arc::new(p)
}

/// A request whose consumer asks for the profile's first type.
pub fn request(consumer: u64, profile: Arc<BearerProfile>) -> ConnectRequest {
    let t = profile.primary_type().unwrap_or(ApnType::Default);
    ConnectRequest::new(ConsumerRef::new(ConsumerId(consumer), t), profile)
}

pub fn watched(
    consumer: u64,
    profile: Arc<BearerProfile>,
) -> (ConnectRequest, mpsc::UnboundedReceiver<BearerNotice>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut req = request(consumer, profile);
    req.consumer = req.consumer.with_notices(tx);
    (req, rx)
}

pub fn ipv6_only() -> SetupResponse {
    SetupResponse {
        iface: "rmnet1".to_string(),
        addresses: vec!["2001:db8::2/64".to_string()],
        dnses: vec!["2001:db8::53".to_string()],
        gateways: vec!["2001:db8::1".to_string()],
        ..SetupResponse::default()
    }
}

/// Pull everything queued on a notice channel.
pub fn drain(rx: &mut mpsc::UnboundedReceiver<BearerNotice>) -> Vec<BearerNotice> {
    let mut out = Vec::new();
    while let Ok(n) = rx.try_recv() {
        out.push(n);
    }
    out
}

/// Let spawned actors drain their mailboxes on the paused clock.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
