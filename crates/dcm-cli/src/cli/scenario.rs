//! Scripted scenarios for `dcm simulate`.
//!
//! A scenario names one bearer profile, the consumers that will use it, a
//! script of setup outcomes for [`ScriptedTransport`], and timed steps. It
//! runs through a [`ConnectionRegistry`] on whatever clock the caller's
//! runtime provides; `dcm simulate` uses a paused one so backoffs of several
//! minutes finish instantly.
//!
//! ```toml
//! run_for_ms = 60000
//!
//! [profile]
//! apn = "internet"
//! types = ["default", "supl"]
//!
//! [[consumers]]
//! id = 1
//!
//! [[script]]
//! outcome = "respond"
//! status = "insufficient-resources"
//!
//! [[steps]]
//! at_ms = 0
//! action = "connect"
//! consumer = 1
//! ```

use anyhow::{bail, Context, Result};
use dcm_core::config::DcmConfig;
use dcm_core::connection::{
    BearerNotice, ConnectRequest, ConnectionStatus, ConsumerId, ConsumerRef, DisconnectRequest,
};
use dcm_core::link::LinkState;
use dcm_core::profile::{ApnType, BearerProfile};
use dcm_core::radio::ServiceState;
use dcm_core::transport::{BearerId, ScriptedSetup, ScriptedTransport};
use dcm_core::{ConnectionContext, ConnectionRegistry};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

fn default_run_for_ms() -> u64 {
    60_000
}

fn default_apn_type() -> ApnType {
    ApnType::Default
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub profile: BearerProfile,
    #[serde(default)]
    pub consumers: Vec<ConsumerSpec>,
    /// Setup outcomes, consumed in order; an exhausted script answers with success.
    #[serde(default)]
    pub script: Vec<ScriptedSetup>,
    #[serde(default)]
    pub steps: Vec<Step>,
    /// Virtual time to keep running after the last step.
    #[serde(default = "default_run_for_ms")]
    pub run_for_ms: u64,
    /// Replaces the loaded configuration for this run.
    #[serde(default)]
    pub config: Option<DcmConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConsumerSpec {
    pub id: u64,
    #[serde(default = "default_apn_type")]
    pub apn_type: ApnType,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub retry_on_service_change: bool,
    #[serde(default)]
    pub retry_forever: bool,
    #[serde(default)]
    pub initial_max_retry: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    #[serde(default)]
    pub at_ms: u64,
    #[serde(flatten)]
    pub action: Action,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum Action {
    Connect {
        consumer: u64,
    },
    Disconnect {
        consumer: u64,
        #[serde(default)]
        reason: Option<String>,
    },
    /// The radio reports the bearer gone; defaults to the profile's current bearer.
    BearerLost {
        #[serde(default)]
        bearer: Option<i32>,
    },
    ServiceState {
        #[serde(default)]
        service: ServiceState,
    },
    Roaming {
        on: bool,
    },
    VoiceCall {
        active: bool,
    },
    Reset,
    TearDownNow,
    /// Append setup outcomes to the transport script.
    Script {
        setups: Vec<ScriptedSetup>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimEvent {
    pub at_ms: u64,
    pub consumer: Option<u64>,
    pub event: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimReport {
    pub events: Vec<SimEvent>,
    pub statuses: Vec<ConnectionStatus>,
    pub setup_calls: usize,
}

pub fn load(path: &Path) -> Result<Scenario> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("reading scenario {}", path.display()))?;
    parse(&data, path.extension().and_then(|e| e.to_str()) == Some("json"))
        .with_context(|| format!("parsing scenario {}", path.display()))
}

pub(crate) fn parse(data: &str, json: bool) -> Result<Scenario> {
    let scenario = if json {
        serde_json::from_str(data)?
    } else {
        toml::from_str(data)?
    };
    Ok(scenario)
}

fn describe_link(link: &LinkState) -> String {
    let addrs: Vec<String> = link.addresses.iter().map(|a| a.to_string()).collect();
    format!(
        "{} [{}]",
        link.iface.as_deref().unwrap_or("-"),
        addrs.join(", ")
    )
}

fn describe(notice: &BearerNotice) -> String {
    match notice {
        BearerNotice::Connected { link, .. } => format!("connected on {}", describe_link(link)),
        BearerNotice::Retrying { .. } => "bearer lost, retrying".to_string(),
        BearerNotice::Disconnected { cause, reason, .. } => match reason {
            Some(r) => format!("disconnected: {cause} ({r})"),
            None => format!("disconnected: {cause}"),
        },
        BearerNotice::Suspended { suspended: true, .. } => "suspended".to_string(),
        BearerNotice::Suspended { suspended: false, .. } => "resumed".to_string(),
        BearerNotice::LinkChanged { link, .. } => format!("link changed: {}", describe_link(link)),
    }
}

struct Sim {
    registry: ConnectionRegistry,
    transport: Arc<ScriptedTransport>,
    profile: Arc<BearerProfile>,
    consumers: HashMap<u64, ConsumerRef>,
    specs: HashMap<u64, ConsumerSpec>,
    log: mpsc::UnboundedSender<SimEvent>,
    start: Instant,
    tasks: Vec<JoinHandle<()>>,
}

impl Sim {
    fn elapsed_ms(start: Instant) -> u64 {
        u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn record(&self, consumer: Option<u64>, event: String) {
        let _ = self.log.send(SimEvent {
            at_ms: Self::elapsed_ms(self.start),
            consumer,
            event,
        });
    }

    fn consumer(&self, id: u64) -> Result<(ConsumerRef, &ConsumerSpec)> {
        match (self.consumers.get(&id), self.specs.get(&id)) {
            (Some(c), Some(spec)) => Ok((c.clone(), spec)),
            _ => bail!("unknown consumer {id}"),
        }
    }

    async fn apply(&mut self, action: Action) -> Result<()> {
        match action {
            Action::Connect { consumer } => {
                let (cref, spec) = self.consumer(consumer)?;
                let mut req = ConnectRequest::new(cref, self.profile.clone())
                    .retry_on_service_change(spec.retry_on_service_change)
                    .retry_forever(spec.retry_forever);
                if let Some(n) = spec.initial_max_retry {
                    req = req.initial_max_retry(n);
                }
                if let Some(r) = &spec.reason {
                    req = req.reason(r.clone());
                }
                self.record(Some(consumer), "connect requested".to_string());
                let registry = self.registry.clone();
                let log = self.log.clone();
                let start = self.start;
                self.tasks.push(tokio::spawn(async move {
                    let event = match registry.connect(req).await {
                        Ok(link) => format!("connect succeeded on {}", describe_link(&link)),
                        Err(err) => format!("connect failed: {}", err.cause),
                    };
                    let _ = log.send(SimEvent {
                        at_ms: Sim::elapsed_ms(start),
                        consumer: Some(consumer),
                        event,
                    });
                }));
            }
            Action::Disconnect { consumer, reason } => {
                self.consumer(consumer)?;
                let mut req = DisconnectRequest::new(ConsumerId(consumer));
                if let Some(r) = reason {
                    req = req.reason(r);
                }
                self.record(Some(consumer), "disconnect requested".to_string());
                let registry = self.registry.clone();
                let log = self.log.clone();
                let start = self.start;
                self.tasks.push(tokio::spawn(async move {
                    let event = match registry.disconnect(req).await {
                        Ok(()) => "disconnect completed".to_string(),
                        Err(err) => format!("disconnect failed: {}", err.cause),
                    };
                    let _ = log.send(SimEvent {
                        at_ms: Sim::elapsed_ms(start),
                        consumer: Some(consumer),
                        event,
                    });
                }));
            }
            Action::BearerLost { bearer } => {
                let bearer = bearer.map(BearerId).or_else(|| {
                    self.registry
                        .by_apn(&self.profile.apn)
                        .and_then(|h| h.bearer_id())
                });
                match bearer {
                    Some(b) => {
                        let routed = self.registry.on_bearer_lost(b);
                        self.record(None, format!("bearer {b} lost (routed: {routed})"));
                    }
                    None => self.record(None, "bearer lost: no bearer up".to_string()),
                }
            }
            Action::ServiceState { service } => {
                self.record(
                    None,
                    format!(
                        "service state: {:?} on {}, radio {}",
                        service.data_reg,
                        service.rat,
                        if service.radio_on { "on" } else { "off" }
                    ),
                );
                self.registry.broadcast_service_state(service);
            }
            Action::Roaming { on } => {
                self.record(None, format!("roaming {}", if on { "on" } else { "off" }));
                self.registry.broadcast_roaming(on);
            }
            Action::VoiceCall { active } => {
                let what = if active { "started" } else { "ended" };
                self.record(None, format!("voice call {what}"));
                self.registry.broadcast_voice_call(active);
            }
            Action::Reset => {
                self.record(None, "reset".to_string());
                for handle in self.registry.connections() {
                    handle.reset().await;
                }
            }
            Action::TearDownNow => {
                self.record(None, "tear down now".to_string());
                for handle in self.registry.connections() {
                    handle.tear_down_now();
                }
            }
            Action::Script { setups } => {
                self.record(None, format!("{} setup outcome(s) scripted", setups.len()));
                self.transport.push_setups(setups);
            }
        }
        Ok(())
    }
}

/// Run `scenario` to completion and collect what happened.
///
/// Connections still pending after `run_for_ms` are disposed, so their
/// requests resolve with `connection-disposed` at the end of the report.
pub async fn run(scenario: Scenario, cfg: DcmConfig) -> Result<SimReport> {
    let cfg = scenario.config.clone().unwrap_or(cfg);
    let transport = Arc::new(ScriptedTransport::with_script(scenario.script.clone()));
    let registry = ConnectionRegistry::new(ConnectionContext::new(transport.clone(), cfg));
    let (log, mut events_rx) = mpsc::unbounded_channel();
    let start = Instant::now();

    let mut sim = Sim {
        registry,
        transport,
        profile: Arc::new(scenario.profile.clone()),
        consumers: HashMap::new(),
        specs: HashMap::new(),
        log,
        start,
        tasks: Vec::new(),
    };

    for spec in &scenario.consumers {
        if sim.specs.contains_key(&spec.id) {
            bail!("consumer {} declared twice", spec.id);
        }
        let (tx, mut rx) = mpsc::unbounded_channel();
        let log = sim.log.clone();
        let id = spec.id;
        sim.tasks.push(tokio::spawn(async move {
            while let Some(notice) = rx.recv().await {
                let _ = log.send(SimEvent {
                    at_ms: Sim::elapsed_ms(start),
                    consumer: Some(id),
                    event: describe(&notice),
                });
            }
        }));
        let cref = ConsumerRef::new(ConsumerId(spec.id), spec.apn_type).with_notices(tx);
        sim.consumers.insert(spec.id, cref);
        sim.specs.insert(spec.id, spec.clone());
    }

    let mut steps = scenario.steps.clone();
    steps.sort_by_key(|s| s.at_ms);
    for step in steps {
        tokio::time::sleep_until(start + Duration::from_millis(step.at_ms)).await;
        let at = step.at_ms;
        sim.apply(step.action)
            .await
            .with_context(|| format!("step at {at} ms"))?;
    }
    tokio::time::sleep(Duration::from_millis(scenario.run_for_ms)).await;

    let statuses = sim.registry.statuses();
    let setup_calls = sim.transport.setup_calls().len();
    sim.registry.dispose_all().await;

    let Sim { tasks, consumers, log, .. } = sim;
    drop(consumers);
    drop(log);
    for task in tasks {
        task.await?;
    }
    let mut events = Vec::new();
    while let Some(e) = events_rx.recv().await {
        events.push(e);
    }

    tracing::debug!(
        events = events.len(),
        connections = statuses.len(),
        "simulation finished"
    );
    Ok(SimReport {
        events,
        statuses,
        setup_calls,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcm_core::classify::FailCause;
    use dcm_core::connection::ConnectionState;
    use dcm_core::radio::{RadioTech, RegState};

    const RETRY_THEN_UP: &str = r#"
        run_for_ms = 10000

        [config.retry]
        default_schedule = "max_retries=3,1000"

        [profile]
        apn = "internet"
        types = ["default", "supl"]

        [[consumers]]
        id = 1

        [[script]]
        outcome = "respond"
        status = "insufficient-resources"

        [[steps]]
        at_ms = 0
        action = "connect"
        consumer = 1
    "#;

    fn events_for(report: &SimReport, consumer: u64) -> Vec<&str> {
        report
            .events
            .iter()
            .filter(|e| e.consumer == Some(consumer))
            .map(|e| e.event.as_str())
            .collect()
    }

    #[test]
    fn parse_toml_scenario() {
        let s = parse(RETRY_THEN_UP, false).unwrap();
        assert_eq!(s.profile.apn, "internet");
        assert_eq!(s.consumers[0].apn_type, ApnType::Default);
        assert_eq!(s.script, vec![ScriptedSetup::fail(FailCause::InsufficientResources)]);
        assert!(matches!(s.steps[0].action, Action::Connect { consumer: 1 }));
        assert_eq!(
            s.config.unwrap().retry.default_schedule,
            "max_retries=3,1000"
        );
    }

    #[test]
    fn parse_json_scenario() {
        let s = parse(
            r#"{
                "profile": { "apn": "mms.carrier", "types": ["mms"] },
                "consumers": [{ "id": 7, "apn_type": "mms" }],
                "steps": [
                    { "at_ms": 5, "action": "roaming", "on": true },
                    { "action": "service-state", "service": { "rat": "umts" } }
                ]
            }"#,
            true,
        )
        .unwrap();
        assert_eq!(s.run_for_ms, default_run_for_ms());
        assert!(matches!(s.steps[0].action, Action::Roaming { on: true }));
        match &s.steps[1].action {
            Action::ServiceState { service } => {
                assert_eq!(service.rat, RadioTech::Umts);
                assert_eq!(service.data_reg, RegState::InService);
            }
            other => panic!("expected ServiceState, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failed_setup_is_retried_then_connects() {
        let report = run(parse(RETRY_THEN_UP, false).unwrap(), DcmConfig::default())
            .await
            .unwrap();
        assert_eq!(report.setup_calls, 2);
        assert_eq!(report.statuses.len(), 1);
        assert_eq!(report.statuses[0].state, ConnectionState::Active);

        let succeeded = report
            .events
            .iter()
            .find(|e| e.event.starts_with("connect succeeded"))
            .unwrap();
        assert!((1000..=1001).contains(&succeeded.at_ms));
        assert_eq!(succeeded.consumer, Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failure_reaches_the_consumer() {
        let scenario = parse(
            r#"
            [profile]
            apn = "internet"
            types = ["default"]

            [[consumers]]
            id = 1

            [[script]]
            outcome = "respond"
            status = "missing-unknown-apn"

            [[steps]]
            action = "connect"
            consumer = 1
            "#,
            false,
        )
        .unwrap();
        let report = run(scenario, DcmConfig::default()).await.unwrap();
        assert_eq!(report.setup_calls, 1);
        assert!(events_for(&report, 1).contains(&"connect failed: missing-unknown-apn"));
        assert_eq!(report.statuses[0].state, ConnectionState::Inactive);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_and_unknown_consumer() {
        let scenario = parse(
            r#"
            run_for_ms = 1000

            [profile]
            apn = "internet"
            types = ["default"]

            [[consumers]]
            id = 1

            [[steps]]
            at_ms = 0
            action = "connect"
            consumer = 1

            [[steps]]
            at_ms = 100
            action = "disconnect"
            consumer = 1
            "#,
            false,
        )
        .unwrap();
        let report = run(scenario, DcmConfig::default()).await.unwrap();
        let events = events_for(&report, 1);
        assert!(events.contains(&"disconnect completed"));
        assert_eq!(report.statuses[0].state, ConnectionState::Inactive);

        let mut bad = parse(RETRY_THEN_UP, false).unwrap();
        bad.steps[0].action = Action::Connect { consumer: 9 };
        let err = run(bad, DcmConfig::default()).await.unwrap_err();
        assert!(format!("{err:#}").contains("unknown consumer 9"));
    }
}
