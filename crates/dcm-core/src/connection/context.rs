use crate::classify::{DefaultClassifier, FailureClassifier};
use crate::config::DcmConfig;
use crate::transport::{AlarmScheduler, BearerTransport, TokioAlarms};
use std::sync::Arc;

/// Collaborators shared by every connection.
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    pub transport: Arc<dyn BearerTransport>,
    pub alarms: Arc<dyn AlarmScheduler>,
    pub classifier: Arc<dyn FailureClassifier>,
    pub config: Arc<DcmConfig>,
}

impl ConnectionContext {
    /// Tokio alarms and the built-in classifier, both configured from
    /// `config`.
    pub fn new(transport: Arc<dyn BearerTransport>, config: DcmConfig) -> Self {
        Self {
            transport,
            alarms: Arc::new(TokioAlarms::from_config(&config.alarms)),
            classifier: Arc::new(DefaultClassifier::from_config(&config.classifier)),
            config: Arc::new(config),
        }
    }

    pub fn with_alarms(mut self, alarms: Arc<dyn AlarmScheduler>) -> Self {
        self.alarms = alarms;
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn FailureClassifier>) -> Self {
        self.classifier = classifier;
        self
    }
}
