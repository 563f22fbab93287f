use crate::classify::{FailCause, OperatorOverride};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_RETRY_SCHEDULE: &str = "default_randomization=2000,5000,10000,20000,40000,\
     80000:5000,160000:5000,320000:5000,640000:5000,1280000:5000,1800000:5000";
pub const SECONDARY_RETRY_SCHEDULE: &str = "max_retries=3,5000,5000,5000";

/// Single-slot schedule used when a configured schedule string is malformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedRetry {
    pub max_retries: u32,
    pub delay_ms: u64,
    pub randomization_ms: u64,
}

/// Retry schedules (optional `[retry]` section).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Schedule for profiles that carry default (internet) traffic.
    pub default_schedule: String,
    /// Schedule for every other profile.
    pub secondary_schedule: String,
    pub fallback: FixedRetry,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            default_schedule: DEFAULT_RETRY_SCHEDULE.to_string(),
            secondary_schedule: SECONDARY_RETRY_SCHEDULE.to_string(),
            fallback: FixedRetry {
                max_retries: 5,
                delay_ms: 2000,
                randomization_ms: 1000,
            },
        }
    }
}

/// Link derivation knobs (optional `[link]` section).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// MTU used when neither the setup response nor the profile gives one.
    pub default_mtu: u32,
    /// Reject responses whose first two DNS servers are both 0.0.0.0.
    pub dns_check: bool,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            default_mtu: 1500,
            dns_check: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Treat `regular-deactivation` as "restart the radio".
    pub restart_on_regular_deactivation: bool,
    pub overrides: Vec<OperatorOverride>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlarmConfig {
    /// Approximate alarms are rounded up to a multiple of this window (0 = off).
    pub approximate_slack_ms: u64,
}

/// Synthetic setup failures for test rigs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailBringUp {
    pub count: u32,
    pub cause: FailCause,
    #[serde(default)]
    pub suggested_retry_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultConfig {
    pub fail_bring_up: Option<FailBringUp>,
}

/// Global configuration loaded from `~/.config/dcm/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DcmConfig {
    pub retry: RetryConfig,
    pub link: LinkConfig,
    pub classifier: ClassifierConfig,
    pub alarms: AlarmConfig,
    pub fault: FaultConfig,
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("dcm")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<DcmConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = DcmConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }
    load_from(&path)
}

pub fn load_from(path: &Path) -> Result<DcmConfig> {
    let data = fs::read_to_string(path)?;
    let cfg: DcmConfig = toml::from_str(&data)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::AlarmPrecision;
    use std::io::Write;

    #[test]
    fn default_config_values() {
        let cfg = DcmConfig::default();
        assert_eq!(cfg.retry.secondary_schedule, SECONDARY_RETRY_SCHEDULE);
        assert_eq!(cfg.retry.fallback.max_retries, 5);
        assert_eq!(cfg.link.default_mtu, 1500);
        assert!(cfg.link.dns_check);
        assert!(cfg.classifier.overrides.is_empty());
        assert!(cfg.fault.fail_bring_up.is_none());
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = DcmConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: DcmConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn empty_file_is_all_defaults() {
        let cfg: DcmConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, DcmConfig::default());
    }

    #[test]
    fn config_toml_custom_values() {
        let toml = r#"
            [retry]
            default_schedule = "1000,2000"

            [link]
            default_mtu = 1400

            [classifier]
            restart_on_regular_deactivation = true

            [[classifier.overrides]]
            cause = "insufficient-resources"
            precision = "exact"
            delay_ms = 720000
            survives_service_change = true

            [fault.fail_bring_up]
            count = 2
            cause = "signal-lost"
        "#;
        let cfg: DcmConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.retry.default_schedule, "1000,2000");
        assert_eq!(cfg.retry.secondary_schedule, SECONDARY_RETRY_SCHEDULE);
        assert_eq!(cfg.link.default_mtu, 1400);
        assert!(cfg.link.dns_check);
        assert!(cfg.classifier.restart_on_regular_deactivation);
        let o = &cfg.classifier.overrides[0];
        assert_eq!(o.cause, FailCause::InsufficientResources);
        assert_eq!(o.precision, AlarmPrecision::Exact);
        assert_eq!(o.delay_ms, Some(720_000));
        let fault = cfg.fault.fail_bring_up.unwrap();
        assert_eq!(fault.count, 2);
        assert_eq!(fault.cause, FailCause::SignalLost);
    }

    #[test]
    fn load_from_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "[alarms]\napproximate_slack_ms = 250").unwrap();
        let cfg = load_from(f.path()).unwrap();
        assert_eq!(cfg.alarms.approximate_slack_ms, 250);
    }

    #[test]
    fn load_from_rejects_garbage() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "[link]\ndefault_mtu = \"big\"").unwrap();
        assert!(load_from(f.path()).is_err());
    }
}
