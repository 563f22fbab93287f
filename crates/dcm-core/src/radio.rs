//! Radio access technology and service-state snapshot, plus the per-RAT
//! lookup tables (nominal bandwidth, TCP buffer sizes) used when publishing
//! link metadata.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Radio access technology reported by the modem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RadioTech {
    #[default]
    Unknown,
    Gprs,
    Edge,
    Umts,
    Is95a,
    Is95b,
    #[serde(rename = "1xrtt")]
    OneXRtt,
    Evdo0,
    EvdoA,
    Hsdpa,
    Hsupa,
    Hspa,
    EvdoB,
    Ehrpd,
    Lte,
    Hspap,
    Gsm,
    TdScdma,
    Iwlan,
}

impl RadioTech {
    /// Nominal `(uplink, downlink)` bandwidth in kbps.
    pub fn bandwidth_kbps(self) -> (u32, u32) {
        match self {
            RadioTech::Gprs => (80, 80),
            RadioTech::Edge => (59, 236),
            RadioTech::Umts => (384, 384),
            RadioTech::Is95a | RadioTech::Is95b => (14, 14),
            RadioTech::Evdo0 => (153, 2457),
            RadioTech::EvdoA => (1843, 3174),
            RadioTech::OneXRtt => (100, 100),
            RadioTech::Hsdpa => (2048, 14336),
            RadioTech::Hsupa | RadioTech::Hspa => (5898, 14336),
            RadioTech::EvdoB => (1843, 5017),
            RadioTech::Lte => (51200, 102400),
            RadioTech::Ehrpd => (153, 2516),
            RadioTech::Hspap => (11264, 43008),
            _ => (14, 14),
        }
    }

    /// Kernel TCP buffer sizes (`rmem min,def,max,wmem min,def,max`) for this
    /// technology, or `None` when the system default applies.
    pub fn tcp_buffer_sizes(self) -> Option<&'static str> {
        let sizes = match self {
            RadioTech::Gprs | RadioTech::Gsm => "4092,8760,48000,4096,8760,48000",
            RadioTech::Edge => "4093,26280,70800,4096,16384,70800",
            RadioTech::Umts | RadioTech::TdScdma => "58254,349525,1048576,58254,349525,1048576",
            RadioTech::OneXRtt | RadioTech::Is95a | RadioTech::Is95b => {
                "16384,32768,131072,4096,16384,102400"
            }
            RadioTech::Evdo0 | RadioTech::EvdoA | RadioTech::EvdoB => {
                "4094,87380,262144,4096,16384,262144"
            }
            RadioTech::Hsdpa => "61167,367002,1101005,8738,52429,262114",
            RadioTech::Hsupa | RadioTech::Hspa => "40778,244668,734003,16777,100663,301990",
            RadioTech::Lte => "524288,1048576,2097152,262144,524288,1048576",
            RadioTech::Ehrpd => "131072,262144,1048576,4096,16384,524288",
            RadioTech::Hspap => "122334,734003,2202010,32040,192239,576717",
            RadioTech::Unknown | RadioTech::Iwlan => return None,
        };
        Some(sizes)
    }
}

impl fmt::Display for RadioTech {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format!("{:?}", self).to_lowercase())
    }
}

/// Data registration state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegState {
    #[default]
    InService,
    OutOfService,
    EmergencyOnly,
    PowerOff,
}

/// Service state pushed by the radio layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceState {
    pub data_reg: RegState,
    pub rat: RadioTech,
    pub radio_on: bool,
    /// Whether the network allows voice and data at the same time. When it
    /// doesn't, an ongoing voice call suspends the bearer.
    pub concurrent_voice_and_data: bool,
}

impl Default for ServiceState {
    fn default() -> Self {
        Self {
            data_reg: RegState::InService,
            rat: RadioTech::Lte,
            radio_on: true,
            concurrent_voice_and_data: true,
        }
    }
}

impl ServiceState {
    pub fn in_service(&self) -> bool {
        self.data_reg == RegState::InService
    }

    /// True when data registration or RAT differ. Radio power and voice
    /// concurrency are tracked but don't count as a service change.
    pub fn drs_or_rat_differs(&self, other: &ServiceState) -> bool {
        self.data_reg != other.data_reg || self.rat != other.rat
    }
}

/// Radio conditions a connection tracks between events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioEnv {
    pub service: ServiceState,
    pub roaming: bool,
    pub voice_call: bool,
}

impl RadioEnv {
    /// Data is suspended while out of service, or during a voice call on a
    /// network without concurrent voice and data.
    pub fn data_suspended(&self) -> bool {
        !self.service.in_service() || (self.voice_call && !self.service.concurrent_voice_and_data)
    }
}
