//! Bearer profile descriptor (APN settings) and the request types it serves.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Traffic class a consumer asks for. A profile lists the classes it can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApnType {
    Default,
    Mms,
    Supl,
    Dun,
    Hipri,
    Fota,
    Ims,
    Cbs,
    Ia,
    Emergency,
    Xcap,
    Rcs,
    /// Wildcard entry (`*` in profile databases): handles every type except
    /// the signalling ones.
    #[serde(alias = "*")]
    All,
}

impl ApnType {
    /// IMS and emergency bearers carry signalling and are never retried.
    pub fn is_signalling(self) -> bool {
        matches!(self, ApnType::Ims | ApnType::Emergency)
    }
}

impl fmt::Display for ApnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ApnType::Default => "default",
            ApnType::Mms => "mms",
            ApnType::Supl => "supl",
            ApnType::Dun => "dun",
            ApnType::Hipri => "hipri",
            ApnType::Fota => "fota",
            ApnType::Ims => "ims",
            ApnType::Cbs => "cbs",
            ApnType::Ia => "ia",
            ApnType::Emergency => "emergency",
            ApnType::Xcap => "xcap",
            ApnType::Rcs => "rcs",
            ApnType::All => "*",
        };
        f.write_str(s)
    }
}

impl FromStr for ApnType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = match s.trim().to_ascii_lowercase().as_str() {
            "default" => ApnType::Default,
            "mms" => ApnType::Mms,
            "supl" => ApnType::Supl,
            "dun" => ApnType::Dun,
            "hipri" => ApnType::Hipri,
            "fota" => ApnType::Fota,
            "ims" => ApnType::Ims,
            "cbs" => ApnType::Cbs,
            "ia" => ApnType::Ia,
            "emergency" => ApnType::Emergency,
            "xcap" => ApnType::Xcap,
            "rcs" => ApnType::Rcs,
            "*" | "all" => ApnType::All,
            other => return Err(format!("unknown APN type '{other}'")),
        };
        Ok(t)
    }
}

/// PDP protocol family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PdpProtocol {
    #[default]
    Ip,
    Ipv6,
    Ipv4v6,
}

impl PdpProtocol {
    pub fn wants_ipv6(self) -> bool {
        matches!(self, PdpProtocol::Ipv6 | PdpProtocol::Ipv4v6)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMode {
    None,
    Pap,
    Chap,
    PapOrChap,
}

/// A bearer profile: everything the transport needs to set up one bearer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BearerProfile {
    pub apn: String,
    pub types: Vec<ApnType>,
    #[serde(default)]
    pub protocol: PdpProtocol,
    #[serde(default)]
    pub roaming_protocol: PdpProtocol,
    /// Explicit auth mode; when absent it is derived from `user`.
    #[serde(default)]
    pub auth: Option<AuthMode>,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub mtu: Option<u32>,
    #[serde(default)]
    pub profile_id: u32,
    #[serde(default)]
    pub mms_proxy: Option<String>,
}

impl BearerProfile {
    pub fn new(apn: impl Into<String>, types: &[ApnType]) -> Self {
        Self {
            apn: apn.into(),
            types: types.to_vec(),
            protocol: PdpProtocol::default(),
            roaming_protocol: PdpProtocol::default(),
            auth: None,
            user: String::new(),
            password: String::new(),
            mtu: None,
            profile_id: 0,
            mms_proxy: None,
        }
    }

    /// Whether a consumer asking for `t` can be served by this profile.
    pub fn can_handle(&self, t: ApnType) -> bool {
        self.types.iter().any(|&own| {
            own == t || (own == ApnType::All && !t.is_signalling())
        })
    }

    /// Two profiles describe the same bearer when they name the same APN.
    pub fn same_bearer(&self, other: &BearerProfile) -> bool {
        self.apn.eq_ignore_ascii_case(&other.apn)
    }

    pub fn primary_type(&self) -> Option<ApnType> {
        self.types.first().copied()
    }

    /// Profiles carrying IMS or emergency signalling.
    pub fn is_signalling(&self) -> bool {
        self.types.iter().any(|t| t.is_signalling())
    }

    pub fn effective_auth(&self) -> AuthMode {
        match self.auth {
            Some(mode) => mode,
            None if self.user.is_empty() => AuthMode::None,
            None => AuthMode::PapOrChap,
        }
    }

    pub fn protocol_for(&self, roaming: bool) -> PdpProtocol {
        if roaming {
            self.roaming_protocol
        } else {
            self.protocol
        }
    }

    /// MMS proxy given as an IP literal (rather than a host name).
    pub fn mms_proxy_is_ip(&self) -> bool {
        self.mms_proxy
            .as_deref()
            .map(|p| p.trim().parse::<IpAddr>().is_ok())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_handles_everything_but_signalling() {
        let p = BearerProfile::new("internet", &[ApnType::All]);
        assert!(p.can_handle(ApnType::Default));
        assert!(p.can_handle(ApnType::Mms));
        assert!(!p.can_handle(ApnType::Ims));
        assert!(!p.can_handle(ApnType::Emergency));
    }

    #[test]
    fn auth_follows_user() {
        let mut p = BearerProfile::new("internet", &[ApnType::Default]);
        assert_eq!(p.effective_auth(), AuthMode::None);
        p.user = "carrier".into();
        assert_eq!(p.effective_auth(), AuthMode::PapOrChap);
        p.auth = Some(AuthMode::Chap);
        assert_eq!(p.effective_auth(), AuthMode::Chap);
    }

    #[test]
    fn roaming_protocol_selected_while_roaming() {
        let mut p = BearerProfile::new("internet", &[ApnType::Default]);
        p.protocol = PdpProtocol::Ipv4v6;
        p.roaming_protocol = PdpProtocol::Ip;
        assert_eq!(p.protocol_for(false), PdpProtocol::Ipv4v6);
        assert_eq!(p.protocol_for(true), PdpProtocol::Ip);
    }

    #[test]
    fn mms_proxy_ip_literal() {
        let mut p = BearerProfile::new("mms", &[ApnType::Mms]);
        assert!(!p.mms_proxy_is_ip());
        p.mms_proxy = Some("mms.example.net".into());
        assert!(!p.mms_proxy_is_ip());
        p.mms_proxy = Some("10.0.0.200".into());
        assert!(p.mms_proxy_is_ip());
    }

    #[test]
    fn profile_from_toml() {
        let p: BearerProfile = toml::from_str(
            r#"
            apn = "ims"
            types = ["ims"]
            protocol = "ipv4v6"
            "#,
        )
        .unwrap();
        assert!(p.is_signalling());
        assert_eq!(p.protocol, PdpProtocol::Ipv4v6);
        assert_eq!("*".parse::<ApnType>().unwrap(), ApnType::All);
    }
}
