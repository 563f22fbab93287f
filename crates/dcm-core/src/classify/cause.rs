//! Failure causes with their radio-level codes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! fail_causes {
    ($($variant:ident = $code:expr, $name:literal;)*) => {
        /// Why a bearer could not be set up or was lost.
        ///
        /// Radio causes keep their 3GPP/modem codes; causes raised locally
        /// use codes outside the modem range.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum FailCause {
            $($variant,)*
            /// Code not known to this build.
            Other(i32),
        }

        impl FailCause {
            pub fn code(self) -> i32 {
                match self {
                    $(FailCause::$variant => $code,)*
                    FailCause::Other(c) => c,
                }
            }

            pub fn from_code(code: i32) -> Self {
                match code {
                    $(c if c == $code => FailCause::$variant,)*
                    other => FailCause::Other(other),
                }
            }

            pub fn name(self) -> Option<&'static str> {
                match self {
                    $(FailCause::$variant => Some($name),)*
                    FailCause::Other(_) => None,
                }
            }

            fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(FailCause::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

fail_causes! {
    None = 0, "none";
    OperatorBarred = 0x08, "operator-barred";
    InsufficientResources = 0x1A, "insufficient-resources";
    MissingUnknownApn = 0x1B, "missing-unknown-apn";
    UnknownPdpAddressType = 0x1C, "unknown-pdp-address-type";
    UserAuthentication = 0x1D, "user-authentication";
    ActivationRejectGgsn = 0x1E, "activation-reject-ggsn";
    ActivationRejectUnspecified = 0x1F, "activation-reject-unspecified";
    ServiceOptionNotSupported = 0x20, "service-option-not-supported";
    ServiceOptionNotSubscribed = 0x21, "service-option-not-subscribed";
    ServiceOptionOutOfOrder = 0x22, "service-option-out-of-order";
    NsapiInUse = 0x23, "nsapi-in-use";
    RegularDeactivation = 0x24, "regular-deactivation";
    OnlyIpv4Allowed = 0x32, "only-ipv4-allowed";
    OnlyIpv6Allowed = 0x33, "only-ipv6-allowed";
    OnlySingleBearerAllowed = 0x34, "only-single-bearer-allowed";
    ProtocolErrors = 0x6F, "protocol-errors";
    RegistrationFail = -1, "registration-fail";
    GprsRegistrationFail = -2, "gprs-registration-fail";
    SignalLost = -3, "signal-lost";
    PrefRadioTechChanged = -4, "pref-radio-tech-changed";
    RadioPowerOff = -5, "radio-power-off";
    TetheredCallActive = -6, "tethered-call-active";
    FallbackRetry = -1000, "fallback-retry";
    ErrorUnspecified = 0xFFFF, "error-unspecified";
    Unknown = 0x10000, "unknown";
    RadioNotAvailable = 0x10001, "radio-not-available";
    UnacceptableNetworkParameter = 0x10002, "unacceptable-network-parameter";
    LostConnection = 0x10004, "lost-connection";
    ResetByController = 0x10005, "reset-by-controller";
    Cancelled = 0x10006, "cancelled";
    ConnectionDisposed = 0x10007, "connection-disposed";
}

impl Default for FailCause {
    fn default() -> Self {
        FailCause::None
    }
}

impl FailCause {
    pub fn is_none(self) -> bool {
        self == FailCause::None
    }

    /// Causes that can never succeed on retry with the same parameters.
    pub fn is_permanent(self) -> bool {
        matches!(
            self,
            FailCause::OperatorBarred
                | FailCause::MissingUnknownApn
                | FailCause::UnknownPdpAddressType
                | FailCause::UserAuthentication
                | FailCause::ActivationRejectGgsn
                | FailCause::ServiceOptionNotSupported
                | FailCause::ServiceOptionNotSubscribed
                | FailCause::NsapiInUse
                | FailCause::ProtocolErrors
                | FailCause::RadioPowerOff
                | FailCause::TetheredCallActive
                | FailCause::UnacceptableNetworkParameter
        )
    }

    /// Only one of the two requested address families was granted.
    pub fn is_partial_family(self) -> bool {
        matches!(
            self,
            FailCause::OnlyIpv4Allowed
                | FailCause::OnlyIpv6Allowed
                | FailCause::OnlySingleBearerAllowed
        )
    }
}

impl fmt::Display for FailCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            Option::None => write!(f, "cause-{:#x}", self.code()),
        }
    }
}

impl FromStr for FailCause {
    type Err = String;

    /// Accepts a kebab-case name, a decimal code, or a `0x` hex code.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(cause) = FailCause::from_name(&s.to_ascii_lowercase().replace('_', "-")) {
            return Ok(cause);
        }
        let code = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => i32::from_str_radix(hex, 16),
            Option::None => s.parse::<i32>(),
        };
        code.map(FailCause::from_code)
            .map_err(|_| format!("unknown fail cause '{s}'"))
    }
}

impl Serialize for FailCause {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.name() {
            Some(name) => serializer.serialize_str(name),
            Option::None => serializer.serialize_i32(self.code()),
        }
    }
}

impl<'de> Deserialize<'de> for FailCause {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Code(i32),
            Name(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Code(c) => Ok(FailCause::from_code(c)),
            Raw::Name(n) => n.parse().map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip_through_names() {
        assert_eq!(FailCause::from_code(0x1A), FailCause::InsufficientResources);
        assert_eq!(FailCause::LostConnection.code(), 0x10004);
        assert_eq!(FailCause::from_code(4242), FailCause::Other(4242));
    }

    #[test]
    fn parse_accepts_names_and_codes() {
        assert_eq!("only-ipv4-allowed".parse(), Ok(FailCause::OnlyIpv4Allowed));
        assert_eq!("ONLY_IPV6_ALLOWED".parse(), Ok(FailCause::OnlyIpv6Allowed));
        assert_eq!("0x24".parse(), Ok(FailCause::RegularDeactivation));
        assert_eq!("-3".parse(), Ok(FailCause::SignalLost));
        assert!("not-a-cause".parse::<FailCause>().is_err());
    }

    #[test]
    fn display_unknown_code_in_hex() {
        assert_eq!(FailCause::Other(0x99).to_string(), "cause-0x99");
        assert_eq!(FailCause::OperatorBarred.to_string(), "operator-barred");
    }

    #[test]
    fn serde_accepts_name_or_code() {
        #[derive(Deserialize)]
        struct W {
            a: FailCause,
            b: FailCause,
        }
        let w: W = toml::from_str("a = \"signal-lost\"\nb = 8").unwrap();
        assert_eq!(w.a, FailCause::SignalLost);
        assert_eq!(w.b, FailCause::OperatorBarred);
    }
}
