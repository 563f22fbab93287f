//! Build a [`LinkState`] from a setup response.

use super::state::{LinkAddress, LinkState, ProxyInfo, Route};
use crate::classify::FailCause;
use crate::config::LinkConfig;
use crate::error::LinkError;
use crate::profile::{ApnType, BearerProfile};
use crate::radio::RadioTech;
use crate::transport::SetupResponse;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

const NULL_IP: &str = "0.0.0.0";

/// Everything besides the response that shapes the derived link.
#[derive(Debug, Clone, Copy)]
pub struct DeriveContext<'a> {
    pub profile: &'a BearerProfile,
    pub rat: RadioTech,
    pub config: &'a LinkConfig,
    /// Proxy of the current link; it survives re-derivation.
    pub http_proxy: Option<&'a ProxyInfo>,
}

fn parse_address(raw: &str) -> Result<LinkAddress, LinkError> {
    let bad = || LinkError::BadAddress(raw.to_string());
    let (ip, prefix) = match raw.trim().split_once('/') {
        Some((ip, p)) => (ip, Some(p)),
        None => (raw.trim(), None),
    };
    let addr: IpAddr = ip.parse().map_err(|_| bad())?;
    let max = if addr.is_ipv4() { 32 } else { 128 };
    let prefix_len = match prefix {
        Some(p) => p.parse::<u8>().map_err(|_| bad())?,
        None => max,
    };
    if prefix_len > max {
        return Err(bad());
    }
    Ok(LinkAddress { addr, prefix_len })
}

/// The modem occasionally reports success with no DNS servers filled in.
/// MMS profiles reaching their proxy by IP literal don't need DNS.
fn dns_ok(dnses: &[String], ctx: &DeriveContext<'_>) -> bool {
    if !ctx.config.dns_check || dnses.len() < 2 {
        return true;
    }
    let null_pair = dnses[0].trim() == NULL_IP && dnses[1].trim() == NULL_IP;
    if !null_pair {
        return true;
    }
    ctx.profile.primary_type() == Some(ApnType::Mms) && ctx.profile.mms_proxy_is_ip()
}

/// Derive the link for a successful response.
pub fn derive_link(response: &SetupResponse, ctx: &DeriveContext<'_>) -> Result<LinkState, LinkError> {
    if !response.status.is_none() {
        return Err(LinkError::Status(response.status));
    }
    let iface = response.iface.trim();
    if iface.is_empty() {
        return Err(LinkError::NoInterface);
    }
    if response.addresses.is_empty() {
        return Err(LinkError::NoAddresses);
    }
    let addresses = response
        .addresses
        .iter()
        .map(|a| parse_address(a))
        .collect::<Result<Vec<_>, _>>()?;

    if !dns_ok(&response.dnses, ctx) {
        return Err(LinkError::NullDns);
    }
    let mut dns = Vec::new();
    for raw in &response.dnses {
        let ip: IpAddr = raw.trim().parse().map_err(|_| LinkError::BadDns(raw.clone()))?;
        if !ip.is_unspecified() {
            dns.push(ip);
        }
    }

    let mut gateways = Vec::new();
    for raw in &response.gateways {
        let ip: IpAddr = raw
            .trim()
            .parse()
            .map_err(|_| LinkError::BadGateway(raw.clone()))?;
        gateways.push(ip);
    }
    if gateways.is_empty() {
        if addresses.iter().any(LinkAddress::is_ipv4) {
            gateways.push(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        }
        if addresses.iter().any(LinkAddress::is_ipv6) {
            gateways.push(IpAddr::V6(Ipv6Addr::UNSPECIFIED));
        }
    }
    let routes = gateways.iter().map(|gw| Route::default_via(*gw, iface)).collect();

    let pcscf = response
        .pcscf
        .iter()
        .filter_map(|raw| match raw.trim().parse::<IpAddr>() {
            Ok(ip) => Some(ip),
            Err(_) => {
                tracing::debug!("ignoring unparsable pcscf '{}'", raw);
                None
            }
        })
        .collect();

    let mtu = response
        .mtu
        .filter(|m| *m > 0)
        .or(ctx.profile.mtu.filter(|m| *m > 0))
        .or(Some(ctx.config.default_mtu).filter(|m| *m > 0));

    Ok(LinkState {
        iface: Some(iface.to_string()),
        addresses,
        dns,
        gateways,
        routes,
        http_proxy: ctx.http_proxy.cloned(),
        mtu,
        tcp_buffer_sizes: ctx.rat.tcp_buffer_sizes().map(str::to_string),
        pcscf,
    })
}

/// Derive the usable part of a response that failed with a partial
/// address-family cause. Works on a copy whose status reads as success;
/// `response` itself is never touched, so repeated calls agree.
pub fn derive_partial(response: &SetupResponse, ctx: &DeriveContext<'_>) -> Result<LinkState, LinkError> {
    let accepted = SetupResponse {
        status: FailCause::None,
        ..response.clone()
    };
    derive_link(&accepted, ctx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response() -> SetupResponse {
        SetupResponse {
            iface: "rmnet0".into(),
            addresses: vec!["10.0.0.2/24".into(), "2001:db8::2".into()],
            dnses: vec!["10.0.0.53".into(), "0.0.0.0".into()],
            gateways: vec!["10.0.0.1".into()],
            ..SetupResponse::default()
        }
    }

    fn derive(resp: &SetupResponse, profile: &BearerProfile) -> Result<LinkState, LinkError> {
        let cfg = LinkConfig::default();
        let ctx = DeriveContext {
            profile,
            rat: RadioTech::Lte,
            config: &cfg,
            http_proxy: None,
        };
        derive_link(resp, &ctx)
    }

    #[test]
    fn full_derivation() {
        let p = BearerProfile::new("internet", &[ApnType::Default]);
        let l = derive(&response(), &p).unwrap();
        assert_eq!(l.iface.as_deref(), Some("rmnet0"));
        assert_eq!(l.addresses.len(), 2);
        assert_eq!(l.addresses[1].prefix_len, 128);
        assert_eq!(l.dns, vec!["10.0.0.53".parse::<IpAddr>().unwrap()]);
        assert_eq!(l.routes.len(), 1);
        assert_eq!(l.mtu, Some(1500));
        assert!(l.tcp_buffer_sizes.is_some());
    }

    #[test]
    fn mtu_precedence() {
        let mut p = BearerProfile::new("internet", &[ApnType::Default]);
        p.mtu = Some(1420);
        assert_eq!(derive(&response(), &p).unwrap().mtu, Some(1420));
        let mut r = response();
        r.mtu = Some(1280);
        assert_eq!(derive(&r, &p).unwrap().mtu, Some(1280));
    }

    #[test]
    fn missing_gateways_default_per_family() {
        let p = BearerProfile::new("internet", &[ApnType::Default]);
        let mut r = response();
        r.gateways.clear();
        let l = derive(&r, &p).unwrap();
        assert_eq!(l.gateways.len(), 2);
        assert!(l.gateways.iter().all(IpAddr::is_unspecified));
    }

    #[test]
    fn unusable_responses_rejected() {
        let p = BearerProfile::new("internet", &[ApnType::Default]);
        let mut r = response();
        r.iface.clear();
        assert_eq!(derive(&r, &p), Err(LinkError::NoInterface));

        let mut r = response();
        r.addresses = vec!["10.0.0.300".into()];
        assert!(matches!(derive(&r, &p), Err(LinkError::BadAddress(_))));

        let mut r = response();
        r.addresses = vec!["10.0.0.3/40".into()];
        assert!(matches!(derive(&r, &p), Err(LinkError::BadAddress(_))));

        let mut r = response();
        r.addresses.clear();
        assert_eq!(derive(&r, &p), Err(LinkError::NoAddresses));

        let mut r = response();
        r.status = FailCause::SignalLost;
        assert_eq!(derive(&r, &p), Err(LinkError::Status(FailCause::SignalLost)));
    }

    #[test]
    fn null_dns_rejected_unless_mms_ip_proxy() {
        let mut r = response();
        r.dnses = vec![NULL_IP.into(), NULL_IP.into()];
        let p = BearerProfile::new("internet", &[ApnType::Default]);
        assert_eq!(derive(&r, &p), Err(LinkError::NullDns));

        let mut mms = BearerProfile::new("mms", &[ApnType::Mms]);
        mms.mms_proxy = Some("10.10.10.10".into());
        assert!(derive(&r, &mms).unwrap().dns.is_empty());
    }

    #[test]
    fn partial_derivation_leaves_response_alone() {
        let p = BearerProfile::new("internet", &[ApnType::Default]);
        let cfg = LinkConfig::default();
        let ctx = DeriveContext {
            profile: &p,
            rat: RadioTech::Lte,
            config: &cfg,
            http_proxy: None,
        };
        let mut r = response();
        r.status = FailCause::OnlyIpv4Allowed;
        let before = r.clone();
        let a = derive_partial(&r, &ctx).unwrap();
        let b = derive_partial(&r, &ctx).unwrap();
        assert_eq!(a, b);
        assert_eq!(r, before);
        assert_eq!(r.status, FailCause::OnlyIpv4Allowed);
    }
}
