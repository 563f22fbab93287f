use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

/// Immutable view of a link handed to consumers. A new snapshot is built
/// on every change; existing snapshots never change under their holders.
pub type LinkSnapshot = Arc<LinkState>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinkAddress {
    pub addr: IpAddr,
    pub prefix_len: u8,
}

impl LinkAddress {
    pub fn is_ipv4(&self) -> bool {
        self.addr.is_ipv4()
    }

    pub fn is_ipv6(&self) -> bool {
        self.addr.is_ipv6()
    }

    /// Routable address: not unspecified and, for IPv6, not link-local.
    pub fn is_usable(&self) -> bool {
        match self.addr {
            IpAddr::V4(v4) => !v4.is_unspecified(),
            IpAddr::V6(v6) => !v6.is_unspecified() && (v6.segments()[0] & 0xffc0) != 0xfe80,
        }
    }
}

impl fmt::Display for LinkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix_len)
    }
}

/// Default route through `gateway`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub destination: LinkAddress,
    pub gateway: IpAddr,
    pub iface: String,
}

impl Route {
    pub fn default_via(gateway: IpAddr, iface: &str) -> Self {
        let any = match gateway {
            IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };
        Self {
            destination: LinkAddress {
                addr: any,
                prefix_len: 0,
            },
            gateway,
            iface: iface.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyInfo {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub exclusions: Vec<String>,
}

/// Addressing, routing and sizing of one bearer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LinkState {
    pub iface: Option<String>,
    pub addresses: Vec<LinkAddress>,
    pub dns: Vec<IpAddr>,
    pub gateways: Vec<IpAddr>,
    pub routes: Vec<Route>,
    pub http_proxy: Option<ProxyInfo>,
    pub mtu: Option<u32>,
    pub tcp_buffer_sizes: Option<String>,
    pub pcscf: Vec<IpAddr>,
}

/// What changed between two link states.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkDiff {
    pub added: Vec<LinkAddress>,
    pub removed: Vec<LinkAddress>,
    pub iface_changed: bool,
    pub dns_changed: bool,
    pub routes_changed: bool,
    pub mtu_changed: bool,
}

impl LinkDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && !self.iface_changed
            && !self.dns_changed
            && !self.routes_changed
            && !self.mtu_changed
    }
}

impl LinkState {
    pub fn empty_snapshot() -> LinkSnapshot {
        Arc::new(LinkState::default())
    }

    pub fn is_empty(&self) -> bool {
        self.iface.is_none() && self.addresses.is_empty()
    }

    pub fn has_usable_ipv4(&self) -> bool {
        self.addresses.iter().any(|a| a.is_ipv4() && a.is_usable())
    }

    pub fn has_usable_ipv6(&self) -> bool {
        self.addresses.iter().any(|a| a.is_ipv6() && a.is_usable())
    }

    /// Copy with `proxy` in place of the current HTTP proxy.
    pub fn with_http_proxy(&self, proxy: Option<ProxyInfo>) -> LinkState {
        LinkState {
            http_proxy: proxy,
            ..self.clone()
        }
    }

    pub fn with_tcp_buffer_sizes(&self, sizes: Option<&str>) -> LinkState {
        LinkState {
            tcp_buffer_sizes: sizes.map(str::to_string),
            ..self.clone()
        }
    }

    /// Compare against a newer state. Address order is irrelevant.
    pub fn diff(&self, newer: &LinkState) -> LinkDiff {
        let added = newer
            .addresses
            .iter()
            .filter(|a| !self.addresses.contains(a))
            .copied()
            .collect();
        let removed = self
            .addresses
            .iter()
            .filter(|a| !newer.addresses.contains(a))
            .copied()
            .collect();
        LinkDiff {
            added,
            removed,
            iface_changed: self.iface != newer.iface,
            dns_changed: self.dns != newer.dns,
            routes_changed: self.routes != newer.routes,
            mtu_changed: self.mtu != newer.mtu,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str, p: u8) -> LinkAddress {
        LinkAddress {
            addr: s.parse().unwrap(),
            prefix_len: p,
        }
    }

    #[test]
    fn link_local_v6_not_usable() {
        let mut l = LinkState::default();
        l.addresses.push(addr("fe80::1", 64));
        assert!(!l.has_usable_ipv6());
        l.addresses.push(addr("2001:db8::5", 64));
        assert!(l.has_usable_ipv6());
        assert!(!l.has_usable_ipv4());
    }

    #[test]
    fn proxy_copy_leaves_original() {
        let l = LinkState {
            iface: Some("rmnet0".into()),
            ..LinkState::default()
        };
        let proxy = ProxyInfo {
            host: "proxy.example.net".into(),
            port: 8080,
            exclusions: Vec::new(),
        };
        let n = l.with_http_proxy(Some(proxy.clone()));
        assert_eq!(n.http_proxy, Some(proxy));
        assert_eq!(l.http_proxy, None);
        assert_eq!(n.iface, l.iface);
    }

    #[test]
    fn diff_reports_address_moves() {
        let old = LinkState {
            addresses: vec![addr("10.0.0.2", 24), addr("2001:db8::5", 64)],
            mtu: Some(1500),
            ..LinkState::default()
        };
        let mut new = old.clone();
        assert!(old.diff(&new).is_empty());
        new.addresses = vec![addr("2001:db8::5", 64), addr("10.0.0.9", 24)];
        new.mtu = Some(1400);
        let d = old.diff(&new);
        assert_eq!(d.added, vec![addr("10.0.0.9", 24)]);
        assert_eq!(d.removed, vec![addr("10.0.0.2", 24)]);
        assert!(d.mtu_changed);
        assert!(!d.dns_changed);
    }
}
