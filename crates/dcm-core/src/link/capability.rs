//! Externally visible capabilities of a connection.

use crate::profile::{ApnType, BearerProfile};
use crate::radio::RadioTech;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Internet,
    Mms,
    Supl,
    Dun,
    Fota,
    Ims,
    Cbs,
    Ia,
    Eims,
    Xcap,
    Rcs,
}

impl Capability {
    /// Capabilities that, on their own, mark a network as restricted.
    pub fn is_restricted(self) -> bool {
        matches!(
            self,
            Capability::Cbs
                | Capability::Dun
                | Capability::Eims
                | Capability::Fota
                | Capability::Ia
                | Capability::Ims
                | Capability::Rcs
                | Capability::Xcap
        )
    }

    /// What a consumer asking for `t` is granted.
    pub fn grant(t: ApnType) -> &'static [Capability] {
        match t {
            ApnType::Default | ApnType::Hipri => &[Capability::Internet],
            ApnType::Mms => &[Capability::Mms],
            ApnType::Supl => &[Capability::Supl],
            ApnType::Dun => &[Capability::Dun],
            ApnType::Fota => &[Capability::Fota],
            ApnType::Ims => &[Capability::Ims],
            ApnType::Cbs => &[Capability::Cbs],
            ApnType::Ia => &[Capability::Ia],
            ApnType::Emergency => &[Capability::Eims],
            ApnType::Xcap => &[Capability::Xcap],
            ApnType::Rcs => &[Capability::Rcs],
            ApnType::All => &[
                Capability::Internet,
                Capability::Mms,
                Capability::Supl,
                Capability::Fota,
                Capability::Cbs,
                Capability::Ia,
                Capability::Dun,
                Capability::Xcap,
                Capability::Rcs,
            ],
        }
    }
}

/// Capability set published for a connection. Recomputed whenever the
/// consumer set, roaming state, RAT or bandwidth changes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CapabilitySet {
    pub caps: BTreeSet<Capability>,
    pub restricted: bool,
    pub roaming: bool,
    pub up_kbps: u32,
    pub down_kbps: u32,
}

impl CapabilitySet {
    /// Union of every consumer's grant, limited to what `profile` can carry.
    pub fn derive(
        profile: Option<&BearerProfile>,
        consumers: impl IntoIterator<Item = ApnType>,
        rat: RadioTech,
        roaming: bool,
        down_override: Option<u32>,
    ) -> Self {
        let mut caps = BTreeSet::new();
        if let Some(profile) = profile {
            for t in consumers {
                if profile.can_handle(t) {
                    caps.extend(Capability::grant(t).iter().copied());
                }
            }
        }
        let restricted = !caps.is_empty() && caps.iter().all(|c| c.is_restricted());
        let (up, down) = rat.bandwidth_kbps();
        Self {
            caps,
            restricted,
            roaming,
            up_kbps: up,
            down_kbps: down_override.unwrap_or(down),
        }
    }

    pub fn has(&self, cap: Capability) -> bool {
        self.caps.contains(&cap)
    }
}
