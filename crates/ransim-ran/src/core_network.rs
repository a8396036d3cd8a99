//! Core network collaborator: authentication, slices and QoS.

use std::fmt;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// Network slice a UE is assigned to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SliceType {
    /// Enhanced mobile broadband.
    Embb,
    /// Ultra reliable low latency communication.
    Urllc,
    /// Massive IoT.
    Miot,
}

impl Default for SliceType {
    fn default() -> Self {
        SliceType::Embb
    }
}

impl fmt::Display for SliceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SliceType::Embb => write!(f, "embb"),
            SliceType::Urllc => write!(f, "urllc"),
            SliceType::Miot => write!(f, "miot"),
        }
    }
}

/// QoS parameters of the default flow assigned by the core.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QosProfile {
    /// 5G QoS identifier.
    pub five_qi: u32,
    /// Allocation and retention priority, lower is more important.
    pub priority: u32,
}

/// Core network stub.
///
/// Owns the network-side registration state of UEs and hands out slice and
/// QoS assignments. Authentication always succeeds and every slice maps to a
/// fixed QoS profile.
#[derive(Debug, Default)]
pub struct CoreNetwork {
    registered: IndexSet<String>,
}

impl CoreNetwork {
    /// Creates a core network with no registered UEs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Authenticates a UE and assigns its slice and QoS profile.
    pub fn authenticate_and_register(&mut self, imsi: &str, slice: SliceType) -> (SliceType, QosProfile) {
        self.registered.insert(imsi.to_string());
        (slice, Self::qos_for(slice))
    }

    /// Releases the core-side registration of a UE. Returns whether the UE
    /// was registered.
    pub fn deregister(&mut self, imsi: &str) -> bool {
        self.registered.shift_remove(imsi)
    }

    /// Checks whether the UE is registered with the core.
    pub fn is_registered(&self, imsi: &str) -> bool {
        self.registered.contains(imsi)
    }

    fn qos_for(slice: SliceType) -> QosProfile {
        match slice {
            SliceType::Embb => QosProfile { five_qi: 9, priority: 80 },
            SliceType::Urllc => QosProfile { five_qi: 82, priority: 20 },
            SliceType::Miot => QosProfile { five_qi: 79, priority: 60 },
        }
    }
}
