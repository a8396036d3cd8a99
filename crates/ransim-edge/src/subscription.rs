//! AI service subscriptions.

use serde::{Deserialize, Serialize};

/// Resource demands of a service image measured on a specific node type.
///
/// A service can run only on nodes it has a profile for. Memory quantities
/// are strings in the usual container notation ("2GB", "512Mi").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResourceProfile {
    /// Node type this profile was measured on.
    pub node_id: String,
    /// CPU memory used by an idle instance.
    pub idle_cpu_memory: String,
    /// Device (accelerator) memory used by an idle instance.
    #[serde(default)]
    pub idle_device_memory: String,
}

/// Subscription of a group of UEs to an edge AI service.
///
/// Subscriptions are immutable once created and shared behind `Rc`: the
/// deployment records and the traffic path hold the same instance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceSubscription {
    /// Unique subscription identifier.
    pub subscription_id: String,
    /// Name of the subscribed AI service.
    pub service_name: String,
    /// Container image serving the model.
    pub image: String,
    /// Per-node resource profiles of the image.
    pub profiles: Vec<ResourceProfile>,
    /// Identifiers of the UEs entitled to use the service.
    pub ue_ids: Vec<String>,
}

impl ServiceSubscription {
    /// Returns the resource profile for the given node type, if the service
    /// has been profiled on it.
    pub fn resource_profile(&self, node_id: &str) -> Option<&ResourceProfile> {
        self.profiles.iter().find(|p| p.node_id == node_id)
    }

    /// Checks whether the given UE is entitled to use the service.
    pub fn entitles(&self, ue_id: &str) -> bool {
        self.ue_ids.iter().any(|id| id == ue_id)
    }
}
