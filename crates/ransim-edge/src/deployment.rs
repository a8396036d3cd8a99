//! Deployed service instances.

use std::rc::Rc;

use serde::Serialize;

use crate::subscription::ServiceSubscription;

/// A service instance running on an edge server.
///
/// Exactly one deployment may exist per subscription, and one per
/// (node, subscription) pair across the network.
#[derive(Clone, Debug)]
pub struct Deployment {
    /// The subscription this instance serves.
    pub subscription: Rc<ServiceSubscription>,
    /// Base station hosting the edge server.
    pub base_station_id: String,
    /// Edge server the instance runs on.
    pub edge_id: String,
    /// Node type of the edge server.
    pub node_id: String,
    /// Address where the instance accepts requests.
    pub endpoint: String,
    /// Container image reference.
    pub image: String,
    /// Deterministic container name.
    pub container_name: String,
    /// CPU memory reserved in the pool, in GB.
    pub cpu_memory_gb: f64,
    /// Device memory reserved in the pool, in GB.
    pub device_memory_gb: f64,
    /// Idle ticks left before automatic teardown.
    pub countdown: u32,
    /// Whether the instance served a request since the last maintenance pass.
    pub recently_served: bool,
}

impl Deployment {
    /// Returns the serializable projection of the record.
    pub fn snapshot(&self) -> DeploymentSnapshot {
        DeploymentSnapshot {
            subscription_id: self.subscription.subscription_id.clone(),
            service_name: self.subscription.service_name.clone(),
            endpoint: self.endpoint.clone(),
            image: self.image.clone(),
            container_name: self.container_name.clone(),
            cpu_memory_gb: self.cpu_memory_gb,
            device_memory_gb: self.device_memory_gb,
            countdown: self.countdown,
            ue_ids: self.subscription.ue_ids.clone(),
        }
    }
}

/// Serializable projection of a [`Deployment`].
#[derive(Clone, Debug, Serialize)]
pub struct DeploymentSnapshot {
    /// The subscription identifier.
    pub subscription_id: String,
    /// Name of the deployed service.
    pub service_name: String,
    /// Address where the instance accepts requests.
    pub endpoint: String,
    /// Container image reference.
    pub image: String,
    /// Deterministic container name.
    pub container_name: String,
    /// CPU memory reserved in the pool, in GB.
    pub cpu_memory_gb: f64,
    /// Device memory reserved in the pool, in GB.
    pub device_memory_gb: f64,
    /// Idle ticks left before automatic teardown.
    pub countdown: u32,
    /// Identifiers of the entitled UEs.
    pub ue_ids: Vec<String>,
}

/// Non-error result of a deployment request.
#[derive(Clone, Debug)]
pub enum DeployOutcome {
    /// A new instance was admitted and started.
    Created(Deployment),
    /// The subscription already had an instance; nothing was changed.
    AlreadyDeployed(Deployment),
}

impl DeployOutcome {
    /// Returns the deployment record regardless of how it was obtained.
    pub fn deployment(&self) -> &Deployment {
        match self {
            DeployOutcome::Created(d) => d,
            DeployOutcome::AlreadyDeployed(d) => d,
        }
    }

    /// Returns true if the request started a new instance.
    pub fn is_created(&self) -> bool {
        matches!(self, DeployOutcome::Created(_))
    }
}
