//! Operational error types of the edge plane.
//!
//! These cover the failures a caller is expected to handle. Broken internal
//! invariants (inconsistent registries, impossible states) panic instead.

use thiserror::Error;

use crate::util::ParseMemoryError;

/// Error raised by a container runtime or cluster backend.
#[derive(Clone, Debug, Error)]
#[error("{0}")]
pub struct BackendError(pub String);

/// Errors returned by deployment admission.
#[derive(Debug, Error)]
pub enum DeployError {
    /// The service has no resource profile for the target node type.
    #[error("service {service} is not compatible with edge server {edge_id} (node {node_id})")]
    Incompatible {
        /// Service name from the subscription.
        service: String,
        /// Edge server that rejected the deployment.
        edge_id: String,
        /// Node type the service has no profile for.
        node_id: String,
    },
    /// A resource profile carries a memory quantity that cannot be parsed.
    #[error("invalid resource profile of {service} for node {node_id}: {source}")]
    InvalidProfile {
        /// Service name from the subscription.
        service: String,
        /// Node type whose profile is malformed.
        node_id: String,
        /// The underlying parse failure.
        #[source]
        source: ParseMemoryError,
    },
    /// The shared pool cannot cover the service's idle memory demand.
    #[error(
        "not enough resources to deploy {service} on edge server {edge_id}: \
         required {required_cpu_gb} GB cpu / {required_device_gb} GB device memory, \
         available {available_cpu_gb} GB cpu / {available_device_gb} GB device memory"
    )]
    InsufficientResources {
        /// Service name from the subscription.
        service: String,
        /// Edge server that rejected the deployment.
        edge_id: String,
        /// CPU memory the deployment would reserve.
        required_cpu_gb: f64,
        /// Device memory the deployment would reserve.
        required_device_gb: f64,
        /// CPU memory left in the pool at rejection time.
        available_cpu_gb: f64,
        /// Device memory left in the pool at rejection time.
        available_device_gb: f64,
    },
    /// The container backend failed to start the service instance.
    #[error("failed to start {service} on edge server {edge_id}: {reason}")]
    Runtime {
        /// Service name from the subscription.
        service: String,
        /// Edge server the start was attempted on.
        edge_id: String,
        /// Reason reported by the backend.
        reason: String,
    },
}

/// Errors returned when tearing down a deployment.
///
/// A failed teardown keeps the deployment record and its reservation, so the
/// pool accounting keeps matching what actually runs.
#[derive(Debug, Error)]
pub enum UndeployError {
    /// The container backend failed to stop the instance.
    #[error("failed to stop container {container_name}: {reason}")]
    Runtime {
        /// Name of the container that could not be stopped.
        container_name: String,
        /// Reason reported by the backend.
        reason: String,
    },
}

/// Errors returned when forwarding a service request.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The subscription has no running instance on this edge server.
    #[error("service {service} is not deployed on edge server {edge_id}")]
    NotDeployed {
        /// Service name from the subscription.
        service: String,
        /// Edge server the request was routed to.
        edge_id: String,
    },
    /// All transport attempts failed or timed out.
    #[error("failed to process request for {service} on edge server {edge_id}")]
    RequestFailed {
        /// Service name from the subscription.
        service: String,
        /// Edge server the request was routed to.
        edge_id: String,
    },
}
