//! Container runtime backend.

use crate::error::BackendError;

/// Where service containers get started and stopped.
///
/// The edge server only sees this trait; the production analog would shell
/// out to a container engine, the simulation uses
/// [`SimulatedCluster`](crate::transport::SimulatedCluster).
pub trait ContainerRuntime {
    /// Starts a container from the given image on the given node type and
    /// returns the endpoint address where the instance serves requests.
    ///
    /// Starting a container whose name is already taken is an error.
    fn start(&mut self, image: &str, container_name: &str, node_id: &str) -> Result<String, BackendError>;

    /// Stops and removes a container.
    fn stop(&mut self, container_name: &str) -> Result<(), BackendError>;
}
