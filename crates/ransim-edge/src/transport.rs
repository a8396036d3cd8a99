//! Service request transport and the simulated cluster backend.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use ransim_core::SimulationContext;

use crate::error::BackendError;
use crate::runtime::ContainerRuntime;

/// Successful reply to a forwarded service request.
#[derive(Clone, Debug, Serialize)]
pub struct ServiceResponse {
    /// Model output.
    pub response: Value,
    /// Processing time reported by the service, in milliseconds.
    pub process_time_ms: f64,
    /// Node that served the request.
    pub node_id: String,
    /// Identity of the serving pod.
    pub pod_name: String,
}

/// Failure of a single transport attempt.
#[derive(Clone, Debug, Error)]
pub enum TransportError {
    /// No reply within the allowed time.
    #[error("request to {url} timed out after {timeout_ms} ms")]
    Timeout {
        /// Requested URL.
        url: String,
        /// Timeout that was exceeded.
        timeout_ms: u64,
    },
    /// The endpoint could not be reached or replied with an error.
    #[error("request to {url} failed: {reason}")]
    Failed {
        /// Requested URL.
        url: String,
        /// Failure reason.
        reason: String,
    },
}

/// Timeout and retry policy applied to forwarded service requests.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct RequestPolicy {
    /// Per-attempt timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Total number of attempts, including the first one. At least one
    /// attempt is always made, so zero behaves like one.
    #[serde(default = "default_attempts")]
    pub attempts: u32,
}

fn default_timeout_ms() -> u64 {
    2000
}

fn default_attempts() -> u32 {
    3
}

impl Default for RequestPolicy {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            attempts: default_attempts(),
        }
    }
}

/// Blocking transport used to reach deployed service instances.
pub trait ServiceTransport {
    /// Posts a request to the given URL and waits for the reply, at most
    /// `timeout_ms` milliseconds.
    fn post(
        &mut self,
        url: &str,
        data: &Value,
        file: Option<&[u8]>,
        timeout_ms: u64,
    ) -> Result<ServiceResponse, TransportError>;
}

struct ContainerInstance {
    endpoint: String,
    pod_name: String,
    node_id: String,
}

/// Simulated container cluster acting as both the runtime and the transport.
///
/// Containers get deterministic endpoints and pod names (the pod suffix is
/// drawn from the simulation-wide RNG), and request processing time is
/// derived from the request size with a small seeded jitter, so runs are
/// reproducible.
pub struct SimulatedCluster {
    instances: IndexMap<String, ContainerInstance>,
    next_addr: u32,
    base_process_time_ms: f64,
    process_time_per_kb_ms: f64,
    ctx: SimulationContext,
}

impl SimulatedCluster {
    /// Creates an empty cluster.
    pub fn new(ctx: SimulationContext) -> Self {
        Self {
            instances: IndexMap::new(),
            next_addr: 2,
            base_process_time_ms: 20.,
            process_time_per_kb_ms: 0.05,
            ctx,
        }
    }

    /// Overrides the process time model, mostly useful in tests.
    pub fn with_process_time(mut self, base_ms: f64, per_kb_ms: f64) -> Self {
        self.base_process_time_ms = base_ms;
        self.process_time_per_kb_ms = per_kb_ms;
        self
    }

    /// Returns the number of running containers.
    pub fn container_count(&self) -> usize {
        self.instances.len()
    }

    fn instance_by_endpoint(&self, endpoint: &str) -> Option<&ContainerInstance> {
        self.instances.values().find(|i| i.endpoint == endpoint)
    }
}

impl ContainerRuntime for SimulatedCluster {
    fn start(&mut self, _image: &str, container_name: &str, node_id: &str) -> Result<String, BackendError> {
        if self.instances.contains_key(container_name) {
            return Err(BackendError(format!("container {} already exists", container_name)));
        }
        let endpoint = format!("10.45.0.{}:8080", self.next_addr);
        self.next_addr += 1;
        let pod_name = format!("{}-{}", container_name, self.ctx.random_string(5).to_lowercase());
        self.instances.insert(
            container_name.to_string(),
            ContainerInstance {
                endpoint: endpoint.clone(),
                pod_name,
                node_id: node_id.to_string(),
            },
        );
        Ok(endpoint)
    }

    fn stop(&mut self, container_name: &str) -> Result<(), BackendError> {
        match self.instances.shift_remove(container_name) {
            Some(_) => Ok(()),
            None => Err(BackendError(format!("no such container: {}", container_name))),
        }
    }
}

impl ServiceTransport for SimulatedCluster {
    fn post(
        &mut self,
        url: &str,
        data: &Value,
        file: Option<&[u8]>,
        timeout_ms: u64,
    ) -> Result<ServiceResponse, TransportError> {
        let endpoint = url
            .strip_prefix("http://")
            .and_then(|rest| rest.split('/').next())
            .unwrap_or_default();
        let instance = match self.instance_by_endpoint(endpoint) {
            Some(i) => i,
            None => {
                return Err(TransportError::Failed {
                    url: url.to_string(),
                    reason: "connection refused".to_string(),
                })
            }
        };
        let node_id = instance.node_id.clone();
        let pod_name = instance.pod_name.clone();

        let request_bytes = data.to_string().len() + file.map_or(0, |f| f.len());
        let jitter = self.ctx.gen_range(0.0..5.0);
        let process_time_ms =
            self.base_process_time_ms + self.process_time_per_kb_ms * (request_bytes as f64 / 1024.) + jitter;
        if process_time_ms > timeout_ms as f64 {
            return Err(TransportError::Timeout {
                url: url.to_string(),
                timeout_ms,
            });
        }

        Ok(ServiceResponse {
            response: json!({ "status": "success", "request_bytes": request_bytes }),
            process_time_ms,
            node_id,
            pod_name,
        })
    }
}
