//! Edge server: deployment admission and the service request path.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use ransim_core::{log_error, log_info, log_warn, SimulationContext};

use crate::deployment::{DeployOutcome, Deployment, DeploymentSnapshot};
use crate::error::{DeployError, ServiceError, UndeployError};
use crate::pool::{AdmissionVerdict, EdgePoolState};
use crate::runtime::ContainerRuntime;
use crate::subscription::ServiceSubscription;
use crate::transport::{RequestPolicy, ServiceResponse, ServiceTransport};
use crate::util::{container_name, parse_memory_gb};

/// Hardware class of an edge node.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    /// CPU-only node.
    Cpu,
    /// Node with an attached accelerator.
    Gpu,
}

impl Default for DeviceClass {
    fn default() -> Self {
        DeviceClass::Cpu
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceClass::Cpu => write!(f, "cpu"),
            DeviceClass::Gpu => write!(f, "gpu"),
        }
    }
}

/// Serializable state of an edge server.
#[derive(Clone, Debug, Serialize)]
pub struct EdgeSnapshot {
    /// Edge server identifier.
    pub edge_id: String,
    /// Node type of the server.
    pub node_id: String,
    /// Hardware class of the server.
    pub device_class: DeviceClass,
    /// Declared CPU memory in GB.
    pub cpu_memory_gb: f64,
    /// Declared device memory in GB.
    pub device_memory_gb: f64,
    /// Deployments in insertion order.
    pub deployments: Vec<DeploymentSnapshot>,
    /// CPU memory left after network-wide reservations, in GB.
    pub available_cpu_memory_gb: f64,
    /// Device memory left after network-wide reservations, in GB.
    pub available_device_memory_gb: f64,
}

/// Edge compute server attached to a base station.
///
/// Holds the deployment records of its AI services and reserves their memory
/// in the shared [`EdgePoolState`]. Container lifecycle and request delivery
/// go through the pluggable backends.
pub struct EdgeServer {
    edge_id: String,
    base_station_id: String,
    node_id: String,
    device_class: DeviceClass,
    cpu_memory_gb: f64,
    device_memory_gb: f64,
    undeploy_countdown: u32,
    policy: RequestPolicy,
    deployments: IndexMap<String, Deployment>,
    pool: Rc<RefCell<EdgePoolState>>,
    runtime: Rc<RefCell<dyn ContainerRuntime>>,
    transport: Rc<RefCell<dyn ServiceTransport>>,
    ctx: SimulationContext,
}

impl EdgeServer {
    /// Creates an edge server and registers its capacities in the pool.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        base_station_id: &str,
        node_id: &str,
        device_class: DeviceClass,
        cpu_memory_gb: f64,
        device_memory_gb: f64,
        undeploy_countdown: u32,
        policy: RequestPolicy,
        pool: Rc<RefCell<EdgePoolState>>,
        runtime: Rc<RefCell<dyn ContainerRuntime>>,
        transport: Rc<RefCell<dyn ServiceTransport>>,
        ctx: SimulationContext,
    ) -> Self {
        let edge_id = format!("{}_edge", base_station_id);
        pool.borrow_mut().add_edge(&edge_id, cpu_memory_gb, device_memory_gb);
        Self {
            edge_id,
            base_station_id: base_station_id.to_string(),
            node_id: node_id.to_string(),
            device_class,
            cpu_memory_gb,
            device_memory_gb,
            undeploy_countdown,
            policy,
            deployments: IndexMap::new(),
            pool,
            runtime,
            transport,
            ctx,
        }
    }

    /// Returns the edge server identifier.
    pub fn edge_id(&self) -> &str {
        &self.edge_id
    }

    /// Returns the node type of the server.
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Returns the hardware class of the server.
    pub fn device_class(&self) -> DeviceClass {
        self.device_class
    }

    /// Returns the CPU memory left to this server after network-wide
    /// reservations, in GB.
    pub fn available_cpu_memory_gb(&self) -> f64 {
        self.pool.borrow().available_cpu_gb(&self.edge_id)
    }

    /// Returns the device memory left to this server after network-wide
    /// reservations, in GB.
    pub fn available_device_memory_gb(&self) -> f64 {
        self.pool.borrow().available_device_gb(&self.edge_id)
    }

    /// Returns the deployment record for the given subscription, if any.
    pub fn deployment(&self, subscription_id: &str) -> Option<&Deployment> {
        self.deployments.get(subscription_id)
    }

    /// Iterates over the deployment records in insertion order.
    pub fn deployments(&self) -> impl Iterator<Item = &Deployment> {
        self.deployments.values()
    }

    /// Returns the number of deployments on this server.
    pub fn deployment_count(&self) -> usize {
        self.deployments.len()
    }

    /// Deploys the service of the given subscription.
    ///
    /// The call is idempotent: a subscription that already has an instance on
    /// this server gets its existing record back without touching the pool.
    /// Admission reserves the idle memory of the service atomically against
    /// the shared pool before the container is started; a failed start rolls
    /// the reservation back and leaves no record behind.
    pub fn create_deployment(&mut self, subscription: &Rc<ServiceSubscription>) -> Result<DeployOutcome, DeployError> {
        if let Some(existing) = self.deployments.get(&subscription.subscription_id) {
            log_info!(
                self.ctx,
                "subscription {} already deployed on edge server {}",
                subscription.subscription_id,
                self.edge_id
            );
            return Ok(DeployOutcome::AlreadyDeployed(existing.clone()));
        }

        let service = &subscription.service_name;
        let profile = subscription
            .resource_profile(&self.node_id)
            .ok_or_else(|| DeployError::Incompatible {
                service: service.clone(),
                edge_id: self.edge_id.clone(),
                node_id: self.node_id.clone(),
            })?;
        let cpu_gb = parse_memory_gb(&profile.idle_cpu_memory).map_err(|e| DeployError::InvalidProfile {
            service: service.clone(),
            node_id: self.node_id.clone(),
            source: e,
        })?;
        let device_gb = if profile.idle_device_memory.is_empty() {
            0.
        } else {
            parse_memory_gb(&profile.idle_device_memory).map_err(|e| DeployError::InvalidProfile {
                service: service.clone(),
                node_id: self.node_id.clone(),
                source: e,
            })?
        };

        {
            let mut pool = self.pool.borrow_mut();
            if pool.try_reserve(&self.edge_id, cpu_gb, device_gb) != AdmissionVerdict::Success {
                return Err(DeployError::InsufficientResources {
                    service: service.clone(),
                    edge_id: self.edge_id.clone(),
                    required_cpu_gb: cpu_gb,
                    required_device_gb: device_gb,
                    available_cpu_gb: pool.available_cpu_gb(&self.edge_id),
                    available_device_gb: pool.available_device_gb(&self.edge_id),
                });
            }
        }

        let name = container_name(&self.edge_id, &subscription.subscription_id, service);
        let endpoint = match self.runtime.borrow_mut().start(&subscription.image, &name, &self.node_id) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                self.pool.borrow_mut().release(cpu_gb, device_gb);
                return Err(DeployError::Runtime {
                    service: service.clone(),
                    edge_id: self.edge_id.clone(),
                    reason: e.to_string(),
                });
            }
        };

        let record = Deployment {
            subscription: subscription.clone(),
            base_station_id: self.base_station_id.clone(),
            edge_id: self.edge_id.clone(),
            node_id: self.node_id.clone(),
            endpoint: endpoint.clone(),
            image: subscription.image.clone(),
            container_name: name,
            cpu_memory_gb: cpu_gb,
            device_memory_gb: device_gb,
            countdown: self.undeploy_countdown,
            recently_served: false,
        };
        self.deployments
            .insert(subscription.subscription_id.clone(), record.clone());
        log_info!(
            self.ctx,
            "deployed service {} on edge server {} with endpoint {}",
            service,
            self.edge_id,
            endpoint
        );
        Ok(DeployOutcome::Created(record))
    }

    /// Tears down the deployment of the given subscription.
    ///
    /// Undeploying a subscription without a record is a no-op. A failed
    /// container stop keeps both the record and the pool reservation and
    /// surfaces the error, so the accounting keeps matching what runs.
    pub fn undeploy_service(&mut self, subscription_id: &str) -> Result<(), UndeployError> {
        let name = match self.deployments.get(subscription_id) {
            Some(dep) => dep.container_name.clone(),
            None => return Ok(()),
        };
        self.runtime
            .borrow_mut()
            .stop(&name)
            .map_err(|e| UndeployError::Runtime {
                container_name: name.clone(),
                reason: e.to_string(),
            })?;
        if let Some(dep) = self.deployments.shift_remove(subscription_id) {
            self.pool.borrow_mut().release(dep.cpu_memory_gb, dep.device_memory_gb);
            log_info!(
                self.ctx,
                "undeployed service {} (subscription {}) from edge server {}",
                dep.subscription.service_name,
                subscription_id,
                self.edge_id
            );
        }
        Ok(())
    }

    /// Looks up the subscription entitling the given UE to the given service.
    ///
    /// Scans the deployments in insertion order and returns the first match.
    pub fn check_ue_subscription(&self, service_name: &str, ue_id: &str) -> Option<Rc<ServiceSubscription>> {
        for dep in self.deployments.values() {
            if dep.subscription.service_name == service_name && dep.subscription.entitles(ue_id) {
                return Some(dep.subscription.clone());
            }
        }
        None
    }

    /// Forwards a request to the deployed instance of the subscription.
    ///
    /// Applies the per-attempt timeout and bounded retry of the configured
    /// [`RequestPolicy`]; exhausting the attempts yields
    /// [`ServiceError::RequestFailed`].
    pub fn handle_service_request(
        &mut self,
        subscription: &Rc<ServiceSubscription>,
        data: &Value,
        file: Option<&[u8]>,
    ) -> Result<ServiceResponse, ServiceError> {
        let sub_id = &subscription.subscription_id;
        let endpoint = match self.deployments.get(sub_id) {
            Some(dep) if !dep.endpoint.is_empty() => dep.endpoint.clone(),
            _ => {
                return Err(ServiceError::NotDeployed {
                    service: subscription.service_name.clone(),
                    edge_id: self.edge_id.clone(),
                })
            }
        };

        let url = format!("http://{}/model/run", endpoint);
        // At least one attempt regardless of the configured budget.
        let max_attempts = self.policy.attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.transport.borrow_mut().post(&url, data, file, self.policy.timeout_ms) {
                Ok(reply) => {
                    log_info!(
                        self.ctx,
                        "service {} replied from pod {} on node {} in {:.1} ms",
                        subscription.service_name,
                        reply.pod_name,
                        reply.node_id,
                        reply.process_time_ms
                    );
                    if let Some(dep) = self.deployments.get_mut(sub_id) {
                        dep.recently_served = true;
                    }
                    return Ok(reply);
                }
                Err(e) if attempt < max_attempts => {
                    log_warn!(
                        self.ctx,
                        "request attempt {}/{} for service {} failed: {}",
                        attempt,
                        max_attempts,
                        subscription.service_name,
                        e
                    );
                    attempt += 1;
                }
                Err(e) => {
                    log_error!(
                        self.ctx,
                        "giving up on service {} after {} attempts: {}",
                        subscription.service_name,
                        attempt,
                        e
                    );
                    return Err(ServiceError::RequestFailed {
                        service: subscription.service_name.clone(),
                        edge_id: self.edge_id.clone(),
                    });
                }
            }
        }
    }

    /// Runs the per-tick teardown pass.
    ///
    /// Deployments that served a request since the previous pass get their
    /// countdown reset; idle ones count down and are undeployed when they
    /// reach zero. Returns the subscription ids that were torn down.
    pub fn run_maintenance(&mut self) -> Vec<String> {
        let mut expired = Vec::new();
        for dep in self.deployments.values_mut() {
            if dep.recently_served {
                dep.recently_served = false;
                dep.countdown = self.undeploy_countdown;
            } else if dep.countdown > 0 {
                dep.countdown -= 1;
            }
            if dep.countdown == 0 {
                expired.push(dep.subscription.subscription_id.clone());
            }
        }
        let mut undeployed = Vec::new();
        for id in expired {
            log_info!(self.ctx, "idle countdown expired for subscription {}", id);
            match self.undeploy_service(&id) {
                Ok(()) => undeployed.push(id),
                Err(e) => log_error!(self.ctx, "automatic undeploy failed: {}", e),
            }
        }
        undeployed
    }

    /// Returns the serializable state of the server.
    pub fn snapshot(&self) -> EdgeSnapshot {
        EdgeSnapshot {
            edge_id: self.edge_id.clone(),
            node_id: self.node_id.clone(),
            device_class: self.device_class,
            cpu_memory_gb: self.cpu_memory_gb,
            device_memory_gb: self.device_memory_gb,
            deployments: self.deployments.values().map(|d| d.snapshot()).collect(),
            available_cpu_memory_gb: self.available_cpu_memory_gb(),
            available_device_memory_gb: self.available_device_memory_gb(),
        }
    }
}
