//! Simulation facade gluing the network together.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::Serialize;
use sugars::{rc, refcell};

use ransim_core::{Simulation, SimulationContext, EPSILON};
use ransim_edge::deployment::DeployOutcome;
use ransim_edge::error::{DeployError, ServiceError, UndeployError};
use ransim_edge::pool::EdgePoolState;
use ransim_edge::server::EdgeServer;
use ransim_edge::subscription::ServiceSubscription;
use ransim_edge::transport::{ServiceResponse, SimulatedCluster};

use crate::base_station::{BaseStation, BaseStationSnapshot, TrafficRecord, UeTraffic};
use crate::cell::Cell;
use crate::config::{BaseStationConfig, RanSimConfig, UeConfig};
use crate::core_network::CoreNetwork;
use crate::directory::NetworkDirectory;
use crate::events::{ControlAction, MeasEventKind};
use crate::logger::{Logger, StdoutLogger};
use crate::stats::Stats;
use crate::ue::{UeSnapshot, UserEquipment};

/// Serializable state of the whole network.
#[derive(Clone, Debug, Serialize)]
pub struct NetworkSnapshot {
    /// Simulation time the snapshot was taken at.
    pub time: f64,
    /// Completed ticks at snapshot time.
    pub tick: u64,
    /// Base station snapshots in insertion order.
    pub base_stations: Vec<BaseStationSnapshot>,
    /// UE snapshots in insertion order.
    pub ues: Vec<UeSnapshot>,
}

/// Simulation engine for the RAN control plane.
///
/// Owns the global registries of base stations and subscriptions, builds the
/// network from a [`RanSimConfig`] and drives the synchronous tick loop: each
/// base station runs its tick in insertion order, then the edge servers run
/// their idle teardown pass, then the clock advances.
pub struct RanSimulation {
    base_stations: IndexMap<String, Rc<RefCell<BaseStation>>>,
    subscriptions: IndexMap<String, Rc<ServiceSubscription>>,
    network: Rc<RefCell<NetworkDirectory>>,
    core: Rc<RefCell<CoreNetwork>>,
    pool: Rc<RefCell<EdgePoolState>>,
    cluster: Rc<RefCell<SimulatedCluster>>,
    stats: Rc<RefCell<Stats>>,
    logger: Rc<RefCell<Box<dyn Logger>>>,
    sim: Simulation,
    ctx: SimulationContext,
    config: Rc<RanSimConfig>,
}

impl RanSimulation {
    /// Creates a simulation logging to the standard logging output.
    pub fn new(sim: Simulation, config: RanSimConfig) -> Self {
        Self::with_logger(sim, config, Box::new(StdoutLogger::new()))
    }

    /// Creates a simulation with a custom logger and builds the network
    /// described by the configuration.
    pub fn with_logger(mut sim: Simulation, config: RanSimConfig, logger: Box<dyn Logger>) -> Self {
        assert!(config.tick_delta > 0., "tick delta must be positive");
        let cluster = rc!(refcell!(SimulatedCluster::new(sim.create_context("cluster"))));
        let ctx = sim.create_context("simulation");
        let mut this = Self {
            base_stations: IndexMap::new(),
            subscriptions: IndexMap::new(),
            network: rc!(refcell!(NetworkDirectory::new())),
            core: rc!(refcell!(CoreNetwork::new())),
            pool: rc!(refcell!(EdgePoolState::new())),
            cluster,
            stats: rc!(refcell!(Stats::default())),
            logger: rc!(refcell!(logger)),
            sim,
            ctx,
            config: rc!(config),
        };
        let base_stations = this.config.base_stations.clone();
        for bs_config in &base_stations {
            this.add_base_station(bs_config);
        }
        let ues = this.config.ues.clone();
        for ue_config in &ues {
            this.add_ue(ue_config);
        }
        let subscriptions = this.config.subscriptions.clone();
        for subscription in subscriptions {
            this.add_subscription(subscription);
        }
        this
    }

    /// Builds a base station with its cells and edge server and adds it to
    /// the network.
    pub fn add_base_station(&mut self, config: &BaseStationConfig) -> Rc<RefCell<BaseStation>> {
        let mut cells = Vec::new();
        for cell_config in &config.cells {
            let cell = rc!(refcell!(Cell::new(
                &cell_config.cell_id,
                (cell_config.position_x, cell_config.position_y),
                cell_config.reference_power_dbm,
                cell_config.path_loss_exponent,
            )));
            self.network.borrow_mut().add_cell(cell.clone(), &config.bs_id);
            cells.push(cell);
        }
        let edge = rc!(refcell!(EdgeServer::new(
            &config.bs_id,
            &config.edge_server.node_id,
            config.edge_server.device_class,
            config.edge_server.cpu_memory_gb,
            config.edge_server.device_memory_gb,
            self.config.undeploy_countdown_ticks,
            self.config.request_policy,
            self.pool.clone(),
            self.cluster.clone(),
            self.cluster.clone(),
            self.sim.create_context(format!("{}_edge", config.bs_id)),
        )));
        let bs = rc!(refcell!(BaseStation::new(
            &config.bs_id,
            (config.position_x, config.position_y),
            config.measurement_config.clone(),
            cells,
            edge,
            self.core.clone(),
            self.network.clone(),
            self.stats.clone(),
            self.logger.clone(),
            self.sim.create_context(&config.bs_id),
        )));
        // default RIC policy: follow A3 reports with a handover
        bs.borrow_mut().add_handler(MeasEventKind::A3, |event| {
            event.neighbor_cell_id.as_ref().map(|target| ControlAction::Handover {
                ue_id: event.ue_id.clone(),
                source_cell_id: event.cell_id.clone(),
                target_cell_id: target.clone(),
            })
        });
        self.network.borrow_mut().add_base_station(&config.bs_id, Rc::downgrade(&bs));
        let prev = self.base_stations.insert(config.bs_id.clone(), bs.clone());
        assert!(prev.is_none(), "base station {} added twice", config.bs_id);
        bs
    }

    /// Places a UE into the network: attaches it to the strongest cell and
    /// registers it at the base station owning that cell.
    pub fn add_ue(&mut self, config: &UeConfig) -> Rc<RefCell<UserEquipment>> {
        let ue = rc!(refcell!(UserEquipment::new(
            &config.imsi,
            (config.position_x, config.position_y),
            (config.velocity_x, config.velocity_y),
        )));
        self.network.borrow_mut().add_ue(ue.clone());
        let cell_id = self
            .strongest_cell((config.position_x, config.position_y))
            .unwrap_or_else(|| panic!("no cell to attach UE {} to", config.imsi));
        ue.borrow_mut().attach(&cell_id);
        let bs_id = self.network.borrow().cell_owner(&cell_id).to_string();
        let bs = self.base_stations[&bs_id].clone();
        bs.borrow_mut().register_ue(&config.imsi, config.slice);
        ue
    }

    /// Deregisters a UE from its base station and removes it from the
    /// network. Unknown UEs are ignored.
    pub fn remove_ue(&mut self, imsi: &str) {
        let serving = self
            .base_stations
            .values()
            .find(|bs| bs.borrow().registration(imsi).is_some())
            .cloned();
        if let Some(bs) = serving {
            bs.borrow_mut().deregister_ue(imsi);
        }
        self.network.borrow_mut().remove_ue(imsi);
    }

    /// Adds an AI service subscription to the global registry.
    pub fn add_subscription(&mut self, subscription: ServiceSubscription) -> Rc<ServiceSubscription> {
        let subscription = Rc::new(subscription);
        let prev = self
            .subscriptions
            .insert(subscription.subscription_id.clone(), subscription.clone());
        assert!(prev.is_none(), "subscription {} added twice", subscription.subscription_id);
        subscription
    }

    /// Deploys the service of a subscription on the edge server of the given
    /// base station.
    ///
    /// A subscription runs at most one instance network-wide: when any edge
    /// server already hosts it, that record is returned and nothing new is
    /// deployed, regardless of the requested base station.
    pub fn deploy_service(&mut self, subscription_id: &str, bs_id: &str) -> Result<DeployOutcome, DeployError> {
        let subscription = self
            .subscriptions
            .get(subscription_id)
            .unwrap_or_else(|| panic!("unknown subscription {}", subscription_id))
            .clone();
        for bs in self.base_stations.values() {
            let edge = bs.borrow().edge();
            let existing = edge.borrow().deployment(subscription_id).cloned();
            if let Some(deployment) = existing {
                self.logger.borrow_mut().log_info(
                    &self.ctx,
                    format!(
                        "subscription {} is already deployed on {}",
                        subscription_id, deployment.edge_id
                    ),
                );
                return Ok(DeployOutcome::AlreadyDeployed(deployment));
            }
        }
        let bs = self
            .base_stations
            .get(bs_id)
            .unwrap_or_else(|| panic!("unknown base station {}", bs_id))
            .clone();
        let edge = bs.borrow().edge();
        let outcome = edge.borrow_mut().create_deployment(&subscription);
        if let Ok(DeployOutcome::Created(_)) = &outcome {
            self.stats.borrow_mut().deployments_created += 1;
        }
        outcome
    }

    /// Tears down the deployment of a subscription, wherever it runs. A
    /// subscription with no deployment is a no-op.
    pub fn undeploy_service(&mut self, subscription_id: &str) -> Result<(), UndeployError> {
        for bs in self.base_stations.values() {
            let edge = bs.borrow().edge();
            let deployed = edge.borrow().deployment(subscription_id).is_some();
            if deployed {
                edge.borrow_mut().undeploy_service(subscription_id)?;
                self.stats.borrow_mut().deployments_removed += 1;
                return Ok(());
            }
        }
        Ok(())
    }

    /// Routes application traffic of a UE through its serving base station.
    ///
    /// Panics if the UE is not registered anywhere.
    pub fn send_ue_traffic(&mut self, imsi: &str, traffic: &UeTraffic) -> Result<Option<ServiceResponse>, ServiceError> {
        let bs = self
            .base_stations
            .values()
            .find(|bs| bs.borrow().registration(imsi).is_some())
            .cloned()
            .unwrap_or_else(|| panic!("UE {} is not registered at any base station", imsi));
        let result = bs.borrow_mut().handle_ue_traffic(imsi, traffic);
        result
    }

    /// Installs a traffic observer on the given base station.
    pub fn set_traffic_observer<F>(&mut self, bs_id: &str, observer: F)
    where
        F: Fn(&TrafficRecord) + 'static,
    {
        self.base_station(bs_id).borrow_mut().set_traffic_observer(Box::new(observer));
    }

    /// Runs one synchronous simulation tick.
    pub fn step(&mut self) {
        let delta = self.config.tick_delta;
        for bs in self.base_stations.values() {
            bs.borrow_mut().step(delta);
        }
        for bs in self.base_stations.values() {
            let edge = bs.borrow().edge();
            let undeployed = edge.borrow_mut().run_maintenance();
            self.stats.borrow_mut().deployments_removed += undeployed.len() as u64;
        }
        self.sim.advance(delta);
    }

    /// Runs the given number of ticks.
    pub fn steps(&mut self, count: u64) {
        for _ in 0..count {
            self.step();
        }
    }

    /// Runs ticks until the given span of simulation time has elapsed.
    pub fn step_for_duration(&mut self, duration: f64) {
        let end = self.sim.time() + duration;
        while self.sim.time() + EPSILON < end {
            self.step();
        }
    }

    /// Returns the current simulation time.
    pub fn current_time(&self) -> f64 {
        self.sim.time()
    }

    /// Returns the number of completed ticks.
    pub fn current_tick(&self) -> u64 {
        self.sim.tick()
    }

    /// Returns the base station with the given id.
    ///
    /// Panics if the base station is unknown.
    pub fn base_station(&self, bs_id: &str) -> Rc<RefCell<BaseStation>> {
        self.base_stations
            .get(bs_id)
            .unwrap_or_else(|| panic!("unknown base station {}", bs_id))
            .clone()
    }

    /// Returns the subscription with the given id.
    ///
    /// Panics if the subscription is unknown.
    pub fn subscription(&self, subscription_id: &str) -> Rc<ServiceSubscription> {
        self.subscriptions
            .get(subscription_id)
            .unwrap_or_else(|| panic!("unknown subscription {}", subscription_id))
            .clone()
    }

    /// Returns the entity directory of the network.
    pub fn network(&self) -> Rc<RefCell<NetworkDirectory>> {
        self.network.clone()
    }

    /// Returns the core network collaborator.
    pub fn core(&self) -> Rc<RefCell<CoreNetwork>> {
        self.core.clone()
    }

    /// Returns a copy of the accumulated counters.
    pub fn stats(&self) -> Stats {
        self.stats.borrow().clone()
    }

    /// Checks that the pool counters match the live deployment records on
    /// every edge server.
    pub fn audit_pool(&self) -> bool {
        let mut reservations = Vec::new();
        for bs in self.base_stations.values() {
            let edge = bs.borrow().edge();
            let edge = edge.borrow();
            for deployment in edge.deployments() {
                reservations.push((deployment.cpu_memory_gb, deployment.device_memory_gb));
            }
        }
        self.pool.borrow().audit(reservations)
    }

    /// Returns the serializable state of the whole network.
    pub fn snapshot(&self) -> NetworkSnapshot {
        let multiplier = self.config.display_distance_multiplier;
        NetworkSnapshot {
            time: self.sim.time(),
            tick: self.sim.tick(),
            base_stations: self
                .base_stations
                .values()
                .map(|bs| bs.borrow().snapshot(multiplier))
                .collect(),
            ues: self
                .network
                .borrow()
                .ues()
                .map(|(_, ue)| ue.borrow().snapshot(multiplier))
                .collect(),
        }
    }

    /// Saves the collected log entries, for loggers that keep them.
    pub fn save_log(&self, path: &str) -> Result<(), std::io::Error> {
        self.logger.borrow().save_log(path)
    }

    fn strongest_cell(&self, position: (f64, f64)) -> Option<String> {
        let network = self.network.borrow();
        let mut best: Option<(String, f64)> = None;
        for (cell_id, cell) in network.cells() {
            let rsrp = cell.borrow().rsrp_dbm(position);
            match &best {
                Some((_, best_rsrp)) if *best_rsrp >= rsrp => {}
                _ => best = Some((cell_id.clone(), rsrp)),
            }
        }
        best.map(|(cell_id, _)| cell_id)
    }
}
