//! Base station: UE registration, measurement dispatch and handovers.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::time::Instant;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use indexmap::map::Entry;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use ransim_core::SimulationContext;
use ransim_edge::error::ServiceError;
use ransim_edge::server::{EdgeServer, EdgeSnapshot};
use ransim_edge::transport::ServiceResponse;

use crate::cell::{Cell, CellSnapshot};
use crate::core_network::{CoreNetwork, QosProfile, SliceType};
use crate::directory::NetworkDirectory;
use crate::events::{ControlAction, MeasEventKind, MeasurementConfig, MeasurementEvent};
use crate::logger::Logger;
use crate::stats::Stats;

/// URL prefix addressing AI services deployed at the network edge. Traffic
/// outside this prefix is not handled by the base station.
pub const AI_SERVICE_URL_PREFIX: &str = "http://ransim_6g.com/ai_services/";

/// Measurement event handler: turns an event into at most one control action.
pub type EventHandler = Box<dyn Fn(&MeasurementEvent) -> Option<ControlAction>>;

/// Callback receiving a record of every traffic exchange that reached an
/// edge service.
pub type TrafficObserver = Box<dyn Fn(&TrafficRecord)>;

/// Registration record of a UE at a base station.
#[derive(Clone, Debug)]
pub struct UeRegistration {
    /// Identity of the registered UE.
    pub imsi: String,
    /// Network slice assigned by the core.
    pub slice: SliceType,
    /// QoS profile assigned by the core.
    pub qos: QosProfile,
    /// Serving cell of the UE.
    pub cell_id: String,
    /// Measurement configuration in effect for this UE, copied from the
    /// base station defaults at registration time.
    pub meas_config: MeasurementConfig,
}

/// Application traffic sent by a UE towards the network.
#[derive(Clone, Debug)]
pub struct UeTraffic {
    /// Request URL addressing a service.
    pub url: String,
    /// JSON payload of the request.
    pub data: Value,
    /// Raw file attachment, if any.
    pub file: Option<Vec<u8>>,
}

/// Request half of a traffic record, with the file attachment re-encoded
/// as transportable text.
#[derive(Clone, Debug, Serialize)]
pub struct TrafficRequest {
    /// Name of the addressed AI service.
    pub service_name: String,
    /// UE the request originated from.
    pub ue_id: String,
    /// JSON payload of the request.
    pub data: Value,
    /// File attachment encoded as base64, if one was sent.
    pub file: Option<String>,
    /// Size of the raw attachment in bytes.
    pub file_size: usize,
}

/// Record of one traffic exchange, passed to the traffic observer. Emitting
/// it never affects what the traffic call returns to the UE.
#[derive(Clone, Debug, Serialize)]
pub struct TrafficRecord {
    /// UE the traffic originated from.
    pub ue_id: String,
    /// The request as forwarded to the edge service.
    pub request: TrafficRequest,
    /// Response of the service, when the request succeeded.
    pub response: Option<ServiceResponse>,
    /// Error description, when the request failed downstream.
    pub error: Option<String>,
    /// Wall clock latency of the service call in milliseconds.
    pub service_response_time_ms: f64,
}

/// Serializable state of a base station.
#[derive(Clone, Debug, Serialize)]
pub struct BaseStationSnapshot {
    /// Base station identifier.
    pub bs_id: String,
    /// Position, x coordinate.
    pub position_x: f64,
    /// Position, y coordinate.
    pub position_y: f64,
    /// Display-scaled x coordinate.
    pub display_position_x: f64,
    /// Display-scaled y coordinate.
    pub display_position_y: f64,
    /// Registered UEs in registration order.
    pub registered_ues: Vec<String>,
    /// Snapshots of the owned cells in insertion order.
    pub cells: Vec<CellSnapshot>,
    /// Snapshot of the attached edge server.
    pub edge_server: EdgeSnapshot,
}

/// Radio node owning cells and an edge compute server.
///
/// The base station keeps one registration record per UE it serves, collects
/// the measurement reports its cells produce and drives one synchronous tick:
/// advance cells, dispatch the queued reports through the registered
/// handlers, then reconcile the resulting control actions into at most one
/// handover per UE. UE traffic addressed to edge AI services is authorized
/// against the subscriptions deployed on the edge server and forwarded to it.
pub struct BaseStation {
    bs_id: String,
    position: (f64, f64),
    meas_config: MeasurementConfig,
    cells: IndexMap<String, Rc<RefCell<Cell>>>,
    registry: IndexMap<String, UeRegistration>,
    event_queue: VecDeque<MeasurementEvent>,
    handlers: HashMap<MeasEventKind, EventHandler>,
    pending_actions: Vec<ControlAction>,
    edge: Rc<RefCell<EdgeServer>>,
    core: Rc<RefCell<CoreNetwork>>,
    network: Rc<RefCell<NetworkDirectory>>,
    stats: Rc<RefCell<Stats>>,
    traffic_observer: Option<TrafficObserver>,
    logger: Rc<RefCell<Box<dyn Logger>>>,
    ctx: SimulationContext,
}

impl BaseStation {
    /// Creates a base station owning the given cells and edge server.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        bs_id: &str,
        position: (f64, f64),
        meas_config: MeasurementConfig,
        cells: Vec<Rc<RefCell<Cell>>>,
        edge: Rc<RefCell<EdgeServer>>,
        core: Rc<RefCell<CoreNetwork>>,
        network: Rc<RefCell<NetworkDirectory>>,
        stats: Rc<RefCell<Stats>>,
        logger: Rc<RefCell<Box<dyn Logger>>>,
        ctx: SimulationContext,
    ) -> Self {
        let mut cell_map = IndexMap::new();
        for cell in cells {
            let cell_id = cell.borrow().cell_id().to_string();
            let prev = cell_map.insert(cell_id.clone(), cell);
            assert!(prev.is_none(), "cell {} added twice to base station {}", cell_id, bs_id);
        }
        Self {
            bs_id: bs_id.to_string(),
            position,
            meas_config,
            cells: cell_map,
            registry: IndexMap::new(),
            event_queue: VecDeque::new(),
            handlers: HashMap::new(),
            pending_actions: Vec::new(),
            edge,
            core,
            network,
            stats,
            traffic_observer: None,
            logger,
            ctx,
        }
    }

    /// Returns the base station identifier.
    pub fn bs_id(&self) -> &str {
        &self.bs_id
    }

    /// Returns the position of the base station.
    pub fn position(&self) -> (f64, f64) {
        self.position
    }

    /// Returns the attached edge server.
    pub fn edge(&self) -> Rc<RefCell<EdgeServer>> {
        self.edge.clone()
    }

    /// Returns the measurement configuration applied to new registrations.
    pub fn default_measurement_config(&self) -> &MeasurementConfig {
        &self.meas_config
    }

    /// Returns the registration record of the given UE, if it is registered
    /// at this base station.
    pub fn registration(&self, imsi: &str) -> Option<&UeRegistration> {
        self.registry.get(imsi)
    }

    /// Iterates over the registered UE ids in registration order.
    pub fn registered_ues(&self) -> impl Iterator<Item = &String> {
        self.registry.keys()
    }

    /// Returns the number of registered UEs.
    pub fn registered_count(&self) -> usize {
        self.registry.len()
    }

    /// Checks whether the given cell belongs to this base station.
    pub fn owns_cell(&self, cell_id: &str) -> bool {
        self.cells.contains_key(cell_id)
    }

    /// Returns the number of measurement events waiting in the queue.
    pub fn pending_event_count(&self) -> usize {
        self.event_queue.len()
    }

    /// Installs the observer notified about served traffic exchanges.
    pub fn set_traffic_observer(&mut self, observer: TrafficObserver) {
        self.traffic_observer = Some(observer);
    }

    /// Registers the handler for one kind of measurement event.
    ///
    /// Exactly one handler per kind: registering a second one is a fatal
    /// configuration error.
    pub fn add_handler<F>(&mut self, kind: MeasEventKind, handler: F)
    where
        F: Fn(&MeasurementEvent) -> Option<ControlAction> + 'static,
    {
        let prev = self.handlers.insert(kind, Box::new(handler));
        assert!(
            prev.is_none(),
            "handler for {} events is already registered at base station {}",
            kind,
            self.bs_id
        );
    }

    /// Registers a UE at this base station.
    ///
    /// The UE must already be connected to one of the owned cells. The core
    /// network assigns slice and QoS, the registry stores a record carrying a
    /// snapshot of the current default measurement configuration, and the
    /// serving cell gets the UE added to its connected set. Returns a copy of
    /// the record.
    pub fn register_ue(&mut self, imsi: &str, slice: SliceType) -> UeRegistration {
        let ue = self.network.borrow().ue(imsi);
        let cell_id = ue
            .borrow()
            .current_cell_id()
            .unwrap_or_else(|| panic!("UE {} is not connected to any cell", imsi))
            .to_string();
        assert!(
            self.cells.contains_key(&cell_id),
            "cell {} does not belong to base station {}",
            cell_id,
            self.bs_id
        );
        assert!(
            !self.registry.contains_key(imsi),
            "UE {} is already registered at base station {}",
            imsi,
            self.bs_id
        );
        let (slice, qos) = self.core.borrow_mut().authenticate_and_register(imsi, slice);
        let record = UeRegistration {
            imsi: imsi.to_string(),
            slice,
            qos,
            cell_id: cell_id.clone(),
            meas_config: self.meas_config.clone(),
        };
        self.registry.insert(imsi.to_string(), record.clone());
        self.cells[&cell_id].borrow_mut().register_ue(imsi);
        ue.borrow_mut().apply_measurement_config(self.meas_config.clone());
        self.logger.borrow_mut().log_info(
            &self.ctx,
            format!(
                "registered UE {} on cell {} (slice {}, 5QI {})",
                imsi, cell_id, record.slice, record.qos.five_qi
            ),
        );
        record
    }

    /// Deregisters a UE from this base station.
    ///
    /// Releases the core-side registration, disconnects the UE from its
    /// serving cell, drops the registry record and purges any still-queued
    /// measurement events of the UE. Deregistering an unknown UE is a no-op.
    pub fn deregister_ue(&mut self, imsi: &str) {
        let cell_id = match self.registry.get(imsi) {
            Some(record) => record.cell_id.clone(),
            None => return,
        };
        self.core.borrow_mut().deregister(imsi);
        self.network.borrow().cell(&cell_id).borrow_mut().deregister_ue(imsi);
        self.network.borrow().ue(imsi).borrow_mut().detach();
        self.registry.shift_remove(imsi);
        let before = self.event_queue.len();
        self.event_queue.retain(|event| event.ue_id != imsi);
        let purged = before - self.event_queue.len();
        if purged > 0 {
            self.stats.borrow_mut().events_purged += purged as u64;
        }
        self.logger
            .borrow_mut()
            .log_info(&self.ctx, format!("deregistered UE {} from cell {}", imsi, cell_id));
    }

    /// Appends a measurement event to the queue.
    ///
    /// The event must come from a registered UE, through a cell owned by this
    /// base station, and the UE must still be connected to the reporting
    /// cell. Violations are fatal, they indicate a bookkeeping bug upstream.
    pub fn receive_measurement_event(&mut self, event: MeasurementEvent) {
        let ue = self.network.borrow().ue(&event.ue_id);
        assert!(
            self.registry.contains_key(&event.ue_id),
            "UE {} is not registered at base station {}",
            event.ue_id,
            self.bs_id
        );
        assert!(
            self.cells.contains_key(&event.cell_id),
            "cell {} does not belong to base station {}",
            event.cell_id,
            self.bs_id
        );
        let current = ue.borrow().current_cell_id().map(|id| id.to_string());
        assert!(
            current.as_deref() == Some(event.cell_id.as_str()),
            "UE {} reports on cell {} but is connected to {:?}",
            event.ue_id,
            event.cell_id,
            current
        );
        self.stats.borrow_mut().events_received += 1;
        self.logger.borrow_mut().log_trace(
            &self.ctx,
            format!("queued {} report from UE {} on cell {}", event.kind, event.ue_id, event.cell_id),
        );
        self.event_queue.push_back(event);
    }

    /// Runs one tick of the base station.
    ///
    /// Fixed pipeline: advance every owned cell and collect the measurement
    /// reports they produce, clear the action buffer, drain the event queue
    /// strictly FIFO through the registered handlers (events of a kind
    /// without a handler are logged and skipped), then reconcile the buffered
    /// actions. The queue is always empty when this returns.
    pub fn step(&mut self, delta: f64) {
        let mut events = Vec::new();
        {
            let network = self.network.borrow();
            for cell in self.cells.values() {
                events.extend(cell.borrow_mut().step(delta, &network));
            }
        }
        for event in events {
            self.receive_measurement_event(event);
        }

        self.pending_actions.clear();
        while let Some(event) = self.event_queue.pop_front() {
            match self.handlers.get(&event.kind) {
                Some(handler) => {
                    self.stats.borrow_mut().events_dispatched += 1;
                    if let Some(action) = handler(&event) {
                        self.stats.borrow_mut().actions_produced += 1;
                        self.pending_actions.push(action);
                    }
                }
                None => {
                    self.stats.borrow_mut().events_skipped += 1;
                    self.logger.borrow_mut().log_warn(
                        &self.ctx,
                        format!(
                            "no handler for {} events, skipping report from UE {}",
                            event.kind, event.ue_id
                        ),
                    );
                }
            }
        }

        self.reconcile_control_actions();
    }

    /// Applies this tick's buffered control actions.
    ///
    /// Handover actions are grouped by UE: the first enqueued action per UE
    /// wins, later ones are dropped without side effects. Non-handover
    /// actions are logged and discarded.
    fn reconcile_control_actions(&mut self) {
        let actions = std::mem::take(&mut self.pending_actions);
        let mut chosen: IndexMap<String, (String, String)> = IndexMap::new();
        for action in actions {
            match action {
                ControlAction::Handover {
                    ue_id,
                    source_cell_id,
                    target_cell_id,
                } => match chosen.entry(ue_id) {
                    Entry::Occupied(entry) => {
                        self.stats.borrow_mut().actions_conflict_dropped += 1;
                        self.logger.borrow_mut().log_debug(
                            &self.ctx,
                            format!(
                                "dropping conflicting handover of UE {} to cell {}",
                                entry.key(),
                                target_cell_id
                            ),
                        );
                    }
                    Entry::Vacant(entry) => {
                        entry.insert((source_cell_id, target_cell_id));
                    }
                },
                other => {
                    self.stats.borrow_mut().actions_unsupported += 1;
                    self.logger.borrow_mut().log_warn(
                        &self.ctx,
                        format!("unsupported control action {:?}, dropping", other),
                    );
                }
            }
        }
        for (ue_id, (source_cell_id, target_cell_id)) in chosen {
            self.execute_handover(&ue_id, &source_cell_id, &target_cell_id);
        }
    }

    /// Moves a UE from its serving cell to the target cell.
    ///
    /// The serving cell must be owned by this base station; the target may
    /// belong to any base station in the network. When it belongs to another
    /// one, the registration record moves there and the UE takes over the
    /// target's default measurement configuration. All preconditions are
    /// asserted, a violated one is a bookkeeping bug.
    pub fn execute_handover(&mut self, imsi: &str, source_cell_id: &str, target_cell_id: &str) {
        assert_ne!(
            source_cell_id, target_cell_id,
            "handover of UE {} targets its serving cell",
            imsi
        );
        let ue = self.network.borrow().ue(imsi);
        let source_cell = self.network.borrow().cell(source_cell_id);
        let target_cell = self.network.borrow().cell(target_cell_id);
        assert!(
            self.cells.contains_key(source_cell_id),
            "cell {} does not belong to base station {}",
            source_cell_id,
            self.bs_id
        );
        assert!(
            self.registry.contains_key(imsi),
            "UE {} is not registered at base station {}",
            imsi,
            self.bs_id
        );
        assert!(
            ue.borrow().current_cell_id() == Some(source_cell_id),
            "UE {} is not connected to cell {}",
            imsi,
            source_cell_id
        );
        assert!(
            source_cell.borrow().is_connected(imsi),
            "cell {} has no connection for UE {}",
            source_cell_id,
            imsi
        );
        assert!(
            !target_cell.borrow().is_connected(imsi),
            "UE {} is already connected to cell {}",
            imsi,
            target_cell_id
        );

        let target_owner = self.network.borrow().cell_owner(target_cell_id).to_string();
        if target_owner == self.bs_id {
            target_cell.borrow_mut().register_ue(imsi);
            ue.borrow_mut().execute_handover(target_cell_id);
            self.registry.get_mut(imsi).unwrap().cell_id = target_cell_id.to_string();
            source_cell.borrow_mut().deregister_ue(imsi);
            self.stats.borrow_mut().handovers_intra += 1;
            self.logger.borrow_mut().log_info(
                &self.ctx,
                format!(
                    "handover of UE {} from cell {} to cell {}",
                    imsi, source_cell_id, target_cell_id
                ),
            );
        } else {
            let target_bs = self.network.borrow().base_station(&target_owner);
            let mut record = self.registry.get(imsi).unwrap().clone();
            record.cell_id = target_cell_id.to_string();
            {
                let mut target = target_bs.borrow_mut();
                record.meas_config = target.meas_config.clone();
                ue.borrow_mut().apply_measurement_config(record.meas_config.clone());
                let prev = target.registry.insert(imsi.to_string(), record);
                assert!(
                    prev.is_none(),
                    "UE {} is already registered at base station {}",
                    imsi,
                    target.bs_id
                );
            }
            target_cell.borrow_mut().register_ue(imsi);
            ue.borrow_mut().execute_handover(target_cell_id);
            source_cell.borrow_mut().deregister_ue(imsi);
            self.registry.shift_remove(imsi);
            self.stats.borrow_mut().handovers_inter += 1;
            self.logger.borrow_mut().log_info(
                &self.ctx,
                format!(
                    "handover of UE {} from cell {} to cell {} on base station {}",
                    imsi, source_cell_id, target_cell_id, target_owner
                ),
            );
        }
    }

    /// Handles application traffic a registered UE sent through this base
    /// station.
    ///
    /// Traffic outside the AI service URL prefix is ignored. For AI service
    /// traffic, the UE must hold a subscription deployed on the edge server,
    /// otherwise the request is silently dropped with `Ok(None)`. Authorized
    /// requests are forwarded to the deployed instance; the raw outcome is
    /// returned and, when an observer is installed, a [`TrafficRecord`] with
    /// the measured wall clock latency is emitted as a side channel.
    pub fn handle_ue_traffic(
        &mut self,
        ue_id: &str,
        traffic: &UeTraffic,
    ) -> Result<Option<ServiceResponse>, ServiceError> {
        assert!(
            self.registry.contains_key(ue_id),
            "UE {} is not registered at base station {}",
            ue_id,
            self.bs_id
        );
        let service_name = match traffic.url.strip_prefix(AI_SERVICE_URL_PREFIX) {
            Some(name) => name.to_string(),
            None => {
                self.logger.borrow_mut().log_trace(
                    &self.ctx,
                    format!("ignoring traffic from UE {} to {}", ue_id, traffic.url),
                );
                return Ok(None);
            }
        };
        if service_name.is_empty() {
            self.logger.borrow_mut().log_warn(
                &self.ctx,
                format!("UE {} sent an AI service request without a service name", ue_id),
            );
            return Ok(None);
        }

        let subscription = self.edge.borrow().check_ue_subscription(&service_name, ue_id);
        let subscription = match subscription {
            Some(sub) => sub,
            None => {
                self.stats.borrow_mut().traffic_unsubscribed += 1;
                return Ok(None);
            }
        };

        let started = Instant::now();
        let result = self
            .edge
            .borrow_mut()
            .handle_service_request(&subscription, &traffic.data, traffic.file.as_deref());
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.;
        match &result {
            Ok(_) => self.stats.borrow_mut().traffic_served += 1,
            Err(_) => self.stats.borrow_mut().traffic_failed += 1,
        }

        if let Some(observer) = &self.traffic_observer {
            let record = TrafficRecord {
                ue_id: ue_id.to_string(),
                request: TrafficRequest {
                    service_name,
                    ue_id: ue_id.to_string(),
                    data: traffic.data.clone(),
                    file: traffic.file.as_deref().map(|bytes| BASE64.encode(bytes)),
                    file_size: traffic.file.as_ref().map_or(0, |bytes| bytes.len()),
                },
                response: result.as_ref().ok().cloned(),
                error: result.as_ref().err().map(|e| e.to_string()),
                service_response_time_ms: elapsed_ms,
            };
            observer(&record);
        }

        result.map(Some)
    }

    /// Returns the serializable state of the base station.
    pub fn snapshot(&self, display_multiplier: f64) -> BaseStationSnapshot {
        BaseStationSnapshot {
            bs_id: self.bs_id.clone(),
            position_x: self.position.0,
            position_y: self.position.1,
            display_position_x: self.position.0 * display_multiplier,
            display_position_y: self.position.1 * display_multiplier,
            registered_ues: self.registry.keys().cloned().collect(),
            cells: self.cells.values().map(|cell| cell.borrow().snapshot(display_multiplier)).collect(),
            edge_server: self.edge.borrow().snapshot(),
        }
    }
}
