use std::cell::RefCell;
use std::rc::Rc;

use serde_json::json;

use ransim_core::simulation::Simulation;

use ransim_edge::deployment::DeployOutcome;
use ransim_ran::base_station::{TrafficRecord, UeTraffic, AI_SERVICE_URL_PREFIX};
use ransim_ran::config::RanSimConfig;
use ransim_ran::core_network::SliceType;
use ransim_ran::events::{ControlAction, MeasEventKind, MeasurementEvent};
use ransim_ran::logger::FileLogger;
use ransim_ran::simulation::RanSimulation;

fn name_wrapper(file_name: &str) -> String {
    format!("test-configs/{}", file_name)
}

fn build_sim(config_file: &str) -> RanSimulation {
    let _ = env_logger::builder().is_test(true).try_init();
    let sim = Simulation::new(123);
    let config = RanSimConfig::from_file(&name_wrapper(config_file));
    RanSimulation::new(sim, config)
}

fn a3_event(ue_id: &str, cell_id: &str, neighbor_cell_id: &str) -> MeasurementEvent {
    MeasurementEvent {
        kind: MeasEventKind::A3,
        ue_id: ue_id.to_string(),
        cell_id: cell_id.to_string(),
        neighbor_cell_id: Some(neighbor_cell_id.to_string()),
        serving_rsrp_dbm: -80.,
        neighbor_rsrp_dbm: Some(-70.),
    }
}

fn a2_event(ue_id: &str, cell_id: &str) -> MeasurementEvent {
    MeasurementEvent {
        kind: MeasEventKind::A2,
        ue_id: ue_id.to_string(),
        cell_id: cell_id.to_string(),
        neighbor_cell_id: None,
        serving_rsrp_dbm: -120.,
        neighbor_rsrp_dbm: None,
    }
}

fn ai_traffic(service_name: &str, file: Option<Vec<u8>>) -> UeTraffic {
    UeTraffic {
        url: format!("{}{}", AI_SERVICE_URL_PREFIX, service_name),
        data: json!({ "frame_id": 1 }),
        file,
    }
}

#[test]
// Missing config fields fall back to their defaults, present ones are taken
// as written.
fn test_config_parsing() {
    let config = RanSimConfig::from_file(&name_wrapper("config.yaml"));
    assert_eq!(config.seed, 123);
    assert_eq!(config.tick_delta, 1.);
    assert_eq!(config.display_distance_multiplier, 100.);
    assert_eq!(config.undeploy_countdown_ticks, 3);
    assert_eq!(config.request_policy.timeout_ms, 2000);
    assert_eq!(config.request_policy.attempts, 3);
    assert_eq!(config.base_stations.len(), 2);
    assert_eq!(config.base_stations[0].cells.len(), 2);
    assert_eq!(config.base_stations[0].measurement_config.enabled_events, vec![MeasEventKind::A3]);
    assert_eq!(config.base_stations[0].cells[0].reference_power_dbm, 30.);
    assert_eq!(config.base_stations[0].cells[0].path_loss_exponent, 3.5);
    assert_eq!(config.base_stations[1].measurement_config.a3_offset_db, 2.);
    assert_eq!(config.base_stations[1].edge_server.device_memory_gb, 0.);
    assert_eq!(config.ues[0].velocity_x, 0.);
    assert_eq!(config.ues[0].slice, SliceType::Embb);
    assert_eq!(config.ues[1].slice, SliceType::Urllc);
    assert_eq!(config.subscriptions[0].profiles.len(), 2);

    let minimal = RanSimConfig::from_yaml("base_stations: []");
    assert_eq!(minimal.seed, 0);
    assert_eq!(minimal.tick_delta, 1.);
    assert_eq!(minimal.display_distance_multiplier, 1.);
    assert_eq!(minimal.undeploy_countdown_ticks, 10);
    assert!(minimal.ues.is_empty());
    assert!(minimal.subscriptions.is_empty());
}

#[test]
// At startup every UE attaches to the strongest cell and registers at the
// base station owning it; the core assigns slice and QoS.
fn test_initial_attachment_and_registration() {
    let ran = build_sim("config.yaml");

    let ue = ran.network().borrow().ue("ue-001");
    assert_eq!(ue.borrow().current_cell_id(), Some("cell_a1"));

    let bs_a = ran.base_station("bs_a");
    assert_eq!(bs_a.borrow().registered_count(), 2);
    let order: Vec<String> = bs_a.borrow().registered_ues().cloned().collect();
    assert_eq!(order, vec!["ue-001".to_string(), "ue-007".to_string()]);
    assert_eq!(ran.base_station("bs_b").borrow().registered_count(), 0);

    let reg = bs_a.borrow().registration("ue-001").cloned().unwrap();
    assert_eq!(reg.slice, SliceType::Embb);
    assert_eq!(reg.qos.five_qi, 9);
    assert_eq!(reg.cell_id, "cell_a1");
    assert_eq!(reg.meas_config.a3_offset_db, 3.);

    let reg = bs_a.borrow().registration("ue-007").cloned().unwrap();
    assert_eq!(reg.slice, SliceType::Urllc);
    assert_eq!(reg.qos.five_qi, 82);
    assert_eq!(reg.qos.priority, 20);

    let cell = ran.network().borrow().cell("cell_a1");
    assert_eq!(cell.borrow().connected_count(), 2);
    assert!(ran.core().borrow().is_registered("ue-001"));
    assert!(ran.core().borrow().is_registered("ue-007"));
    assert_eq!(ran.current_tick(), 0);
    assert_eq!(ran.current_time(), 0.);
}

#[test]
// A handover between two cells of the same base station updates the serving
// cell everywhere and keeps the registration record in place.
fn test_intra_handover() {
    let ran = build_sim("config.yaml");
    let bs_a = ran.base_station("bs_a");

    bs_a.borrow_mut().execute_handover("ue-001", "cell_a1", "cell_a2");

    let ue = ran.network().borrow().ue("ue-001");
    assert_eq!(ue.borrow().current_cell_id(), Some("cell_a2"));
    let cell_a1 = ran.network().borrow().cell("cell_a1");
    let cell_a2 = ran.network().borrow().cell("cell_a2");
    assert!(!cell_a1.borrow().is_connected("ue-001"));
    assert!(cell_a2.borrow().is_connected("ue-001"));
    let reg = bs_a.borrow().registration("ue-001").cloned().unwrap();
    assert_eq!(reg.cell_id, "cell_a2");
    assert_eq!(ran.stats().handovers_intra, 1);
    assert_eq!(ran.stats().handovers_inter, 0);

    // and back again
    bs_a.borrow_mut().execute_handover("ue-001", "cell_a2", "cell_a1");
    assert_eq!(ue.borrow().current_cell_id(), Some("cell_a1"));
    assert_eq!(ran.stats().handovers_intra, 2);
}

#[test]
// A handover to a cell of another base station moves the registration record
// there, preserving slice and QoS but taking over the target's measurement
// configuration.
fn test_inter_handover_moves_registration() {
    let ran = build_sim("config.yaml");
    let bs_a = ran.base_station("bs_a");
    let bs_b = ran.base_station("bs_b");

    bs_a.borrow_mut().execute_handover("ue-007", "cell_a1", "cell_b1");

    assert!(bs_a.borrow().registration("ue-007").is_none());
    assert_eq!(bs_a.borrow().registered_count(), 1);
    let reg = bs_b.borrow().registration("ue-007").cloned().unwrap();
    assert_eq!(reg.cell_id, "cell_b1");
    assert_eq!(reg.slice, SliceType::Urllc);
    assert_eq!(reg.qos.five_qi, 82);
    assert_eq!(reg.meas_config.a3_offset_db, 2.);
    assert_eq!(reg.meas_config.a2_threshold_dbm, -105.);

    let ue = ran.network().borrow().ue("ue-007");
    assert_eq!(ue.borrow().current_cell_id(), Some("cell_b1"));
    assert_eq!(ue.borrow().measurement_config().a3_offset_db, 2.);
    let cell_a1 = ran.network().borrow().cell("cell_a1");
    let cell_b1 = ran.network().borrow().cell("cell_b1");
    assert!(!cell_a1.borrow().is_connected("ue-007"));
    assert!(cell_b1.borrow().is_connected("ue-007"));
    assert!(ran.core().borrow().is_registered("ue-007"));
    assert_eq!(ran.stats().handovers_inter, 1);
}

#[test]
// Two handover actions for the same UE in one tick: the first one wins, the
// second is dropped without touching the network.
fn test_first_handover_wins_per_tick() {
    let mut ran = build_sim("config.yaml");
    let bs_a = ran.base_station("bs_a");

    bs_a.borrow_mut().receive_measurement_event(a3_event("ue-001", "cell_a1", "cell_a2"));
    bs_a.borrow_mut().receive_measurement_event(a3_event("ue-001", "cell_a1", "cell_b1"));
    assert_eq!(bs_a.borrow().pending_event_count(), 2);

    ran.step();

    let ue = ran.network().borrow().ue("ue-001");
    assert_eq!(ue.borrow().current_cell_id(), Some("cell_a2"));
    let cell_b1 = ran.network().borrow().cell("cell_b1");
    assert!(!cell_b1.borrow().is_connected("ue-001"));
    assert_eq!(ran.base_station("bs_b").borrow().registered_count(), 0);

    let stats = ran.stats();
    assert_eq!(stats.events_received, 2);
    assert_eq!(stats.events_dispatched, 2);
    assert_eq!(stats.actions_produced, 2);
    assert_eq!(stats.actions_conflict_dropped, 1);
    assert_eq!(stats.handovers_intra, 1);
    assert_eq!(stats.handovers_inter, 0);
    assert_eq!(bs_a.borrow().pending_event_count(), 0);
}

#[test]
// Events of a kind nobody handles are counted and skipped; the queue is
// always empty at the end of the tick.
fn test_event_without_handler_is_skipped() {
    let mut ran = build_sim("config.yaml");
    let bs_a = ran.base_station("bs_a");

    bs_a.borrow_mut().receive_measurement_event(a2_event("ue-001", "cell_a1"));
    ran.step();

    let stats = ran.stats();
    assert_eq!(stats.events_received, 1);
    assert_eq!(stats.events_dispatched, 0);
    assert_eq!(stats.events_skipped, 1);
    assert_eq!(bs_a.borrow().pending_event_count(), 0);
    let ue = ran.network().borrow().ue("ue-001");
    assert_eq!(ue.borrow().current_cell_id(), Some("cell_a1"));
}

#[test]
// Control actions other than handovers are dropped by the reconciliation
// pass without side effects.
fn test_unsupported_action_is_dropped() {
    let mut ran = build_sim("config.yaml");
    let bs_a = ran.base_station("bs_a");
    bs_a.borrow_mut().add_handler(MeasEventKind::A2, |event| {
        Some(ControlAction::CellSleep {
            cell_id: event.cell_id.clone(),
        })
    });

    bs_a.borrow_mut().receive_measurement_event(a2_event("ue-001", "cell_a1"));
    ran.step();

    let stats = ran.stats();
    assert_eq!(stats.events_dispatched, 1);
    assert_eq!(stats.actions_produced, 1);
    assert_eq!(stats.actions_unsupported, 1);
    assert_eq!(stats.handovers_intra + stats.handovers_inter, 0);
    let ue = ran.network().borrow().ue("ue-001");
    assert_eq!(ue.borrow().current_cell_id(), Some("cell_a1"));
}

#[test]
#[should_panic(expected = "already registered")]
// At most one handler per event kind; the facade installs the A3 handler.
fn test_duplicate_handler_panics() {
    let ran = build_sim("config.yaml");
    ran.base_station("bs_a").borrow_mut().add_handler(MeasEventKind::A3, |_| None);
}

#[test]
// Deregistration releases the core registration, disconnects the UE and
// purges its queued measurement events. Doing it twice is harmless.
fn test_deregistration_purges_queued_events() {
    let mut ran = build_sim("config.yaml");
    let bs_a = ran.base_station("bs_a");
    bs_a.borrow_mut().receive_measurement_event(a3_event("ue-001", "cell_a1", "cell_a2"));

    ran.remove_ue("ue-001");

    assert_eq!(bs_a.borrow().pending_event_count(), 0);
    assert_eq!(ran.stats().events_purged, 1);
    assert_eq!(bs_a.borrow().registered_count(), 1);
    assert!(ran.network().borrow().lookup_ue("ue-001").is_none());
    assert!(!ran.core().borrow().is_registered("ue-001"));
    let cell_a1 = ran.network().borrow().cell("cell_a1");
    assert!(!cell_a1.borrow().is_connected("ue-001"));
    assert_eq!(cell_a1.borrow().connected_count(), 1);

    ran.remove_ue("ue-001");
    assert_eq!(bs_a.borrow().registered_count(), 1);

    // the dropped events do not resurface on the next tick
    ran.step();
    assert_eq!(ran.stats().handovers_intra, 0);
}

#[test]
// A moving UE triggers an A3 report once the far cell clears the serving
// signal by offset plus hysteresis, and the default policy hands it over.
fn test_natural_handover_on_motion() {
    let mut ran = build_sim("config_mobility.yaml");
    let ue = ran.network().borrow().ue("ue-001");
    assert_eq!(ue.borrow().current_cell_id(), Some("cell_a1"));

    ran.steps(10);

    assert_eq!(ue.borrow().current_cell_id(), Some("cell_b1"));
    let stats = ran.stats();
    assert_eq!(stats.events_received, 1);
    assert_eq!(stats.actions_produced, 1);
    assert_eq!(stats.handovers_inter, 1);
    assert_eq!(stats.handovers_intra, 0);
    assert_eq!(ran.base_station("bs_a").borrow().registered_count(), 0);
    let reg = ran.base_station("bs_b").borrow().registration("ue-001").cloned().unwrap();
    assert_eq!(reg.cell_id, "cell_b1");
    assert_eq!(reg.meas_config.a3_offset_db, 2.);
    assert!(ran.core().borrow().is_registered("ue-001"));
}

#[test]
// A subscription runs at most one instance network-wide: a second deploy
// request returns the existing record wherever it lives.
fn test_global_deploy_idempotence() {
    let mut ran = build_sim("config.yaml");

    assert!(ran.deploy_service("sub-face", "bs_a").unwrap().is_created());
    let outcome = ran.deploy_service("sub-face", "bs_b").unwrap();
    assert!(matches!(outcome, DeployOutcome::AlreadyDeployed(_)));
    assert_eq!(outcome.deployment().edge_id, "bs_a_edge");

    let edge_a = ran.base_station("bs_a").borrow().edge();
    let edge_b = ran.base_station("bs_b").borrow().edge();
    assert_eq!(edge_a.borrow().deployment_count(), 1);
    assert_eq!(edge_b.borrow().deployment_count(), 0);
    assert_eq!(ran.stats().deployments_created, 1);
    assert!(ran.audit_pool());

    // after a teardown the service can come up on the other base station
    ran.undeploy_service("sub-face").unwrap();
    assert_eq!(edge_a.borrow().deployment_count(), 0);
    assert!(ran.deploy_service("sub-face", "bs_b").unwrap().is_created());
    assert_eq!(edge_b.borrow().deployment_count(), 1);
    assert_eq!(ran.stats().deployments_created, 2);
    assert_eq!(ran.stats().deployments_removed, 1);
    assert!(ran.audit_pool());
}

#[test]
// UE traffic to a deployed and subscribed service reaches the instance; the
// observer gets the full exchange with the file re-encoded as base64.
fn test_traffic_reaches_deployed_service() {
    let mut ran = build_sim("config.yaml");
    ran.deploy_service("sub-face", "bs_a").unwrap();

    let records = Rc::new(RefCell::new(Vec::new()));
    let sink = records.clone();
    ran.set_traffic_observer("bs_a", move |record: &TrafficRecord| sink.borrow_mut().push(record.clone()));

    let reply = ran
        .send_ue_traffic("ue-007", &ai_traffic("face_expression", Some(vec![1, 2, 3, 4])))
        .unwrap()
        .unwrap();
    assert_eq!(reply.response["status"], "success");
    assert_eq!(reply.response["request_bytes"], 18);
    assert_eq!(reply.node_id, "jetson-nano");
    assert!(reply.pod_name.starts_with("bs_a_edge_sub-face_face_expression-"));
    assert!(reply.process_time_ms >= 20.);

    assert_eq!(records.borrow().len(), 1);
    let record = records.borrow()[0].clone();
    assert_eq!(record.ue_id, "ue-007");
    assert_eq!(record.request.service_name, "face_expression");
    assert_eq!(record.request.file.as_deref(), Some("AQIDBA=="));
    assert_eq!(record.request.file_size, 4);
    assert!(record.response.is_some());
    assert!(record.error.is_none());
    assert!(record.service_response_time_ms >= 0.);

    let stats = ran.stats();
    assert_eq!(stats.traffic_served, 1);
    assert_eq!(stats.traffic_unsubscribed, 0);
    assert_eq!(stats.traffic_failed, 0);
}

#[test]
// Traffic outside the AI prefix, without a service name or without a
// deployed subscription is dropped silently.
fn test_traffic_silent_drops() {
    let mut ran = build_sim("config.yaml");
    let records = Rc::new(RefCell::new(Vec::new()));
    let sink = records.clone();
    ran.set_traffic_observer("bs_a", move |record: &TrafficRecord| sink.borrow_mut().push(record.clone()));

    let other = UeTraffic {
        url: "http://maps.example.com/tiles".to_string(),
        data: json!({}),
        file: None,
    };
    assert!(ran.send_ue_traffic("ue-001", &other).unwrap().is_none());
    assert!(ran.send_ue_traffic("ue-001", &ai_traffic("", None)).unwrap().is_none());
    assert!(ran
        .send_ue_traffic("ue-001", &ai_traffic("face_expression", None))
        .unwrap()
        .is_none());

    let stats = ran.stats();
    assert_eq!(stats.traffic_served, 0);
    assert_eq!(stats.traffic_unsubscribed, 1);
    assert_eq!(stats.traffic_failed, 0);
    // nothing was forwarded, so the observer saw nothing
    assert!(records.borrow().is_empty());
}

#[test]
// An idle deployment survives countdown minus one ticks and is torn down on
// the next one, releasing its reservation.
fn test_idle_deployments_expire() {
    let mut ran = build_sim("config.yaml");
    ran.deploy_service("sub-face", "bs_a").unwrap();
    let edge_a = ran.base_station("bs_a").borrow().edge();
    assert_eq!(edge_a.borrow().available_cpu_memory_gb(), 8.);
    assert_eq!(edge_a.borrow().available_device_memory_gb(), 3.);

    ran.steps(2);
    assert_eq!(edge_a.borrow().deployment_count(), 1);

    ran.step();
    assert_eq!(edge_a.borrow().deployment_count(), 0);
    assert_eq!(edge_a.borrow().available_cpu_memory_gb(), 10.);
    assert_eq!(edge_a.borrow().available_device_memory_gb(), 4.);
    assert_eq!(ran.stats().deployments_removed, 1);
    assert!(ran.audit_pool());
}

#[test]
// Serving a request resets the idle countdown of the deployment.
fn test_traffic_resets_idle_countdown() {
    let mut ran = build_sim("config.yaml");
    ran.deploy_service("sub-face", "bs_a").unwrap();
    let edge_a = ran.base_station("bs_a").borrow().edge();

    ran.step();
    ran.send_ue_traffic("ue-007", &ai_traffic("face_expression", None))
        .unwrap()
        .unwrap();
    ran.steps(2);
    // three ticks in, but the served request pushed the teardown out
    assert_eq!(edge_a.borrow().deployment_count(), 1);

    ran.steps(2);
    assert_eq!(edge_a.borrow().deployment_count(), 0);
    assert_eq!(ran.stats().deployments_removed, 1);
    assert!(ran.audit_pool());
}

#[test]
// Snapshots list entities in insertion order, scale display coordinates and
// serialize identically when nothing changed in between.
fn test_snapshot_is_deterministic() {
    let mut ran = build_sim("config.yaml");
    ran.deploy_service("sub-face", "bs_a").unwrap();
    ran.steps(2);

    let first = serde_json::to_string(&ran.snapshot()).unwrap();
    let second = serde_json::to_string(&ran.snapshot()).unwrap();
    assert_eq!(first, second);

    let snapshot = ran.snapshot();
    assert_eq!(snapshot.tick, 2);
    assert_eq!(snapshot.time, 2.);
    assert_eq!(snapshot.base_stations.len(), 2);
    assert_eq!(snapshot.base_stations[0].bs_id, "bs_a");
    assert_eq!(snapshot.base_stations[1].bs_id, "bs_b");
    assert_eq!(snapshot.base_stations[0].cells[0].cell_id, "cell_a1");
    assert_eq!(snapshot.base_stations[0].cells[1].cell_id, "cell_a2");
    assert_eq!(
        snapshot.base_stations[0].registered_ues,
        vec!["ue-001".to_string(), "ue-007".to_string()]
    );
    assert_eq!(snapshot.base_stations[1].display_position_x, 100000.);
    assert_eq!(snapshot.ues[0].imsi, "ue-001");
    assert_eq!(snapshot.ues[0].position_x, 10.);
    assert_eq!(snapshot.ues[0].display_position_x, 1000.);

    let edge = &snapshot.base_stations[0].edge_server;
    assert_eq!(edge.edge_id, "bs_a_edge");
    assert_eq!(edge.deployments.len(), 1);
    assert_eq!(edge.deployments[0].subscription_id, "sub-face");
    assert_eq!(edge.deployments[0].countdown, 1);
    assert_eq!(edge.available_cpu_memory_gb, 8.);
}

#[test]
// The file logger keeps entries at or above its level and saves them as CSV.
fn test_file_logger_saves_entries() {
    let sim = Simulation::new(123);
    let config = RanSimConfig::from_file(&name_wrapper("config.yaml"));
    let mut ran = RanSimulation::with_logger(sim, config, Box::new(FileLogger::new()));
    ran.steps(1);

    let path = std::env::temp_dir().join("ransim-ran-test-log.csv");
    let path = path.to_str().unwrap().to_string();
    ran.save_log(&path).unwrap();
    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.starts_with("timestamp,tick,component,message"));
    assert!(contents.contains("registered UE ue-001 on cell cell_a1 (slice embb, 5QI 9)"));
    let _ = std::fs::remove_file(&path);
}
