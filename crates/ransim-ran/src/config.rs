//! Simulation configuration.

use serde::{Deserialize, Serialize};

use ransim_edge::server::DeviceClass;
use ransim_edge::subscription::ServiceSubscription;
use ransim_edge::transport::RequestPolicy;

use crate::core_network::SliceType;
use crate::events::MeasurementConfig;

/// Radio cell description.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CellConfig {
    /// Cell identifier, unique network-wide.
    pub cell_id: String,
    /// Position, x coordinate.
    pub position_x: f64,
    /// Position, y coordinate.
    pub position_y: f64,
    /// Transmit power at the reference distance, in dBm.
    #[serde(default = "default_reference_power_dbm")]
    pub reference_power_dbm: f64,
    /// Path loss exponent of the propagation model.
    #[serde(default = "default_path_loss_exponent")]
    pub path_loss_exponent: f64,
}

/// Edge server description.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EdgeServerConfig {
    /// Compute node type, matched against subscription resource profiles.
    pub node_id: String,
    /// Hardware class of the node.
    #[serde(default)]
    pub device_class: DeviceClass,
    /// CPU memory capacity in GB.
    #[serde(default = "default_cpu_memory_gb")]
    pub cpu_memory_gb: f64,
    /// Device memory capacity in GB.
    #[serde(default)]
    pub device_memory_gb: f64,
}

/// Base station description.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BaseStationConfig {
    /// Base station identifier.
    pub bs_id: String,
    /// Position, x coordinate.
    pub position_x: f64,
    /// Position, y coordinate.
    pub position_y: f64,
    /// Measurement configuration applied to newly registered UEs.
    #[serde(default)]
    pub measurement_config: MeasurementConfig,
    /// Cells owned by the base station.
    pub cells: Vec<CellConfig>,
    /// Edge server attached to the base station.
    pub edge_server: EdgeServerConfig,
}

/// UE description.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UeConfig {
    /// Identity of the UE.
    pub imsi: String,
    /// Initial position, x coordinate.
    pub position_x: f64,
    /// Initial position, y coordinate.
    pub position_y: f64,
    /// Velocity along x, coordinate units per second.
    #[serde(default)]
    pub velocity_x: f64,
    /// Velocity along y, coordinate units per second.
    #[serde(default)]
    pub velocity_y: f64,
    /// Slice requested from the core network.
    #[serde(default)]
    pub slice: SliceType,
}

/// Top level simulation configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RanSimConfig {
    /// Seed of the simulation random number generator.
    #[serde(default)]
    pub seed: u64,
    /// Wall clock length of one tick in seconds.
    #[serde(default = "default_tick_delta")]
    pub tick_delta: f64,
    /// Multiplier from model coordinates to display coordinates in snapshots.
    #[serde(default = "default_display_distance_multiplier")]
    pub display_distance_multiplier: f64,
    /// Ticks an idle deployment survives before automatic teardown.
    #[serde(default = "default_undeploy_countdown_ticks")]
    pub undeploy_countdown_ticks: u32,
    /// Timeout and retry policy of edge service requests.
    #[serde(default)]
    pub request_policy: RequestPolicy,
    /// Base stations of the network.
    pub base_stations: Vec<BaseStationConfig>,
    /// UEs placed into the network at startup.
    #[serde(default)]
    pub ues: Vec<UeConfig>,
    /// AI service subscriptions known at startup.
    #[serde(default)]
    pub subscriptions: Vec<ServiceSubscription>,
}

impl RanSimConfig {
    /// Creates a configuration from a YAML file.
    pub fn from_file(file_name: &str) -> Self {
        serde_yaml::from_str(
            &std::fs::read_to_string(file_name).unwrap_or_else(|_| panic!("Can't read file {}", file_name)),
        )
        .unwrap_or_else(|_| panic!("Can't parse YAML from file {}", file_name))
    }

    /// Creates a configuration from a YAML string.
    pub fn from_yaml(content: &str) -> Self {
        serde_yaml::from_str(content).unwrap_or_else(|_| panic!("Can't parse YAML config"))
    }
}

fn default_reference_power_dbm() -> f64 {
    30.
}

fn default_path_loss_exponent() -> f64 {
    3.5
}

fn default_cpu_memory_gb() -> f64 {
    10.
}

fn default_tick_delta() -> f64 {
    1.
}

fn default_display_distance_multiplier() -> f64 {
    1.
}

fn default_undeploy_countdown_ticks() -> u32 {
    10
}
