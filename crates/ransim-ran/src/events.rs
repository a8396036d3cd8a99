//! Measurement events and the control actions derived from them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of an RRC measurement report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MeasEventKind {
    /// Serving cell became worse than a threshold.
    A2,
    /// Neighbour cell became better than the serving cell by an offset.
    A3,
}

impl fmt::Display for MeasEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeasEventKind::A2 => write!(f, "A2"),
            MeasEventKind::A3 => write!(f, "A3"),
        }
    }
}

/// Measurement report produced by a cell for one of its connected UEs.
///
/// Reports are queued at the base station owning the reporting cell and
/// consumed exactly once, within the tick they were produced in.
#[derive(Clone, Debug)]
pub struct MeasurementEvent {
    /// Kind of the report.
    pub kind: MeasEventKind,
    /// UE the report is about.
    pub ue_id: String,
    /// Cell the report was taken on, always the serving cell of the UE.
    pub cell_id: String,
    /// Best neighbour cell, for kinds that compare against a neighbour.
    pub neighbor_cell_id: Option<String>,
    /// RSRP of the serving cell in dBm.
    pub serving_rsrp_dbm: f64,
    /// RSRP of the best neighbour in dBm.
    pub neighbor_rsrp_dbm: Option<f64>,
}

/// Control action produced by a measurement event handler.
///
/// Only handovers are executed by the reconciliation pass; other actions are
/// logged and dropped there.
#[derive(Clone, Debug, PartialEq)]
pub enum ControlAction {
    /// Move a UE from its serving cell to a target cell.
    Handover {
        /// UE to move.
        ue_id: String,
        /// Serving cell of the UE.
        source_cell_id: String,
        /// Cell the UE should be moved to.
        target_cell_id: String,
    },
    /// Put an underused cell into a low power state.
    CellSleep {
        /// Cell to power down.
        cell_id: String,
    },
}

/// Measurement reporting parameters applied to UEs at registration.
///
/// Every base station carries a default configuration; registration stores a
/// snapshot of it in the UE's record, so later changes to the defaults do not
/// affect already registered UEs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeasurementConfig {
    /// Offset in dB a neighbour must clear over the serving cell to trigger
    /// an A3 report.
    #[serde(default = "default_a3_offset_db")]
    pub a3_offset_db: f64,
    /// Hysteresis in dB added on top of the A3 offset.
    #[serde(default = "default_hysteresis_db")]
    pub hysteresis_db: f64,
    /// Serving cell RSRP in dBm below which an A2 report is triggered.
    #[serde(default = "default_a2_threshold_dbm")]
    pub a2_threshold_dbm: f64,
    /// Report kinds the UE sends.
    #[serde(default = "default_enabled_events")]
    pub enabled_events: Vec<MeasEventKind>,
}

impl MeasurementConfig {
    /// Checks whether reports of the given kind are enabled.
    pub fn is_enabled(&self, kind: MeasEventKind) -> bool {
        self.enabled_events.contains(&kind)
    }
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        Self {
            a3_offset_db: default_a3_offset_db(),
            hysteresis_db: default_hysteresis_db(),
            a2_threshold_dbm: default_a2_threshold_dbm(),
            enabled_events: default_enabled_events(),
        }
    }
}

fn default_a3_offset_db() -> f64 {
    3.
}

fn default_hysteresis_db() -> f64 {
    1.
}

fn default_a2_threshold_dbm() -> f64 {
    -110.
}

fn default_enabled_events() -> Vec<MeasEventKind> {
    vec![MeasEventKind::A2, MeasEventKind::A3]
}
