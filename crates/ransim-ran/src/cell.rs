//! Radio cells.

use indexmap::IndexSet;
use serde::Serialize;

use crate::directory::NetworkDirectory;
use crate::events::{MeasEventKind, MeasurementEvent};

/// Serializable state of a cell.
#[derive(Clone, Debug, Serialize)]
pub struct CellSnapshot {
    /// Cell identifier.
    pub cell_id: String,
    /// Position, x coordinate.
    pub position_x: f64,
    /// Position, y coordinate.
    pub position_y: f64,
    /// Display-scaled x coordinate.
    pub display_position_x: f64,
    /// Display-scaled y coordinate.
    pub display_position_y: f64,
    /// Transmit power at the reference distance, in dBm.
    pub reference_power_dbm: f64,
    /// Path loss exponent of the propagation model.
    pub path_loss_exponent: f64,
    /// Connected UEs in connection order.
    pub connected_ues: Vec<String>,
}

/// Radio cell of a base station.
///
/// Tracks the UEs connected to it and produces their measurement reports
/// once per tick. Signal strength follows a log-distance model:
/// `reference_power_dbm - 10 * path_loss_exponent * log10(distance)`,
/// with the distance clamped to one coordinate unit.
pub struct Cell {
    cell_id: String,
    position: (f64, f64),
    reference_power_dbm: f64,
    path_loss_exponent: f64,
    connected: IndexSet<String>,
}

impl Cell {
    /// Creates a cell with the given propagation parameters.
    pub fn new(cell_id: &str, position: (f64, f64), reference_power_dbm: f64, path_loss_exponent: f64) -> Self {
        Self {
            cell_id: cell_id.to_string(),
            position,
            reference_power_dbm,
            path_loss_exponent,
            connected: IndexSet::new(),
        }
    }

    /// Returns the cell identifier.
    pub fn cell_id(&self) -> &str {
        &self.cell_id
    }

    /// Returns the position of the cell.
    pub fn position(&self) -> (f64, f64) {
        self.position
    }

    /// Returns the received signal power at the given position in dBm.
    pub fn rsrp_dbm(&self, position: (f64, f64)) -> f64 {
        let dx = position.0 - self.position.0;
        let dy = position.1 - self.position.1;
        let distance = (dx * dx + dy * dy).sqrt().max(1.);
        self.reference_power_dbm - 10. * self.path_loss_exponent * distance.log10()
    }

    /// Adds a UE to the connected set.
    pub fn register_ue(&mut self, ue_id: &str) {
        assert!(
            self.connected.insert(ue_id.to_string()),
            "UE {} is already connected to cell {}",
            ue_id,
            self.cell_id
        );
    }

    /// Removes a UE from the connected set.
    pub fn deregister_ue(&mut self, ue_id: &str) {
        assert!(
            self.connected.shift_remove(ue_id),
            "UE {} is not connected to cell {}",
            ue_id,
            self.cell_id
        );
    }

    /// Checks whether the given UE is connected to this cell.
    pub fn is_connected(&self, ue_id: &str) -> bool {
        self.connected.contains(ue_id)
    }

    /// Iterates over the connected UEs in connection order.
    pub fn connected_ues(&self) -> impl Iterator<Item = &String> {
        self.connected.iter()
    }

    /// Returns the number of connected UEs.
    pub fn connected_count(&self) -> usize {
        self.connected.len()
    }

    /// Advances the cell by one tick.
    ///
    /// Moves every connected UE along its velocity, then evaluates the UE's
    /// measurement configuration against the new position: an A2 report when
    /// the serving signal drops below the threshold, an A3 report when the
    /// best other cell in the network clears the serving signal by offset
    /// plus hysteresis. Returns the produced reports in connection order.
    pub fn step(&mut self, delta: f64, network: &NetworkDirectory) -> Vec<MeasurementEvent> {
        let mut events = Vec::new();
        for ue_id in &self.connected {
            let ue = network.ue(ue_id);
            let mut ue = ue.borrow_mut();
            ue.advance(delta);
            let serving_rsrp = self.rsrp_dbm(ue.position());
            let config = ue.measurement_config();
            if config.is_enabled(MeasEventKind::A2) && serving_rsrp < config.a2_threshold_dbm {
                events.push(MeasurementEvent {
                    kind: MeasEventKind::A2,
                    ue_id: ue_id.clone(),
                    cell_id: self.cell_id.clone(),
                    neighbor_cell_id: None,
                    serving_rsrp_dbm: serving_rsrp,
                    neighbor_rsrp_dbm: None,
                });
            }
            if config.is_enabled(MeasEventKind::A3) {
                if let Some((neighbor_id, neighbor_rsrp)) = self.best_neighbor(ue.position(), network) {
                    if neighbor_rsrp > serving_rsrp + config.a3_offset_db + config.hysteresis_db {
                        events.push(MeasurementEvent {
                            kind: MeasEventKind::A3,
                            ue_id: ue_id.clone(),
                            cell_id: self.cell_id.clone(),
                            neighbor_cell_id: Some(neighbor_id),
                            serving_rsrp_dbm: serving_rsrp,
                            neighbor_rsrp_dbm: Some(neighbor_rsrp),
                        });
                    }
                }
            }
        }
        events
    }

    // The serving cell is skipped by id, it is mutably borrowed by the caller.
    fn best_neighbor(&self, position: (f64, f64), network: &NetworkDirectory) -> Option<(String, f64)> {
        let mut best: Option<(String, f64)> = None;
        for (cell_id, cell) in network.cells() {
            if *cell_id == self.cell_id {
                continue;
            }
            let rsrp = cell.borrow().rsrp_dbm(position);
            match &best {
                Some((_, best_rsrp)) if *best_rsrp >= rsrp => {}
                _ => best = Some((cell_id.clone(), rsrp)),
            }
        }
        best
    }

    /// Returns the serializable state of the cell.
    pub fn snapshot(&self, display_multiplier: f64) -> CellSnapshot {
        CellSnapshot {
            cell_id: self.cell_id.clone(),
            position_x: self.position.0,
            position_y: self.position.1,
            display_position_x: self.position.0 * display_multiplier,
            display_position_y: self.position.1 * display_multiplier,
            reference_power_dbm: self.reference_power_dbm,
            path_loss_exponent: self.path_loss_exponent,
            connected_ues: self.connected.iter().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rsrp_falls_with_distance() {
        let cell = Cell::new("c1", (0., 0.), 30., 3.5);
        let near = cell.rsrp_dbm((10., 0.));
        let far = cell.rsrp_dbm((100., 0.));
        assert!(near > far);
        assert!((near - far - 35.).abs() < 1e-9);
    }

    #[test]
    fn rsrp_is_clamped_near_the_mast() {
        let cell = Cell::new("c1", (0., 0.), 30., 3.5);
        assert_eq!(cell.rsrp_dbm((0., 0.)), 30.);
        assert_eq!(cell.rsrp_dbm((0.5, 0.)), 30.);
    }

    #[test]
    fn membership_follows_registration() {
        let mut cell = Cell::new("c1", (0., 0.), 30., 3.5);
        cell.register_ue("ue-001");
        cell.register_ue("ue-002");
        assert!(cell.is_connected("ue-001"));
        assert_eq!(cell.connected_count(), 2);
        cell.deregister_ue("ue-001");
        assert!(!cell.is_connected("ue-001"));
        assert_eq!(cell.connected_count(), 1);
    }

    #[test]
    #[should_panic(expected = "is not connected")]
    fn deregistering_unknown_ue_panics() {
        let mut cell = Cell::new("c1", (0., 0.), 30., 3.5);
        cell.deregister_ue("ue-001");
    }
}
