//! User equipment.

use serde::Serialize;

use crate::events::MeasurementConfig;

/// Serializable state of a UE.
#[derive(Clone, Debug, Serialize)]
pub struct UeSnapshot {
    /// Identity of the UE.
    pub imsi: String,
    /// Position, x coordinate.
    pub position_x: f64,
    /// Position, y coordinate.
    pub position_y: f64,
    /// Display-scaled x coordinate.
    pub display_position_x: f64,
    /// Display-scaled y coordinate.
    pub display_position_y: f64,
    /// Serving cell, if the UE is connected.
    pub current_cell_id: Option<String>,
}

/// Mobile terminal.
///
/// Moves with a constant velocity and is connected to at most one cell at a
/// time. The serving cell pointer is maintained by the base station owning
/// that cell; the UE itself only stores it.
#[derive(Clone, Debug)]
pub struct UserEquipment {
    imsi: String,
    position: (f64, f64),
    velocity: (f64, f64),
    current_cell_id: Option<String>,
    meas_config: MeasurementConfig,
}

impl UserEquipment {
    /// Creates a disconnected UE at the given position.
    pub fn new(imsi: &str, position: (f64, f64), velocity: (f64, f64)) -> Self {
        Self {
            imsi: imsi.to_string(),
            position,
            velocity,
            current_cell_id: None,
            meas_config: MeasurementConfig::default(),
        }
    }

    /// Returns the identity of the UE.
    pub fn imsi(&self) -> &str {
        &self.imsi
    }

    /// Returns the current position of the UE.
    pub fn position(&self) -> (f64, f64) {
        self.position
    }

    /// Returns the velocity of the UE in coordinate units per second.
    pub fn velocity(&self) -> (f64, f64) {
        self.velocity
    }

    /// Replaces the velocity of the UE.
    pub fn set_velocity(&mut self, velocity: (f64, f64)) {
        self.velocity = velocity;
    }

    /// Returns the id of the serving cell, if the UE is connected.
    pub fn current_cell_id(&self) -> Option<&str> {
        self.current_cell_id.as_deref()
    }

    /// Returns the measurement configuration the UE currently applies.
    pub fn measurement_config(&self) -> &MeasurementConfig {
        &self.meas_config
    }

    /// Replaces the measurement configuration of the UE. Called on
    /// registration and when a handover moves the UE to another base station.
    pub fn apply_measurement_config(&mut self, config: MeasurementConfig) {
        self.meas_config = config;
    }

    /// Connects the UE to a cell on initial attach.
    pub fn attach(&mut self, cell_id: &str) {
        assert!(
            self.current_cell_id.is_none(),
            "UE {} is already connected to cell {}",
            self.imsi,
            self.current_cell_id.as_deref().unwrap_or("")
        );
        self.current_cell_id = Some(cell_id.to_string());
    }

    /// Moves the serving cell pointer to the handover target.
    pub fn execute_handover(&mut self, target_cell_id: &str) {
        assert!(
            self.current_cell_id.is_some(),
            "UE {} is not connected to any cell",
            self.imsi
        );
        self.current_cell_id = Some(target_cell_id.to_string());
    }

    /// Disconnects the UE from its serving cell.
    pub fn detach(&mut self) {
        self.current_cell_id = None;
    }

    /// Moves the UE along its velocity for one time step.
    pub fn advance(&mut self, delta: f64) {
        self.position.0 += self.velocity.0 * delta;
        self.position.1 += self.velocity.1 * delta;
    }

    /// Returns the serializable state of the UE.
    pub fn snapshot(&self, display_multiplier: f64) -> UeSnapshot {
        UeSnapshot {
            imsi: self.imsi.clone(),
            position_x: self.position.0,
            position_y: self.position.1,
            display_position_x: self.position.0 * display_multiplier,
            display_position_y: self.position.1 * display_multiplier,
            current_cell_id: self.current_cell_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn movement_follows_velocity() {
        let mut ue = UserEquipment::new("ue-001", (10., 20.), (2., -1.));
        ue.advance(0.5);
        assert_eq!(ue.position(), (11., 19.5));
        ue.advance(0.5);
        assert_eq!(ue.position(), (12., 19.));
    }

    #[test]
    fn attach_and_handover() {
        let mut ue = UserEquipment::new("ue-001", (0., 0.), (0., 0.));
        assert_eq!(ue.current_cell_id(), None);
        ue.attach("cell_a");
        assert_eq!(ue.current_cell_id(), Some("cell_a"));
        ue.execute_handover("cell_b");
        assert_eq!(ue.current_cell_id(), Some("cell_b"));
        ue.detach();
        assert_eq!(ue.current_cell_id(), None);
    }

    #[test]
    #[should_panic(expected = "already connected")]
    fn double_attach_panics() {
        let mut ue = UserEquipment::new("ue-001", (0., 0.), (0., 0.));
        ue.attach("cell_a");
        ue.attach("cell_b");
    }
}
