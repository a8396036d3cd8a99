//! Id-indexed lookup tables for cross-entity navigation.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use crate::base_station::BaseStation;
use crate::cell::Cell;
use crate::ue::UserEquipment;

/// Arena of network entities keyed by id.
///
/// Base stations, cells and UEs navigate to each other through this
/// directory instead of holding owning references, so the entity graph stays
/// cycle-free. Base stations are held through weak handles, their owner is
/// the simulation facade. Iteration follows insertion order everywhere.
#[derive(Default)]
pub struct NetworkDirectory {
    ues: IndexMap<String, Rc<RefCell<UserEquipment>>>,
    cells: IndexMap<String, Rc<RefCell<Cell>>>,
    cell_owner: IndexMap<String, String>,
    base_stations: IndexMap<String, Weak<RefCell<BaseStation>>>,
}

impl NetworkDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a UE to the directory.
    pub fn add_ue(&mut self, ue: Rc<RefCell<UserEquipment>>) {
        let imsi = ue.borrow().imsi().to_string();
        let prev = self.ues.insert(imsi.clone(), ue);
        assert!(prev.is_none(), "UE {} added twice", imsi);
    }

    /// Removes a UE from the directory.
    pub fn remove_ue(&mut self, imsi: &str) -> Option<Rc<RefCell<UserEquipment>>> {
        self.ues.shift_remove(imsi)
    }

    /// Returns the UE with the given identity.
    ///
    /// Panics if the UE is unknown.
    pub fn ue(&self, imsi: &str) -> Rc<RefCell<UserEquipment>> {
        self.ues
            .get(imsi)
            .unwrap_or_else(|| panic!("unknown UE {}", imsi))
            .clone()
    }

    /// Returns the UE with the given identity, if it exists.
    pub fn lookup_ue(&self, imsi: &str) -> Option<Rc<RefCell<UserEquipment>>> {
        self.ues.get(imsi).cloned()
    }

    /// Iterates over all UEs in insertion order.
    pub fn ues(&self) -> impl Iterator<Item = (&String, &Rc<RefCell<UserEquipment>>)> {
        self.ues.iter()
    }

    /// Adds a cell owned by the given base station.
    pub fn add_cell(&mut self, cell: Rc<RefCell<Cell>>, base_station_id: &str) {
        let cell_id = cell.borrow().cell_id().to_string();
        let prev = self.cells.insert(cell_id.clone(), cell);
        assert!(prev.is_none(), "cell {} added twice", cell_id);
        self.cell_owner.insert(cell_id, base_station_id.to_string());
    }

    /// Returns the cell with the given id.
    ///
    /// Panics if the cell is unknown.
    pub fn cell(&self, cell_id: &str) -> Rc<RefCell<Cell>> {
        self.cells
            .get(cell_id)
            .unwrap_or_else(|| panic!("unknown cell {}", cell_id))
            .clone()
    }

    /// Returns the cell with the given id, if it exists.
    pub fn lookup_cell(&self, cell_id: &str) -> Option<Rc<RefCell<Cell>>> {
        self.cells.get(cell_id).cloned()
    }

    /// Iterates over all cells in insertion order.
    pub fn cells(&self) -> impl Iterator<Item = (&String, &Rc<RefCell<Cell>>)> {
        self.cells.iter()
    }

    /// Returns the id of the base station owning the given cell.
    ///
    /// Panics if the cell is unknown.
    pub fn cell_owner(&self, cell_id: &str) -> &str {
        self.cell_owner
            .get(cell_id)
            .unwrap_or_else(|| panic!("unknown cell {}", cell_id))
    }

    /// Adds a base station handle to the directory.
    pub fn add_base_station(&mut self, bs_id: &str, bs: Weak<RefCell<BaseStation>>) {
        let prev = self.base_stations.insert(bs_id.to_string(), bs);
        assert!(prev.is_none(), "base station {} added twice", bs_id);
    }

    /// Returns the base station with the given id.
    ///
    /// Panics if the base station is unknown or already dropped.
    pub fn base_station(&self, bs_id: &str) -> Rc<RefCell<BaseStation>> {
        self.base_stations
            .get(bs_id)
            .and_then(Weak::upgrade)
            .unwrap_or_else(|| panic!("unknown base station {}", bs_id))
    }
}
