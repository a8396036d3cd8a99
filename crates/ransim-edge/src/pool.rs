//! Shared edge resource pool state.

use indexmap::IndexMap;

use ransim_core::EPSILON;

/// Declared memory capacities of a single edge server.
#[derive(Clone)]
pub struct EdgeCapacity {
    /// Total CPU memory in GB.
    pub cpu_memory_gb: f64,
    /// Total device (accelerator) memory in GB.
    pub device_memory_gb: f64,
}

/// Outcome of an admission check against the pool.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AdmissionVerdict {
    /// Not enough CPU memory left for the requested reservation.
    NotEnoughCpuMemory,
    /// Not enough device memory left for the requested reservation.
    NotEnoughDeviceMemory,
    /// The reservation fits.
    Success,
    /// The edge server is not registered in the pool.
    EdgeNotFound,
}

/// Authoritative accounting of edge memory.
///
/// All edge servers draw from one logical pool: memory reserved by every
/// deployment in the network counts against each server's declared capacity.
/// Every reservation and release goes through this single structure, so a
/// check-and-reserve is one atomic step and the running totals can never
/// disagree between servers.
pub struct EdgePoolState {
    edges: IndexMap<String, EdgeCapacity>,
    reserved_cpu_gb: f64,
    reserved_device_gb: f64,
}

impl EdgePoolState {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self {
            edges: IndexMap::new(),
            reserved_cpu_gb: 0.,
            reserved_device_gb: 0.,
        }
    }

    /// Registers an edge server with its declared capacities.
    pub fn add_edge(&mut self, edge_id: &str, cpu_memory_gb: f64, device_memory_gb: f64) {
        let prev = self.edges.insert(
            edge_id.to_string(),
            EdgeCapacity {
                cpu_memory_gb,
                device_memory_gb,
            },
        );
        assert!(prev.is_none(), "edge server {} registered twice", edge_id);
    }

    /// Returns the CPU memory still available to the given edge server,
    /// i.e. its declared capacity minus the memory reserved network-wide.
    pub fn available_cpu_gb(&self, edge_id: &str) -> f64 {
        self.edges[edge_id].cpu_memory_gb - self.reserved_cpu_gb
    }

    /// Returns the device memory still available to the given edge server.
    pub fn available_device_gb(&self, edge_id: &str) -> f64 {
        self.edges[edge_id].device_memory_gb - self.reserved_device_gb
    }

    /// Checks whether the requested reservation fits without committing it.
    pub fn can_reserve(&self, edge_id: &str, cpu_gb: f64, device_gb: f64) -> AdmissionVerdict {
        let capacity = match self.edges.get(edge_id) {
            Some(c) => c,
            None => return AdmissionVerdict::EdgeNotFound,
        };
        if cpu_gb > capacity.cpu_memory_gb - self.reserved_cpu_gb {
            return AdmissionVerdict::NotEnoughCpuMemory;
        }
        if device_gb > capacity.device_memory_gb - self.reserved_device_gb {
            return AdmissionVerdict::NotEnoughDeviceMemory;
        }
        AdmissionVerdict::Success
    }

    /// Checks and commits a reservation in one step.
    ///
    /// The counters are updated only on [`AdmissionVerdict::Success`].
    pub fn try_reserve(&mut self, edge_id: &str, cpu_gb: f64, device_gb: f64) -> AdmissionVerdict {
        let verdict = self.can_reserve(edge_id, cpu_gb, device_gb);
        if verdict == AdmissionVerdict::Success {
            self.reserved_cpu_gb += cpu_gb;
            self.reserved_device_gb += device_gb;
        }
        verdict
    }

    /// Returns a previously committed reservation to the pool.
    pub fn release(&mut self, cpu_gb: f64, device_gb: f64) {
        self.reserved_cpu_gb -= cpu_gb;
        self.reserved_device_gb -= device_gb;
        assert!(
            self.reserved_cpu_gb > -EPSILON && self.reserved_device_gb > -EPSILON,
            "pool released more memory than was reserved"
        );
        self.reserved_cpu_gb = self.reserved_cpu_gb.max(0.);
        self.reserved_device_gb = self.reserved_device_gb.max(0.);
    }

    /// Returns the network-wide reserved totals as `(cpu_gb, device_gb)`.
    pub fn reserved_totals(&self) -> (f64, f64) {
        (self.reserved_cpu_gb, self.reserved_device_gb)
    }

    /// Recomputes the reserved totals from live deployment reservations and
    /// checks them against the running counters.
    pub fn audit<I>(&self, reservations: I) -> bool
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        let (mut cpu, mut device) = (0., 0.);
        for (c, d) in reservations {
            cpu += c;
            device += d;
        }
        (cpu - self.reserved_cpu_gb).abs() < EPSILON && (device - self.reserved_device_gb).abs() < EPSILON
    }
}

impl Default for EdgePoolState {
    fn default() -> Self {
        Self::new()
    }
}
