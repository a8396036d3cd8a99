//! Aggregated simulation counters.

use serde::Serialize;

/// Counters accumulated over a simulation run. Shared by the facade and all
/// base stations.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Stats {
    pub events_received: u64,
    pub events_dispatched: u64,
    pub events_skipped: u64,
    pub events_purged: u64,
    pub actions_produced: u64,
    pub actions_conflict_dropped: u64,
    pub actions_unsupported: u64,
    pub handovers_intra: u64,
    pub handovers_inter: u64,
    pub traffic_served: u64,
    pub traffic_unsubscribed: u64,
    pub traffic_failed: u64,
    pub deployments_created: u64,
    pub deployments_removed: u64,
}
