//! Radio access network control plane simulation.
//!
//! Base stations own radio cells and an edge compute server, keep per-UE
//! registration state and drive a synchronous tick: cells report measurement
//! events, registered handlers turn them into control actions, and a
//! reconciliation pass executes at most one handover per UE per tick.
//! [`simulation::RanSimulation`] is the entry point: it builds the network
//! from a [`config::RanSimConfig`], owns the global entity registries and
//! runs the tick loop across base stations and edge servers.

pub mod base_station;
pub mod cell;
pub mod config;
pub mod core_network;
pub mod directory;
pub mod events;
pub mod logger;
pub mod simulation;
pub mod stats;
pub mod ue;
