#![warn(missing_docs)]
//! Deterministic tick-driven simulation kernel.
//!
//! The kernel owns the simulation clock, the tick counter and a seeded random
//! number generator, and hands out per-component [`SimulationContext`] handles
//! used for time access, random sampling and logging. There is no global event
//! queue: the driver polls its components once per tick in a fixed order and
//! then advances the clock, so runs are reproducible for a given seed and
//! component insertion order.

pub mod component;
pub mod context;
pub mod log;
pub mod simulation;
mod state;

pub use colored;
pub use component::Id;
pub use context::SimulationContext;
pub use simulation::Simulation;
pub use state::EPSILON;
