//! Simulation component identifiers.

/// Identifier of simulation component.
///
/// Identifiers are assigned sequentially starting from 0 when creating
/// component contexts via [`Simulation::create_context`](crate::Simulation::create_context).
pub type Id = u32;
