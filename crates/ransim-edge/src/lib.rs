//! Edge compute plane: AI service subscriptions, resource-aware deployment
//! admission and the request path from base stations to deployed services.
//!
//! The crate models a set of edge servers drawing from one logical memory
//! pool. Admission goes through a single authoritative [`pool::EdgePoolState`]
//! so that check-and-reserve is atomic within a simulation tick. Container
//! starts and service requests go through the [`runtime::ContainerRuntime`]
//! and [`transport::ServiceTransport`] backends, with simulated
//! implementations provided by [`transport::SimulatedCluster`].

pub mod deployment;
pub mod error;
pub mod pool;
pub mod runtime;
pub mod server;
pub mod subscription;
pub mod transport;
pub mod util;
