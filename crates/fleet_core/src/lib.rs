//! Second-by-second ride-hailing fleet simulation.
//!
//! An [environment::Environment] owns the map, the driver fleet and the order
//! book of one simulated day and advances them one second at a time. Matching
//! and repositioning decisions are delegated to a [matching::DispatchAgent];
//! scoring, cancellations and idle movement come from the pluggable models in
//! [models].

pub mod arrivals;
pub mod clock;
pub mod config;
pub mod driver;
pub mod environment;
pub mod error;
pub mod fleet;
pub mod geo;
pub mod ids;
pub mod matching;
pub mod models;
pub mod orders;
pub mod rng;
pub mod runner;
pub mod spatial;
pub mod systems;
pub mod telemetry;
pub mod telemetry_export;
pub mod trajectory;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use environment::{Environment, EnvironmentBuilder};
pub use error::{SimError, SimResult};
