//! Tick phases. Each phase is a bevy system over the environment's resources;
//! fallible phases return [crate::error::SimResult] and are piped into the
//! fault recorder by [crate::runner::simulation_schedule].

pub mod arrivals;
pub mod dispatch;
pub mod idle_movement;
pub mod metrics;
pub mod movement;
pub mod reposition;

use bevy_ecs::prelude::Resource;

use crate::ids::OrderId;

/// Orders bound during the current dispatch cycle with their pickup
/// distance and reward. Filled by dispatch, drained by cancellation.
#[derive(Debug, Default, Resource)]
pub struct DispatchCycle {
    pub assigned: Vec<(OrderId, f64, f64)>,
}
