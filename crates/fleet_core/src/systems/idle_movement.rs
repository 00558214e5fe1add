use bevy_ecs::prelude::{Res, ResMut};
use h3o::CellIndex;

use crate::clock::SimulationClock;
use crate::config::SimConfig;
use crate::error::SimResult;
use crate::fleet::DriverFleet;
use crate::ids::DriverId;
use crate::models::IdleTransitionModel;
use crate::rng::SimRng;
use crate::spatial::SpatialMap;
use crate::telemetry::TrajectoryCollector;

pub fn idle_movement_system(
    clock: Res<SimulationClock>,
    config: Res<SimConfig>,
    map: Res<SpatialMap>,
    model: Res<IdleTransitionModel>,
    mut fleet: ResMut<DriverFleet>,
    mut rng: ResMut<SimRng>,
    mut collector: ResMut<TrajectoryCollector>,
) -> SimResult<()> {
    if model.is_empty() {
        return Ok(());
    }
    let hour = clock.hour();
    let targets: Vec<(DriverId, CellIndex)> = fleet
        .resting()
        .map(|driver| {
            (
                driver.id(),
                model.transition(driver.cell(), hour, &mut rng.0),
            )
        })
        .collect();
    let moved = fleet.idle_move(&targets, &map, config.idle_speed_m_per_s, clock.now())?;
    collector.frame_mut().idle_moves += moved;
    Ok(())
}
