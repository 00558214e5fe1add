use bevy_ecs::prelude::{Res, ResMut};

use crate::clock::SimulationClock;
use crate::config::SimConfig;
use crate::error::SimResult;
use crate::fleet::DriverFleet;
use crate::matching::{apply_reposition, AgentResource, DriverInfo, RepositionRequest};
use crate::rng::SimRng;
use crate::spatial::SpatialMap;
use crate::telemetry::TrajectoryCollector;

/// Offers a shuffled batch of long-idle drivers to the agent and sends them
/// where it answers.
pub fn reposition_system(
    clock: Res<SimulationClock>,
    config: Res<SimConfig>,
    map: Res<SpatialMap>,
    mut fleet: ResMut<DriverFleet>,
    mut agent: ResMut<AgentResource>,
    mut rng: ResMut<SimRng>,
    mut collector: ResMut<TrajectoryCollector>,
) -> SimResult<()> {
    let offered = fleet.eligible_for_reposition(
        config.min_idle_for_reposition_secs,
        Some(config.reposition_batch_size),
        &mut rng.0,
    );
    if offered.is_empty() {
        return Ok(());
    }

    let request = RepositionRequest {
        timestamp: clock.timestamp(),
        day_of_week: clock.day_of_week(),
        driver_info: offered
            .iter()
            .filter_map(|id| fleet.get(*id))
            .map(|driver| DriverInfo {
                driver_id: driver.id(),
                grid_id: driver.cell(),
            })
            .collect(),
    };
    let response = agent.reposition(&request);
    let sent = apply_reposition(
        &offered,
        &response,
        &mut fleet,
        &map,
        config.reposition_speed_m_per_s,
        clock.now(),
    )?;
    log::debug!("t={} repositioned {sent} of {} offered drivers", clock.now(), offered.len());
    collector.frame_mut().repositioned_drivers += sent;
    Ok(())
}
