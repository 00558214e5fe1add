use bevy_ecs::prelude::{Res, ResMut};

use crate::clock::SimulationClock;
use crate::error::SimResult;
use crate::fleet::DriverFleet;
use crate::orders::OrderBook;
use crate::rng::SimRng;
use crate::spatial::SpatialMap;
use crate::telemetry::TrajectoryCollector;

pub fn movement_system(
    clock: Res<SimulationClock>,
    map: Res<SpatialMap>,
    mut fleet: ResMut<DriverFleet>,
    mut orders: ResMut<OrderBook>,
    mut rng: ResMut<SimRng>,
    mut collector: ResMut<TrajectoryCollector>,
) -> SimResult<()> {
    let completed = fleet.advance_all(clock.now(), &mut orders, &map, &mut rng.0)?;
    let frame = collector.frame_mut();
    frame.completed_orders += completed.len();
    frame.reward_completed += completed.iter().map(|order| order.reward()).sum::<f64>();
    Ok(())
}
