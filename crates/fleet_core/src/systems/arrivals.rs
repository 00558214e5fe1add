use bevy_ecs::prelude::{Res, ResMut};

use crate::arrivals::ArrivalSchedule;
use crate::clock::SimulationClock;
use crate::error::SimResult;
use crate::fleet::DriverFleet;
use crate::orders::OrderBook;
use crate::rng::SimRng;
use crate::spatial::SpatialMap;
use crate::telemetry::TrajectoryCollector;

/// Admits the orders and drivers scheduled for this second, then retires
/// idle drivers whose lifetime ran out.
pub fn arrivals_system(
    clock: Res<SimulationClock>,
    map: Res<SpatialMap>,
    schedule: Res<ArrivalSchedule>,
    mut orders: ResMut<OrderBook>,
    mut fleet: ResMut<DriverFleet>,
    mut rng: ResMut<SimRng>,
    mut collector: ResMut<TrajectoryCollector>,
) -> SimResult<()> {
    let now = clock.now();
    let admitted = orders.admit(schedule.orders_at(now), &map, now, &mut rng.0)?;

    let arriving = schedule.drivers_at(now);
    for arrival in arriving {
        fleet.spawn(arrival.cell, arrival.lifetime_secs, &map, now, &mut rng.0)?;
    }
    let retired = fleet.expire(now);
    if !retired.is_empty() {
        log::debug!("t={now} {} drivers went offline", retired.len());
    }

    let frame = collector.frame_mut();
    frame.income_orders += admitted.len();
    frame.income_drivers += arriving.len();
    collector.record_retired(retired);
    Ok(())
}
