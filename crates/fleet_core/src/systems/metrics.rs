use bevy_ecs::prelude::{Res, ResMut};

use crate::clock::SimulationClock;
use crate::driver::StatusKind;
use crate::fleet::DriverFleet;
use crate::orders::OrderBook;
use crate::telemetry::{TelemetrySinkResource, TrajectoryCollector};

pub fn open_frame_system(clock: Res<SimulationClock>, mut collector: ResMut<TrajectoryCollector>) {
    collector.open(clock.now(), clock.day_of_week());
}

/// Fills the population gauges and hands the frame to the sink.
pub fn flush_frame_system(
    fleet: Res<DriverFleet>,
    orders: Res<OrderBook>,
    mut collector: ResMut<TrajectoryCollector>,
    mut sink: ResMut<TelemetrySinkResource>,
) {
    let frame = collector.frame_mut();
    frame.total_drivers = fleet.len();
    frame.idle_drivers = fleet.count(StatusKind::Idle);
    frame.reposition_drivers = fleet.count(StatusKind::Reposition);
    frame.assigned_drivers = fleet.count(StatusKind::Assigned);
    frame.total_orders = orders.len();
    frame.total_reward = fleet.total_reward();

    sink.0.on_step(collector.frame(), collector.segments());
}
