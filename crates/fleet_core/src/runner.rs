//! Tick schedule and the per-second driver.
//!
//! The clock is advanced here, outside the systems. Each phase is gated by
//! its cadence and by [tick_healthy]: once a phase records a fault, the rest
//! of the tick is skipped and [run_tick] returns the error.

use bevy_ecs::prelude::{In, IntoSystem, IntoSystemConfigs, Res, ResMut, Resource, Schedule, World};
use bevy_ecs::schedule::ExecutorKind;

use crate::clock::SimulationClock;
use crate::config::SimConfig;
use crate::error::{SimError, SimResult};
use crate::systems::{
    arrivals::arrivals_system,
    dispatch::{cancellation_system, dispatch_system},
    idle_movement::idle_movement_system,
    metrics::{flush_frame_system, open_frame_system},
    movement::movement_system,
    reposition::reposition_system,
};

/// First error raised by a phase during the current tick.
#[derive(Debug, Default, Resource)]
pub struct TickFault(pub Option<SimError>);

fn is_dispatch_second(clock: Res<SimulationClock>, config: Res<SimConfig>) -> bool {
    config.is_dispatch_second(clock.now())
}

fn is_reposition_second(clock: Res<SimulationClock>, config: Res<SimConfig>) -> bool {
    config.is_reposition_second(clock.now())
}

fn tick_healthy(fault: Res<TickFault>) -> bool {
    fault.0.is_none()
}

/// Stores the first phase error of the tick.
pub fn record_fault(In(result): In<SimResult<()>>, mut fault: ResMut<TickFault>) {
    if let Err(error) = result {
        log::error!("tick phase failed: {error}");
        if fault.0.is_none() {
            fault.0 = Some(error);
        }
    }
}

/// Builds the tick schedule: phases chained in fixed order on the
/// single-threaded executor.
pub fn simulation_schedule() -> Schedule {
    let mut schedule = Schedule::default();
    schedule.set_executor_kind(ExecutorKind::SingleThreaded);
    schedule.add_systems(
        (
            open_frame_system,
            reposition_system
                .pipe(record_fault)
                .run_if(is_reposition_second),
            idle_movement_system.pipe(record_fault),
            arrivals_system.pipe(record_fault),
            dispatch_system.pipe(record_fault).run_if(is_dispatch_second),
            cancellation_system
                .pipe(record_fault)
                .run_if(is_dispatch_second),
            movement_system.pipe(record_fault),
            flush_frame_system,
        )
            .chain()
            .distributive_run_if(tick_healthy),
    );
    schedule
}

/// Runs the schedule for `second` and returns the first phase error, if any.
pub fn run_tick(world: &mut World, schedule: &mut Schedule, second: u64) -> SimResult<()> {
    world.resource_mut::<SimulationClock>().update(second);
    world.resource_mut::<TickFault>().0 = None;
    schedule.run(world);
    match world.resource_mut::<TickFault>().0.take() {
        Some(error) => Err(error),
        None => Ok(()),
    }
}
