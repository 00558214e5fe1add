use bevy_ecs::prelude::{Res, ResMut};

use crate::clock::SimulationClock;
use crate::config::SimConfig;
use crate::error::SimResult;
use crate::fleet::DriverFleet;
use crate::ids::OrderId;
use crate::matching::{apply_dispatch, build_candidates, AgentResource, DispatchOutcome};
use crate::models::cancellation::select_cancellations;
use crate::models::{CancellationModelResource, RewardModelResource};
use crate::orders::OrderBook;
use crate::rng::SimRng;
use crate::spatial::SpatialMap;
use crate::telemetry::TrajectoryCollector;

use super::DispatchCycle;

/// One matching cycle: build and score candidates, ask the agent, bind what
/// it chose and drop every order left unmatched.
#[allow(clippy::too_many_arguments)]
pub fn dispatch_system(
    clock: Res<SimulationClock>,
    config: Res<SimConfig>,
    map: Res<SpatialMap>,
    reward_model: Res<RewardModelResource>,
    mut agent: ResMut<AgentResource>,
    mut fleet: ResMut<DriverFleet>,
    mut orders: ResMut<OrderBook>,
    mut cycle: ResMut<DispatchCycle>,
    mut collector: ResMut<TrajectoryCollector>,
) -> SimResult<()> {
    cycle.assigned.clear();
    let candidates = build_candidates(&orders, &fleet, &map, &clock, &config, &reward_model)?;
    let outcome = if candidates.is_empty() {
        DispatchOutcome::default()
    } else {
        let response = agent.dispatch(&candidates);
        apply_dispatch(&candidates, &response, &mut fleet, &mut orders, clock.now())?
    };
    let expired = orders.expire_unmatched();
    log::debug!(
        "t={} dispatch: {} candidates, {} assigned, {} discarded, {} expired",
        clock.now(),
        candidates.len(),
        outcome.assigned.len(),
        outcome.discarded,
        expired.len()
    );

    let frame = collector.frame_mut();
    frame.dispatch_candidates += candidates.len();
    frame.assigned_orders += outcome.assigned.len();
    frame.discarded_pairs += outcome.discarded;
    frame.expired_orders += expired.len();
    frame.reward_earned += outcome.reward();
    cycle.assigned = outcome.assigned;
    Ok(())
}

/// Cancellation trials for the orders bound in this cycle only.
pub fn cancellation_system(
    config: Res<SimConfig>,
    model: Res<CancellationModelResource>,
    mut cycle: ResMut<DispatchCycle>,
    mut orders: ResMut<OrderBook>,
    mut fleet: ResMut<DriverFleet>,
    mut rng: ResMut<SimRng>,
    mut collector: ResMut<TrajectoryCollector>,
) -> SimResult<()> {
    let assigned = std::mem::take(&mut cycle.assigned);
    let trials: Vec<(OrderId, f64)> = assigned
        .iter()
        .map(|(order, distance, _)| (*order, *distance))
        .collect();
    let losers = select_cancellations(
        &trials,
        model.0.as_ref(),
        config.cancel_bin_width_m,
        &mut rng.0,
    )?;
    if losers.is_empty() {
        return Ok(());
    }
    let cancelled = orders.cancel(&losers, &mut fleet)?;
    let lost: f64 = cancelled.iter().map(|order| order.reward()).sum();

    let frame = collector.frame_mut();
    frame.cancelled_orders += cancelled.len();
    frame.reward_cancelled += lost;
    frame.reward_earned -= lost;
    Ok(())
}
