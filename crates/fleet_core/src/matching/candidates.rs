//! Candidate (order, driver) pairs for one dispatch cycle.
//!
//! Drivers are bucketed by cell once per cycle; each unassigned order then
//! looks only at drivers inside the two-hop closure of its start cell, drops
//! pairs beyond the pickup limit and is scored in one batch.

use std::collections::HashMap;

use h3o::CellIndex;

use crate::clock::SimulationClock;
use crate::config::SimConfig;
use crate::driver::Driver;
use crate::error::SimResult;
use crate::fleet::DriverFleet;
use crate::geo::great_circle_m;
use crate::models::RewardModelResource;
use crate::orders::{Order, OrderBook, OrderStatus};
use crate::spatial::SpatialMap;

use super::types::PairRequest;

struct CycleContext<'a> {
    map: &'a SpatialMap,
    clock: &'a SimulationClock,
    config: &'a SimConfig,
    drivers_by_cell: HashMap<CellIndex, Vec<&'a Driver>>,
}

fn pairs_for_order(order: &Order, ctx: &CycleContext<'_>) -> SimResult<Vec<PairRequest>> {
    let closure = ctx.map.neighbors_of_neighbors(order.start_cell)?;
    let mut nearby: Vec<&Driver> = closure
        .iter()
        .filter_map(|cell| ctx.drivers_by_cell.get(cell))
        .flatten()
        .copied()
        .collect();
    if nearby.is_empty() {
        return Ok(Vec::new());
    }
    nearby.sort_unstable_by_key(|driver| driver.id());

    let trip = ctx.map.path(order.start_cell, order.finish_cell)?;
    let trip_secs = trip.distance_m / ctx.config.trip_speed_m_per_s;
    let now = ctx.clock.now();

    let mut pairs = Vec::new();
    for driver in nearby {
        let distance = great_circle_m(driver.location(), order.start_location);
        if distance > ctx.config.max_pickup_distance_m {
            continue;
        }
        let pick_up_eta = distance / ctx.config.pickup_speed_m_per_s;
        let finish_second = now + pick_up_eta as u64 + trip_secs as u64;
        pairs.push(PairRequest {
            order_id: order.id,
            driver_id: driver.id(),
            order_driver_distance: distance,
            order_start_location: order.start_location,
            order_finish_location: order.finish_location,
            driver_location: driver.location(),
            order_start_cell: order.start_cell,
            order_finish_cell: order.finish_cell,
            driver_cell: driver.cell(),
            timestamp: ctx.clock.timestamp(),
            order_finish_timestamp: ctx.clock.timestamp_of(finish_second),
            day_of_week: ctx.clock.day_of_week(),
            reward_units: 0.0,
            pick_up_eta,
            trip_distance: trip.distance_m,
            finish_second,
        });
    }
    Ok(pairs)
}

#[cfg(not(feature = "parallel"))]
fn collect_pairs(orders: &[&Order], ctx: &CycleContext<'_>) -> SimResult<Vec<PairRequest>> {
    let mut pairs = Vec::new();
    for order in orders {
        pairs.extend(pairs_for_order(order, ctx)?);
    }
    Ok(pairs)
}

#[cfg(feature = "parallel")]
fn collect_pairs(orders: &[&Order], ctx: &CycleContext<'_>) -> SimResult<Vec<PairRequest>> {
    use rayon::prelude::*;

    let per_order: Vec<Vec<PairRequest>> = orders
        .par_iter()
        .map(|order| pairs_for_order(order, ctx))
        .collect::<SimResult<_>>()?;
    Ok(per_order.into_iter().flatten().collect())
}

/// Feasible, scored pairs for every unassigned order, in order-id then
/// driver-id order.
pub fn build_candidates(
    orders: &OrderBook,
    fleet: &DriverFleet,
    map: &SpatialMap,
    clock: &SimulationClock,
    config: &SimConfig,
    reward_model: &RewardModelResource,
) -> SimResult<Vec<PairRequest>> {
    let waiting: Vec<&Order> = orders.by_status(OrderStatus::Unassigned).collect();
    if waiting.is_empty() {
        return Ok(Vec::new());
    }

    let mut drivers_by_cell: HashMap<CellIndex, Vec<&Driver>> = HashMap::new();
    for driver in fleet.dispatchable() {
        drivers_by_cell.entry(driver.cell()).or_default().push(driver);
    }
    let ctx = CycleContext {
        map,
        clock,
        config,
        drivers_by_cell,
    };

    let mut pairs = collect_pairs(&waiting, &ctx)?;
    reward_model.score(&mut pairs)?;
    log::debug!(
        "t={} {} waiting orders produced {} candidate pairs",
        clock.now(),
        waiting.len(),
        pairs.len()
    );
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrivals::OrderArrival;
    use crate::models::ConstantRewardModel;
    use crate::test_helpers::{test_cell, test_map, test_neighbor_cell};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn cell_at_distance(k: i32) -> CellIndex {
        *test_cell()
            .grid_disk::<Vec<_>>(k as u32)
            .iter()
            .find(|cell| test_cell().grid_distance(**cell).ok() == Some(k))
            .expect("ring cell")
    }

    fn setup(driver_cells: &[CellIndex]) -> (OrderBook, DriverFleet, SpatialMap, SimulationClock) {
        let map = test_map(4);
        let mut rng = StdRng::seed_from_u64(21);
        let mut fleet = DriverFleet::default();
        for cell in driver_cells {
            fleet.spawn(*cell, None, &map, 0, &mut rng).expect("spawn");
        }
        let mut orders = OrderBook::default();
        orders
            .admit(
                &[OrderArrival {
                    start_cell: test_cell(),
                    finish_cell: test_neighbor_cell(),
                }],
                &map,
                10,
                &mut rng,
            )
            .expect("admit");
        let mut clock = SimulationClock::new(2, 1_000);
        clock.update(10);
        (orders, fleet, map, clock)
    }

    #[test]
    fn only_drivers_within_two_hops_are_considered() {
        let (orders, fleet, map, clock) =
            setup(&[test_cell(), cell_at_distance(2), cell_at_distance(3)]);
        let reward = RewardModelResource::new(ConstantRewardModel(2.0));
        let pairs = build_candidates(&orders, &fleet, &map, &clock, &SimConfig::default(), &reward)
            .expect("candidates");
        let drivers: Vec<u64> = pairs.iter().map(|pair| pair.driver_id.raw()).collect();
        assert_eq!(drivers, vec![0, 1]);
        assert!(pairs.iter().all(|pair| pair.reward_units == 2.0));
    }

    #[test]
    fn pickup_limit_filters_pairs() {
        let (orders, fleet, map, clock) = setup(&[test_cell(), cell_at_distance(2)]);
        let reward = RewardModelResource::new(ConstantRewardModel(1.0));
        let config = SimConfig::default().with_max_pickup_distance(0.0);
        let pairs =
            build_candidates(&orders, &fleet, &map, &clock, &config, &reward).expect("candidates");
        assert!(pairs.is_empty());
    }

    #[test]
    fn finish_time_adds_pickup_and_trip() {
        let (orders, fleet, map, clock) = setup(&[test_cell()]);
        let reward = RewardModelResource::new(ConstantRewardModel(1.0));
        let config = SimConfig::default();
        let pairs =
            build_candidates(&orders, &fleet, &map, &clock, &config, &reward).expect("candidates");
        let pair = &pairs[0];
        let trip = map.path(test_cell(), test_neighbor_cell()).expect("path");
        let expected = 10
            + (pair.order_driver_distance / config.pickup_speed_m_per_s) as u64
            + (trip.distance_m / config.trip_speed_m_per_s) as u64;
        assert_eq!(pair.finish_second, expected);
        assert_eq!(pair.order_finish_timestamp, 1_000 + expected as i64);
        assert_eq!(pair.timestamp, 1_010);
        assert_eq!(pair.day_of_week, 2);
        assert_eq!(pair.trip_distance, trip.distance_m);
    }

    #[test]
    fn assigned_drivers_are_not_candidates() {
        let (orders, mut fleet, map, clock) = setup(&[test_cell()]);
        fleet
            .take_order(crate::ids::DriverId(0), crate::ids::OrderId(99), 5)
            .expect("take order");
        let reward = RewardModelResource::new(ConstantRewardModel(1.0));
        let pairs = build_candidates(&orders, &fleet, &map, &clock, &SimConfig::default(), &reward)
            .expect("candidates");
        assert!(pairs.is_empty());
    }
}
