//! Applying agent responses to the fleet and the order book.
//!
//! Agent output is untrusted: pairs that were never offered, drivers or
//! orders used twice, and reposition answers for drivers that were not asked
//! about are dropped with a warning. Whatever survives must bind cleanly;
//! a failure there is an internal inconsistency.

use std::collections::{HashMap, HashSet};

use h3o::CellIndex;

use crate::error::SimResult;
use crate::fleet::DriverFleet;
use crate::ids::{DriverId, OrderId};
use crate::orders::{OrderAssignment, OrderBook};
use crate::spatial::SpatialMap;

use super::types::{DispatchAssignment, PairRequest, RepositionAssignment};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchOutcome {
    /// `(order, pickup distance, reward)` for each applied pair.
    pub assigned: Vec<(OrderId, f64, f64)>,
    pub discarded: usize,
}

impl DispatchOutcome {
    pub fn reward(&self) -> f64 {
        self.assigned.iter().map(|(_, _, reward)| reward).sum()
    }
}

pub fn apply_dispatch(
    candidates: &[PairRequest],
    response: &[DispatchAssignment],
    fleet: &mut DriverFleet,
    orders: &mut OrderBook,
    now: u64,
) -> SimResult<DispatchOutcome> {
    let offered: HashMap<(OrderId, DriverId), &PairRequest> = candidates
        .iter()
        .map(|pair| ((pair.order_id, pair.driver_id), pair))
        .collect();
    let mut used_drivers = HashSet::new();
    let mut used_orders = HashSet::new();
    let mut outcome = DispatchOutcome::default();

    for answer in response {
        let Some(pair) = offered.get(&(answer.order_id, answer.driver_id)) else {
            log::warn!(
                "agent returned {} / {} which was not offered, discarding",
                answer.order_id,
                answer.driver_id
            );
            outcome.discarded += 1;
            continue;
        };
        if used_drivers.contains(&pair.driver_id) || used_orders.contains(&pair.order_id) {
            log::warn!(
                "agent reused {} or {} in one cycle, discarding",
                pair.order_id,
                pair.driver_id
            );
            outcome.discarded += 1;
            continue;
        }
        used_drivers.insert(pair.driver_id);
        used_orders.insert(pair.order_id);

        fleet.take_order(pair.driver_id, pair.order_id, now)?;
        orders.assign(
            pair.order_id,
            OrderAssignment {
                driver: pair.driver_id,
                reward: pair.reward_units,
                pick_up_eta: pair.pick_up_eta,
                order_driver_distance: pair.order_driver_distance,
                finish_second: pair.finish_second,
                assigned_at: now,
            },
        )?;
        outcome
            .assigned
            .push((pair.order_id, pair.order_driver_distance, pair.reward_units));
    }
    Ok(outcome)
}

/// Applies valid reposition answers and returns how many drivers were sent.
pub fn apply_reposition(
    offered: &[DriverId],
    response: &[RepositionAssignment],
    fleet: &mut DriverFleet,
    map: &SpatialMap,
    speed_m_per_s: f64,
    now: u64,
) -> SimResult<usize> {
    let offered: HashSet<DriverId> = offered.iter().copied().collect();
    let mut seen = HashSet::new();
    let mut targets: Vec<(DriverId, CellIndex)> = Vec::with_capacity(response.len());
    for answer in response {
        if !offered.contains(&answer.driver_id) || !seen.insert(answer.driver_id) {
            log::warn!(
                "reposition answer for {} was not requested or is repeated, discarding",
                answer.driver_id
            );
            continue;
        }
        if !map.contains(answer.destination) {
            log::warn!(
                "reposition destination {} for {} is outside the map, discarding",
                answer.destination,
                answer.driver_id
            );
            continue;
        }
        targets.push((answer.driver_id, answer.destination));
    }
    fleet.reposition(&targets, map, speed_m_per_s, now)?;
    Ok(targets.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrivals::OrderArrival;
    use crate::driver::DriverStatus;
    use crate::test_helpers::{sample_pair, test_cell, test_map, test_neighbor_cell};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn world(drivers: usize, orders: usize) -> (DriverFleet, OrderBook, SpatialMap) {
        let map = test_map(2);
        let mut rng = StdRng::seed_from_u64(5);
        let mut fleet = DriverFleet::default();
        for _ in 0..drivers {
            fleet.spawn(test_cell(), None, &map, 0, &mut rng).expect("spawn");
        }
        let mut book = OrderBook::default();
        let arrivals = vec![
            OrderArrival {
                start_cell: test_cell(),
                finish_cell: test_neighbor_cell(),
            };
            orders
        ];
        book.admit(&arrivals, &map, 0, &mut rng).expect("admit");
        (fleet, book, map)
    }

    fn answer(order: u64, driver: u64) -> DispatchAssignment {
        DispatchAssignment {
            order_id: OrderId(order),
            driver_id: DriverId(driver),
        }
    }

    #[test]
    fn duplicate_and_unknown_pairs_are_discarded() {
        let (mut fleet, mut book, _) = world(2, 2);
        let candidates: Vec<_> = [(0, 0), (0, 1), (1, 0), (1, 1)]
            .iter()
            .map(|(o, d)| sample_pair(*o, *d))
            .collect();
        let response = [answer(0, 0), answer(1, 0), answer(0, 1), answer(5, 1), answer(1, 1)];
        let outcome = apply_dispatch(&candidates, &response, &mut fleet, &mut book, 2)
            .expect("apply");

        assert_eq!(outcome.assigned.len(), 2);
        assert_eq!(outcome.discarded, 3);
        assert_eq!(
            fleet.get(DriverId(0)).map(|d| d.status()),
            Some(DriverStatus::Assigned(OrderId(0)))
        );
        assert_eq!(
            fleet.get(DriverId(1)).map(|d| d.status()),
            Some(DriverStatus::Assigned(OrderId(1)))
        );
        fleet.verify_pairing(&book).expect("paired");
    }

    #[test]
    fn reposition_ignores_drivers_that_were_not_offered() {
        let (mut fleet, _, map) = world(3, 0);
        let outside = *test_cell()
            .grid_disk::<Vec<_>>(4)
            .iter()
            .find(|cell| !map.contains(**cell))
            .expect("outside cell");
        let response = [
            RepositionAssignment {
                driver_id: DriverId(0),
                destination: test_neighbor_cell(),
            },
            RepositionAssignment {
                driver_id: DriverId(1),
                destination: outside,
            },
            RepositionAssignment {
                driver_id: DriverId(2),
                destination: test_neighbor_cell(),
            },
        ];
        let sent = apply_reposition(
            &[DriverId(0), DriverId(1)],
            &response,
            &mut fleet,
            &map,
            5.0,
            100,
        )
        .expect("apply");
        assert_eq!(sent, 1);
        assert_eq!(
            fleet.get(DriverId(0)).map(|d| d.status()),
            Some(DriverStatus::Reposition)
        );
        assert_eq!(fleet.get(DriverId(2)).map(|d| d.status()), Some(DriverStatus::Idle));
    }
}
