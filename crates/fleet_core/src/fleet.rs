//! The driver population of a run.

use std::collections::BTreeMap;

use bevy_ecs::prelude::Resource;
use h3o::CellIndex;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::driver::{Driver, DriverStatus, RetiredDriver, StatusKind};
use crate::error::{SimError, SimResult};
use crate::ids::{DriverId, IdAllocator, OrderId};
use crate::orders::{Order, OrderBook};
use crate::rng::InitialIdle;
use crate::spatial::SpatialMap;
use crate::trajectory::TrajectorySegment;

#[derive(Debug, Default, Resource)]
pub struct DriverFleet {
    drivers: BTreeMap<DriverId, Driver>,
    ids: IdAllocator,
    total_reward: f64,
    initial_idle: InitialIdle,
}

impl DriverFleet {
    /// An empty fleet whose drivers come online with idle time drawn from
    /// `initial_idle`.
    pub fn with_initial_idle(initial_idle: InitialIdle) -> Self {
        Self {
            initial_idle,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }

    pub fn get(&self, id: DriverId) -> Option<&Driver> {
        self.drivers.get(&id)
    }

    fn get_mut(&mut self, id: DriverId) -> SimResult<&mut Driver> {
        self.drivers.get_mut(&id).ok_or(SimError::UnknownDriver(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Driver> {
        self.drivers.values()
    }

    /// Reward credited by completed orders over the whole run.
    pub fn total_reward(&self) -> f64 {
        self.total_reward
    }

    pub fn count(&self, kind: StatusKind) -> usize {
        self.iter()
            .filter(|driver| driver.status().kind() == kind)
            .count()
    }

    pub fn spawn<R: Rng + ?Sized>(
        &mut self,
        cell: CellIndex,
        lifetime_secs: Option<u64>,
        map: &SpatialMap,
        now: u64,
        rng: &mut R,
    ) -> SimResult<DriverId> {
        let location = map.coordinate_for(cell, rng)?;
        let idle_time = self.initial_idle.sample(rng);
        let id = DriverId(self.ids.next_raw());
        self.drivers.insert(
            id,
            Driver::new(id, cell, location, now, lifetime_secs, idle_time),
        );
        Ok(id)
    }

    /// Trajectories of every driver still online, each cut at `now`.
    pub fn survivor_segments(&self, now: u64) -> Vec<TrajectorySegment> {
        self.iter()
            .flat_map(|driver| driver.survivor_trajectory(now))
            .collect()
    }

    /// Removes idle drivers whose deadline has passed.
    pub fn expire(&mut self, now: u64) -> Vec<RetiredDriver> {
        let expired: Vec<DriverId> = self
            .iter()
            .filter(|driver| driver.is_expired(now))
            .map(Driver::id)
            .collect();
        expired
            .into_iter()
            .filter_map(|id| self.drivers.remove(&id))
            .map(|driver| driver.retire(now))
            .collect()
    }

    /// Drivers of the given kind; with a limit, a uniformly shuffled prefix.
    pub fn by_status<R: Rng + ?Sized>(
        &self,
        kind: StatusKind,
        limit: Option<usize>,
        rng: &mut R,
    ) -> Vec<DriverId> {
        self.select(|driver| driver.status().kind() == kind, limit, rng)
    }

    /// Idle drivers that waited at least `min_idle_secs` and are not in
    /// transit; with a limit, a uniformly shuffled prefix.
    pub fn eligible_for_reposition<R: Rng + ?Sized>(
        &self,
        min_idle_secs: u64,
        limit: Option<usize>,
        rng: &mut R,
    ) -> Vec<DriverId> {
        self.select(
            |driver| {
                driver.status() == DriverStatus::Idle
                    && driver.idle_time() >= min_idle_secs
                    && driver.route().is_empty()
            },
            limit,
            rng,
        )
    }

    fn select<R: Rng + ?Sized>(
        &self,
        keep: impl Fn(&Driver) -> bool,
        limit: Option<usize>,
        rng: &mut R,
    ) -> Vec<DriverId> {
        let mut ids: Vec<DriverId> = self
            .iter()
            .filter(|driver| keep(driver))
            .map(Driver::id)
            .collect();
        if let Some(limit) = limit {
            ids.shuffle(rng);
            ids.truncate(limit);
        }
        ids
    }

    /// Idle drivers not in transit; candidates for the idle movement model.
    pub fn resting(&self) -> impl Iterator<Item = &Driver> {
        self.iter()
            .filter(|driver| driver.status() == DriverStatus::Idle && driver.route().is_empty())
    }

    pub fn dispatchable(&self) -> impl Iterator<Item = &Driver> {
        self.iter().filter(|driver| driver.is_dispatchable())
    }

    /// Sends each driver towards its target at `speed_m_per_s`.
    pub fn reposition(
        &mut self,
        targets: &[(DriverId, CellIndex)],
        map: &SpatialMap,
        speed_m_per_s: f64,
        now: u64,
    ) -> SimResult<()> {
        for (id, target) in targets {
            let driver = self.get_mut(*id)?;
            if let DriverStatus::Assigned(order) = driver.status() {
                return Err(SimError::OrderNotBound {
                    order,
                    driver: *id,
                });
            }
            let route = map.route(driver.cell(), *target, speed_m_per_s, now)?;
            driver.begin_reposition(route, now);
        }
        Ok(())
    }

    /// Moves idle drivers to new resting cells; returns how many actually left
    /// their cell.
    pub fn idle_move(
        &mut self,
        targets: &[(DriverId, CellIndex)],
        map: &SpatialMap,
        speed_m_per_s: f64,
        now: u64,
    ) -> SimResult<usize> {
        let mut moved = 0;
        for (id, target) in targets {
            let driver = self.get_mut(*id)?;
            if *target == driver.cell() || driver.status() != DriverStatus::Idle {
                continue;
            }
            let route = map.route(driver.cell(), *target, speed_m_per_s, now)?;
            driver.begin_idle_transit(route, now);
            moved += 1;
        }
        Ok(moved)
    }

    pub fn take_order(&mut self, driver: DriverId, order: OrderId, now: u64) -> SimResult<()> {
        self.get_mut(driver)?.take_order(order, now)
    }

    pub(crate) fn release(&mut self, driver: DriverId, order: OrderId) -> SimResult<()> {
        self.get_mut(driver)?.release(order)
    }

    /// Advances every driver by one second. Drivers whose trip ends now are
    /// credited, relocated to the drop-off and freed; their orders are
    /// completed in the book and returned.
    pub fn advance_all<R: Rng + ?Sized>(
        &mut self,
        now: u64,
        orders: &mut OrderBook,
        map: &SpatialMap,
        rng: &mut R,
    ) -> SimResult<Vec<Order>> {
        let mut completed = Vec::new();
        for driver in self.drivers.values_mut() {
            let Some(order_id) = driver.order() else {
                driver.advance(now, map, rng)?;
                continue;
            };
            let order = orders
                .get(order_id)
                .ok_or(SimError::UnknownOrder(order_id))?;
            let assignment = order.assignment().ok_or(SimError::OrderNotBound {
                order: order_id,
                driver: driver.id(),
            })?;
            if now < assignment.finish_second {
                continue;
            }
            let reward = assignment.reward;
            driver.complete_order(
                order_id,
                now,
                order.finish_cell,
                order.finish_location,
                reward,
            )?;
            self.total_reward += reward;
            completed.push(orders.complete(order_id)?);
        }
        Ok(completed)
    }

    /// Checks that assigned drivers and assigned orders point at each other
    /// one-to-one.
    pub fn verify_pairing(&self, orders: &OrderBook) -> SimResult<()> {
        let mut bound = 0;
        for driver in self.iter() {
            let Some(order_id) = driver.order() else {
                continue;
            };
            bound += 1;
            let order = orders
                .get(order_id)
                .ok_or(SimError::UnknownOrder(order_id))?;
            if order.driver() != Some(driver.id()) {
                return Err(SimError::OrderNotBound {
                    order: order_id,
                    driver: driver.id(),
                });
            }
        }
        let assigned_orders = orders.iter().filter(|order| order.driver().is_some()).count();
        if assigned_orders != bound {
            return Err(SimError::Pairing(format!(
                "{assigned_orders} assigned orders but {bound} assigned drivers"
            )));
        }
        for order in orders.iter() {
            if let Some(driver) = order.driver() {
                let status = self
                    .get(driver)
                    .ok_or(SimError::UnknownDriver(driver))?
                    .status();
                if status != DriverStatus::Assigned(order.id) {
                    return Err(SimError::OrderNotBound {
                        order: order.id,
                        driver,
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrivals::OrderArrival;
    use crate::orders::OrderAssignment;
    use crate::test_helpers::{test_cell, test_map, test_neighbor_cell};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn fleet_with(n: usize, lifetime: Option<u64>) -> (DriverFleet, SpatialMap, StdRng) {
        let map = test_map(2);
        let mut rng = StdRng::seed_from_u64(11);
        let mut fleet = DriverFleet::default();
        for _ in 0..n {
            fleet
                .spawn(test_cell(), lifetime, &map, 0, &mut rng)
                .expect("spawn");
        }
        (fleet, map, rng)
    }

    fn bind(fleet: &mut DriverFleet, book: &mut OrderBook, driver: DriverId, order: OrderId, finish: u64) {
        fleet.take_order(driver, order, 1).expect("take order");
        book.assign(
            order,
            OrderAssignment {
                driver,
                reward: 4.0,
                pick_up_eta: 1.0,
                order_driver_distance: 10.0,
                finish_second: finish,
                assigned_at: 1,
            },
        )
        .expect("assign");
    }

    fn admit_one(book: &mut OrderBook, map: &SpatialMap, rng: &mut StdRng) -> OrderId {
        book.admit(
            &[OrderArrival {
                start_cell: test_cell(),
                finish_cell: test_neighbor_cell(),
            }],
            map,
            1,
            rng,
        )
        .expect("admit")[0]
    }

    #[test]
    fn expire_is_idempotent_without_clock_advance() {
        let (mut fleet, _, _) = fleet_with(3, Some(10));
        assert_eq!(fleet.expire(10).len(), 3);
        assert!(fleet.expire(10).is_empty());
        assert!(fleet.is_empty());
    }

    #[test]
    fn assigned_drivers_never_expire() {
        let (mut fleet, map, mut rng) = fleet_with(2, Some(10));
        let mut book = OrderBook::default();
        let order = admit_one(&mut book, &map, &mut rng);
        bind(&mut fleet, &mut book, DriverId(0), order, 1_000);

        let retired = fleet.expire(50);
        assert_eq!(retired.len(), 1);
        assert_eq!(retired[0].id, DriverId(1));
        assert!(retired[0].trajectory.last().is_some_and(|segment| segment.done));
        assert!(fleet.get(DriverId(0)).is_some());
    }

    #[test]
    fn by_status_limit_returns_shuffled_prefix() {
        let (fleet, _, mut rng) = fleet_with(10, None);
        let all = fleet.by_status(StatusKind::Idle, None, &mut rng);
        assert_eq!(all.len(), 10);
        let some = fleet.by_status(StatusKind::Idle, Some(4), &mut rng);
        assert_eq!(some.len(), 4);
        assert!(some.iter().all(|id| all.contains(id)));
        assert!(fleet.by_status(StatusKind::Assigned, Some(4), &mut rng).is_empty());
    }

    #[test]
    fn spawned_drivers_start_with_random_idle_time() {
        let map = test_map(2);
        let mut rng = StdRng::seed_from_u64(5);
        let mut fleet = DriverFleet::with_initial_idle(InitialIdle::new(300.0, 200.0));
        for _ in 0..20 {
            fleet
                .spawn(test_cell(), None, &map, 0, &mut rng)
                .expect("spawn");
        }
        let idle: Vec<u64> = fleet.iter().map(Driver::idle_time).collect();
        assert!(idle.iter().filter(|secs| **secs > 0).count() >= 18);
        assert!(idle.windows(2).any(|pair| pair[0] != pair[1]));

        let ready = idle.iter().filter(|secs| **secs >= 300).count();
        assert!(ready > 0);
        assert_eq!(fleet.eligible_for_reposition(300, None, &mut rng).len(), ready);
    }

    #[test]
    fn survivors_are_cut_at_the_given_second() {
        let (fleet, _, _) = fleet_with(3, None);
        let segments = fleet.survivor_segments(40);
        assert_eq!(segments.len(), 3);
        assert!(segments
            .iter()
            .all(|segment| segment.end_time == 40 && !segment.done));
    }

    #[test]
    fn reposition_eligibility_needs_idle_time_and_no_route() {
        let (mut fleet, map, mut rng) = fleet_with(2, None);
        let mut book = OrderBook::default();
        for second in 1..=5 {
            fleet.advance_all(second, &mut book, &map, &mut rng).expect("advance");
        }
        assert_eq!(fleet.eligible_for_reposition(5, None, &mut rng).len(), 2);
        assert!(fleet.eligible_for_reposition(6, None, &mut rng).is_empty());
        assert_eq!(fleet.eligible_for_reposition(5, Some(1), &mut rng).len(), 1);

        fleet
            .idle_move(&[(DriverId(0), test_neighbor_cell())], &map, 1.0, 6)
            .expect("idle move");
        assert_eq!(fleet.eligible_for_reposition(5, None, &mut rng), vec![DriverId(1)]);
    }

    #[test]
    fn reposition_falls_back_to_idle_on_arrival() {
        let (mut fleet, map, mut rng) = fleet_with(1, None);
        let mut book = OrderBook::default();
        let target = test_neighbor_cell();
        fleet
            .reposition(&[(DriverId(0), target)], &map, 10_000.0, 10)
            .expect("reposition");
        assert_eq!(fleet.get(DriverId(0)).map(Driver::status), Some(DriverStatus::Reposition));

        fleet.advance_all(10, &mut book, &map, &mut rng).expect("advance");
        fleet.advance_all(11, &mut book, &map, &mut rng).expect("advance");
        let driver = fleet.get(DriverId(0)).expect("driver");
        assert_eq!(driver.cell(), target);
        assert_eq!(driver.status(), DriverStatus::Idle);
        assert!(map.bounds(target).expect("bounds").contains(driver.location()));
    }

    #[test]
    fn reposition_to_current_cell_resolves_immediately() {
        let (mut fleet, map, mut rng) = fleet_with(1, None);
        let mut book = OrderBook::default();
        fleet
            .reposition(&[(DriverId(0), test_cell())], &map, 5.0, 100)
            .expect("reposition");
        fleet.advance_all(100, &mut book, &map, &mut rng).expect("advance");
        assert_eq!(fleet.get(DriverId(0)).map(Driver::status), Some(DriverStatus::Idle));
    }

    #[test]
    fn advance_all_completes_orders_at_finish_time() {
        let (mut fleet, map, mut rng) = fleet_with(1, None);
        let mut book = OrderBook::default();
        let order = admit_one(&mut book, &map, &mut rng);
        bind(&mut fleet, &mut book, DriverId(0), order, 20);
        fleet.verify_pairing(&book).expect("paired");

        assert!(fleet.advance_all(19, &mut book, &map, &mut rng).expect("advance").is_empty());
        let completed = fleet.advance_all(20, &mut book, &map, &mut rng).expect("advance");
        assert_eq!(completed.len(), 1);
        assert!(book.is_empty());
        assert_eq!(fleet.total_reward(), 4.0);
        let driver = fleet.get(DriverId(0)).expect("driver");
        assert_eq!(driver.status(), DriverStatus::Idle);
        assert_eq!(driver.cell(), test_neighbor_cell());
        fleet.verify_pairing(&book).expect("paired");
    }

    #[test]
    fn cancel_frees_the_driver_and_drops_its_segment() {
        let (mut fleet, map, mut rng) = fleet_with(1, None);
        let mut book = OrderBook::default();
        let order = admit_one(&mut book, &map, &mut rng);
        bind(&mut fleet, &mut book, DriverId(0), order, 20);

        let cancelled = book.cancel(&[order], &mut fleet).expect("cancel");
        assert_eq!(cancelled.len(), 1);
        let driver = fleet.get(DriverId(0)).expect("driver");
        assert_eq!(driver.status(), DriverStatus::Idle);
        assert!(driver.order().is_none());
        assert!(driver.trajectory().iter().all(|segment| !segment.refers_to(order)));
        assert_ne!(driver.open_segment().status, DriverStatus::Assigned(order));
        fleet.verify_pairing(&book).expect("paired");
    }
}
