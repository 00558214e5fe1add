//! Orders and the book that owns them.
//!
//! Orders live for at most one dispatch cycle while unassigned: anything the
//! cycle leaves unmatched is dropped. Assigned orders leave the book when the
//! trip completes or the rider cancels.

use std::collections::BTreeMap;

use bevy_ecs::prelude::Resource;
use h3o::CellIndex;
use rand::Rng;

use crate::arrivals::OrderArrival;
use crate::error::{SimError, SimResult};
use crate::fleet::DriverFleet;
use crate::geo::LonLat;
use crate::ids::{DriverId, IdAllocator, OrderId};
use crate::spatial::SpatialMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderStatus {
    Unassigned,
    Assigned,
}

/// Binding of an order to the driver serving it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderAssignment {
    pub driver: DriverId,
    pub reward: f64,
    pub pick_up_eta: f64,
    pub order_driver_distance: f64,
    /// Simulated second the trip ends.
    pub finish_second: u64,
    pub assigned_at: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: OrderId,
    pub start_cell: CellIndex,
    pub finish_cell: CellIndex,
    pub start_location: LonLat,
    pub finish_location: LonLat,
    pub created_at: u64,
    assignment: Option<OrderAssignment>,
}

impl Order {
    pub fn status(&self) -> OrderStatus {
        if self.assignment.is_some() {
            OrderStatus::Assigned
        } else {
            OrderStatus::Unassigned
        }
    }

    pub fn assignment(&self) -> Option<&OrderAssignment> {
        self.assignment.as_ref()
    }

    pub fn driver(&self) -> Option<DriverId> {
        self.assignment.map(|assignment| assignment.driver)
    }

    pub fn reward(&self) -> f64 {
        self.assignment.map_or(0.0, |assignment| assignment.reward)
    }
}

#[derive(Debug, Default, Resource)]
pub struct OrderBook {
    orders: BTreeMap<OrderId, Order>,
    ids: IdAllocator,
}

impl OrderBook {
    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn get(&self, id: OrderId) -> Option<&Order> {
        self.orders.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Order> {
        self.orders.values()
    }

    pub fn by_status(&self, status: OrderStatus) -> impl Iterator<Item = &Order> {
        self.orders
            .values()
            .filter(move |order| order.status() == status)
    }

    /// Admits new unassigned orders with endpoints sampled inside their cells.
    pub fn admit<R: Rng + ?Sized>(
        &mut self,
        arrivals: &[OrderArrival],
        map: &SpatialMap,
        now: u64,
        rng: &mut R,
    ) -> SimResult<Vec<OrderId>> {
        let mut admitted = Vec::with_capacity(arrivals.len());
        for arrival in arrivals {
            let start_location = map.coordinate_for(arrival.start_cell, rng)?;
            let finish_location = map.coordinate_for(arrival.finish_cell, rng)?;
            let id = OrderId(self.ids.next_raw());
            self.orders.insert(
                id,
                Order {
                    id,
                    start_cell: arrival.start_cell,
                    finish_cell: arrival.finish_cell,
                    start_location,
                    finish_location,
                    created_at: now,
                    assignment: None,
                },
            );
            admitted.push(id);
        }
        Ok(admitted)
    }

    pub(crate) fn assign(&mut self, id: OrderId, assignment: OrderAssignment) -> SimResult<()> {
        let order = self.orders.get_mut(&id).ok_or(SimError::UnknownOrder(id))?;
        if order.assignment.is_some() {
            return Err(SimError::OrderAlreadyAssigned(id));
        }
        order.assignment = Some(assignment);
        Ok(())
    }

    /// Removes a finished order. The driver side is handled by the fleet.
    pub fn complete(&mut self, id: OrderId) -> SimResult<Order> {
        self.orders.remove(&id).ok_or(SimError::UnknownOrder(id))
    }

    /// Removes the orders and releases their drivers back to idle.
    pub fn cancel(&mut self, ids: &[OrderId], fleet: &mut DriverFleet) -> SimResult<Vec<Order>> {
        let mut cancelled = Vec::with_capacity(ids.len());
        for id in ids {
            let order = self.orders.remove(id).ok_or(SimError::UnknownOrder(*id))?;
            if let Some(driver) = order.driver() {
                fleet.release(driver, *id)?;
            }
            cancelled.push(order);
        }
        Ok(cancelled)
    }

    /// Drops every order still waiting for a driver.
    pub fn expire_unmatched(&mut self) -> Vec<Order> {
        let expired: Vec<OrderId> = self
            .by_status(OrderStatus::Unassigned)
            .map(|order| order.id)
            .collect();
        expired
            .into_iter()
            .filter_map(|id| self.orders.remove(&id))
            .collect()
    }
}
