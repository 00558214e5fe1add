//! Driver entity: status, position, route and episode segments.

use std::fmt;

use h3o::CellIndex;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};
use crate::geo::LonLat;
use crate::ids::{DriverId, OrderId};
use crate::spatial::{Route, SpatialMap};
use crate::trajectory::{OpenSegment, TrajectorySegment};

/// A driver either waits, drives towards a reposition target, or serves
/// exactly one order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "status", content = "order_id", rename_all = "snake_case")]
pub enum DriverStatus {
    Idle,
    Reposition,
    Assigned(OrderId),
}

impl DriverStatus {
    pub fn order(&self) -> Option<OrderId> {
        match self {
            DriverStatus::Assigned(order) => Some(*order),
            _ => None,
        }
    }

    pub fn is_assigned(&self) -> bool {
        matches!(self, DriverStatus::Assigned(_))
    }

    pub fn kind(&self) -> StatusKind {
        match self {
            DriverStatus::Idle => StatusKind::Idle,
            DriverStatus::Reposition => StatusKind::Reposition,
            DriverStatus::Assigned(_) => StatusKind::Assigned,
        }
    }
}

impl fmt::Display for DriverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverStatus::Idle => f.write_str("idle"),
            DriverStatus::Reposition => f.write_str("reposition"),
            DriverStatus::Assigned(order) => write!(f, "assigned_{}", order.raw()),
        }
    }
}

/// Status without the bound order, for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusKind {
    Idle,
    Reposition,
    Assigned,
}

#[derive(Debug, Clone)]
pub struct Driver {
    id: DriverId,
    status: DriverStatus,
    cell: CellIndex,
    location: LonLat,
    idle_time: u64,
    route: Route,
    reward: f64,
    birth: u64,
    deadline: Option<u64>,
    trajectory: Vec<TrajectorySegment>,
    open: OpenSegment,
}

/// What is left of a driver once it leaves the fleet.
#[derive(Debug, Clone)]
pub struct RetiredDriver {
    pub id: DriverId,
    pub reward: f64,
    pub trajectory: Vec<TrajectorySegment>,
}

impl Driver {
    pub(crate) fn new(
        id: DriverId,
        cell: CellIndex,
        location: LonLat,
        now: u64,
        lifetime_secs: Option<u64>,
        idle_time: u64,
    ) -> Self {
        Self {
            id,
            status: DriverStatus::Idle,
            cell,
            location,
            idle_time,
            route: Route::default(),
            reward: 0.0,
            birth: now,
            deadline: lifetime_secs.map(|lifetime| now.saturating_add(lifetime)),
            trajectory: Vec::new(),
            open: OpenSegment {
                start_time: now,
                status: DriverStatus::Idle,
                cell,
                location,
            },
        }
    }

    pub fn id(&self) -> DriverId {
        self.id
    }

    pub fn status(&self) -> DriverStatus {
        self.status
    }

    pub fn order(&self) -> Option<OrderId> {
        self.status.order()
    }

    pub fn cell(&self) -> CellIndex {
        self.cell
    }

    pub fn location(&self) -> LonLat {
        self.location
    }

    pub fn idle_time(&self) -> u64 {
        self.idle_time
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn reward(&self) -> f64 {
        self.reward
    }

    pub fn birth(&self) -> u64 {
        self.birth
    }

    pub fn deadline(&self) -> Option<u64> {
        self.deadline
    }

    /// Closed segments so far.
    pub fn trajectory(&self) -> &[TrajectorySegment] {
        &self.trajectory
    }

    pub fn open_segment(&self) -> &OpenSegment {
        &self.open
    }

    pub fn is_dispatchable(&self) -> bool {
        !self.status.is_assigned()
    }

    /// Idle past the deadline. Assigned and repositioning drivers never expire.
    pub fn is_expired(&self, now: u64) -> bool {
        self.status == DriverStatus::Idle && self.deadline.is_some_and(|deadline| deadline <= now)
    }

    fn snapshot(&self, now: u64, status: DriverStatus) -> OpenSegment {
        OpenSegment {
            start_time: now,
            status,
            cell: self.cell,
            location: self.location,
        }
    }

    /// Closes the open segment at `now` and starts the next one in `next`.
    fn transition(&mut self, now: u64, next: DriverStatus, reward: f64) {
        let end = self.snapshot(now, next);
        let closed = self.open.close(self.id, end, reward, false);
        self.trajectory.push(closed);
        self.open = end;
        self.status = next;
    }

    pub(crate) fn take_order(&mut self, order: OrderId, now: u64) -> SimResult<()> {
        if let DriverStatus::Assigned(current) = self.status {
            return Err(SimError::DriverAlreadyAssigned {
                driver: self.id,
                current,
                requested: order,
            });
        }
        self.route.clear();
        self.idle_time = 0;
        self.transition(now, DriverStatus::Assigned(order), 0.0);
        Ok(())
    }

    /// Drops the assignment without a reward; the driver is idle again and
    /// no segment keeps the order.
    ///
    /// An idle span that ended in the assignment is reopened. A reposition
    /// span is kept but now ends idle at the assignment time, where a new
    /// idle span starts.
    pub(crate) fn release(&mut self, order: OrderId) -> SimResult<()> {
        if self.status != DriverStatus::Assigned(order) {
            return Err(SimError::OrderNotBound {
                order,
                driver: self.id,
            });
        }
        let ended_in_assignment = self
            .trajectory
            .last()
            .is_some_and(|segment| segment.end_status == DriverStatus::Assigned(order));
        let before = if ended_in_assignment {
            self.trajectory.pop()
        } else {
            None
        };
        self.open = match before {
            Some(segment) if segment.start_status == DriverStatus::Idle => {
                OpenSegment::reopen(&segment)
            }
            Some(mut segment) => {
                segment.end_status = DriverStatus::Idle;
                let idle = OpenSegment::idle_from_end(&segment);
                self.trajectory.push(segment);
                idle
            }
            None => OpenSegment {
                status: DriverStatus::Idle,
                ..self.open
            },
        };
        self.status = DriverStatus::Idle;
        Ok(())
    }

    pub(crate) fn complete_order(
        &mut self,
        order: OrderId,
        now: u64,
        finish_cell: CellIndex,
        finish_location: LonLat,
        reward: f64,
    ) -> SimResult<()> {
        if self.status != DriverStatus::Assigned(order) {
            return Err(SimError::OrderNotBound {
                order,
                driver: self.id,
            });
        }
        self.cell = finish_cell;
        self.location = finish_location;
        self.reward += reward;
        self.idle_time = 0;
        self.transition(now, DriverStatus::Idle, reward);
        Ok(())
    }

    pub(crate) fn begin_reposition(&mut self, route: Route, now: u64) {
        self.route = route;
        self.idle_time = 0;
        self.transition(now, DriverStatus::Reposition, 0.0);
    }

    /// Starts an idle transit; the status stays idle but the idle span
    /// before the move is recorded as its own segment.
    pub(crate) fn begin_idle_transit(&mut self, route: Route, now: u64) {
        self.route = route;
        self.transition(now, DriverStatus::Idle, 0.0);
    }

    /// One second of movement for a driver that is not serving an order.
    pub(crate) fn advance<R: Rng + ?Sized>(
        &mut self,
        now: u64,
        map: &SpatialMap,
        rng: &mut R,
    ) -> SimResult<()> {
        if let Some(cell) = self.route.pop_due(now) {
            if cell != self.cell {
                self.location = map.coordinate_for(cell, rng)?;
                self.cell = cell;
            }
        }
        match self.status {
            DriverStatus::Idle => self.idle_time += 1,
            DriverStatus::Reposition if self.route.is_empty() => {
                self.transition(now, DriverStatus::Idle, 0.0);
            }
            _ => {}
        }
        Ok(())
    }

    /// Closes the open segment as terminal and hands back the trajectory.
    /// Closed segments plus the open one cut at `now`, for a driver still
    /// online when the run stops.
    pub(crate) fn survivor_trajectory(&self, now: u64) -> Vec<TrajectorySegment> {
        let mut segments = self.trajectory.clone();
        let end = self.snapshot(now, self.status);
        segments.push(self.open.close(self.id, end, 0.0, false));
        segments
    }

    pub(crate) fn retire(mut self, now: u64) -> RetiredDriver {
        let end = self.snapshot(now, self.status);
        let closed = self.open.close(self.id, end, 0.0, true);
        self.trajectory.push(closed);
        RetiredDriver {
            id: self.id,
            reward: self.reward,
            trajectory: self.trajectory,
        }
    }
}
