//! Driver episode segments.
//!
//! A live driver always has exactly one open segment. Every status change
//! closes it and opens the next one, so the closed segments of a driver tile
//! its life from spawn to retirement.

use h3o::CellIndex;
use serde::Serialize;

use crate::driver::DriverStatus;
use crate::geo::{cell_hex, LonLat};
use crate::ids::{DriverId, OrderId};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrajectorySegment {
    pub driver_id: DriverId,
    pub start_time: u64,
    pub start_status: DriverStatus,
    #[serde(with = "cell_hex")]
    pub start_cell: CellIndex,
    pub start_location: LonLat,
    pub end_time: u64,
    pub end_status: DriverStatus,
    #[serde(with = "cell_hex")]
    pub end_cell: CellIndex,
    pub end_location: LonLat,
    pub reward: f64,
    /// Set only on the segment closed by the driver's retirement.
    pub done: bool,
}

impl TrajectorySegment {
    pub fn refers_to(&self, order: OrderId) -> bool {
        self.start_status.order() == Some(order) || self.end_status.order() == Some(order)
    }

    pub fn duration_secs(&self) -> u64 {
        self.end_time.saturating_sub(self.start_time)
    }
}

/// Start half of the segment currently being accumulated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpenSegment {
    pub start_time: u64,
    pub status: DriverStatus,
    pub cell: CellIndex,
    pub location: LonLat,
}

impl OpenSegment {
    pub(crate) fn close(
        self,
        driver_id: DriverId,
        end: OpenSegment,
        reward: f64,
        done: bool,
    ) -> TrajectorySegment {
        TrajectorySegment {
            driver_id,
            start_time: self.start_time,
            start_status: self.status,
            start_cell: self.cell,
            start_location: self.location,
            end_time: end.start_time,
            end_status: end.status,
            end_cell: end.cell,
            end_location: end.location,
            reward,
            done,
        }
    }

    /// An idle segment starting where `segment` ended.
    pub(crate) fn idle_from_end(segment: &TrajectorySegment) -> Self {
        Self {
            start_time: segment.end_time,
            status: DriverStatus::Idle,
            cell: segment.end_cell,
            location: segment.end_location,
        }
    }

    pub(crate) fn reopen(segment: &TrajectorySegment) -> Self {
        Self {
            start_time: segment.start_time,
            status: segment.start_status,
            cell: segment.start_cell,
            location: segment.start_location,
        }
    }
}
