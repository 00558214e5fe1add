use h3o::CellIndex;
use serde::{Deserialize, Serialize};

use crate::geo::{cell_hex, LonLat};
use crate::ids::{DriverId, OrderId};

/// One feasible (order, driver) pair offered to the agent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairRequest {
    pub order_id: OrderId,
    pub driver_id: DriverId,
    /// Great-circle pickup distance in meters.
    pub order_driver_distance: f64,
    pub order_start_location: LonLat,
    pub order_finish_location: LonLat,
    pub driver_location: LonLat,
    #[serde(with = "cell_hex")]
    pub order_start_cell: CellIndex,
    #[serde(with = "cell_hex")]
    pub order_finish_cell: CellIndex,
    #[serde(with = "cell_hex")]
    pub driver_cell: CellIndex,
    pub timestamp: i64,
    pub order_finish_timestamp: i64,
    pub day_of_week: u8,
    pub reward_units: f64,
    /// Pickup time in seconds.
    pub pick_up_eta: f64,
    /// Shortest path length of the trip in meters.
    pub trip_distance: f64,
    /// Simulated second the trip would end.
    pub finish_second: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DispatchAssignment {
    pub order_id: OrderId,
    pub driver_id: DriverId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverInfo {
    pub driver_id: DriverId,
    #[serde(with = "cell_hex")]
    pub grid_id: CellIndex,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositionRequest {
    pub timestamp: i64,
    pub day_of_week: u8,
    pub driver_info: Vec<DriverInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositionAssignment {
    pub driver_id: DriverId,
    #[serde(with = "cell_hex")]
    pub destination: CellIndex,
}

/// Loss and value statistics reported by a learning agent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainStats {
    pub loss: f64,
    pub value_mean: f64,
    pub value_std: f64,
}
