//! Shared fixtures for unit and integration tests.

use h3o::CellIndex;

use crate::geo::{cell_distance_m, LonLat};
use crate::ids::{DriverId, OrderId};
use crate::matching::PairRequest;
use crate::spatial::SpatialMap;

/// A resolution 10 cell in the San Francisco Bay Area.
pub const TEST_CELL: u64 = 0x8a1fb46622dffff;

/// # Panics
///
/// Panics if [TEST_CELL] is not a valid H3 index.
pub fn test_cell() -> CellIndex {
    CellIndex::try_from(TEST_CELL).expect("TEST_CELL should be a valid H3 cell")
}

/// A ring-1 neighbour of [test_cell].
pub fn test_neighbor_cell() -> CellIndex {
    test_cell()
        .grid_disk::<Vec<_>>(1)
        .into_iter()
        .find(|cell| *cell != test_cell())
        .expect("test cell should have neighbors")
}

/// A cell exactly two rings away from [test_cell].
pub fn test_distant_cell() -> CellIndex {
    let inner = test_cell().grid_disk::<Vec<_>>(1);
    test_cell()
        .grid_disk::<Vec<_>>(2)
        .into_iter()
        .find(|cell| !inner.contains(cell))
        .expect("test cell should have distant neighbors")
}

/// The hexagonal disk of radius `k` around [test_cell], with ring-1 adjacency.
pub fn test_map(k: u32) -> SpatialMap {
    SpatialMap::from_cells(test_cell().grid_disk::<Vec<_>>(k)).expect("test map")
}

/// An unscored pair from [test_cell] to [test_neighbor_cell] with the driver
/// waiting at the pickup cell's center.
pub fn sample_pair(order: u64, driver: u64) -> PairRequest {
    let start = test_cell();
    let finish = test_neighbor_cell();
    PairRequest {
        order_id: OrderId(order),
        driver_id: DriverId(driver),
        order_driver_distance: 0.0,
        order_start_location: LonLat::of_cell(start),
        order_finish_location: LonLat::of_cell(finish),
        driver_location: LonLat::of_cell(start),
        order_start_cell: start,
        order_finish_cell: finish,
        driver_cell: start,
        timestamp: 0,
        order_finish_timestamp: 0,
        day_of_week: 1,
        reward_units: 0.0,
        pick_up_eta: 0.0,
        trip_distance: cell_distance_m(start, finish),
        finish_second: 0,
    }
}
