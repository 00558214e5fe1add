use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{BooleanArray, Float64Array, UInt64Array, UInt8Array};

use crate::driver::DriverStatus;
use crate::trajectory::TrajectorySegment;

use super::utils::{cell_to_u64, status_code, Columns};

/// One row per closed segment. Statuses are coded 0 idle, 1 reposition,
/// 2 assigned; the order id columns are null unless assigned.
pub fn write_segments_parquet<P: AsRef<Path>>(
    path: P,
    segments: &[TrajectorySegment],
) -> Result<(), Box<dyn Error>> {
    let ids = |read: fn(&TrajectorySegment) -> u64| {
        Arc::new(UInt64Array::from_iter_values(segments.iter().map(read)))
    };
    let coords = |read: fn(&TrajectorySegment) -> f64| {
        Arc::new(Float64Array::from_iter_values(segments.iter().map(read)))
    };
    let statuses = |read: fn(&TrajectorySegment) -> DriverStatus| {
        Arc::new(UInt8Array::from_iter_values(
            segments.iter().map(|s| status_code(read(s).kind())),
        ))
    };
    let orders = |read: fn(&TrajectorySegment) -> DriverStatus| {
        Arc::new(UInt64Array::from_iter(
            segments.iter().map(|s| read(s).order().map(|id| id.raw())),
        ))
    };

    Columns::default()
        .required("driver_id", ids(|s| s.driver_id.raw()))
        .required("start_time", ids(|s| s.start_time))
        .required("start_status", statuses(|s| s.start_status))
        .nullable("start_order_id", orders(|s| s.start_status))
        .required("start_cell", ids(|s| cell_to_u64(s.start_cell)))
        .required("start_lon", coords(|s| s.start_location.lon))
        .required("start_lat", coords(|s| s.start_location.lat))
        .required("end_time", ids(|s| s.end_time))
        .required("end_status", statuses(|s| s.end_status))
        .nullable("end_order_id", orders(|s| s.end_status))
        .required("end_cell", ids(|s| cell_to_u64(s.end_cell)))
        .required("end_lon", coords(|s| s.end_location.lon))
        .required("end_lat", coords(|s| s.end_location.lat))
        .required("reward", coords(|s| s.reward))
        .required(
            "done",
            Arc::new(BooleanArray::from_iter(
                segments.iter().map(|s| Some(s.done)),
            )),
        )
        .write_parquet(path)
}
