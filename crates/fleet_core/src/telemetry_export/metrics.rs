use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, UInt64Array, UInt8Array};

use crate::telemetry::MetricsFrame;

use super::utils::Columns;

/// One row per step.
pub fn write_metrics_parquet<P: AsRef<Path>>(
    path: P,
    frames: &[MetricsFrame],
) -> Result<(), Box<dyn Error>> {
    let count = |read: fn(&MetricsFrame) -> usize| -> ArrayRef {
        Arc::new(UInt64Array::from_iter_values(
            frames.iter().map(|frame| read(frame) as u64),
        ))
    };
    let amount = |read: fn(&MetricsFrame) -> f64| -> ArrayRef {
        Arc::new(Float64Array::from_iter_values(frames.iter().map(read)))
    };

    Columns::default()
        .required(
            "step",
            Arc::new(UInt64Array::from_iter_values(frames.iter().map(|f| f.step))),
        )
        .required(
            "day_of_week",
            Arc::new(UInt8Array::from_iter_values(
                frames.iter().map(|f| f.day_of_week),
            )),
        )
        .required("total_drivers", count(|f| f.total_drivers))
        .required("idle_drivers", count(|f| f.idle_drivers))
        .required("reposition_drivers", count(|f| f.reposition_drivers))
        .required("assigned_drivers", count(|f| f.assigned_drivers))
        .required("total_orders", count(|f| f.total_orders))
        .required("income_orders", count(|f| f.income_orders))
        .required("income_drivers", count(|f| f.income_drivers))
        .required("outcome_drivers", count(|f| f.outcome_drivers))
        .required("dispatch_candidates", count(|f| f.dispatch_candidates))
        .required("assigned_orders", count(|f| f.assigned_orders))
        .required("discarded_pairs", count(|f| f.discarded_pairs))
        .required("cancelled_orders", count(|f| f.cancelled_orders))
        .required("expired_orders", count(|f| f.expired_orders))
        .required("completed_orders", count(|f| f.completed_orders))
        .required("repositioned_drivers", count(|f| f.repositioned_drivers))
        .required("idle_moves", count(|f| f.idle_moves))
        .required("reward_earned", amount(|f| f.reward_earned))
        .required("reward_cancelled", amount(|f| f.reward_cancelled))
        .required("reward_completed", amount(|f| f.reward_completed))
        .required("total_reward", amount(|f| f.total_reward))
        .write_parquet(path)
}
