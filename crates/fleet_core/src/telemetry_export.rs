//! Parquet export of recorded telemetry.

mod metrics;
mod segments;
mod utils;

pub use metrics::write_metrics_parquet;
pub use segments::write_segments_parquet;
