use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, StringArray, UInt64Array, UInt8Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;

use crate::metrics::DayResult;

/// One row per day; `last_loss` is null for days without training.
pub(super) fn write_results<W: std::io::Write + Send>(
    results: &[DayResult],
    out: W,
) -> Result<(), Box<dyn std::error::Error>> {
    let batch = build_record_batch(results)?;
    let props = WriterProperties::builder().build();
    let mut writer = ArrowWriter::try_new(out, batch.schema(), Some(props))?;
    writer.write(&batch)?;
    writer.close()?;

    Ok(())
}

fn build_record_batch(results: &[DayResult]) -> Result<RecordBatch, arrow::error::ArrowError> {
    let schema = Arc::new(parquet_schema());
    RecordBatch::try_new(schema, build_arrays(results))
}

fn parquet_schema() -> Schema {
    Schema::new(vec![
        Field::new("plan", DataType::Utf8, false),
        Field::new("agent", DataType::Utf8, false),
        Field::new("day_of_week", DataType::UInt8, false),
        Field::new("seed", DataType::UInt64, false),
        Field::new("ticks", DataType::UInt64, false),
        Field::new("income_orders", DataType::UInt64, false),
        Field::new("assigned_orders", DataType::UInt64, false),
        Field::new("cancelled_orders", DataType::UInt64, false),
        Field::new("expired_orders", DataType::UInt64, false),
        Field::new("completed_orders", DataType::UInt64, false),
        Field::new("income_drivers", DataType::UInt64, false),
        Field::new("outcome_drivers", DataType::UInt64, false),
        Field::new("repositioned_drivers", DataType::UInt64, false),
        Field::new("answer_rate", DataType::Float64, false),
        Field::new("reward_earned", DataType::Float64, false),
        Field::new("reward_cancelled", DataType::Float64, false),
        Field::new("total_reward", DataType::Float64, false),
        Field::new("train_calls", DataType::UInt64, false),
        Field::new("last_loss", DataType::Float64, true),
    ])
}

fn counts(results: &[DayResult], read: fn(&DayResult) -> usize) -> ArrayRef {
    Arc::new(UInt64Array::from_iter_values(
        results.iter().map(|result| read(result) as u64),
    ))
}

fn amounts(results: &[DayResult], read: fn(&DayResult) -> f64) -> ArrayRef {
    Arc::new(Float64Array::from_iter_values(results.iter().map(read)))
}

fn build_arrays(results: &[DayResult]) -> Vec<ArrayRef> {
    vec![
        Arc::new(StringArray::from_iter_values(
            results.iter().map(|r| r.plan.as_str()),
        )),
        Arc::new(StringArray::from_iter_values(
            results.iter().map(|r| r.agent.as_str()),
        )),
        Arc::new(UInt8Array::from_iter_values(
            results.iter().map(|r| r.day_of_week),
        )),
        Arc::new(UInt64Array::from_iter_values(results.iter().map(|r| r.seed))),
        Arc::new(UInt64Array::from_iter_values(results.iter().map(|r| r.ticks))),
        counts(results, |r| r.income_orders),
        counts(results, |r| r.assigned_orders),
        counts(results, |r| r.cancelled_orders),
        counts(results, |r| r.expired_orders),
        counts(results, |r| r.completed_orders),
        counts(results, |r| r.income_drivers),
        counts(results, |r| r.outcome_drivers),
        counts(results, |r| r.repositioned_drivers),
        amounts(results, |r| r.answer_rate),
        amounts(results, |r| r.reward_earned),
        amounts(results, |r| r.reward_cancelled),
        amounts(results, |r| r.total_reward),
        counts(results, |r| r.train_calls),
        Arc::new(Float64Array::from(
            results.iter().map(|r| r.last_loss).collect::<Vec<_>>(),
        )),
    ]
}
