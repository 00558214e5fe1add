//! Error type shared by every part of the simulator.
//!
//! Data and configuration problems surface at load time. Lookups that find
//! nothing during a tick are internal consistency failures and abort the
//! remaining phases of that tick.

use h3o::CellIndex;
use thiserror::Error;

use crate::ids::{DriverId, OrderId};

#[derive(Debug, Error)]
pub enum SimError {
    #[error("cell {0} is not part of the map")]
    UnknownCell(CellIndex),

    #[error("invalid cell id `{0}`")]
    InvalidCell(String),

    #[error("no path between {from} and {to}")]
    NoPath { from: CellIndex, to: CellIndex },

    #[error("{0} not found")]
    UnknownDriver(DriverId),

    #[error("{0} not found")]
    UnknownOrder(OrderId),

    #[error("{driver} is already assigned to {current}, cannot take {requested}")]
    DriverAlreadyAssigned {
        driver: DriverId,
        current: OrderId,
        requested: OrderId,
    },

    #[error("{0} is already assigned")]
    OrderAlreadyAssigned(OrderId),

    #[error("{order} is not bound to {driver}")]
    OrderNotBound { order: OrderId, driver: DriverId },

    #[error("pairing violated: {0}")]
    Pairing(String),

    #[error("reward model returned {got} scores for {expected} pairs")]
    RewardBatchMismatch { expected: usize, got: usize },

    #[error("cancellation model returned {got} rows for {expected} orders")]
    CancellationBatchMismatch { expected: usize, got: usize },

    #[error("cancellation probability {0} is not a number")]
    InvalidProbability(f64),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("malformed table {table}: {reason}")]
    Table { table: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("weighted sampling error: {0}")]
    Weights(#[from] rand::distributions::WeightedError),

    #[cfg(feature = "precomputed")]
    #[error("route table decode error: {0}")]
    Bincode(#[from] bincode::Error),
}

pub type SimResult<T> = Result<T, SimError>;

impl SimError {
    pub(crate) fn table(table: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Table {
            table: table.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_ids() {
        let message = SimError::OrderAlreadyAssigned(OrderId(4)).to_string();
        assert_eq!(message, format!("{} is already assigned", OrderId(4)));
        let message = SimError::CancellationBatchMismatch {
            expected: 3,
            got: 1,
        }
        .to_string();
        assert_eq!(message, "cancellation model returned 1 rows for 3 orders");
    }
}
