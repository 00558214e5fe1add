//! Rider cancellation after assignment.
//!
//! A model yields probability vectors indexed by pickup-distance bin. Each
//! order assigned in the current cycle gets one vector and one Bernoulli trial
//! at the bin of its pickup distance.

use std::ops::Deref;
use std::path::Path;

use bevy_ecs::prelude::Resource;
use rand::rngs::StdRng;
use rand::Rng;

use crate::error::{SimError, SimResult};
use crate::ids::OrderId;

pub trait CancellationModel: Send + Sync {
    /// `n` probability vectors, one per order under test.
    fn sample(&self, n: usize, rng: &mut StdRng) -> Vec<Vec<f64>>;
}

/// Same probability for every distance.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstantCancellationModel {
    probability: f64,
}

impl ConstantCancellationModel {
    pub fn new(probability: f64) -> SimResult<Self> {
        if !(0.0..=1.0).contains(&probability) {
            return Err(SimError::table(
                "cancellation",
                format!("probability {probability} outside [0, 1]"),
            ));
        }
        Ok(Self { probability })
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }
}

impl CancellationModel for ConstantCancellationModel {
    fn sample(&self, n: usize, _rng: &mut StdRng) -> Vec<Vec<f64>> {
        vec![vec![self.probability]; n]
    }
}

/// Resamples rows of historical per-bin probabilities uniformly.
#[derive(Debug, Clone)]
pub struct EmpiricalCancellationModel {
    rows: Vec<Vec<f64>>,
}

impl EmpiricalCancellationModel {
    pub fn new(rows: Vec<Vec<f64>>) -> SimResult<Self> {
        if rows.is_empty() || rows.iter().any(Vec::is_empty) {
            return Err(SimError::table("cancellation", "needs at least one non-empty row"));
        }
        if let Some(bad) = rows
            .iter()
            .flatten()
            .find(|p| !(0.0..=1.0).contains(*p))
        {
            return Err(SimError::table(
                "cancellation",
                format!("probability {bad} outside [0, 1]"),
            ));
        }
        Ok(Self { rows })
    }

    /// Header row names the distance bins; every following row is one
    /// observed probability vector.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> SimResult<Self> {
        let mut reader = csv::Reader::from_path(path)?;
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let row = record
                .iter()
                .map(|field| {
                    field.trim().parse::<f64>().map_err(|_| {
                        SimError::table("cancellation", format!("not a number: `{field}`"))
                    })
                })
                .collect::<SimResult<Vec<f64>>>()?;
            rows.push(row);
        }
        Self::new(rows)
    }

    /// Loads `cancel_probs_day{day}.csv` from `dir`.
    pub fn for_weekday<P: AsRef<Path>>(dir: P, day_of_week: u8) -> SimResult<Self> {
        Self::from_csv(dir.as_ref().join(format!("cancel_probs_day{day_of_week}.csv")))
    }

    pub fn bins(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }
}

impl CancellationModel for EmpiricalCancellationModel {
    fn sample(&self, n: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
        (0..n)
            .map(|_| self.rows[rng.gen_range(0..self.rows.len())].clone())
            .collect()
    }
}

#[derive(Resource)]
pub struct CancellationModelResource(pub Box<dyn CancellationModel>);

impl CancellationModelResource {
    pub fn new(model: impl CancellationModel + 'static) -> Self {
        Self(Box::new(model))
    }
}

impl Deref for CancellationModelResource {
    type Target = dyn CancellationModel;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

/// Probability at the distance's bin, clamped to [0, 1]; distances past the
/// last bin use it. A NaN entry or a non-positive bin width is an error.
pub fn probability_at(row: &[f64], distance_m: f64, bin_width_m: f64) -> SimResult<f64> {
    if !(bin_width_m.is_finite() && bin_width_m > 0.0) {
        return Err(SimError::Config(format!(
            "cancel_bin_width_m must be positive, got {bin_width_m}"
        )));
    }
    let bin = (distance_m.max(0.0) / bin_width_m).floor() as usize;
    let probability = row.get(bin).or_else(|| row.last()).copied().unwrap_or(0.0);
    if probability.is_nan() {
        return Err(SimError::InvalidProbability(probability));
    }
    Ok(probability.clamp(0.0, 1.0))
}

/// Runs one trial per `(order, pickup distance)` and returns the cancelled ids.
/// The model must return exactly one row per order.
pub fn select_cancellations(
    assigned: &[(OrderId, f64)],
    model: &dyn CancellationModel,
    bin_width_m: f64,
    rng: &mut StdRng,
) -> SimResult<Vec<OrderId>> {
    if assigned.is_empty() {
        return Ok(Vec::new());
    }
    let rows = model.sample(assigned.len(), rng);
    if rows.len() != assigned.len() {
        return Err(SimError::CancellationBatchMismatch {
            expected: assigned.len(),
            got: rows.len(),
        });
    }
    let mut cancelled = Vec::new();
    for ((order, distance), row) in assigned.iter().zip(&rows) {
        let probability = probability_at(row, *distance, bin_width_m)?;
        if rng.gen_bool(probability) {
            cancelled.push(*order);
        }
    }
    Ok(cancelled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn assigned(n: u64) -> Vec<(OrderId, f64)> {
        (0..n).map(|i| (OrderId(i), 150.0 * i as f64)).collect()
    }

    #[test]
    fn certain_cancellation_cancels_everything() {
        let mut rng = StdRng::seed_from_u64(1);
        let model = ConstantCancellationModel::new(1.0).expect("model");
        let cancelled =
            select_cancellations(&assigned(20), &model, 200.0, &mut rng).expect("trials");
        assert_eq!(cancelled.len(), 20);
    }

    #[test]
    fn zero_probability_cancels_nothing() {
        let mut rng = StdRng::seed_from_u64(1);
        let model = ConstantCancellationModel::default();
        assert!(select_cancellations(&assigned(20), &model, 200.0, &mut rng)
            .expect("trials")
            .is_empty());
    }

    #[test]
    fn bins_beyond_the_row_use_the_last_bin() {
        let row = [0.1, 0.2, 0.9];
        assert_eq!(probability_at(&row, 0.0, 200.0).ok(), Some(0.1));
        assert_eq!(probability_at(&row, 399.0, 200.0).ok(), Some(0.2));
        assert_eq!(probability_at(&row, 10_000.0, 200.0).ok(), Some(0.9));
        assert_eq!(probability_at(&[], 10.0, 200.0).ok(), Some(0.0));
        assert_eq!(probability_at(&[1.7], 10.0, 200.0).ok(), Some(1.0));
    }

    #[test]
    fn zero_bin_width_is_rejected() {
        assert!(matches!(
            probability_at(&[0.5], 10.0, 0.0),
            Err(SimError::Config(_))
        ));
    }

    #[test]
    fn constant_model_rejects_out_of_range_probabilities() {
        assert!(ConstantCancellationModel::new(f64::NAN).is_err());
        assert!(ConstantCancellationModel::new(-0.1).is_err());
        assert!(ConstantCancellationModel::new(1.5).is_err());
        assert_eq!(ConstantCancellationModel::new(0.25).map(|m| m.probability()).ok(), Some(0.25));
    }

    struct Rows(Vec<Vec<f64>>);

    impl CancellationModel for Rows {
        fn sample(&self, _n: usize, _rng: &mut StdRng) -> Vec<Vec<f64>> {
            self.0.clone()
        }
    }

    #[test]
    fn nan_probability_is_an_error_not_a_panic() {
        let mut rng = StdRng::seed_from_u64(2);
        let model = Rows(vec![vec![f64::NAN]]);
        assert!(matches!(
            select_cancellations(&assigned(1), &model, 200.0, &mut rng),
            Err(SimError::InvalidProbability(_))
        ));
    }

    #[test]
    fn short_row_batches_are_rejected() {
        let mut rng = StdRng::seed_from_u64(2);
        let model = Rows(vec![vec![1.0]]);
        assert!(matches!(
            select_cancellations(&assigned(2), &model, 200.0, &mut rng),
            Err(SimError::CancellationBatchMismatch { expected: 2, got: 1 })
        ));
    }

    #[test]
    fn empirical_rows_load_and_validate() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("cancel_probs_day3.csv"),
            "0,200,400\n0.1,0.2,0.3\n0.0,0.5,1.0\n",
        )
        .expect("write");
        let model = EmpiricalCancellationModel::for_weekday(dir.path(), 3).expect("load");
        assert_eq!(model.bins(), 3);
        let mut rng = StdRng::seed_from_u64(4);
        let rows = model.sample(5, &mut rng);
        assert_eq!(rows.len(), 5);
        assert!(rows.iter().all(|row| row.len() == 3));

        assert!(EmpiricalCancellationModel::new(vec![vec![1.5]]).is_err());
        assert!(EmpiricalCancellationModel::new(Vec::new()).is_err());
    }
}
