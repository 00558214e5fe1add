//! Batch scoring of candidate (order, driver) pairs.

use std::ops::Deref;

use bevy_ecs::prelude::Resource;

use crate::error::{SimError, SimResult};
use crate::matching::PairRequest;

/// Scores pairs; the output must match the input in length and order.
pub trait RewardModel: Send + Sync {
    fn predict_batch(&self, pairs: &[PairRequest]) -> Vec<f64>;

    fn name(&self) -> &str {
        "reward_model"
    }
}

/// Same score for every pair.
#[derive(Debug, Clone, Copy)]
pub struct ConstantRewardModel(pub f64);

impl RewardModel for ConstantRewardModel {
    fn predict_batch(&self, pairs: &[PairRequest]) -> Vec<f64> {
        vec![self.0; pairs.len()]
    }

    fn name(&self) -> &str {
        "constant"
    }
}

/// Fare-like score: base fare plus a per-kilometre trip component, minus a
/// penalty per kilometre of empty pickup driving.
#[derive(Debug, Clone, Copy)]
pub struct LinearFareModel {
    pub base_fare: f64,
    pub per_trip_km: f64,
    pub per_pickup_km: f64,
}

impl Default for LinearFareModel {
    fn default() -> Self {
        Self {
            base_fare: 2.5,
            per_trip_km: 1.2,
            per_pickup_km: 0.3,
        }
    }
}

impl RewardModel for LinearFareModel {
    fn predict_batch(&self, pairs: &[PairRequest]) -> Vec<f64> {
        pairs
            .iter()
            .map(|pair| {
                self.base_fare + self.per_trip_km * pair.trip_distance / 1_000.0
                    - self.per_pickup_km * pair.order_driver_distance / 1_000.0
            })
            .collect()
    }

    fn name(&self) -> &str {
        "linear_fare"
    }
}

#[derive(Resource)]
pub struct RewardModelResource(pub Box<dyn RewardModel>);

impl RewardModelResource {
    pub fn new(model: impl RewardModel + 'static) -> Self {
        Self(Box::new(model))
    }

    /// Scores `pairs` in place.
    pub fn score(&self, pairs: &mut [PairRequest]) -> SimResult<()> {
        if pairs.is_empty() {
            return Ok(());
        }
        let scores = self.0.predict_batch(pairs);
        if scores.len() != pairs.len() {
            return Err(SimError::RewardBatchMismatch {
                expected: pairs.len(),
                got: scores.len(),
            });
        }
        for (pair, score) in pairs.iter_mut().zip(scores) {
            pair.reward_units = score;
        }
        Ok(())
    }
}

impl Deref for RewardModelResource {
    type Target = dyn RewardModel;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::sample_pair;

    struct Truncating;

    impl RewardModel for Truncating {
        fn predict_batch(&self, _pairs: &[PairRequest]) -> Vec<f64> {
            vec![1.0]
        }
    }

    #[test]
    fn linear_fare_grows_with_trip_and_shrinks_with_pickup() {
        let model = LinearFareModel::default();
        let mut short = sample_pair(0, 0);
        short.trip_distance = 1_000.0;
        let mut long = short.clone();
        long.trip_distance = 5_000.0;
        let mut far_pickup = short.clone();
        far_pickup.order_driver_distance += 1_000.0;
        let scores = model.predict_batch(&[short, long, far_pickup]);
        assert!(scores[1] > scores[0]);
        assert!(scores[2] < scores[0]);
    }

    #[test]
    fn score_rejects_length_mismatch() {
        let resource = RewardModelResource::new(Truncating);
        let mut pairs = vec![sample_pair(0, 0), sample_pair(1, 1)];
        assert!(matches!(
            resource.score(&mut pairs),
            Err(SimError::RewardBatchMismatch { expected: 2, got: 1 })
        ));
    }

    #[test]
    fn score_writes_reward_units() {
        let resource = RewardModelResource::new(ConstantRewardModel(4.5));
        let mut pairs = vec![sample_pair(0, 0), sample_pair(1, 1)];
        resource.score(&mut pairs).expect("scored");
        assert!(pairs.iter().all(|pair| pair.reward_units == 4.5));
    }
}
