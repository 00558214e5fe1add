//! Stochastic and scoring models consulted by the tick loop.

pub mod cancellation;
pub mod idle_transition;
pub mod reward;

pub use cancellation::{
    CancellationModel, CancellationModelResource, ConstantCancellationModel,
    EmpiricalCancellationModel,
};
pub use idle_transition::{IdleTransition, IdleTransitionModel};
pub use reward::{ConstantRewardModel, LinearFareModel, RewardModel, RewardModelResource};
