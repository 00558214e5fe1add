use bevy_ecs::prelude::Resource;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// The single RNG stream of a run. Every stochastic phase draws from it in
/// tick order, so a seed reproduces the run exactly.
#[derive(Debug, Resource)]
pub struct SimRng(pub StdRng);

impl SimRng {
    pub fn seeded(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }
}

/// Idle seconds a driver already has when it comes online:
/// `|N(mean, std)|` truncated to whole seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InitialIdle {
    pub mean_secs: f64,
    pub std_secs: f64,
}

impl InitialIdle {
    pub fn new(mean_secs: f64, std_secs: f64) -> Self {
        Self {
            mean_secs,
            std_secs,
        }
    }

    /// A zero deviation draws nothing from `rng`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> u64 {
        if self.std_secs == 0.0 {
            return self.mean_secs.abs() as u64;
        }
        // Box-Muller; `1 - u` keeps the log argument in (0, 1].
        let u1 = 1.0 - rng.gen::<f64>();
        let u2 = rng.gen::<f64>();
        let z = (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos();
        (self.mean_secs + self.std_secs * z).abs() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_deviation_is_constant_and_draws_nothing() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut untouched = StdRng::seed_from_u64(3);
        assert_eq!(InitialIdle::new(0.0, 0.0).sample(&mut rng), 0);
        assert_eq!(InitialIdle::new(-45.5, 0.0).sample(&mut rng), 45);
        assert_eq!(rng.gen::<u64>(), untouched.gen::<u64>());
    }

    #[test]
    fn idle_draws_follow_the_folded_normal() {
        let mut rng = StdRng::seed_from_u64(11);
        let idle = InitialIdle::new(300.0, 200.0);
        let draws: Vec<u64> = (0..5_000).map(|_| idle.sample(&mut rng)).collect();
        let mean = draws.iter().sum::<u64>() as f64 / draws.len() as f64;
        // E|N(300, 200)| is about 309.
        assert!((280.0..340.0).contains(&mean), "mean {mean}");
        assert!(draws.iter().any(|secs| *secs > 600));
        assert!(draws.iter().any(|secs| *secs < 100));
    }
}
