//! Run configuration: day window, cadences, speeds and matching limits.
//!
//! Every field has a default so partial JSON files are accepted.

use std::path::Path;

use bevy_ecs::prelude::Resource;
use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};
use crate::rng::InitialIdle;
use crate::spatial::DEFAULT_PATH_CACHE_CAPACITY;

pub const SECONDS_PER_DAY: u64 = 86_400;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Resource)]
#[serde(default)]
pub struct SimConfig {
    /// Day of week, 1 (Monday) through 7 (Sunday).
    pub day_of_week: u8,
    /// First simulated second (inclusive).
    pub start_second: u64,
    /// Last simulated second (inclusive).
    pub end_second: u64,
    /// Wall-clock epoch of second zero; only used for timestamps handed to the agent.
    pub epoch_seconds: i64,
    /// Seed of the run's single RNG stream.
    pub seed: u64,
    /// Drivers placed on uniformly random cells before the first tick.
    pub initial_driver_count: usize,
    /// Lifetime of the initial drivers; `None` keeps them for the whole run.
    pub initial_driver_lifetime_secs: Option<u64>,
    /// Every driver comes online with `|N(mean, std)|` idle seconds.
    pub initial_idle_mean_secs: f64,
    pub initial_idle_std_secs: f64,
    pub dispatch_interval_secs: u64,
    pub reposition_interval_secs: u64,
    /// Maximum number of drivers offered to the agent per reposition cycle.
    pub reposition_batch_size: usize,
    /// Idle seconds before a driver may be offered for repositioning.
    pub min_idle_for_reposition_secs: u64,
    /// Pairs whose pickup distance exceeds this are never offered.
    pub max_pickup_distance_m: f64,
    pub pickup_speed_m_per_s: f64,
    pub trip_speed_m_per_s: f64,
    pub reposition_speed_m_per_s: f64,
    pub idle_speed_m_per_s: f64,
    /// Width of the pickup-distance bins of the cancellation model.
    pub cancel_bin_width_m: f64,
    /// Capacity of the on-demand shortest path memo.
    pub path_cache_capacity: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            day_of_week: 1,
            start_second: 1,
            end_second: SECONDS_PER_DAY,
            epoch_seconds: 0,
            seed: 42,
            initial_driver_count: 100,
            initial_driver_lifetime_secs: None,
            initial_idle_mean_secs: 300.0,
            initial_idle_std_secs: 200.0,
            dispatch_interval_secs: 2,
            reposition_interval_secs: 100,
            reposition_batch_size: 5,
            min_idle_for_reposition_secs: 300,
            max_pickup_distance_m: 2_000.0,
            pickup_speed_m_per_s: 8.3,
            trip_speed_m_per_s: 8.3,
            reposition_speed_m_per_s: 8.3,
            idle_speed_m_per_s: 4.0,
            cancel_bin_width_m: 200.0,
            path_cache_capacity: DEFAULT_PATH_CACHE_CAPACITY,
        }
    }
}

impl SimConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> SimResult<Self> {
        let file = std::fs::File::open(path)?;
        let config: Self = serde_json::from_reader(std::io::BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SimResult<()> {
        if !(1..=7).contains(&self.day_of_week) {
            return Err(SimError::Config(format!(
                "day_of_week must be within 1..=7, got {}",
                self.day_of_week
            )));
        }
        if self.start_second > self.end_second {
            return Err(SimError::Config(format!(
                "start_second {} is after end_second {}",
                self.start_second, self.end_second
            )));
        }
        if self.dispatch_interval_secs == 0 || self.reposition_interval_secs == 0 {
            return Err(SimError::Config("cycle intervals must be non-zero".into()));
        }
        for (name, value) in [
            ("pickup_speed_m_per_s", self.pickup_speed_m_per_s),
            ("trip_speed_m_per_s", self.trip_speed_m_per_s),
            ("reposition_speed_m_per_s", self.reposition_speed_m_per_s),
            ("idle_speed_m_per_s", self.idle_speed_m_per_s),
            ("cancel_bin_width_m", self.cancel_bin_width_m),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(SimError::Config(format!("{name} must be positive, got {value}")));
            }
        }
        if !self.initial_idle_mean_secs.is_finite()
            || !(self.initial_idle_std_secs.is_finite() && self.initial_idle_std_secs >= 0.0)
        {
            return Err(SimError::Config(format!(
                "initial idle time needs a finite mean and a non-negative deviation, got N({}, {})",
                self.initial_idle_mean_secs, self.initial_idle_std_secs
            )));
        }
        if self.max_pickup_distance_m.is_nan() || self.max_pickup_distance_m < 0.0 {
            return Err(SimError::Config(
                "max_pickup_distance_m must be non-negative".into(),
            ));
        }
        Ok(())
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_day_of_week(mut self, day_of_week: u8) -> Self {
        self.day_of_week = day_of_week;
        self
    }

    pub fn with_window(mut self, start_second: u64, end_second: u64) -> Self {
        self.start_second = start_second;
        self.end_second = end_second;
        self
    }

    pub fn with_initial_drivers(mut self, count: usize) -> Self {
        self.initial_driver_count = count;
        self
    }

    pub fn with_initial_idle(mut self, mean_secs: f64, std_secs: f64) -> Self {
        self.initial_idle_mean_secs = mean_secs;
        self.initial_idle_std_secs = std_secs;
        self
    }

    pub fn initial_idle(&self) -> InitialIdle {
        InitialIdle::new(self.initial_idle_mean_secs, self.initial_idle_std_secs)
    }

    pub fn with_max_pickup_distance(mut self, meters: f64) -> Self {
        self.max_pickup_distance_m = meters;
        self
    }

    pub fn is_dispatch_second(&self, second: u64) -> bool {
        second % self.dispatch_interval_secs == 0
    }

    pub fn is_reposition_second(&self, second: u64) -> bool {
        second % self.reposition_interval_secs == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        SimConfig::default().validate().expect("defaults validate");
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: SimConfig =
            serde_json::from_str(r#"{"day_of_week": 3, "seed": 7}"#).expect("parse");
        assert_eq!(config.day_of_week, 3);
        assert_eq!(config.seed, 7);
        assert_eq!(config.dispatch_interval_secs, 2);
        assert_eq!(config.reposition_batch_size, 5);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(SimConfig::default().with_day_of_week(0).validate().is_err());
        assert!(SimConfig::default().with_window(10, 5).validate().is_err());
        let mut config = SimConfig::default();
        config.idle_speed_m_per_s = 0.0;
        assert!(config.validate().is_err());
        let mut config = SimConfig::default();
        config.dispatch_interval_secs = 0;
        assert!(config.validate().is_err());
        assert!(SimConfig::default()
            .with_initial_idle(300.0, -1.0)
            .validate()
            .is_err());
        assert!(SimConfig::default()
            .with_initial_idle(f64::NAN, 200.0)
            .validate()
            .is_err());
    }

    #[test]
    fn initial_idle_defaults_and_overrides() {
        let config = SimConfig::default();
        assert_eq!(config.initial_idle(), InitialIdle::new(300.0, 200.0));
        let config: SimConfig = serde_json::from_str(
            r#"{"initial_idle_mean_secs": 60.0, "initial_idle_std_secs": 0.0}"#,
        )
        .expect("parse");
        assert_eq!(config.initial_idle(), InitialIdle::new(60.0, 0.0));
        config.validate().expect("zero deviation is valid");
    }

    #[test]
    fn cadence_helpers() {
        let config = SimConfig::default();
        assert!(config.is_dispatch_second(10));
        assert!(!config.is_dispatch_second(11));
        assert!(config.is_reposition_second(200));
        assert!(!config.is_reposition_second(250));
    }
}
