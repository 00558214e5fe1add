//! Day plans: a configuration plus the data sources one simulated day needs.
//!
//! A plan is plain serde data so it can live in a JSON file next to the
//! tables it points at. [DayPlan::build_environment] turns it into a ready
//! [Environment].

use std::path::{Path, PathBuf};

use fleet_core::arrivals::{ArrivalSchedule, PoissonDriverGenerator, PoissonOrderGenerator};
use fleet_core::config::SimConfig;
use fleet_core::geo::parse_cell;
use fleet_core::matching::DispatchAgent;
use fleet_core::models::{
    ConstantCancellationModel, EmpiricalCancellationModel, IdleTransitionModel, LinearFareModel,
};
use fleet_core::spatial::{MapDefinition, SpatialMap};
use fleet_core::telemetry::TelemetrySink;
use fleet_core::{Environment, SimResult};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MapSource {
    /// Hexagonal disk of `radius` rings around a hex H3 cell id.
    Disk { center: String, radius: u32 },
    /// JSON map definition with explicit cells and weighted edges.
    Definition { path: PathBuf },
}

impl Default for MapSource {
    fn default() -> Self {
        Self::Disk {
            center: "8a1fb46622dffff".into(),
            radius: 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DemandSource {
    /// Flat hourly rates with uniform cells.
    Uniform {
        orders_per_hour: f64,
        drivers_per_hour: f64,
        mean_driver_lifetime_min: f64,
    },
    /// Hourly rate and weight tables, sampled for the plan's weekday.
    Tables {
        order_rates: PathBuf,
        od_weights: PathBuf,
        driver_rates: PathBuf,
        spawn_weights: PathBuf,
    },
    /// Explicit arrival lists.
    Files { orders: PathBuf, drivers: PathBuf },
}

impl Default for DemandSource {
    fn default() -> Self {
        Self::Uniform {
            orders_per_hour: 600.0,
            drivers_per_hour: 30.0,
            mean_driver_lifetime_min: 240.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CancellationSource {
    Constant { probability: f64 },
    /// Directory holding `cancel_probs_day{d}.csv` files.
    Weekday { dir: PathBuf },
}

impl Default for CancellationSource {
    fn default() -> Self {
        Self::Constant { probability: 0.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DayPlan {
    pub name: String,
    pub config: SimConfig,
    pub map: MapSource,
    pub demand: DemandSource,
    pub cancellation: CancellationSource,
    /// `cell,hour,destination,self_probability` table.
    pub idle_transitions: Option<PathBuf>,
    /// Serialized precomputed shortest paths.
    pub path_table: Option<PathBuf>,
}

impl DayPlan {
    pub fn new(name: impl Into<String>, config: SimConfig) -> Self {
        Self {
            name: name.into(),
            config,
            ..Self::default()
        }
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> SimResult<Self> {
        let file = std::fs::File::open(path)?;
        let plan: Self = serde_json::from_reader(std::io::BufReader::new(file))?;
        plan.config.validate()?;
        Ok(plan)
    }

    /// The same plan for each weekday in `days`, each with its own seed.
    pub fn for_days(&self, days: impl IntoIterator<Item = u8>) -> Vec<DayPlan> {
        days.into_iter()
            .map(|day| {
                let mut plan = self.clone();
                plan.name = format!("{}-day{day}", self.name);
                plan.config = plan
                    .config
                    .with_day_of_week(day)
                    .with_seed(self.config.seed.wrapping_add(u64::from(day)));
                plan
            })
            .collect()
    }

    /// Independent replicas of this plan with consecutive seeds.
    pub fn replicas(&self, count: usize) -> Vec<DayPlan> {
        (0..count)
            .map(|index| {
                let mut plan = self.clone();
                plan.name = format!("{}-r{index}", self.name);
                plan.config = plan
                    .config
                    .with_seed(self.config.seed.wrapping_add(index as u64));
                plan
            })
            .collect()
    }

    pub fn load_map(&self) -> SimResult<SpatialMap> {
        let map = match &self.map {
            MapSource::Disk { center, radius } => {
                let center = parse_cell(center)?;
                SpatialMap::from_cells(center.grid_disk::<Vec<_>>(*radius))?
            }
            MapSource::Definition { path } => {
                SpatialMap::from_definition(MapDefinition::from_json_file(path)?)?
            }
        };
        self.attach_path_table(map)
    }

    #[cfg(feature = "precomputed")]
    fn attach_path_table(&self, map: SpatialMap) -> SimResult<SpatialMap> {
        use fleet_core::spatial::RoutePathCache;

        let Some(path) = &self.path_table else {
            return Ok(map);
        };
        let cache =
            RoutePathCache::with_capacity(self.config.path_cache_capacity).load_bincode(path)?;
        Ok(map.with_path_cache(cache))
    }

    #[cfg(not(feature = "precomputed"))]
    fn attach_path_table(&self, map: SpatialMap) -> SimResult<SpatialMap> {
        if self.path_table.is_some() {
            return Err(fleet_core::SimError::Config(
                "path_table requires the `precomputed` feature".into(),
            ));
        }
        Ok(map)
    }

    /// Arrivals for the plan's weekday. Generated demand draws from a stream
    /// seeded separately from the simulation RNG.
    pub fn load_arrivals(&self, map: &SpatialMap) -> SimResult<ArrivalSchedule> {
        let day = self.config.day_of_week;
        let mut rng = StdRng::seed_from_u64(self.config.seed ^ 0x5eed_da7a);
        let cells = map.cells().to_vec();
        match &self.demand {
            DemandSource::Uniform {
                orders_per_hour,
                drivers_per_hour,
                mean_driver_lifetime_min,
            } => {
                let mut schedule = PoissonOrderGenerator::uniform(cells.clone(), *orders_per_hour)?
                    .generate(day, &mut rng);
                schedule.merge(
                    PoissonDriverGenerator::uniform(
                        cells,
                        *drivers_per_hour,
                        *mean_driver_lifetime_min,
                    )?
                    .generate(day, &mut rng),
                );
                Ok(schedule)
            }
            DemandSource::Tables {
                order_rates,
                od_weights,
                driver_rates,
                spawn_weights,
            } => {
                let mut schedule = PoissonOrderGenerator::from_csv(order_rates, od_weights)?
                    .generate(day, &mut rng);
                schedule.merge(
                    PoissonDriverGenerator::from_csv(driver_rates, spawn_weights, cells)?
                        .generate(day, &mut rng),
                );
                Ok(schedule)
            }
            DemandSource::Files { orders, drivers } => {
                let mut schedule = ArrivalSchedule::default();
                schedule.load_orders_csv(orders)?;
                schedule.load_drivers_csv(drivers)?;
                Ok(schedule)
            }
        }
    }

    pub fn load_idle_model(&self) -> SimResult<IdleTransitionModel> {
        match &self.idle_transitions {
            Some(path) => IdleTransitionModel::from_csv(path),
            None => Ok(IdleTransitionModel::default()),
        }
    }

    /// Builds the environment for this plan with the given agent and sink.
    pub fn build_environment(
        &self,
        agent: Box<dyn DispatchAgent>,
        sink: impl TelemetrySink + 'static,
    ) -> SimResult<Environment> {
        let map = self.load_map()?;
        let arrivals = self.load_arrivals(&map)?;
        let idle_model = self.load_idle_model()?;
        log::info!(
            "plan {}: {} cells, {} orders and {} drivers scheduled",
            self.name,
            map.cells().len(),
            arrivals.order_count(),
            arrivals.driver_count()
        );

        let builder = Environment::builder(self.config.clone(), map)
            .boxed_agent(agent)
            .reward_model(LinearFareModel::default())
            .idle_model(idle_model)
            .arrivals(arrivals)
            .sink(sink);
        let builder = match &self.cancellation {
            CancellationSource::Constant { probability } => {
                builder.cancellation_model(ConstantCancellationModel::new(*probability)?)
            }
            CancellationSource::Weekday { dir } => builder.cancellation_model(
                EmpiricalCancellationModel::for_weekday(dir, self.config.day_of_week)?,
            ),
        };
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::matching::BaselineAgent;
    use fleet_core::telemetry::NullSink;

    #[test]
    fn partial_json_uses_defaults() {
        let plan: DayPlan = serde_json::from_str(
            r#"{"name": "tiny", "config": {"end_second": 60, "initial_driver_count": 5},
                "map": {"kind": "disk", "center": "8a1fb46622dffff", "radius": 2}}"#,
        )
        .expect("plan");
        assert_eq!(plan.config.end_second, 60);
        assert_eq!(plan.config.dispatch_interval_secs, 2);
        assert_eq!(plan.demand, DemandSource::default());
        assert_eq!(
            plan.map,
            MapSource::Disk {
                center: "8a1fb46622dffff".into(),
                radius: 2
            }
        );
    }

    #[test]
    fn for_days_varies_weekday_and_seed() {
        let plan = DayPlan::new("week", SimConfig::default());
        let days = plan.for_days(1..=7);
        assert_eq!(days.len(), 7);
        assert_eq!(days[3].config.day_of_week, 4);
        assert_ne!(days[0].config.seed, days[1].config.seed);
    }

    #[test]
    fn plan_builds_an_environment() {
        let mut plan = DayPlan::new("small", SimConfig::default().with_window(1, 30));
        plan.map = MapSource::Disk {
            center: "8a1fb46622dffff".into(),
            radius: 2,
        };
        let env = plan
            .build_environment(Box::new(BaselineAgent::default()), NullSink)
            .expect("environment");
        assert_eq!(env.fleet().len(), plan.config.initial_driver_count);
    }

    #[test]
    fn unknown_map_center_is_rejected() {
        let mut plan = DayPlan::new("broken", SimConfig::default());
        plan.map = MapSource::Disk {
            center: "not-a-cell".into(),
            radius: 1,
        };
        assert!(plan.load_map().is_err());
    }
}
