//! The simulation environment: one simulated day over a bevy [World].
//!
//! [EnvironmentBuilder] validates the configuration and every table against
//! the map, seeds the run's RNG and places the initial drivers. The
//! environment then advances one second per [Environment::step].

use bevy_ecs::prelude::{Schedule, World};

use crate::arrivals::ArrivalSchedule;
use crate::clock::SimulationClock;
use crate::config::SimConfig;
use crate::error::SimResult;
use crate::fleet::DriverFleet;
use crate::matching::{AgentResource, BaselineAgent, DispatchAgent, TrainStats};
use crate::models::{
    CancellationModel, CancellationModelResource, ConstantCancellationModel, IdleTransitionModel,
    LinearFareModel, RewardModel, RewardModelResource,
};
use crate::orders::OrderBook;
use crate::rng::SimRng;
use crate::runner::{run_tick, simulation_schedule, TickFault};
use crate::spatial::{RoutePathCache, SpatialMap, DEFAULT_PATH_CACHE_CAPACITY};
use crate::systems::DispatchCycle;
use crate::telemetry::{NullSink, TelemetrySink, TelemetrySinkResource, TrajectoryCollector};

pub struct EnvironmentBuilder {
    config: SimConfig,
    map: SpatialMap,
    agent: AgentResource,
    reward_model: RewardModelResource,
    cancellation_model: CancellationModelResource,
    idle_model: IdleTransitionModel,
    arrivals: ArrivalSchedule,
    sink: TelemetrySinkResource,
}

impl EnvironmentBuilder {
    pub fn agent(mut self, agent: impl DispatchAgent + 'static) -> Self {
        self.agent = AgentResource::new(agent);
        self
    }

    pub fn boxed_agent(mut self, agent: Box<dyn DispatchAgent>) -> Self {
        self.agent = AgentResource(agent);
        self
    }

    pub fn reward_model(mut self, model: impl RewardModel + 'static) -> Self {
        self.reward_model = RewardModelResource::new(model);
        self
    }

    pub fn cancellation_model(mut self, model: impl CancellationModel + 'static) -> Self {
        self.cancellation_model = CancellationModelResource::new(model);
        self
    }

    pub fn idle_model(mut self, model: IdleTransitionModel) -> Self {
        self.idle_model = model;
        self
    }

    pub fn arrivals(mut self, arrivals: ArrivalSchedule) -> Self {
        self.arrivals = arrivals;
        self
    }

    pub fn sink(mut self, sink: impl TelemetrySink + 'static) -> Self {
        self.sink = TelemetrySinkResource::new(sink);
        self
    }

    pub fn build(self) -> SimResult<Environment> {
        let config = self.config;
        config.validate()?;
        let mut map = self.map;
        if map.path_cache().precomputed_len() == 0
            && config.path_cache_capacity != DEFAULT_PATH_CACHE_CAPACITY
        {
            map = map.with_path_cache(RoutePathCache::with_capacity(config.path_cache_capacity));
        }
        self.idle_model.validate(&map)?;
        self.arrivals.validate(&map)?;

        let mut rng = SimRng::seeded(config.seed);
        let mut fleet = DriverFleet::with_initial_idle(config.initial_idle());
        for _ in 0..config.initial_driver_count {
            let cell = map.random_cell(&mut rng.0);
            fleet.spawn(
                cell,
                config.initial_driver_lifetime_secs,
                &map,
                config.start_second,
                &mut rng.0,
            )?;
        }

        log::info!(
            "environment ready: day {} seconds {}..={}, {} cells, {} drivers, {} scheduled orders, agent {}",
            config.day_of_week,
            config.start_second,
            config.end_second,
            map.cells().len(),
            fleet.len(),
            self.arrivals.order_count(),
            self.agent.name()
        );

        let mut world = World::new();
        world.insert_resource(SimulationClock::new(config.day_of_week, config.epoch_seconds));
        world.insert_resource(map);
        world.insert_resource(fleet);
        world.insert_resource(OrderBook::default());
        world.insert_resource(rng);
        world.insert_resource(self.agent);
        world.insert_resource(self.reward_model);
        world.insert_resource(self.cancellation_model);
        world.insert_resource(self.idle_model);
        world.insert_resource(self.arrivals);
        world.insert_resource(self.sink);
        world.insert_resource(TrajectoryCollector::default());
        world.insert_resource(DispatchCycle::default());
        world.insert_resource(TickFault::default());
        let next_second = config.start_second;
        world.insert_resource(config);

        Ok(Environment {
            world,
            schedule: simulation_schedule(),
            next_second,
            survivors_flushed: false,
        })
    }
}

pub struct Environment {
    world: World,
    schedule: Schedule,
    next_second: u64,
    survivors_flushed: bool,
}

impl Environment {
    /// Starts a builder with the baseline agent, a linear fare model, no
    /// cancellations, no idle movement, no arrivals and a discarding sink.
    pub fn builder(config: SimConfig, map: SpatialMap) -> EnvironmentBuilder {
        EnvironmentBuilder {
            config,
            map,
            agent: AgentResource::new(BaselineAgent::default()),
            reward_model: RewardModelResource::new(LinearFareModel::default()),
            cancellation_model: CancellationModelResource::new(ConstantCancellationModel::default()),
            idle_model: IdleTransitionModel::default(),
            arrivals: ArrivalSchedule::default(),
            sink: TelemetrySinkResource::new(NullSink),
        }
    }

    /// Runs every phase for `second`. A failing phase skips the rest of the
    /// tick and its error is returned.
    pub fn step(&mut self, second: u64) -> SimResult<()> {
        run_tick(&mut self.world, &mut self.schedule, second)?;
        self.next_second = second + 1;
        Ok(())
    }

    /// Runs the remaining seconds of the window; returns how many ran.
    pub fn run(&mut self) -> SimResult<u64> {
        self.run_with_hook(|_, _| Ok(()))
    }

    /// Like [Environment::run], calling `hook` after every tick.
    pub fn run_with_hook<F>(&mut self, mut hook: F) -> SimResult<u64>
    where
        F: FnMut(&mut Environment, u64) -> SimResult<()>,
    {
        let mut ticks = 0;
        while !self.is_finished() {
            let second = self.next_second;
            self.step(second)?;
            hook(self, second)?;
            ticks += 1;
        }
        log::info!(
            "day {} finished after {ticks} ticks, total reward {:.2}",
            self.config().day_of_week,
            self.total_reward()
        );
        Ok(ticks)
    }

    /// Hands the trajectories of drivers still online to the sink, each cut
    /// at the last simulated second with `done` unset. Runs at most once;
    /// returns how many segments were handed over.
    pub fn flush_survivors(&mut self) -> usize {
        if self.survivors_flushed {
            return 0;
        }
        self.survivors_flushed = true;
        let now = self
            .next_second
            .saturating_sub(1)
            .max(self.config().start_second);
        let segments = self.fleet().survivor_segments(now);
        self.world
            .resource_mut::<TelemetrySinkResource>()
            .0
            .on_finish(&segments);
        log::debug!(
            "flushed {} segments of {} drivers still online",
            segments.len(),
            self.fleet().len()
        );
        segments.len()
    }

    pub fn is_finished(&self) -> bool {
        self.next_second > self.config().end_second
    }

    /// Next second [Environment::run] would simulate.
    pub fn next_second(&self) -> u64 {
        self.next_second
    }

    pub fn config(&self) -> &SimConfig {
        self.world.resource::<SimConfig>()
    }

    pub fn clock(&self) -> &SimulationClock {
        self.world.resource::<SimulationClock>()
    }

    pub fn map(&self) -> &SpatialMap {
        self.world.resource::<SpatialMap>()
    }

    pub fn fleet(&self) -> &DriverFleet {
        self.world.resource::<DriverFleet>()
    }

    pub fn orders(&self) -> &OrderBook {
        self.world.resource::<OrderBook>()
    }

    pub fn total_reward(&self) -> f64 {
        self.fleet().total_reward()
    }

    pub fn agent_mut(&mut self) -> &mut dyn DispatchAgent {
        self.world
            .resource_mut::<AgentResource>()
            .into_inner()
            .0
            .as_mut()
    }

    /// Calls [DispatchAgent::train] on the current agent.
    pub fn train_agent(&mut self) -> Option<TrainStats> {
        self.agent_mut().train()
    }

    pub fn verify_pairing(&self) -> SimResult<()> {
        self.fleet().verify_pairing(self.orders())
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SimError;
    use crate::telemetry::MemorySink;
    use crate::test_helpers::{test_cell, test_map};

    #[test]
    fn build_places_initial_drivers() {
        let config = SimConfig::default().with_window(1, 10).with_initial_drivers(7);
        let env = Environment::builder(config, test_map(2))
            .build()
            .expect("environment");
        assert_eq!(env.fleet().len(), 7);
        assert_eq!(env.next_second(), 1);
    }

    #[test]
    fn build_rejects_arrivals_outside_the_map() {
        let outside = test_cell()
            .grid_disk::<Vec<_>>(3)
            .into_iter()
            .find(|cell| !test_map(1).contains(*cell))
            .expect("outside cell");
        let arrivals = ArrivalSchedule::default().with_order(5, outside, test_cell());
        let result = Environment::builder(SimConfig::default(), test_map(1))
            .arrivals(arrivals)
            .build();
        assert!(matches!(result, Err(SimError::UnknownCell(_))));
    }

    #[test]
    fn run_covers_the_whole_window() {
        let config = SimConfig::default().with_window(5, 24).with_initial_drivers(3);
        let mut env = Environment::builder(config, test_map(1))
            .build()
            .expect("environment");
        assert_eq!(env.run().expect("run"), 20);
        assert!(env.is_finished());
        assert_eq!(env.clock().now(), 24);
        assert_eq!(env.run().expect("second run"), 0);
    }

    #[test]
    fn survivors_reach_the_sink_only_when_flushed() {
        let sink = MemorySink::new();
        let config = SimConfig::default().with_window(1, 30).with_initial_drivers(4);
        let mut env = Environment::builder(config, test_map(1))
            .sink(sink.clone())
            .build()
            .expect("environment");
        env.run().expect("run");
        assert!(sink.segments().is_empty());
        assert_eq!(env.fleet().len(), 4);

        assert_eq!(env.flush_survivors(), 4);
        let segments = sink.segments();
        assert_eq!(segments.len(), 4);
        assert!(segments
            .iter()
            .all(|segment| segment.start_time == 1 && segment.end_time == 30 && !segment.done));
        assert_eq!(env.flush_survivors(), 0);
        assert_eq!(sink.segments().len(), 4);
    }

    #[test]
    fn hook_errors_stop_the_run() {
        let config = SimConfig::default().with_window(1, 50).with_initial_drivers(1);
        let mut env = Environment::builder(config, test_map(1))
            .build()
            .expect("environment");
        let result = env.run_with_hook(|_, second| {
            if second == 10 {
                Err(SimError::Config("stop".into()))
            } else {
                Ok(())
            }
        });
        assert!(result.is_err());
        assert_eq!(env.next_second(), 11);
    }
}
