use fleet_core::arrivals::ArrivalSchedule;
use fleet_core::config::SimConfig;
use fleet_core::matching::{BaselineAgent, DispatchAgent};
use fleet_core::models::{ConstantCancellationModel, ConstantRewardModel, IdleTransitionModel};
use fleet_core::telemetry::MemorySink;
use fleet_core::test_helpers::test_map;
use fleet_core::Environment;

/// Builder for small, seeded environments over the test disk.
pub struct TestEnvBuilder {
    config: SimConfig,
    map_radius: u32,
    agent: Box<dyn DispatchAgent>,
    reward: f64,
    cancel_probability: f64,
    idle_model: IdleTransitionModel,
    arrivals: ArrivalSchedule,
}

impl Default for TestEnvBuilder {
    fn default() -> Self {
        Self {
            config: SimConfig::default()
                .with_window(1, 120)
                .with_initial_drivers(0)
                .with_initial_idle(0.0, 0.0)
                .with_seed(7),
            map_radius: 2,
            agent: Box::new(BaselineAgent::default()),
            reward: 10.0,
            cancel_probability: 0.0,
            idle_model: IdleTransitionModel::default(),
            arrivals: ArrivalSchedule::default(),
        }
    }
}

impl TestEnvBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, edit: impl FnOnce(SimConfig) -> SimConfig) -> Self {
        self.config = edit(self.config);
        self
    }

    pub fn with_map_radius(mut self, radius: u32) -> Self {
        self.map_radius = radius;
        self
    }

    pub fn with_agent(mut self, agent: impl DispatchAgent + 'static) -> Self {
        self.agent = Box::new(agent);
        self
    }

    pub fn with_reward(mut self, reward: f64) -> Self {
        self.reward = reward;
        self
    }

    pub fn with_cancel_probability(mut self, probability: f64) -> Self {
        self.cancel_probability = probability;
        self
    }

    pub fn with_idle_model(mut self, model: IdleTransitionModel) -> Self {
        self.idle_model = model;
        self
    }

    pub fn with_arrivals(mut self, arrivals: ArrivalSchedule) -> Self {
        self.arrivals = arrivals;
        self
    }

    /// Builds the environment together with a handle on its recorded telemetry.
    pub fn build(self) -> (Environment, MemorySink) {
        let sink = MemorySink::new();
        let env = Environment::builder(self.config, test_map(self.map_radius))
            .boxed_agent(self.agent)
            .reward_model(ConstantRewardModel(self.reward))
            .cancellation_model(
                ConstantCancellationModel::new(self.cancel_probability)
                    .expect("cancel probability in [0, 1]"),
            )
            .idle_model(self.idle_model)
            .arrivals(self.arrivals)
            .sink(sink.clone())
            .build()
            .expect("test environment");
        (env, sink)
    }
}
