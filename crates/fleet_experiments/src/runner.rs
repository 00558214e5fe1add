//! Running simulated days, one at a time or in parallel with rayon.
//!
//! Every day owns its own environment and agent; nothing is shared between
//! days, so results do not depend on the thread count.

use fleet_core::matching::{DispatchAgent, TrainStats};
use fleet_core::telemetry::{MemorySink, MetricsFrame};
use fleet_core::trajectory::TrajectorySegment;
use fleet_core::{SimError, SimResult};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;

use crate::metrics::DayResult;
use crate::plan::DayPlan;

/// Builds a fresh agent for a plan.
pub type AgentFactory = dyn Fn(&DayPlan) -> Box<dyn DispatchAgent> + Sync;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Call `train()` on the agent after every tick whose second is a multiple
    /// of this. `None` never trains.
    pub train_every_secs: Option<u64>,
    /// Keep every per-step frame, not just the run totals.
    pub keep_frames: bool,
    /// Hand the trajectories of drivers still online at the end of the
    /// window to the sink.
    pub flush_survivors: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            train_every_secs: Some(300),
            keep_frames: false,
            flush_survivors: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DayRun {
    pub result: DayResult,
    pub frames: Vec<MetricsFrame>,
    pub segments: Vec<TrajectorySegment>,
    pub training: Vec<TrainStats>,
}

/// Runs one plan to the end of its window.
pub fn run_day(
    plan: &DayPlan,
    agent: Box<dyn DispatchAgent>,
    options: &RunOptions,
) -> SimResult<DayRun> {
    let sink = if options.keep_frames {
        MemorySink::new()
    } else {
        MemorySink::totals_only()
    };
    let mut env = plan.build_environment(agent, sink.clone())?;
    let agent_name = env.agent_mut().name().to_string();
    let train_every = options.train_every_secs.filter(|every| *every > 0);

    let mut training = Vec::new();
    env.run_with_hook(|env, second| {
        let Some(every) = train_every else {
            return Ok(());
        };
        if second % every == 0 {
            if let Some(stats) = env.train_agent() {
                log::debug!("t={second} train loss {:.4}", stats.loss);
                training.push(stats);
            }
        }
        Ok(())
    })?;
    if options.flush_survivors {
        env.flush_survivors();
    }

    let totals = sink.totals();
    let result = DayResult::from_totals(
        &plan.name,
        &agent_name,
        plan.config.day_of_week,
        plan.config.seed,
        &totals,
        env.total_reward(),
        &training,
    );
    let (frames, segments) =
        sink.with(|recorded| (recorded.frames.clone(), recorded.segments.clone()));
    Ok(DayRun {
        result,
        frames,
        segments,
        training,
    })
}

fn progress_bar(total: usize) -> ProgressBar {
    let bar = ProgressBar::new(total as u64);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    bar.set_style(style);
    bar
}

/// Runs every plan on a rayon pool. Results come back in plan order; the
/// first failing day fails the batch.
pub fn run_days_parallel(
    plans: &[DayPlan],
    factory: &AgentFactory,
    options: &RunOptions,
    num_threads: Option<usize>,
    show_progress: bool,
) -> SimResult<Vec<DayRun>> {
    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(threads) = num_threads {
        builder = builder.num_threads(threads);
    }
    let pool = builder
        .build()
        .map_err(|error| SimError::Config(format!("failed to create thread pool: {error}")))?;

    let bar = (show_progress && !plans.is_empty()).then(|| progress_bar(plans.len()));
    let runs = pool.install(|| {
        plans
            .par_iter()
            .map(|plan| {
                let run = run_day(plan, factory(plan), options);
                if let Some(bar) = &bar {
                    bar.inc(1);
                }
                run
            })
            .collect::<SimResult<Vec<_>>>()
    });
    if let Some(bar) = &bar {
        bar.finish_with_message("Completed");
    }
    runs
}
