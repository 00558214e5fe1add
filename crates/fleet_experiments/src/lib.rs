//! Running simulated days of the fleet simulation: day plans, single and
//! parallel day runners with a training cadence, result summaries and export.
//!
//! ```no_run
//! use fleet_core::config::SimConfig;
//! use fleet_core::matching::{BaselineAgent, DispatchAgent};
//! use fleet_experiments::{run_days_parallel, summarize, DayPlan, RunOptions};
//!
//! let week = DayPlan::new("baseline", SimConfig::default()).for_days(1..=7);
//! let factory = |_: &DayPlan| -> Box<dyn DispatchAgent> { Box::new(BaselineAgent::default()) };
//! let runs = run_days_parallel(&week, &factory, &RunOptions::default(), None, true)?;
//! let results: Vec<_> = runs.into_iter().map(|run| run.result).collect();
//! println!("{:?}", summarize(&results));
//! # Ok::<(), fleet_core::SimError>(())
//! ```

pub mod export;
pub mod metrics;
pub mod plan;
pub mod runner;

pub use export::{export_day_telemetry, export_results, ResultFormat};
pub use metrics::{summarize, DayResult, Summary};
pub use plan::{CancellationSource, DayPlan, DemandSource, MapSource};
pub use runner::{run_day, run_days_parallel, AgentFactory, DayRun, RunOptions};
