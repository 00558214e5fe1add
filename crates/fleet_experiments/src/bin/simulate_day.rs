use std::path::PathBuf;
use std::process::exit;

use clap::{Parser, ValueEnum};
use fleet_core::config::SimConfig;
use fleet_core::matching::{BaselineAgent, DispatchAgent, GreedyAgent, Objective};
use fleet_experiments::{
    export_day_telemetry, export_results, run_days_parallel, summarize, ResultFormat,
    CancellationSource, DayPlan, DemandSource, MapSource, RunOptions,
};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum AgentKind {
    /// Optimal assignment on predicted reward
    Baseline,
    /// Highest reward first
    Greedy,
}

#[derive(Parser)]
#[command(
    name = "simulate_day",
    about = "Simulate one or more days of the ride-hailing fleet"
)]
struct Cli {
    /// JSON day plan; the flags below are ignored when given
    #[arg(long)]
    plan: Option<PathBuf>,

    /// Day of week, 1 (Monday) to 7 (Sunday)
    #[arg(long, default_value_t = 1)]
    day: u8,

    /// Simulate every day of the week instead of a single day
    #[arg(long)]
    week: bool,

    /// Independent replicas per day
    #[arg(long, default_value_t = 1)]
    replicas: usize,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Last simulated second
    #[arg(long, default_value_t = 86_400)]
    end_second: u64,

    /// Hex H3 cell at the center of the service area
    #[arg(long, default_value = "8a1fb46622dffff")]
    center: String,

    /// Rings around the center cell
    #[arg(long, default_value_t = 6)]
    radius: u32,

    #[arg(long, default_value_t = 100)]
    initial_drivers: usize,

    #[arg(long, default_value_t = 600.0)]
    orders_per_hour: f64,

    #[arg(long, default_value_t = 30.0)]
    drivers_per_hour: f64,

    #[arg(long, default_value_t = 240.0)]
    driver_lifetime_min: f64,

    /// Constant cancellation probability after assignment
    #[arg(long, default_value_t = 0.0)]
    cancel_probability: f64,

    /// Directory with cancel_probs_day{d}.csv files; overrides --cancel-probability
    #[arg(long)]
    cancel_dir: Option<PathBuf>,

    /// Idle transition table
    #[arg(long)]
    idle_table: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = AgentKind::Baseline)]
    agent: AgentKind,

    /// Seconds between agent training calls; 0 disables training
    #[arg(long, default_value_t = 300)]
    train_every: u64,

    /// Worker threads; defaults to one per core
    #[arg(long)]
    threads: Option<usize>,

    /// Output directory for results and telemetry
    #[arg(long, default_value = "simulation_output")]
    out: PathBuf,

    /// Also export per-step metrics and trajectories for each day
    #[arg(long)]
    telemetry: bool,

    /// Hide the progress bar
    #[arg(long)]
    no_progress: bool,

    /// Drop the trajectories of drivers still online when the day ends
    #[arg(long)]
    no_survivor_flush: bool,
}

fn plan_from_flags(cli: &Cli) -> DayPlan {
    let config = SimConfig::default()
        .with_day_of_week(cli.day)
        .with_seed(cli.seed)
        .with_window(1, cli.end_second)
        .with_initial_drivers(cli.initial_drivers);
    let mut plan = DayPlan::new("cli", config);
    plan.map = MapSource::Disk {
        center: cli.center.clone(),
        radius: cli.radius,
    };
    plan.demand = DemandSource::Uniform {
        orders_per_hour: cli.orders_per_hour,
        drivers_per_hour: cli.drivers_per_hour,
        mean_driver_lifetime_min: cli.driver_lifetime_min,
    };
    plan.cancellation = match &cli.cancel_dir {
        Some(dir) => CancellationSource::Weekday { dir: dir.clone() },
        None => CancellationSource::Constant {
            probability: cli.cancel_probability,
        },
    };
    plan.idle_transitions = cli.idle_table.clone();
    plan
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let base = match &cli.plan {
        Some(path) => DayPlan::from_json_file(path)?,
        None => plan_from_flags(&cli),
    };
    let days = if cli.week {
        base.for_days(1..=7)
    } else {
        vec![base]
    };
    let plans: Vec<DayPlan> = days
        .iter()
        .flat_map(|plan| {
            if cli.replicas > 1 {
                plan.replicas(cli.replicas)
            } else {
                vec![plan.clone()]
            }
        })
        .collect();

    let agent = cli.agent;
    let factory = move |_: &DayPlan| -> Box<dyn DispatchAgent> {
        match agent {
            AgentKind::Baseline => Box::new(BaselineAgent {
                objective: Objective::Maximize,
            }),
            AgentKind::Greedy => Box::new(GreedyAgent),
        }
    };
    let options = RunOptions {
        train_every_secs: Some(cli.train_every),
        keep_frames: cli.telemetry,
        flush_survivors: !cli.no_survivor_flush,
    };

    log::info!("simulating {} day(s)", plans.len());
    let runs = run_days_parallel(&plans, &factory, &options, cli.threads, !cli.no_progress)?;

    std::fs::create_dir_all(&cli.out)?;
    if cli.telemetry {
        for run in &runs {
            export_day_telemetry(run, cli.out.join("telemetry"))?;
        }
    }
    let results: Vec<_> = runs.into_iter().map(|run| run.result).collect();
    for format in ResultFormat::ALL {
        let path = cli.out.join(format!("results.{}", format.extension()));
        export_results(&results, path, format)?;
    }

    let summary = summarize(&results);
    println!(
        "{} day(s): mean reward {:.2} (std {:.2}), answer rate {:.1}%, completed {:.0}",
        summary.days,
        summary.mean_total_reward,
        summary.std_total_reward,
        summary.mean_answer_rate * 100.0,
        summary.mean_completed_orders
    );
    println!("results written to {}", cli.out.display());
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(error) = run(Cli::parse()) {
        eprintln!("Error: {error}");
        exit(1);
    }
}
