use fleet_core::matching::{BaselineAgent, DispatchAgent, GreedyAgent};
use fleet_experiments::{
    export_day_telemetry, export_results, run_day, run_days_parallel, summarize, DayPlan,
    ResultFormat, RunOptions,
};

const PLAN_JSON: &str = r#"{
    "name": "short",
    "config": {
        "day_of_week": 5,
        "start_second": 1,
        "end_second": 1200,
        "seed": 11,
        "initial_driver_count": 15
    },
    "map": { "kind": "disk", "center": "8a1fb46622dffff", "radius": 3 },
    "demand": {
        "kind": "uniform",
        "orders_per_hour": 300.0,
        "drivers_per_hour": 120.0,
        "mean_driver_lifetime_min": 10.0
    },
    "cancellation": { "kind": "constant", "probability": 0.2 }
}"#;

fn plan_from_json() -> DayPlan {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("plan.json");
    std::fs::write(&path, PLAN_JSON).expect("write plan");
    DayPlan::from_json_file(&path).expect("parse plan")
}

#[test]
fn json_plan_runs_a_full_window() {
    let plan = plan_from_json();
    assert_eq!(plan.config.day_of_week, 5);
    assert_eq!(plan.config.dispatch_interval_secs, 2);

    let run = run_day(&plan, Box::new(BaselineAgent::default()), &RunOptions::default())
        .expect("day runs");
    let result = &run.result;
    assert_eq!(result.plan, "short");
    assert_eq!(result.day_of_week, 5);
    assert_eq!(result.ticks, 1200);
    assert!(result.income_orders > 0);
    assert!(result.assigned_orders + result.expired_orders <= result.income_orders);
    assert!(result.completed_orders <= result.assigned_orders);
    assert!((0.0..=1.0).contains(&result.answer_rate));
    assert!(run.frames.is_empty());
}

#[test]
fn kept_frames_and_segments_are_exported() {
    let plan = plan_from_json();
    let options = RunOptions {
        keep_frames: true,
        ..RunOptions::default()
    };
    let run = run_day(&plan, Box::new(GreedyAgent), &options).expect("day runs");
    assert_eq!(run.frames.len(), 1200);
    assert!(!run.segments.is_empty());

    let out = tempfile::tempdir().expect("tempdir");
    export_day_telemetry(&run, out.path()).expect("telemetry export");
    assert!(out.path().join("short_metrics.parquet").exists());
    assert!(out.path().join("short_segments.parquet").exists());

    let csv_path = out.path().join("results.csv");
    export_results(&[run.result], &csv_path, ResultFormat::Csv).expect("csv export");
    let text = std::fs::read_to_string(csv_path).expect("read csv");
    assert_eq!(text.lines().count(), 2);
}

#[test]
fn weekly_batch_reports_each_day_in_order() {
    let week = plan_from_json().for_days(1..=3);
    let factory = |_: &DayPlan| -> Box<dyn DispatchAgent> { Box::new(BaselineAgent::default()) };
    let runs = run_days_parallel(&week, &factory, &RunOptions::default(), Some(2), false)
        .expect("batch runs");

    let days: Vec<u8> = runs.iter().map(|run| run.result.day_of_week).collect();
    assert_eq!(days, vec![1, 2, 3]);
    let results: Vec<_> = runs.into_iter().map(|run| run.result).collect();
    let summary = summarize(&results);
    assert_eq!(summary.days, 3);
    assert!(summary.mean_total_reward.is_finite());
}
