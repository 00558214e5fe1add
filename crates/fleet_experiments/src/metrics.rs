//! Per-day results and cross-day summaries.

use fleet_core::matching::TrainStats;
use fleet_core::telemetry::RunTotals;
use serde::Serialize;

/// Aggregated outcome of one simulated day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayResult {
    pub plan: String,
    pub agent: String,
    pub day_of_week: u8,
    pub seed: u64,
    pub ticks: u64,
    pub income_orders: usize,
    pub assigned_orders: usize,
    pub cancelled_orders: usize,
    pub expired_orders: usize,
    pub completed_orders: usize,
    pub income_drivers: usize,
    pub outcome_drivers: usize,
    pub repositioned_drivers: usize,
    /// Orders that got a driver and were not cancelled, over admitted orders.
    pub answer_rate: f64,
    pub reward_earned: f64,
    pub reward_cancelled: f64,
    /// Reward credited by completed trips.
    pub total_reward: f64,
    pub train_calls: usize,
    /// Loss reported by the last training call, if any.
    pub last_loss: Option<f64>,
}

impl DayResult {
    pub fn from_totals(
        plan: &str,
        agent: &str,
        day_of_week: u8,
        seed: u64,
        totals: &RunTotals,
        total_reward: f64,
        training: &[TrainStats],
    ) -> Self {
        Self {
            plan: plan.to_string(),
            agent: agent.to_string(),
            day_of_week,
            seed,
            ticks: totals.steps,
            income_orders: totals.income_orders,
            assigned_orders: totals.assigned_orders,
            cancelled_orders: totals.cancelled_orders,
            expired_orders: totals.expired_orders,
            completed_orders: totals.completed_orders,
            income_drivers: totals.income_drivers,
            outcome_drivers: totals.outcome_drivers,
            repositioned_drivers: totals.repositioned_drivers,
            answer_rate: totals.answer_rate(),
            reward_earned: totals.reward_earned,
            reward_cancelled: totals.reward_cancelled,
            total_reward,
            train_calls: training.len(),
            last_loss: training.last().map(|stats| stats.loss),
        }
    }
}

/// Mean and spread of the headline numbers across days.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    pub days: usize,
    pub mean_total_reward: f64,
    pub std_total_reward: f64,
    pub mean_answer_rate: f64,
    pub mean_completed_orders: f64,
}

impl Summary {
    fn mean_and_std(values: &[f64]) -> (f64, f64) {
        if values.is_empty() {
            return (0.0, 0.0);
        }
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let variance =
            values.iter().map(|value| (value - mean).powi(2)).sum::<f64>() / values.len() as f64;
        (mean, variance.sqrt())
    }
}

pub fn summarize(results: &[DayResult]) -> Summary {
    if results.is_empty() {
        return Summary::default();
    }
    let rewards: Vec<f64> = results.iter().map(|result| result.total_reward).collect();
    let (mean_total_reward, std_total_reward) = Summary::mean_and_std(&rewards);
    let days = results.len() as f64;
    Summary {
        days: results.len(),
        mean_total_reward,
        std_total_reward,
        mean_answer_rate: results.iter().map(|r| r.answer_rate).sum::<f64>() / days,
        mean_completed_orders: results.iter().map(|r| r.completed_orders as f64).sum::<f64>()
            / days,
    }
}
