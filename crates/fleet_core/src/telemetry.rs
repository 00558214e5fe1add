//! Per-step metrics frames, trajectory collection and sinks.
//!
//! The [TrajectoryCollector] fills one [MetricsFrame] per tick together with
//! the trajectories of drivers that retired during it; the flush phase hands
//! both to the configured [TelemetrySink].

use std::sync::{Arc, Mutex, PoisonError};

use bevy_ecs::prelude::Resource;
use serde::Serialize;

use crate::driver::RetiredDriver;
use crate::trajectory::TrajectorySegment;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsFrame {
    pub step: u64,
    pub day_of_week: u8,
    pub total_drivers: usize,
    pub idle_drivers: usize,
    pub reposition_drivers: usize,
    pub assigned_drivers: usize,
    /// Orders on the book after the tick.
    pub total_orders: usize,
    pub income_orders: usize,
    pub income_drivers: usize,
    pub outcome_drivers: usize,
    pub dispatch_candidates: usize,
    pub assigned_orders: usize,
    pub discarded_pairs: usize,
    pub cancelled_orders: usize,
    pub expired_orders: usize,
    pub completed_orders: usize,
    pub repositioned_drivers: usize,
    pub idle_moves: usize,
    /// Reward of orders assigned this tick, net of those cancelled.
    pub reward_earned: f64,
    pub reward_cancelled: f64,
    /// Reward credited to drivers by trips finishing this tick.
    pub reward_completed: f64,
    pub total_reward: f64,
}

#[derive(Debug, Default, Resource)]
pub struct TrajectoryCollector {
    frame: MetricsFrame,
    segments: Vec<TrajectorySegment>,
}

impl TrajectoryCollector {
    pub fn open(&mut self, step: u64, day_of_week: u8) {
        self.frame = MetricsFrame {
            step,
            day_of_week,
            ..MetricsFrame::default()
        };
        self.segments.clear();
    }

    pub fn frame(&self) -> &MetricsFrame {
        &self.frame
    }

    pub fn frame_mut(&mut self) -> &mut MetricsFrame {
        &mut self.frame
    }

    pub fn segments(&self) -> &[TrajectorySegment] {
        &self.segments
    }

    pub fn record_retired(&mut self, retired: Vec<RetiredDriver>) {
        self.frame.outcome_drivers += retired.len();
        for driver in retired {
            self.segments.extend(driver.trajectory);
        }
    }
}

/// Receives every flushed step.
pub trait TelemetrySink: Send + Sync {
    fn on_step(&mut self, frame: &MetricsFrame, segments: &[TrajectorySegment]);

    /// Trajectories of drivers still online when the run is flushed.
    fn on_finish(&mut self, _segments: &[TrajectorySegment]) {}
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn on_step(&mut self, _frame: &MetricsFrame, _segments: &[TrajectorySegment]) {}
}

/// Whole-run aggregates accumulated from frames.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunTotals {
    pub steps: u64,
    pub income_orders: usize,
    pub assigned_orders: usize,
    pub cancelled_orders: usize,
    pub expired_orders: usize,
    pub completed_orders: usize,
    pub income_drivers: usize,
    pub outcome_drivers: usize,
    pub repositioned_drivers: usize,
    pub reward_earned: f64,
    pub reward_cancelled: f64,
    pub reward_completed: f64,
}

impl RunTotals {
    pub fn absorb(&mut self, frame: &MetricsFrame) {
        self.steps += 1;
        self.income_orders += frame.income_orders;
        self.assigned_orders += frame.assigned_orders;
        self.cancelled_orders += frame.cancelled_orders;
        self.expired_orders += frame.expired_orders;
        self.completed_orders += frame.completed_orders;
        self.income_drivers += frame.income_drivers;
        self.outcome_drivers += frame.outcome_drivers;
        self.repositioned_drivers += frame.repositioned_drivers;
        self.reward_earned += frame.reward_earned;
        self.reward_cancelled += frame.reward_cancelled;
        self.reward_completed += frame.reward_completed;
    }

    /// Share of admitted orders that got a driver and were not cancelled.
    pub fn answer_rate(&self) -> f64 {
        if self.income_orders == 0 {
            return 0.0;
        }
        (self.assigned_orders - self.cancelled_orders.min(self.assigned_orders)) as f64
            / self.income_orders as f64
    }
}

#[derive(Debug, Default)]
pub struct Recorded {
    pub frames: Vec<MetricsFrame>,
    pub segments: Vec<TrajectorySegment>,
    pub totals: RunTotals,
}

/// Keeps every frame and segment in memory. Clones share the same storage,
/// so a handle kept outside the environment can read what was recorded.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    inner: Arc<Mutex<Recorded>>,
    keep_frames: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            inner: Arc::default(),
            keep_frames: true,
        }
    }

    /// Keeps totals and segments but not the per-step frames.
    pub fn totals_only() -> Self {
        Self {
            inner: Arc::default(),
            keep_frames: false,
        }
    }

    pub fn with<T>(&self, read: impl FnOnce(&Recorded) -> T) -> T {
        let recorded = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        read(&recorded)
    }

    pub fn totals(&self) -> RunTotals {
        self.with(|recorded| recorded.totals.clone())
    }

    pub fn frames(&self) -> Vec<MetricsFrame> {
        self.with(|recorded| recorded.frames.clone())
    }

    pub fn segments(&self) -> Vec<TrajectorySegment> {
        self.with(|recorded| recorded.segments.clone())
    }
}

impl TelemetrySink for MemorySink {
    fn on_step(&mut self, frame: &MetricsFrame, segments: &[TrajectorySegment]) {
        let mut recorded = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        recorded.totals.absorb(frame);
        if self.keep_frames {
            recorded.frames.push(frame.clone());
        }
        recorded.segments.extend_from_slice(segments);
    }

    fn on_finish(&mut self, segments: &[TrajectorySegment]) {
        let mut recorded = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        recorded.segments.extend_from_slice(segments);
    }
}

#[derive(Resource)]
pub struct TelemetrySinkResource(pub Box<dyn TelemetrySink>);

impl TelemetrySinkResource {
    pub fn new(sink: impl TelemetrySink + 'static) -> Self {
        Self(Box::new(sink))
    }
}
