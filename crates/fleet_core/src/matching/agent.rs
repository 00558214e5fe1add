//! Dispatch and repositioning policy contract plus two reference policies.

use std::collections::HashSet;
use std::ops::{Deref, DerefMut};

use bevy_ecs::prelude::Resource;

use super::assignment::{solve_assignment, AssignmentEdge, Objective};
use super::types::{
    DispatchAssignment, PairRequest, RepositionAssignment, RepositionRequest, TrainStats,
};

/// Decision policy consulted by the tick loop.
///
/// The environment never calls [DispatchAgent::train]; that is left to
/// whoever drives the loop.
pub trait DispatchAgent: Send + Sync {
    /// Chooses a subset of the offered pairs.
    fn dispatch(&mut self, candidates: &[PairRequest]) -> Vec<DispatchAssignment>;

    /// Chooses destinations for the offered drivers. Drivers left out stay put.
    fn reposition(&mut self, request: &RepositionRequest) -> Vec<RepositionAssignment> {
        request
            .driver_info
            .iter()
            .map(|info| RepositionAssignment {
                driver_id: info.driver_id,
                destination: info.grid_id,
            })
            .collect()
    }

    fn train(&mut self) -> Option<TrainStats> {
        None
    }

    fn name(&self) -> &str;
}

/// Globally optimal assignment on `reward_units`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BaselineAgent {
    pub objective: Objective,
}

impl DispatchAgent for BaselineAgent {
    fn dispatch(&mut self, candidates: &[PairRequest]) -> Vec<DispatchAssignment> {
        let edges: Vec<AssignmentEdge> = candidates
            .iter()
            .map(|pair| AssignmentEdge {
                driver: pair.driver_id,
                order: pair.order_id,
                weight: pair.reward_units,
            })
            .collect();
        solve_assignment(&edges, self.objective)
    }

    fn name(&self) -> &str {
        "baseline"
    }
}

/// Takes pairs in descending `reward_units`, skipping used drivers and orders.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedyAgent;

impl DispatchAgent for GreedyAgent {
    fn dispatch(&mut self, candidates: &[PairRequest]) -> Vec<DispatchAssignment> {
        let mut ranked: Vec<&PairRequest> = candidates.iter().collect();
        ranked.sort_by(|a, b| {
            b.reward_units
                .total_cmp(&a.reward_units)
                .then_with(|| a.order_driver_distance.total_cmp(&b.order_driver_distance))
        });
        let mut used_drivers = HashSet::new();
        let mut used_orders = HashSet::new();
        let mut chosen = Vec::new();
        for pair in ranked {
            if used_drivers.contains(&pair.driver_id) || used_orders.contains(&pair.order_id) {
                continue;
            }
            used_drivers.insert(pair.driver_id);
            used_orders.insert(pair.order_id);
            chosen.push(DispatchAssignment {
                order_id: pair.order_id,
                driver_id: pair.driver_id,
            });
        }
        chosen
    }

    fn name(&self) -> &str {
        "greedy"
    }
}

#[derive(Resource)]
pub struct AgentResource(pub Box<dyn DispatchAgent>);

impl AgentResource {
    pub fn new(agent: impl DispatchAgent + 'static) -> Self {
        Self(Box::new(agent))
    }
}

impl Deref for AgentResource {
    type Target = dyn DispatchAgent;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl DerefMut for AgentResource {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.0.as_mut()
    }
}
