//! Order/driver matching: candidate pairs, the agent contract and the
//! reference assignment solver.

pub mod agent;
pub mod apply;
pub mod assignment;
pub mod candidates;
pub mod types;

pub use agent::{AgentResource, BaselineAgent, DispatchAgent, GreedyAgent};
pub use apply::{apply_dispatch, apply_reposition, DispatchOutcome};
pub use assignment::{solve_assignment, AssignmentEdge, Objective};
pub use candidates::build_candidates;
pub use types::{
    DispatchAssignment, DriverInfo, PairRequest, RepositionAssignment, RepositionRequest,
    TrainStats,
};
