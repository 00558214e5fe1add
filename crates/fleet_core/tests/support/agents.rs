use std::sync::{Arc, Mutex};

use fleet_core::matching::{
    DispatchAgent, DispatchAssignment, PairRequest, RepositionAssignment, RepositionRequest,
};

/// Accepts every offered pair, duplicates included.
#[derive(Debug, Default)]
pub struct AcceptEverythingAgent;

impl DispatchAgent for AcceptEverythingAgent {
    fn dispatch(&mut self, candidates: &[PairRequest]) -> Vec<DispatchAssignment> {
        candidates
            .iter()
            .map(|pair| DispatchAssignment {
                order_id: pair.order_id,
                driver_id: pair.driver_id,
            })
            .collect()
    }

    fn name(&self) -> &str {
        "accept_everything"
    }
}

#[derive(Debug, Default)]
pub struct Calls {
    pub dispatch: Vec<Vec<PairRequest>>,
    pub reposition: Vec<RepositionRequest>,
}

/// Never dispatches; sends every offered driver to `destination` and records
/// what it was asked.
#[derive(Debug, Clone)]
pub struct RecordingAgent {
    pub calls: Arc<Mutex<Calls>>,
    pub destination: h3o::CellIndex,
}

impl RecordingAgent {
    pub fn new(destination: h3o::CellIndex) -> Self {
        Self {
            calls: Arc::default(),
            destination,
        }
    }
}

impl DispatchAgent for RecordingAgent {
    fn dispatch(&mut self, candidates: &[PairRequest]) -> Vec<DispatchAssignment> {
        self.calls
            .lock()
            .expect("calls")
            .dispatch
            .push(candidates.to_vec());
        Vec::new()
    }

    fn reposition(&mut self, request: &RepositionRequest) -> Vec<RepositionAssignment> {
        self.calls
            .lock()
            .expect("calls")
            .reposition
            .push(request.clone());
        request
            .driver_info
            .iter()
            .map(|info| RepositionAssignment {
                driver_id: info.driver_id,
                destination: self.destination,
            })
            .collect()
    }

    fn name(&self) -> &str {
        "recording"
    }
}
