use crate::domain::{SimResult, SimulationArtifact, SimulationRequest};

pub trait StageExecutor {
    fn execute(&self, request: &SimulationRequest) -> SimResult<Vec<SimulationArtifact>>;
}
