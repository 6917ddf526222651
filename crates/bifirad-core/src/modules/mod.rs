pub mod analysis;
pub mod engine;
pub mod ground;
pub mod mismatch;
pub mod performance;
pub mod pvmodule;
pub mod results;
pub mod scene;
pub mod serialization;
pub mod simulation;
pub mod sky;
pub mod tracker;
pub mod weather;

mod traits;

pub use simulation::{CompileStage, MismatchStage, SceneStage, SimulateStage, SkyStage, TrackerStage};
pub use traits::StageExecutor;
