pub mod errors;

pub use errors::{
    BifiError, BifiErrorCategory, ExitStatus, GeometryResult, ParserResult, SimResult,
};

use std::fmt::{Display, Formatter};
use std::path::PathBuf;

/// Pipeline stage addressed by a [`SimulationRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Tracker,
    Sky,
    Scene,
    Simulate,
    Compile,
    Mismatch,
}

impl Stage {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tracker => "TRACKER",
            Self::Sky => "SKY",
            Self::Scene => "SCENE",
            Self::Simulate => "SIMULATE",
            Self::Compile => "COMPILE",
            Self::Mismatch => "MISMATCH",
        }
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationRequest {
    pub name: String,
    pub stage: Stage,
    pub input_path: PathBuf,
    pub output_dir: PathBuf,
}

impl SimulationRequest {
    pub fn new(
        name: impl Into<String>,
        stage: Stage,
        input_path: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            stage,
            input_path: input_path.into(),
            output_dir: output_dir.into(),
        }
    }
}

/// A file produced by a stage, relative to the request's output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationArtifact {
    pub relative_path: PathBuf,
}

impl SimulationArtifact {
    pub fn new(relative_path: impl Into<PathBuf>) -> Self {
        Self {
            relative_path: relative_path.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{SimulationRequest, Stage};
    use std::path::Path;

    #[test]
    fn request_keeps_stage_and_paths() {
        let request = SimulationRequest::new("demo", Stage::Sky, "config.json", "out");
        assert_eq!(request.stage.to_string(), "SKY");
        assert_eq!(request.input_path, Path::new("config.json"));
        assert_eq!(request.output_dir, Path::new("out"));
    }
}
