use bifirad_core::domain::Stage;

#[derive(Debug, Clone, Copy)]
pub(super) struct StageCommandSpec {
    pub(super) command: &'static str,
    pub(super) stage: Stage,
    /// What the stage reads, as named in diagnostics.
    pub(super) input_artifact: &'static str,
}

pub(super) fn stage_command_spec(stage: Stage) -> StageCommandSpec {
    let (command, input_artifact) = match stage {
        Stage::Tracker => ("tracker", "config.json"),
        Stage::Sky => ("sky", "config.json"),
        Stage::Scene => ("scene", "config.json"),
        Stage::Simulate => ("simulate", "config.json"),
        Stage::Compile => ("compile", "trackerdict.json"),
        Stage::Mismatch => ("mismatch", "results directory"),
    };
    StageCommandSpec {
        command,
        stage,
        input_artifact,
    }
}

#[cfg(test)]
mod tests {
    use super::stage_command_spec;
    use bifirad_core::domain::Stage;

    #[test]
    fn every_stage_has_a_command() {
        for stage in [
            Stage::Tracker,
            Stage::Sky,
            Stage::Scene,
            Stage::Simulate,
            Stage::Compile,
            Stage::Mismatch,
        ] {
            let spec = stage_command_spec(stage);
            assert_eq!(spec.stage, stage);
            assert_eq!(spec.command.to_ascii_uppercase(), stage.as_str());
            assert!(!spec.input_artifact.is_empty());
        }
    }
}
