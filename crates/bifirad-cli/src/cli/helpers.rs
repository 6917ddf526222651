use super::CliError;
use super::dispatch::StageCommandSpec;
use bifirad_core::domain::{BifiError, SimulationArtifact, SimulationRequest};
use bifirad_core::modules::StageExecutor;
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Logs go to stderr so stdout stays parseable. `RUST_LOG` wins over
/// `--log-level`.
pub(super) fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

pub(super) fn require_input(spec: StageCommandSpec, path: &Path) -> Result<(), CliError> {
    if path.exists() {
        return Ok(());
    }
    Err(CliError::Compute(BifiError::input_validation(
        "INPUT.CLI_INPUT_MISSING",
        format!(
            "'{}' does not exist; the {} command expects a {}",
            path.display(),
            spec.command,
            spec.input_artifact
        ),
    )))
}

/// Name for a request: the file stem of its input, or `fallback`.
pub(super) fn request_name(input: &Path, fallback: &str) -> String {
    input
        .file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

pub(super) fn execute_stage(
    spec: StageCommandSpec,
    executor: &dyn StageExecutor,
    name: String,
    input: PathBuf,
    output_dir: PathBuf,
) -> Result<Vec<SimulationArtifact>, CliError> {
    require_input(spec, &input)?;
    let request = SimulationRequest::new(name, spec.stage, input, output_dir);
    debug!(command = spec.command, input = %request.input_path.display(), "dispatching stage");

    println!("Running {}...", spec.stage);
    let artifacts = executor.execute(&request).map_err(CliError::Compute)?;
    for artifact in &artifacts {
        println!("  {}", request.output_dir.join(&artifact.relative_path).display());
    }
    println!(
        "{} completed for '{}' ({} artifacts).",
        spec.stage,
        request.name,
        artifacts.len()
    );
    Ok(artifacts)
}

#[cfg(test)]
mod tests {
    use super::{request_name, require_input};
    use crate::cli::dispatch::stage_command_spec;
    use bifirad_core::domain::Stage;
    use std::path::Path;

    #[test]
    fn request_names_come_from_the_input_stem() {
        assert_eq!(request_name(Path::new("runs/site_a.json"), "run"), "site_a");
        assert_eq!(request_name(Path::new("/"), "run"), "run");
    }

    #[test]
    fn missing_inputs_name_the_expected_artifact() {
        let error = require_input(
            stage_command_spec(Stage::Compile),
            Path::new("/nonexistent/trackerdict.json"),
        )
        .expect_err("missing input should fail");
        let error = error.as_bifi_error();
        assert_eq!(error.placeholder(), "INPUT.CLI_INPUT_MISSING");
        assert!(error.message().contains("trackerdict.json"));
    }
}
