mod commands;
mod dispatch;
mod helpers;

use bifirad_core::domain::{BifiError, Stage};
use clap::Parser;
use dispatch::stage_command_spec;

pub fn run_from_env() -> i32 {
    let args: Vec<String> = std::env::args().skip(1).collect();

    match run(args) {
        Ok(code) => code,
        Err(error) => {
            let error = error.as_bifi_error();
            eprintln!("{}", error.diagnostic_line());
            if let Some(summary_line) = error.fatal_exit_line() {
                eprintln!("{}", summary_line);
            }
            error.exit_code()
        }
    }
}

pub fn run<I, S>(args: I) -> Result<i32, CliError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let full_args = std::iter::once("bifirad".to_string())
        .chain(args.into_iter().map(Into::into))
        .collect::<Vec<_>>();
    parse_and_dispatch(full_args)
}

fn parse_and_dispatch(args: Vec<String>) -> Result<i32, CliError> {
    match Cli::try_parse_from(&args) {
        Ok(cli) => {
            helpers::init_tracing(&cli.log_level);
            dispatch_parsed(cli.command)
        }
        Err(err) => match err.kind() {
            clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                print!("{}", err);
                Ok(0)
            }
            _ => Err(CliError::Usage(err.to_string())),
        },
    }
}

#[derive(Parser)]
#[command(name = "bifirad", version, about = "Bifacial PV scene generation for RADIANCE")]
struct Cli {
    /// Log filter used when RUST_LOG is not set (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(clap::Subcommand)]
enum CliCommand {
    /// Build the tracker dictionary and its per-angle weather files
    Tracker(commands::StageArgs),
    /// Write gendaylit or gencumulativesky skies
    Sky(commands::EngineStageArgs),
    /// Write the module, module.json and scene files
    Scene(commands::StageArgs),
    /// Run the full pipeline: skies, scenes, octrees and irradiance scans
    Simulate(commands::EngineStageArgs),
    /// Load tracker results and export a summary CSV
    Compile(commands::CompileArgs),
    /// Electrical mismatch statistics of a results directory
    Mismatch(commands::MismatchArgs),
    /// MBD and RMSE of a modelled column against a measured one
    Performance(commands::PerformanceArgs),
    /// List the ground materials available in a work directory
    Materials(commands::MaterialsArgs),
}

fn dispatch_parsed(command: CliCommand) -> Result<i32, CliError> {
    match command {
        CliCommand::Tracker(args) => {
            commands::run_tracker_command(stage_command_spec(Stage::Tracker), args)
        }
        CliCommand::Sky(args) => commands::run_sky_command(stage_command_spec(Stage::Sky), args),
        CliCommand::Scene(args) => {
            commands::run_scene_command(stage_command_spec(Stage::Scene), args)
        }
        CliCommand::Simulate(args) => {
            commands::run_simulate_command(stage_command_spec(Stage::Simulate), args)
        }
        CliCommand::Compile(args) => {
            commands::run_compile_command(stage_command_spec(Stage::Compile), args)
        }
        CliCommand::Mismatch(args) => {
            commands::run_mismatch_command(stage_command_spec(Stage::Mismatch), args)
        }
        CliCommand::Performance(args) => commands::run_performance_command(args),
        CliCommand::Materials(args) => commands::run_materials_command(args),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error("{0}")]
    Compute(BifiError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CliError {
    fn as_bifi_error(&self) -> BifiError {
        match self {
            Self::Usage(message) => BifiError::input_validation("INPUT.CLI_USAGE", message.clone()),
            Self::Compute(error) => error.clone(),
            Self::Internal(error) => BifiError::io_system("IO.CLI", format!("{error:#}")),
        }
    }
}
