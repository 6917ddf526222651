use super::CliError;
use super::dispatch::StageCommandSpec;
use super::helpers::*;
use anyhow::Context;
use bifirad_core::modules::engine::ProcessEngine;
use bifirad_core::modules::ground::MaterialTable;
use bifirad_core::modules::mismatch::MismatchOptions;
use bifirad_core::modules::performance::{performance_stats, read_series};
use bifirad_core::modules::simulation::MATERIALS_DIR;
use bifirad_core::modules::{
    CompileStage, MismatchStage, SceneStage, SimulateStage, SkyStage, TrackerStage,
};
use std::path::PathBuf;

#[derive(clap::Args)]
pub(super) struct StageArgs {
    /// Simulation config (JSON)
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Work directory receiving objects/, skies/, results/ and EPWs/
    #[arg(long, default_value = ".")]
    workdir: PathBuf,
}

#[derive(clap::Args)]
pub(super) struct EngineStageArgs {
    #[command(flatten)]
    stage: StageArgs,

    /// Directory holding the RADIANCE binaries; PATH is searched otherwise
    #[arg(long)]
    radiance_bin: Option<PathBuf>,
}

#[derive(clap::Args)]
pub(super) struct CompileArgs {
    /// Tracker dictionary written by the tracker, sky, scene or simulate commands
    #[arg(long, default_value = "trackerdict.json")]
    trackerdict: PathBuf,

    /// Results directory; defaults to results/ beside the tracker dictionary
    #[arg(long)]
    results: Option<PathBuf>,

    /// Output directory
    #[arg(long, default_value = ".")]
    output: PathBuf,

    /// Output file name, without the .csv extension
    #[arg(long, default_value = "compiled_results")]
    name: String,

    /// Fill missing hours with empty rows (hourly dictionaries only)
    #[arg(long)]
    reindex: bool,
}

#[derive(clap::Args)]
pub(super) struct MismatchArgs {
    /// Directory of irradiance results files
    #[arg(long, default_value = "results")]
    results: PathBuf,

    /// Output directory
    #[arg(long, default_value = ".")]
    output: PathBuf,

    /// Output file name, without the .csv extension
    #[arg(long, default_value = "mismatch")]
    name: String,

    /// Module orientation: portrait or landscape
    #[arg(long, default_value = "portrait")]
    orientation: String,

    /// Bifaciality factor applied to the rear irradiance
    #[arg(long, default_value_t = 1.0)]
    bifi: f64,

    /// Cells per module: 72 or 96
    #[arg(long, default_value_t = 72)]
    numcells: usize,

    /// Downsampling of sensor rows to cell rows: byCenter or byAverage
    #[arg(long, default_value = "byCenter")]
    method: String,
}

#[derive(clap::Args)]
pub(super) struct PerformanceArgs {
    /// CSV file holding both series
    #[arg(long)]
    file: PathBuf,

    /// Column with the modelled values
    #[arg(long)]
    modeled: String,

    /// Column with the measured values
    #[arg(long)]
    measured: String,

    /// Print the statistics as JSON
    #[arg(long)]
    json: bool,
}

#[derive(clap::Args)]
pub(super) struct MaterialsArgs {
    /// Work directory; its materials/ground.rad is listed when present
    #[arg(long, default_value = ".")]
    workdir: PathBuf,
}

impl MismatchArgs {
    fn into_options(self) -> Result<(MismatchOptions, PathBuf, PathBuf, String), CliError> {
        let options = MismatchOptions {
            orientation: self.orientation.parse().map_err(CliError::Compute)?,
            bifi: self.bifi,
            numcells: self.numcells,
            method: self.method.parse().map_err(CliError::Compute)?,
        };
        Ok((options, self.results, self.output, self.name))
    }
}

pub(super) fn run_tracker_command(spec: StageCommandSpec, args: StageArgs) -> Result<i32, CliError> {
    let name = request_name(&args.config, spec.command);
    execute_stage(spec, &TrackerStage, name, args.config, args.workdir)?;
    Ok(0)
}

pub(super) fn run_sky_command(spec: StageCommandSpec, args: EngineStageArgs) -> Result<i32, CliError> {
    let name = request_name(&args.stage.config, spec.command);
    let executor = SkyStage::new(ProcessEngine::new(args.radiance_bin));
    execute_stage(spec, &executor, name, args.stage.config, args.stage.workdir)?;
    Ok(0)
}

pub(super) fn run_scene_command(spec: StageCommandSpec, args: StageArgs) -> Result<i32, CliError> {
    let name = request_name(&args.config, spec.command);
    execute_stage(spec, &SceneStage, name, args.config, args.workdir)?;
    Ok(0)
}

pub(super) fn run_simulate_command(
    spec: StageCommandSpec,
    args: EngineStageArgs,
) -> Result<i32, CliError> {
    let name = request_name(&args.stage.config, spec.command);
    let executor = SimulateStage::new(ProcessEngine::new(args.radiance_bin));
    execute_stage(spec, &executor, name, args.stage.config, args.stage.workdir)?;
    Ok(0)
}

pub(super) fn run_compile_command(spec: StageCommandSpec, args: CompileArgs) -> Result<i32, CliError> {
    let executor = CompileStage {
        results_dir: args.results,
        reindex: args.reindex,
    };
    execute_stage(spec, &executor, args.name, args.trackerdict, args.output)?;
    Ok(0)
}

pub(super) fn run_mismatch_command(spec: StageCommandSpec, args: MismatchArgs) -> Result<i32, CliError> {
    let (options, results, output, name) = args.into_options()?;
    execute_stage(spec, &MismatchStage { options }, name, results, output)?;
    Ok(0)
}

pub(super) fn run_performance_command(args: PerformanceArgs) -> Result<i32, CliError> {
    let (modeled, measured) =
        read_series(&args.file, &args.modeled, &args.measured).map_err(CliError::Compute)?;
    let stats = performance_stats(&modeled, &measured).map_err(CliError::Compute)?;
    if args.json {
        let json = serde_json::to_string_pretty(&stats)
            .context("failed to encode performance statistics")?;
        println!("{}", json);
        return Ok(0);
    }
    println!("Pairs compared: {}", stats.count);
    println!("MBD: {:.3} %", stats.mbd);
    println!("RMSE: {:.3} %", stats.rmse);
    println!("MBD_abs: {:.3}", stats.mbd_abs);
    println!("RMSE_abs: {:.3}", stats.rmse_abs);
    Ok(0)
}

pub(super) fn run_materials_command(args: MaterialsArgs) -> Result<i32, CliError> {
    let table = MaterialTable::load(&args.workdir.join(MATERIALS_DIR)).map_err(CliError::Compute)?;
    for name in table.names() {
        if let Some([r, g, b]) = table.lookup(name) {
            println!("{}\t{} {} {}", name, r, g, b);
        }
    }
    Ok(0)
}
