//! Stage executors: each turns a [`SimulationRequest`] into files under the
//! request's output directory.
//!
//! `Tracker`, `Sky`, `Scene` and `Simulate` read a JSON [`SimulationConfig`]
//! from the request's input path. `Compile` reads a `trackerdict.json` and
//! `Mismatch` a results directory.

mod config;
mod workspace;

pub use config::{SimulationConfig, SkyConfig, SkyMode, WeatherConfig};
pub use workspace::{MATERIALS_DIR, SimulationWorkspace};

use crate::domain::{BifiError, SimResult, SimulationArtifact, SimulationRequest, Stage};
use crate::modules::analysis::{analysis, analysis_1axis, module_analysis};
use crate::modules::engine::{RadianceEngine, make_octree};
use crate::modules::ground::{Ground, GroundInput};
use crate::modules::mismatch::{MismatchOptions, analyse_mismatch_folder, write_mismatch_csv};
use crate::modules::pvmodule::{MODULE_LIBRARY_FILE, PvModule};
use crate::modules::results::{RESULTS_DIR, export_tracker_dict, load_tracker_dict};
use crate::modules::scene::{Scene, make_scene_1axis};
use crate::modules::sky::{CumulativeWindow, gencumsky, gencumsky_1axis, gendaylit, gendaylit_1axis};
use crate::modules::tracker::{TRACKER_CSV_DIR, TRACKERDICT_FILE, TrackerDict, TrackerEntry, set_1axis};
use crate::modules::traits::StageExecutor;
use crate::modules::weather::{MetData, read_weather_file};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

const CUMULATIVE_SKY_NAME: &str = "cumulative";

fn expect_stage(request: &SimulationRequest, expected: Stage) -> SimResult<()> {
    if request.stage == expected {
        return Ok(());
    }
    Err(BifiError::input_validation(
        "INPUT.STAGE_MISMATCH",
        format!(
            "{} executor cannot run a {} request",
            expected, request.stage
        ),
    ))
}

fn prepare(request: &SimulationRequest) -> SimResult<(SimulationConfig, SimulationWorkspace)> {
    let config = SimulationConfig::load(&request.input_path)?;
    let workspace = SimulationWorkspace::create(&request.output_dir)?;
    info!(name = %config.name, stage = %request.stage, workdir = %request.output_dir.display(), "stage started");
    Ok((config, workspace))
}

fn read_weather(config: &SimulationConfig, cumulative_csv: Option<&Path>) -> SimResult<MetData> {
    read_weather_file(&config.weather.file, &config.weather.options, cumulative_csv)
}

/// Ground from the configuration, or from the weather file's albedo column.
fn build_ground(config: &SimulationConfig, met: &MetData, workspace: &SimulationWorkspace) -> SimResult<Ground> {
    let table = workspace.material_table()?;
    let input = match (&config.ground, &met.albedo) {
        (Some(input), _) => input.clone(),
        (None, Some(albedo)) => {
            info!("using the weather file albedo");
            GroundInput::Series(albedo.clone())
        }
        (None, None) => {
            return Err(BifiError::input_validation(
                "INPUT.GROUND_MISSING",
                "no ground in the config and no albedo in the weather file",
            ));
        }
    };
    Ground::new(&input, &table)
}

fn tracking_dict(config: &SimulationConfig, met: &MetData, workspace: &SimulationWorkspace) -> SimResult<TrackerDict> {
    let settings = config.tracking.clone().ok_or_else(|| {
        BifiError::input_validation(
            "INPUT.CONFIG_TRACKING",
            format!("config '{}' has no tracking section", config.name),
        )
    })?;
    set_1axis(met, &settings, workspace.root())
}

/// Skies for a fixed system: one cumulative sky, or the gendaylit sky of the
/// first hour with daylight.
fn fixed_sky(
    engine: &dyn RadianceEngine,
    config: &SimulationConfig,
    workspace: &SimulationWorkspace,
) -> SimResult<PathBuf> {
    if config.is_cumulative() {
        let csvfile = Path::new(TRACKER_CSV_DIR).join(format!("{}.csv", CUMULATIVE_SKY_NAME));
        let met = read_weather(config, Some(&workspace.root().join(&csvfile)))?;
        let ground = build_ground(config, &met, workspace)?;
        let sky = gencumsky(
            engine,
            workspace.root(),
            &met,
            &ground,
            &csvfile,
            CUMULATIVE_SKY_NAME,
            &CumulativeWindow::default(),
        )?;
        return Ok(sky);
    }
    let met = read_weather(config, None)?;
    let ground = build_ground(config, &met, workspace)?;
    for index in 0..met.len() {
        if let Some(sky) = gendaylit(workspace.root(), &met, index, &ground)? {
            info!(time = %met.time_key(index), "using the first daylit hour");
            return Ok(sky);
        }
    }
    Err(BifiError::computation(
        "RUN.SKY_NONE",
        "no hour in the selected weather has diffuse light",
    ))
}

/// Tracker dictionary with a sky per entry.
fn tracking_skies(
    engine: &dyn RadianceEngine,
    config: &SimulationConfig,
    workspace: &SimulationWorkspace,
) -> SimResult<TrackerDict> {
    let met = read_weather(config, None)?;
    let ground = build_ground(config, &met, workspace)?;
    let mut trackerdict = tracking_dict(config, &met, workspace)?;
    if trackerdict.cumulativesky {
        gencumsky_1axis(engine, workspace.root(), &met, &ground, &mut trackerdict)?;
    } else {
        gendaylit_1axis(workspace.root(), &met, &ground, &mut trackerdict, None, None)?;
    }
    Ok(trackerdict)
}

fn compile_module(config: &SimulationConfig, workspace: &SimulationWorkspace) -> SimResult<PvModule> {
    let module = config.module.compile()?;
    module.save(workspace.root())?;
    Ok(module)
}

fn save_trackerdict(trackerdict: &TrackerDict, workspace: &SimulationWorkspace) -> SimResult<SimulationArtifact> {
    trackerdict.save(&workspace.root().join(TRACKERDICT_FILE))?;
    Ok(SimulationArtifact::new(TRACKERDICT_FILE))
}

fn entry_artifacts<'a>(
    trackerdict: &'a TrackerDict,
    field: impl Fn(&'a TrackerEntry) -> Option<&'a PathBuf>,
) -> impl Iterator<Item = SimulationArtifact> {
    trackerdict
        .entries
        .iter()
        .filter_map(field)
        .map(SimulationArtifact::new)
}

/// Builds the tracker dictionary and its per-bucket weather files.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrackerStage;

impl StageExecutor for TrackerStage {
    fn execute(&self, request: &SimulationRequest) -> SimResult<Vec<SimulationArtifact>> {
        expect_stage(request, Stage::Tracker)?;
        let (config, workspace) = prepare(request)?;
        let met = read_weather(&config, None)?;
        let trackerdict = tracking_dict(&config, &met, &workspace)?;
        let mut artifacts = vec![save_trackerdict(&trackerdict, &workspace)?];
        artifacts.extend(entry_artifacts(&trackerdict, |entry| entry.csvfile.as_ref()));
        Ok(artifacts)
    }
}

/// Writes skies: one for a fixed system, one per tracker entry otherwise.
#[derive(Debug, Clone, Default)]
pub struct SkyStage<E> {
    engine: E,
}

impl<E: RadianceEngine> SkyStage<E> {
    pub fn new(engine: E) -> Self {
        Self { engine }
    }
}

impl<E: RadianceEngine> StageExecutor for SkyStage<E> {
    fn execute(&self, request: &SimulationRequest) -> SimResult<Vec<SimulationArtifact>> {
        expect_stage(request, Stage::Sky)?;
        let (config, workspace) = prepare(request)?;
        if !config.is_tracking() {
            let sky = fixed_sky(&self.engine, &config, &workspace)?;
            return Ok(vec![SimulationArtifact::new(sky)]);
        }
        let trackerdict = tracking_skies(&self.engine, &config, &workspace)?;
        let mut artifacts = vec![save_trackerdict(&trackerdict, &workspace)?];
        artifacts.extend(entry_artifacts(&trackerdict, |entry| entry.skyfile.as_ref()));
        Ok(artifacts)
    }
}

/// Writes the module, `module.json` and the scene files. Tracking scenes use
/// the saved `trackerdict.json` when there is one.
#[derive(Debug, Clone, Copy, Default)]
pub struct SceneStage;

impl StageExecutor for SceneStage {
    fn execute(&self, request: &SimulationRequest) -> SimResult<Vec<SimulationArtifact>> {
        expect_stage(request, Stage::Scene)?;
        let (config, workspace) = prepare(request)?;
        let module = compile_module(&config, &workspace)?;
        let mut artifacts = vec![
            SimulationArtifact::new(&module.modulefile),
            SimulationArtifact::new(MODULE_LIBRARY_FILE),
        ];
        if !config.is_tracking() {
            let scene = Scene::new(&module, &config.scene, None)?;
            artifacts.push(SimulationArtifact::new(scene.save(workspace.root())?));
            return Ok(artifacts);
        }

        let saved = workspace.root().join(TRACKERDICT_FILE);
        let mut trackerdict = if saved.is_file() {
            TrackerDict::load(&saved)?
        } else {
            let met = read_weather(&config, None)?;
            tracking_dict(&config, &met, &workspace)?
        };
        make_scene_1axis(workspace.root(), &module, &config.scene, &mut trackerdict)?;
        artifacts.push(save_trackerdict(&trackerdict, &workspace)?);
        artifacts.extend(entry_artifacts(&trackerdict, |entry| entry.radfile.as_ref()));
        Ok(artifacts)
    }
}

/// Runs the whole pipeline: skies, module and scenes, octrees, ray tracing
/// and result files. Tracking runs also write `<name>_summary.csv`.
#[derive(Debug, Clone, Default)]
pub struct SimulateStage<E> {
    engine: E,
}

impl<E: RadianceEngine> SimulateStage<E> {
    pub fn new(engine: E) -> Self {
        Self { engine }
    }

    fn simulate_fixed(
        &self,
        config: &SimulationConfig,
        workspace: &SimulationWorkspace,
        module: &PvModule,
    ) -> SimResult<Vec<SimulationArtifact>> {
        let root = workspace.root();
        let sky = fixed_sky(&self.engine, config, workspace)?;
        let scene = Scene::new(module, &config.scene, None)?;
        let radfile = scene.save(root)?;
        let files = [Some(workspace.material_file()), Some(sky.clone()), Some(radfile.clone())];
        let octfile = make_octree(&self.engine, root, &files, &config.name)?.ok_or_else(|| {
            BifiError::computation(
                "RUN.OCTREE_MISSING",
                format!("octree for '{}' could not be built", config.name),
            )
        })?;
        let (front, back) = module_analysis(&scene, &config.analysis)?;
        let result = analysis(
            &self.engine,
            root,
            &octfile,
            &config.name,
            &front,
            Some(&back),
            config.analysis.accuracy,
        )?;
        Ok(vec![
            SimulationArtifact::new(sky),
            SimulationArtifact::new(radfile),
            SimulationArtifact::new(octfile),
            SimulationArtifact::new(result.path),
        ])
    }

    fn simulate_tracking(
        &self,
        config: &SimulationConfig,
        workspace: &SimulationWorkspace,
        module: &PvModule,
    ) -> SimResult<Vec<SimulationArtifact>> {
        let root = workspace.root();
        let mut trackerdict = tracking_skies(&self.engine, config, workspace)?;
        make_scene_1axis(root, module, &config.scene, &mut trackerdict)?;
        let material = workspace.material_file();
        for entry in &mut trackerdict.entries {
            let files = [Some(material.clone()), entry.skyfile.clone(), entry.radfile.clone()];
            entry.octfile = make_octree(&self.engine, root, &files, &format!("1axis_{}", entry.key))?;
        }
        let totals = analysis_1axis(
            &self.engine,
            root,
            module,
            &config.scene,
            &mut trackerdict,
            &config.analysis,
            "",
        )?;
        info!(indices = totals.numfiles, "tracking simulation finished");

        let summary = format!("{}_summary.csv", config.name);
        export_tracker_dict(&trackerdict, &root.join(&summary), !trackerdict.cumulativesky)?;
        let mut artifacts = vec![save_trackerdict(&trackerdict, workspace)?, SimulationArtifact::new(summary)];
        artifacts.extend(entry_artifacts(&trackerdict, |entry| entry.octfile.as_ref()));
        Ok(artifacts)
    }
}

impl<E: RadianceEngine> StageExecutor for SimulateStage<E> {
    fn execute(&self, request: &SimulationRequest) -> SimResult<Vec<SimulationArtifact>> {
        expect_stage(request, Stage::Simulate)?;
        let (config, workspace) = prepare(request)?;
        let module = compile_module(&config, &workspace)?;
        let mut artifacts = vec![
            SimulationArtifact::new(&module.modulefile),
            SimulationArtifact::new(MODULE_LIBRARY_FILE),
        ];
        if config.is_tracking() {
            artifacts.extend(self.simulate_tracking(&config, &workspace, &module)?);
        } else {
            artifacts.extend(self.simulate_fixed(&config, &workspace, &module)?);
        }
        Ok(artifacts)
    }
}

/// Loads tracker results into a `trackerdict.json` and exports
/// `<name>.csv` to the output directory.
#[derive(Debug, Clone, Default)]
pub struct CompileStage {
    /// Defaults to `results/` beside the tracker dictionary.
    pub results_dir: Option<PathBuf>,
    pub reindex: bool,
}

impl StageExecutor for CompileStage {
    fn execute(&self, request: &SimulationRequest) -> SimResult<Vec<SimulationArtifact>> {
        expect_stage(request, Stage::Compile)?;
        let mut trackerdict = TrackerDict::load(&request.input_path)?;
        let results_dir = self.results_dir.clone().unwrap_or_else(|| {
            request
                .input_path
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join(RESULTS_DIR)
        });
        let totals = load_tracker_dict(&results_dir, &mut trackerdict, None)?;
        info!(files = totals.numfiles, "compiled tracker results");

        create_output_dir(&request.output_dir)?;
        let summary = format!("{}.csv", request.name);
        export_tracker_dict(&trackerdict, &request.output_dir.join(&summary), self.reindex)?;
        Ok(vec![SimulationArtifact::new(summary)])
    }
}

/// Mismatch statistics of every results file in the input directory, written
/// to `<name>.csv`.
#[derive(Debug, Clone, Default)]
pub struct MismatchStage {
    pub options: MismatchOptions,
}

impl StageExecutor for MismatchStage {
    fn execute(&self, request: &SimulationRequest) -> SimResult<Vec<SimulationArtifact>> {
        expect_stage(request, Stage::Mismatch)?;
        let rows = analyse_mismatch_folder(&request.input_path, &self.options)?;
        create_output_dir(&request.output_dir)?;
        let output = format!("{}.csv", request.name);
        write_mismatch_csv(&request.output_dir.join(&output), &rows)?;
        Ok(vec![SimulationArtifact::new(output)])
    }
}

fn create_output_dir(dir: &Path) -> SimResult<()> {
    fs::create_dir_all(dir).map_err(|source| {
        BifiError::io_system(
            "IO.OUTPUT_DIRECTORY",
            format!("failed to create output directory '{}': {}", dir.display(), source),
        )
    })
}
