//! Sensor placement along a module's collector width and the rtrace line
//! scans that sample front and rear irradiance there.

use crate::common::constants::{
    CENTER_INDEX_DIVISOR, DEFAULT_BACK_SURFACE_OFFSET, DEFAULT_FRONT_SURFACE_OFFSET,
};
use crate::domain::{BifiError, SimResult};
use crate::modules::engine::RadianceEngine;
use crate::modules::pvmodule::PvModule;
use crate::modules::results::{RESULTS_DIR, RayValue, ResultTable, TrackerTotals};
use crate::modules::scene::{Scene, SceneDefinition, center_index, tracker_scene, tracking_hub_height};
use crate::modules::serialization::format_python_float;
use crate::modules::tracker::TrackerDict;
use crate::modules::weather::solpos::deg_to_rad;
use crate::numerics::mean;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Ambient settings handed to rtrace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Accuracy {
    #[default]
    Low,
    High,
}

impl FromStr for Accuracy {
    type Err = BifiError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "high" => Ok(Self::High),
            other => Err(BifiError::input_validation(
                "INPUT.ANALYSIS_ACCURACY",
                format!("invalid accuracy '{}'; valid inputs: low or high", other),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisOptions {
    /// Module to sample, counting from 1. Defaults to the centre module.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mod_wanted: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_wanted: Option<u32>,
    pub sensorsy: usize,
    pub accuracy: Accuracy,
    #[serde(rename = "frontsurfaceoffset")]
    pub front_offset: f64,
    #[serde(rename = "backsurfaceoffset")]
    pub back_offset: f64,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            mod_wanted: None,
            row_wanted: None,
            sensorsy: 9,
            accuracy: Accuracy::Low,
            front_offset: DEFAULT_FRONT_SURFACE_OFFSET,
            back_offset: DEFAULT_BACK_SURFACE_OFFSET,
        }
    }
}

/// Straight line of sensors, all looking along `orient`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanDefinition {
    pub xstart: f64,
    pub ystart: f64,
    pub zstart: f64,
    pub xinc: f64,
    pub yinc: f64,
    pub zinc: f64,
    pub sensors: usize,
    pub orient: String,
}

impl ScanDefinition {
    pub fn points(&self) -> Vec<[f64; 3]> {
        (0..self.sensors)
            .map(|index| {
                let step = index as f64;
                [
                    self.xstart + step * self.xinc,
                    self.ystart + step * self.yinc,
                    self.zstart + step * self.zinc,
                ]
            })
            .collect()
    }

    /// rtrace input: `x y z dx dy dz` per sensor, carriage-return separated.
    pub fn linepts(&self) -> String {
        self.points()
            .iter()
            .map(|[x, y, z]| {
                format!(
                    "{} {} {} {} \r",
                    format_python_float(*x),
                    format_python_float(*y),
                    format_python_float(*z),
                    self.orient
                )
            })
            .collect()
    }
}

/// Coordinate the scan mostly advances along.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanAxis {
    X,
    Y,
    Z,
}

/// Classifies which coordinate a scan advances along. [`module_analysis`]
/// projects the collector width onto all three axes at once, so its
/// increments already cover each case; this only labels the result.
pub fn scan_axis(tilt: f64, azimuth: f64) -> ScanAxis {
    if tilt > 60.0 {
        ScanAxis::Z
    } else if deg_to_rad(azimuth).tan().abs() <= 1.0 {
        ScanAxis::Y
    } else {
        ScanAxis::X
    }
}

fn wanted_index(requested: Option<u32>, count: u32, what: &str) -> f64 {
    match requested {
        None => center_index(count, CENTER_INDEX_DIVISOR),
        Some(0) => {
            warn!(what, "modules and rows start at index 1; reindexing to 1");
            1.0
        }
        Some(index) => f64::from(index),
    }
}

fn orientation(x: f64, y: f64, z: f64) -> String {
    format!("{:.3} {:.3} {:.3}", x, y, z)
}

/// Front and rear sensor lines across the chosen module of `scene`.
pub fn module_analysis(scene: &Scene, options: &AnalysisOptions) -> SimResult<(ScanDefinition, ScanDefinition)> {
    if options.sensorsy == 0 {
        return Err(BifiError::input_validation(
            "INPUT.ANALYSIS_SENSORS",
            "sensorsy must be a positive number of sensors",
        ));
    }
    let def = &scene.definition;
    let sind = |angle: f64| deg_to_rad(angle).sin();
    let cosd = |angle: f64| deg_to_rad(angle).cos();
    let (tilt, azimuth) = (def.tilt, def.azimuth);
    let (scenex, sceney) = (scene.module.scenex, scene.module.sceney);
    let offset = scene.module.offsetfromaxis;
    let modulez = scene.module.z();
    let pitch = scene.pitch;

    let mod_wanted = wanted_index(options.mod_wanted, def.n_mods, "module");
    let row_wanted = wanted_index(options.row_wanted, def.n_rows, "row");

    let x0 = (mod_wanted - 1.0) * scenex
        - scenex * (center_index(def.n_mods, CENTER_INDEX_DIVISOR) - 1.0);
    let y0 = (row_wanted - 1.0) * pitch
        - pitch * (center_index(def.n_rows, CENTER_INDEX_DIVISOR) - 1.0);
    let x1 = x0 * cosd(180.0 - azimuth) - y0 * sind(180.0 - azimuth);
    let y1 = x0 * sind(180.0 - azimuth) + y0 * cosd(180.0 - azimuth);
    let z1 = if def.axis_tilt != 0.0 && azimuth == 90.0 {
        debug!(axis_tilt = def.axis_tilt, "raising sensors for axis tilt");
        (mod_wanted - 1.0) * scenex * sind(def.axis_tilt)
    } else {
        0.0
    };

    // lower edge of the module
    let x2 = sceney / 2.0 * cosd(tilt) * sind(azimuth);
    let y2 = sceney / 2.0 * cosd(tilt) * cosd(azimuth);
    let z2 = -sceney / 2.0 * sind(tilt);

    let normal = [sind(tilt) * sind(azimuth), sind(tilt) * cosd(azimuth), cosd(tilt)];
    let front_shift = offset + modulez + options.front_offset;
    let back_shift = offset - options.back_offset;

    let spacing = sceney / (options.sensorsy as f64 + 1.0);
    let xinc = -spacing * cosd(tilt) * sind(azimuth);
    let yinc = -spacing * cosd(tilt) * cosd(azimuth);
    let zinc = spacing * sind(tilt);

    let scan = |shift: f64, orient: String| ScanDefinition {
        xstart: x1 + x2 + shift * normal[0] + def.originx + xinc,
        ystart: y1 + y2 + shift * normal[1] + def.originy + yinc,
        zstart: scene.hub_height + z1 + z2 + shift * normal[2] + zinc,
        xinc,
        yinc,
        zinc,
        sensors: options.sensorsy,
        orient,
    };
    let front = scan(front_shift, orientation(-normal[0], -normal[1], -normal[2]));
    let back = scan(back_shift, orientation(normal[0], normal[1], normal[2]));
    debug!(
        mod_wanted,
        row_wanted,
        axis = ?scan_axis(tilt, azimuth),
        front_z = front.zstart,
        back_z = back.zstart,
        "sensor lines"
    );
    Ok((front, back))
}

pub fn rtrace_args(accuracy: Accuracy) -> Vec<String> {
    let ambient: [&str; 10] = match accuracy {
        Accuracy::Low => ["-ab", "2", "-aa", ".1", "-ar", "256", "-ad", "2048", "-as", "256"],
        Accuracy::High => ["-ab", "5", "-aa", ".08", "-ar", "512", "-ad", "2048", "-as", "512"],
    };
    std::iter::once("-i")
        .chain(ambient)
        .chain(["-h", "-oovs"])
        .map(str::to_string)
        .collect()
}

/// Reads `x y z r g b material` rows as printed by `rtrace -oovs`.
pub fn parse_rtrace(stdout: &str) -> SimResult<Vec<RayValue>> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let fields: Vec<&str> = line.trim_end_matches('\r').split('\t').collect();
            let invalid = || {
                BifiError::computation(
                    "RUN.RTRACE_FORMAT",
                    format!("unexpected rtrace output line '{}'", line),
                )
            };
            if fields.len() < 7 {
                return Err(invalid());
            }
            let mut numbers = [0.0; 6];
            for (slot, field) in numbers.iter_mut().zip(&fields[..6]) {
                *slot = field.trim().parse::<f64>().map_err(|_| invalid())?;
            }
            let [x, y, z, r, g, b] = numbers;
            Ok(RayValue {
                x,
                y,
                z,
                r,
                g,
                b,
                mattype: fields[6].trim().to_string(),
                wm2: (r + g + b) / 3.0,
            })
        })
        .collect()
}

/// Traces one sensor line through `octfile`.
pub fn irradiance_scan(
    engine: &dyn RadianceEngine,
    workdir: &Path,
    octfile: &Path,
    scan: &ScanDefinition,
    accuracy: Accuracy,
) -> SimResult<Vec<RayValue>> {
    let output = engine.rtrace(workdir, &rtrace_args(accuracy), octfile, &scan.linepts())?;
    let stderr = output.stderr.trim();
    if stderr.starts_with("error") {
        return Err(BifiError::computation(
            "RUN.RTRACE",
            format!("rtrace failed on '{}': {}", octfile.display(), stderr),
        ));
    }
    if !stderr.is_empty() {
        warn!(octree = %octfile.display(), stderr, "rtrace reported a problem");
    }
    let rays = parse_rtrace(&output.stdout)?;
    if rays.is_empty() {
        warn!(octree = %octfile.display(), "rtrace returned no rays");
    }
    Ok(rays)
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    pub front: Vec<RayValue>,
    pub back: Option<Vec<RayValue>>,
    pub table: ResultTable,
    /// Results file relative to the working directory.
    pub path: PathBuf,
}

/// Scans front and optionally rear sensors and writes `results/irr_<name>.csv`.
pub fn analysis(
    engine: &dyn RadianceEngine,
    workdir: &Path,
    octfile: &Path,
    name: &str,
    front: &ScanDefinition,
    back: Option<&ScanDefinition>,
    accuracy: Accuracy,
) -> SimResult<AnalysisResult> {
    info!(name, "linescan in process");
    let front_rays = irradiance_scan(engine, workdir, octfile, front, accuracy)?;
    let back_rays = back
        .map(|scan| irradiance_scan(engine, workdir, octfile, scan, accuracy))
        .transpose()?;
    let table = ResultTable::from_scans(&front_rays, back_rays.as_deref());
    let path = Path::new(RESULTS_DIR).join(format!("irr_{}.csv", name));
    table.write(&workdir.join(&path))?;
    info!(path = %path.display(), "saved results");
    Ok(AnalysisResult {
        front: front_rays,
        back: back_rays,
        table,
        path,
    })
}

/// Runs [`analysis`] for every tracker entry with an octree, storing the
/// per-sensor values on the entry. Failed entries are skipped with a warning.
///
/// The summed values are also written to `cumulative_results_<customname>.csv`
/// using the sensor positions of the first analysed entry.
pub fn analysis_1axis(
    engine: &dyn RadianceEngine,
    workdir: &Path,
    module: &PvModule,
    scene_definition: &SceneDefinition,
    trackerdict: &mut TrackerDict,
    options: &AnalysisOptions,
    customname: &str,
) -> SimResult<TrackerTotals> {
    let hub_height = tracking_hub_height(scene_definition)?;
    let mut totals = TrackerTotals {
        wm2_front: Vec::new(),
        wm2_back: Vec::new(),
        numfiles: 0,
        finalkey: None,
    };
    let mut first: Option<AnalysisResult> = None;

    for entry in &mut trackerdict.entries {
        let Some(octfile) = entry.octfile.clone() else {
            continue;
        };
        let name = format!("1axis_{}{}", entry.key, customname);
        let mut scratch = entry.clone();
        let outcome = tracker_scene(module, scene_definition, hub_height, &mut scratch)
            .and_then(|scene| module_analysis(&scene, options))
            .and_then(|(front, back)| {
                analysis(engine, workdir, &octfile, &name, &front, Some(&back), options.accuracy)
            });
        let result = match outcome {
            Ok(result) if result.front.is_empty() => {
                warn!(key = %entry.key, "no irradiance traced for tracker index; skipping");
                continue;
            }
            Ok(result) => result,
            Err(error) => {
                warn!(key = %entry.key, %error, "problem with tracker index; skipping");
                continue;
            }
        };

        entry.wm2_front = result.table.front_values();
        entry.wm2_back = result.table.back_values();
        entry.back_ratio = result.table.rows.iter().map(|row| row.back_ratio).collect();
        info!(
            key = %entry.key,
            front = mean(&entry.wm2_front),
            back = mean(&entry.wm2_back),
            "analysed tracker index"
        );

        if totals.numfiles == 0 {
            totals.wm2_front = entry.wm2_front.clone();
            totals.wm2_back = entry.wm2_back.clone();
        } else if totals.wm2_front.len() == entry.wm2_front.len() {
            for (total, value) in totals.wm2_front.iter_mut().zip(&entry.wm2_front) {
                *total += value;
            }
            for (total, value) in totals.wm2_back.iter_mut().zip(&entry.wm2_back) {
                *total += value;
            }
        } else {
            warn!(key = %entry.key, "sensor count differs from earlier indices; not accumulated");
        }
        totals.numfiles += 1;
        totals.finalkey = Some(entry.key.clone());
        if first.is_none() {
            first = Some(result);
        }
    }

    let Some(first) = first else {
        return Err(BifiError::computation(
            "RUN.ANALYSIS_EMPTY",
            "no tracker index could be analysed",
        ));
    };
    let with_totals = |rays: &[RayValue], values: &[f64]| -> Vec<RayValue> {
        rays.iter()
            .zip(values)
            .map(|(ray, value)| RayValue {
                wm2: *value,
                ..ray.clone()
            })
            .collect()
    };
    let front = with_totals(&first.front, &totals.wm2_front);
    let back = first.back.as_deref().map(|rays| with_totals(rays, &totals.wm2_back));
    let cumulative = ResultTable::from_scans(&front, back.as_deref());
    let path = workdir.join(format!("cumulative_results_{}.csv", customname));
    cumulative.write(&path)?;
    info!(
        path = %path.display(),
        indices = totals.numfiles,
        "saved cumulative results; these are not cleaned of tube or gap hits"
    );
    Ok(totals)
}
