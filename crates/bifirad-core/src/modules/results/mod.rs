//! Irradiance result files: the per-sensor CSV written after each ray trace,
//! material-based cleaning and per-panel resampling.

mod tracker;

pub use tracker::{TrackerTotals, export_tracker_dict, load_tracker_dict};

use crate::common::constants::{BACK_FACE_TAG, DEFAULT_CLEAN_MATCHERS, FRONT_FACE_TAG, RATIO_EPSILON};
use crate::domain::{BifiError, SimResult};
use crate::modules::serialization::format_python_float;
use crate::numerics::resample_linear;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::debug;

pub const RESULTS_DIR: &str = "results";

const REAR_HEADER: [&str; 9] = [
    "x",
    "y",
    "z",
    "rearZ",
    "mattype",
    "rearMat",
    "Wm2Front",
    "Wm2Back",
    "Back/FrontRatio",
];
const FRONT_HEADER: [&str; 5] = ["x", "y", "z", "mattype", "Wm2"];

/// One sensor. Rear values are NaN (and `rear_mat` empty) for front-only files.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub rear_z: f64,
    pub mattype: String,
    pub rear_mat: String,
    pub wm2_front: f64,
    pub wm2_back: f64,
    pub back_ratio: f64,
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    x: f64,
    y: f64,
    z: f64,
    #[serde(rename = "rearZ", default)]
    rear_z: Option<f64>,
    mattype: String,
    #[serde(rename = "rearMat", default)]
    rear_mat: Option<String>,
    #[serde(rename = "Wm2Front", alias = "Wm2", default)]
    wm2_front: Option<f64>,
    #[serde(rename = "Wm2Back", default)]
    wm2_back: Option<f64>,
    #[serde(rename = "Back/FrontRatio", default)]
    back_ratio: Option<f64>,
}

impl From<CsvRow> for ResultRow {
    fn from(row: CsvRow) -> Self {
        let nan = f64::NAN;
        Self {
            x: row.x,
            y: row.y,
            z: row.z,
            rear_z: row.rear_z.unwrap_or(nan),
            mattype: row.mattype,
            rear_mat: row.rear_mat.unwrap_or_default(),
            wm2_front: row.wm2_front.unwrap_or(nan),
            wm2_back: row.wm2_back.unwrap_or(nan),
            back_ratio: row.back_ratio.unwrap_or(nan),
        }
    }
}

/// Contents of a `results/irr_<name>.csv` file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultTable {
    pub rows: Vec<ResultRow>,
    pub has_rear: bool,
}

fn csv_error(placeholder: &'static str, path: &Path, source: csv::Error) -> BifiError {
    if source.is_io_error() {
        BifiError::io_system(placeholder, format!("'{}': {}", path.display(), source))
    } else {
        BifiError::input_validation(
            "INPUT.RESULTS_FORMAT",
            format!("invalid results file '{}': {}", path.display(), source),
        )
    }
}

fn cell(value: f64) -> String {
    if value.is_nan() { String::new() } else { format_python_float(value) }
}

impl ResultTable {
    pub fn front_values(&self) -> Vec<f64> {
        self.rows.iter().map(|row| row.wm2_front).collect()
    }

    pub fn back_values(&self) -> Vec<f64> {
        self.rows.iter().map(|row| row.wm2_back).collect()
    }

    pub fn read(path: &Path) -> SimResult<Self> {
        let mut reader = csv::Reader::from_path(path)
            .map_err(|source| csv_error("IO.RESULTS_READ", path, source))?;
        let has_rear = reader
            .headers()
            .map_err(|source| csv_error("IO.RESULTS_READ", path, source))?
            .iter()
            .any(|header| header == "rearMat");
        let rows = reader
            .deserialize::<CsvRow>()
            .map(|row| row.map(ResultRow::from))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| csv_error("IO.RESULTS_READ", path, source))?;
        Ok(Self { rows, has_rear })
    }

    /// Writes the table; missing values are empty cells.
    pub fn write(&self, path: &Path) -> SimResult<()> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| {
                BifiError::io_system(
                    "IO.RESULTS_WRITE",
                    format!("failed to create '{}': {}", parent.display(), source),
                )
            })?;
        }
        let mut writer = csv::Writer::from_path(path)
            .map_err(|source| csv_error("IO.RESULTS_WRITE", path, source))?;
        let written = write_rows(&mut writer, self);
        written.map_err(|source| csv_error("IO.RESULTS_WRITE", path, source))?;
        writer.flush().map_err(|source| {
            BifiError::io_system(
                "IO.RESULTS_WRITE",
                format!("failed to flush '{}': {}", path.display(), source),
            )
        })
    }

    /// Pairs front and rear samples. The ratio carries a 1 mW/m2 guard on the
    /// front value.
    pub fn from_scans(front: &[RayValue], back: Option<&[RayValue]>) -> Self {
        let rows = front
            .iter()
            .enumerate()
            .map(|(index, ray)| {
                let rear = back.and_then(|back| back.get(index));
                let wm2_back = rear.map_or(f64::NAN, |rear| rear.wm2);
                ResultRow {
                    x: ray.x,
                    y: ray.y,
                    z: ray.z,
                    rear_z: rear.map_or(f64::NAN, |rear| rear.z),
                    mattype: ray.mattype.clone(),
                    rear_mat: rear.map(|rear| rear.mattype.clone()).unwrap_or_default(),
                    wm2_front: ray.wm2,
                    wm2_back,
                    back_ratio: wm2_back / (ray.wm2 + RATIO_EPSILON),
                }
            })
            .collect();
        Self {
            rows,
            has_rear: back.is_some(),
        }
    }
}

fn write_rows<W: std::io::Write>(writer: &mut csv::Writer<W>, table: &ResultTable) -> csv::Result<()> {
    if table.has_rear {
        writer.write_record(REAR_HEADER)?;
        for row in &table.rows {
            writer.write_record([
                cell(row.x),
                cell(row.y),
                cell(row.z),
                cell(row.rear_z),
                row.mattype.clone(),
                row.rear_mat.clone(),
                cell(row.wm2_front),
                cell(row.wm2_back),
                cell(row.back_ratio),
            ])?;
        }
    } else {
        writer.write_record(FRONT_HEADER)?;
        for row in &table.rows {
            writer.write_record([
                cell(row.x),
                cell(row.y),
                cell(row.z),
                row.mattype.clone(),
                cell(row.wm2_front),
            ])?;
        }
    }
    Ok(())
}

/// One traced ray: intersection point, RGB irradiance and the material hit.
#[derive(Debug, Clone, PartialEq)]
pub struct RayValue {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub mattype: String,
    pub wm2: f64,
}

pub fn read_result(path: &Path) -> SimResult<ResultTable> {
    ResultTable::read(path)
}

/// Nulls irradiance where the front or rear ray hit anything matching
/// `matchers` (sky, ground, racking, module edges).
pub fn clean_result(table: &mut ResultTable, matchers: Option<&[&str]>) {
    let matchers = matchers.unwrap_or(&DEFAULT_CLEAN_MATCHERS[..]);
    let hit = |material: &str| matchers.iter().any(|matcher| material.contains(matcher));
    for row in &mut table.rows {
        if hit(&row.mattype) {
            row.wm2_front = f64::NAN;
        }
        if hit(&row.rear_mat) {
            row.wm2_back = f64::NAN;
        }
    }
}

/// Keeps only sensors landing on module faces and resamples each panel to
/// `sensorsy / numpanels` points. Panels are returned in `a0, a1, ...` order.
pub fn deep_clean_result(
    table: &ResultTable,
    sensorsy: usize,
    numpanels: u32,
) -> SimResult<(Vec<f64>, Vec<f64>)> {
    if numpanels == 0 {
        return Err(BifiError::input_validation(
            "INPUT.RESULTS_PANELS",
            "numpanels must be at least 1",
        ));
    }
    let per_panel = sensorsy / numpanels as usize;
    let mut front = Vec::with_capacity(sensorsy);
    let mut back = Vec::with_capacity(sensorsy);
    for panel in 0..numpanels {
        let front_tag = format!("a{}.{}", panel, FRONT_FACE_TAG);
        let back_tag = format!("a{}.{}", panel, BACK_FACE_TAG);
        let kept: Vec<&ResultRow> = table
            .rows
            .iter()
            .filter(|row| row.mattype.contains(&front_tag) && row.rear_mat.contains(&back_tag))
            .collect();
        if kept.is_empty() {
            return Err(BifiError::input_validation(
                "INPUT.RESULTS_PANELS",
                format!("no sensors landed on both faces of panel a{}", panel),
            ));
        }
        debug!(panel, sensors = kept.len(), "deep clean kept sensors");
        let panel_front: Vec<f64> = kept.iter().map(|row| row.wm2_front).collect();
        let panel_back: Vec<f64> = kept.iter().map(|row| row.wm2_back).collect();
        front.extend(resample_linear(&panel_front, per_panel));
        back.extend(resample_linear(&panel_back, per_panel));
    }
    Ok((front, back))
}
