//! Irradiance non-uniformity across a module and the electrical mismatch
//! loss estimated from it.
//!
//! Per-sensor results are resampled onto the cell rows of a 72- or 96-cell
//! module, and the mean absolute deviation of the plane-of-array total is
//! mapped to a loss with a quadratic empirical fit.

use crate::common::constants::{
    DARK_IRRADIANCE_THRESHOLD, MISMATCH_ALT_FIT_LINEAR, MISMATCH_ALT_FIT_QUADRATIC,
    MISMATCH_FIT_LINEAR, MISMATCH_FIT_QUADRATIC,
};
use crate::domain::{BifiError, SimResult};
use crate::modules::results::{deep_clean_result, read_result};
use crate::modules::serialization::format_python_float;
use crate::numerics::{interp, mean, nanmean, sample_std};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

/// Mean absolute deviation over all value pairs, relative to the mean, in percent.
pub fn mad(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let total: f64 = values
        .iter()
        .map(|a| values.iter().map(|b| (a - b).abs()).sum::<f64>())
        .sum();
    total / (n * n) / mean(values) * 100.0
}

/// Mismatch loss in percent: `0.142*MAD + 0.032*MAD^2`.
pub fn mismatch_fit(values: &[f64]) -> f64 {
    let m = mad(values);
    MISMATCH_FIT_LINEAR * m + MISMATCH_FIT_QUADRATIC * m * m
}

/// Alternate fit: `0.054*MAD + 0.068*MAD^2`.
pub fn mismatch_fit_alt(values: &[f64]) -> f64 {
    let m = mad(values);
    MISMATCH_ALT_FIT_LINEAR * m + MISMATCH_ALT_FIT_QUADRATIC * m * m
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

impl FromStr for Orientation {
    type Err = BifiError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "portrait" => Ok(Self::Portrait),
            "landscape" => Ok(Self::Landscape),
            other => Err(BifiError::input_validation(
                "INPUT.MISMATCH_ORIENTATION",
                format!("invalid orientation '{}'; valid inputs: portrait or landscape", other),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Downsampling {
    #[default]
    #[serde(rename = "byCenter")]
    ByCenter,
    #[serde(rename = "byAverage")]
    ByAverage,
}

impl FromStr for Downsampling {
    type Err = BifiError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "bycenter" => Ok(Self::ByCenter),
            "byaverage" => Ok(Self::ByAverage),
            other => Err(BifiError::input_validation(
                "INPUT.MISMATCH_METHOD",
                format!("invalid downsampling method '{}'; valid inputs: byCenter or byAverage", other),
            )),
        }
    }
}

/// Cell numbering of a module: `positions[row][column]` is the position of
/// that cell along the series string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellLayout {
    pub positions: Vec<Vec<usize>>,
}

impl CellLayout {
    pub fn cells_x(&self) -> usize {
        self.positions.first().map_or(0, Vec::len)
    }

    pub fn cells_y(&self) -> usize {
        self.positions.len()
    }

    fn transpose(&self) -> Self {
        let positions = (0..self.cells_x())
            .map(|column| self.positions.iter().map(|row| row[column]).collect())
            .collect();
        Self { positions }
    }
}

const PORTRAIT_ROWS: usize = 12;

/// Interconnect table of a 72- or 96-cell module. In portrait the string runs
/// down and up alternate columns of twelve cells; landscape is the transpose.
pub fn cell_layout(orientation: Orientation, numcells: usize) -> SimResult<CellLayout> {
    if numcells != 72 && numcells != 96 {
        return Err(BifiError::input_validation(
            "INPUT.MISMATCH_CELLS",
            format!("only 72 and 96 cell modules are supported, got {}", numcells),
        ));
    }
    let columns = numcells / PORTRAIT_ROWS;
    let positions = (0..PORTRAIT_ROWS)
        .map(|row| {
            (0..columns)
                .map(|column| {
                    let along = if column % 2 == 0 { row } else { PORTRAIT_ROWS - 1 - row };
                    column * PORTRAIT_ROWS + along
                })
                .collect()
        })
        .collect();
    let portrait = CellLayout { positions };
    Ok(match orientation {
        Orientation::Portrait => portrait,
        Orientation::Landscape => portrait.transpose(),
    })
}

/// Start indices of the cell strides over `len` sensors, with the leftover
/// sensors split between both edges. Has `cellsy + 1` entries.
fn stride_starts(len: usize, cellsy: usize) -> (Vec<usize>, usize) {
    let step = len / cellsy;
    let edges = len - step * cellsy;
    let edge1 = edges / 2;
    let edge2 = edges - edge1;
    let stop = len + 1 - edge2;
    ((edge1..stop).step_by(step.max(1)).collect(), step)
}

/// Picks the sensor at the centre of each cell stride.
pub fn downsample_by_center(values: &[f64], cellsy: usize) -> Vec<f64> {
    let (starts, step) = stride_starts(values.len(), cellsy);
    starts
        .iter()
        .take(starts.len().saturating_sub(1))
        .map(|start| values.get(start + step / 2).copied().unwrap_or(f64::NAN))
        .collect()
}

/// Averages the sensors of each cell stride, skipping masked values.
pub fn downsample_by_average(values: &[f64], cellsy: usize) -> Vec<f64> {
    let (starts, _) = stride_starts(values.len(), cellsy);
    starts
        .windows(2)
        .map(|pair| nanmean(&values[pair[0]..pair[1].min(values.len())]))
        .collect()
}

/// Interpolates sensors onto the centre of each of `cellsy` equal cells.
pub fn upsample_by_interpolation(values: &[f64], cellsy: usize) -> Vec<f64> {
    let sensors = values.len() as f64;
    let cells = cellsy as f64;
    let xp: Vec<f64> = (0..values.len()).map(|index| index as f64).collect();
    (0..cellsy)
        .map(|cell| {
            let i = cell as f64;
            let center = (i * sensors / cells + (i + 1.0) * sensors / cells) / 2.0;
            interp(center, &xp, values)
        })
        .collect()
}

pub fn resample_to_cells(values: &[f64], cellsy: usize, method: Downsampling) -> Vec<f64> {
    use std::cmp::Ordering;
    match values.len().cmp(&cellsy) {
        Ordering::Greater => match method {
            Downsampling::ByCenter => downsample_by_center(values, cellsy),
            Downsampling::ByAverage => downsample_by_average(values, cellsy),
        },
        Ordering::Less => upsample_by_interpolation(values, cellsy),
        Ordering::Equal => values.to_vec(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MismatchOptions {
    #[serde(rename = "portraitorlandscape")]
    pub orientation: Orientation,
    #[serde(rename = "bififactor")]
    pub bifi: f64,
    pub numcells: usize,
    #[serde(rename = "downsamplingmethod")]
    pub method: Downsampling,
}

impl Default for MismatchOptions {
    fn default() -> Self {
        Self {
            orientation: Orientation::Portrait,
            bifi: 1.0,
            numcells: 72,
            method: Downsampling::ByCenter,
        }
    }
}

/// Irradiance statistics of one results file, resampled to cell rows.
#[derive(Debug, Clone, PartialEq)]
pub struct MismatchRow {
    pub file: String,
    /// Fitted loss of the total irradiance, in percent. Zero for a dark module.
    pub mismatch: f64,
    pub front_mismatch: f64,
    pub mad_total: f64,
    pub front_mad: f64,
    pub poat: f64,
    pub gfront: f64,
    pub grear: f64,
    pub bifi_ratio: f64,
    pub stdev: f64,
    pub poat_cells: Vec<f64>,
    pub front_cells: Vec<f64>,
    pub back_cells: Vec<f64>,
}

fn fitted_loss(irradiance: &[f64]) -> f64 {
    // the dark threshold applies to suns (kW/m2)
    if mean(irradiance) / 1000.0 < DARK_IRRADIANCE_THRESHOLD {
        0.0
    } else {
        mismatch_fit(irradiance)
    }
}

impl MismatchRow {
    pub fn from_cells(file: impl Into<String>, front_cells: Vec<f64>, back_cells: Vec<f64>) -> Self {
        let poat_cells: Vec<f64> = front_cells.iter().zip(&back_cells).map(|(f, b)| f + b).collect();
        let poat = nanmean(&poat_cells);
        let gfront = nanmean(&front_cells);
        let grear = nanmean(&back_cells);
        let finite: Vec<f64> = poat_cells.iter().copied().filter(|v| !v.is_nan()).collect();
        Self {
            file: file.into(),
            mismatch: fitted_loss(&poat_cells),
            front_mismatch: fitted_loss(&front_cells),
            mad_total: mad(&poat_cells),
            front_mad: mad(&front_cells),
            poat,
            gfront,
            grear,
            bifi_ratio: grear / gfront,
            stdev: sample_std(&finite) / poat,
            poat_cells,
            front_cells,
            back_cells,
        }
    }
}

fn csv_files(results_dir: &Path) -> SimResult<Vec<PathBuf>> {
    let entries = fs::read_dir(results_dir).map_err(|source| {
        BifiError::io_system(
            "IO.RESULTS_DIR",
            format!("failed to list '{}': {}", results_dir.display(), source),
        )
    })?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Deep-cleans every results CSV in `results_dir`, applies bifaciality to the
/// rear, resamples onto cell rows and computes per-file mismatch statistics.
///
/// The sensor count of the first file sets the deep-clean resolution.
pub fn analyse_mismatch_folder(results_dir: &Path, options: &MismatchOptions) -> SimResult<Vec<MismatchRow>> {
    let layout = cell_layout(options.orientation, options.numcells)?;
    let cellsy = layout.cells_y();
    let files = csv_files(results_dir)?;
    let Some(first) = files.first() else {
        return Err(BifiError::input_validation(
            "INPUT.MISMATCH_EMPTY",
            format!("no results files in '{}'", results_dir.display()),
        ));
    };
    let sensorsy = read_result(first)?.rows.len();
    info!(files = files.len(), sensorsy, cellsy, "mismatch analysis");
    if sensorsy == cellsy {
        debug!("sensor count matches the cell rows; no resampling");
    }

    files
        .iter()
        .map(|path| {
            let table = read_result(path)?;
            let (front, back) = deep_clean_result(&table, sensorsy, 1)?;
            let back: Vec<f64> = back.iter().map(|value| value * options.bifi).collect();
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            Ok(MismatchRow::from_cells(
                name,
                resample_to_cells(&front, cellsy, options.method),
                resample_to_cells(&back, cellsy, options.method),
            ))
        })
        .collect()
}

fn cell(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else {
        format_python_float(value)
    }
}

/// Writes one row per results file with the statistics followed by the
/// per-cell POAT, front and rear irradiance.
pub fn write_mismatch_csv(path: &Path, rows: &[MismatchRow]) -> SimResult<()> {
    let write_error = |source: csv::Error| {
        BifiError::io_system(
            "IO.MISMATCH_WRITE",
            format!("failed to write '{}': {}", path.display(), source),
        )
    };
    let cells = rows.first().map_or(0, |row| row.poat_cells.len());
    let mut header: Vec<String> = [
        "file",
        "Mismatch_rel",
        "Front_Mismatch_rel",
        "MAD/G_Total",
        "Front_MAD/G_Total",
        "MAD/G_Total**2",
        "Front_MAD/G_Total**2",
        "poat",
        "gfront",
        "grear",
        "bifi_ratio",
        "stdev",
    ]
    .iter()
    .map(|name| (*name).to_string())
    .collect();
    for prefix in ["POAT_Irradiance_cell_", "FrontIrradiance_cell_", "BackIrradiance_cell_"] {
        header.extend((0..cells).map(|index| format!("{prefix}{index}")));
    }

    let mut writer = csv::Writer::from_path(path).map_err(write_error)?;
    writer.write_record(&header).map_err(write_error)?;
    for row in rows {
        let mut record = vec![row.file.clone()];
        record.extend(
            [
                row.mismatch,
                row.front_mismatch,
                row.mad_total,
                row.front_mad,
                row.mad_total * row.mad_total,
                row.front_mad * row.front_mad,
                row.poat,
                row.gfront,
                row.grear,
                row.bifi_ratio,
                row.stdev,
            ]
            .into_iter()
            .map(cell),
        );
        for values in [&row.poat_cells, &row.front_cells, &row.back_cells] {
            record.extend(values.iter().copied().map(cell));
        }
        writer.write_record(&record).map_err(write_error)?;
    }
    writer.flush().map_err(|source| {
        BifiError::io_system(
            "IO.MISMATCH_WRITE",
            format!("failed to flush '{}': {}", path.display(), source),
        )
    })?;
    info!(path = %path.display(), rows = rows.len(), "saved mismatch results");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{
        Downsampling, MismatchOptions, MismatchRow, Orientation, analyse_mismatch_folder,
        cell_layout, downsample_by_average, downsample_by_center, mad, mismatch_fit,
        mismatch_fit_alt, resample_to_cells, upsample_by_interpolation, write_mismatch_csv,
    };
    use crate::modules::results::{RayValue, ResultTable};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    #[test]
    fn mad_and_fits_follow_closed_forms() {
        assert_eq!(mad(&[500.0, 500.0, 500.0]), 0.0);
        let values = [90.0, 110.0];
        assert!((mad(&values) - 10.0).abs() < 1.0e-12);
        assert!((mismatch_fit(&values) - 4.62).abs() < 1.0e-12);
        assert!((mismatch_fit_alt(&values) - 7.34).abs() < 1.0e-12);
    }

    #[test]
    fn layouts_snake_down_columns() {
        let portrait = cell_layout(Orientation::Portrait, 72).expect("72 cells are supported");
        assert_eq!((portrait.cells_x(), portrait.cells_y()), (6, 12));
        assert_eq!(portrait.positions[0], vec![0, 23, 24, 47, 48, 71]);
        assert_eq!(portrait.positions[11], vec![11, 12, 35, 36, 59, 60]);

        let landscape = cell_layout(Orientation::Landscape, 96).expect("96 cells are supported");
        assert_eq!((landscape.cells_x(), landscape.cells_y()), (12, 8));
        assert_eq!(landscape.positions[7][0], 95);

        let error = cell_layout(Orientation::Portrait, 60).expect_err("60 cells are unsupported");
        assert_eq!(error.placeholder(), "INPUT.MISMATCH_CELLS");
    }

    #[test]
    fn resampling_sensors_onto_cells() {
        let sensors: Vec<f64> = (0..10).map(f64::from).collect();
        assert_eq!(downsample_by_center(&sensors, 4), vec![2.0, 4.0, 6.0, 8.0]);
        assert_eq!(downsample_by_average(&sensors, 4), vec![1.5, 3.5, 5.5, 7.5]);
        assert_eq!(upsample_by_interpolation(&[10.0, 20.0], 4), vec![12.5, 17.5, 20.0, 20.0]);
        assert_eq!(resample_to_cells(&sensors, 10, Downsampling::ByAverage), sensors);
        assert_eq!("BYAVERAGE".parse::<Downsampling>().expect("method should parse"), Downsampling::ByAverage);
    }

    #[test]
    fn dark_modules_have_no_fitted_loss() {
        let row = MismatchRow::from_cells("night.csv", vec![0.0; 12], vec![0.0; 12]);
        assert_eq!(row.mismatch, 0.0);
        assert_eq!(row.front_mismatch, 0.0);
        assert!(row.mad_total.is_nan());
    }

    fn ray(wm2: f64, mattype: &str) -> RayValue {
        RayValue {
            x: 0.0,
            y: 0.0,
            z: 1.0,
            r: wm2,
            g: wm2,
            b: wm2,
            mattype: mattype.to_string(),
            wm2,
        }
    }

    fn write_results(dir: &Path, name: &str, front: f64, back_ramp: f64) {
        let front_rays: Vec<RayValue> = (0..24).map(|_| ray(front, "a0.PVmodule.6457")).collect();
        let back_rays: Vec<RayValue> = (0..24)
            .map(|index| ray(100.0 + back_ramp * f64::from(index), "a0.PVmodule.2310"))
            .collect();
        ResultTable::from_scans(&front_rays, Some(&back_rays))
            .write(&dir.join(name))
            .expect("results should be written");
    }

    #[test]
    fn folder_analysis_reports_per_file_statistics() {
        let temp = TempDir::new().expect("tempdir should be created");
        let results = temp.path().join("results");
        fs::create_dir_all(&results).expect("results dir should be created");
        write_results(&results, "irr_a.csv", 800.0, 0.0);
        write_results(&results, "irr_b.csv", 800.0, 10.0);
        fs::write(results.join("notes.txt"), "ignored").expect("note should be written");

        let options = MismatchOptions {
            bifi: 0.5,
            ..MismatchOptions::default()
        };
        let rows = analyse_mismatch_folder(&results, &options).expect("analysis should succeed");
        assert_eq!(rows.len(), 2);
        let uniform = &rows[0];
        assert_eq!(uniform.file, "irr_a.csv");
        assert_eq!(uniform.poat_cells.len(), 12);
        assert!((uniform.grear - 50.0).abs() < 1.0e-9);
        assert!((uniform.poat - 850.0).abs() < 1.0e-9);
        assert!(uniform.mad_total.abs() < 1.0e-9);
        assert!((uniform.bifi_ratio - 50.0 / 800.0).abs() < 1.0e-12);
        assert!(rows[1].mismatch > 0.0);
        assert!(rows[1].front_mad.abs() < 1.0e-9);

        let output = temp.path().join("mismatch.csv");
        write_mismatch_csv(&output, &rows).expect("csv should be written");
        let text = fs::read_to_string(&output).expect("csv should be readable");
        let header = text.lines().next().expect("header exists");
        assert!(header.starts_with("file,Mismatch_rel,Front_Mismatch_rel,MAD/G_Total,"));
        assert!(header.ends_with("BackIrradiance_cell_11"));
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn empty_folder_is_an_input_error() {
        let temp = TempDir::new().expect("tempdir should be created");
        let error = analyse_mismatch_folder(temp.path(), &MismatchOptions::default())
            .expect_err("empty folder should fail");
        assert_eq!(error.placeholder(), "INPUT.MISMATCH_EMPTY");
    }
}
