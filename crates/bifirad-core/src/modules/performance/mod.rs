//! Validation statistics of a modelled series against measurements.

use crate::domain::{BifiError, SimResult};
use crate::numerics::mean;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStats {
    /// Mean bias deviation, percent of the mean measurement.
    #[serde(rename = "MBD")]
    pub mbd: f64,
    #[serde(rename = "RMSE")]
    pub rmse: f64,
    #[serde(rename = "MBD_abs")]
    pub mbd_abs: f64,
    #[serde(rename = "RMSE_abs")]
    pub rmse_abs: f64,
    pub count: usize,
}

/// Pairs kept for comparison: neither value NaN, and the modelled value above
/// the smallest measurement of the whole series, NaN pairs included.
pub fn filter_pairs(modeled: &[f64], measured: &[f64]) -> Vec<(f64, f64)> {
    let floor = measured
        .iter()
        .copied()
        .filter(|meas| !meas.is_nan())
        .fold(f64::INFINITY, f64::min);
    modeled
        .iter()
        .zip(measured)
        .map(|(model, meas)| (*model, *meas))
        .filter(|(model, meas)| !model.is_nan() && !meas.is_nan() && *model > floor)
        .collect()
}

fn kept_pairs(modeled: &[f64], measured: &[f64]) -> SimResult<(Vec<f64>, Vec<f64>)> {
    if modeled.len() != measured.len() {
        return Err(BifiError::input_validation(
            "INPUT.PERFORMANCE_LENGTH",
            format!(
                "modelled and measured series differ in length: {} vs {}",
                modeled.len(),
                measured.len()
            ),
        ));
    }
    let pairs = filter_pairs(modeled, measured);
    if pairs.is_empty() {
        return Err(BifiError::input_validation(
            "INPUT.PERFORMANCE_EMPTY",
            "no valid modelled/measured pairs to compare",
        ));
    }
    debug!(kept = pairs.len(), total = modeled.len(), "paired series");
    Ok(pairs.into_iter().unzip())
}

fn mbd_abs_of(model: &[f64], meas: &[f64]) -> f64 {
    let diffs: Vec<f64> = model.iter().zip(meas).map(|(a, b)| a - b).collect();
    mean(&diffs)
}

fn rmse_abs_of(model: &[f64], meas: &[f64]) -> f64 {
    let squares: Vec<f64> = model.iter().zip(meas).map(|(a, b)| (a - b).powi(2)).collect();
    mean(&squares).sqrt()
}

/// `100 * mean(model - meas) / mean(meas)`.
pub fn mbd(modeled: &[f64], measured: &[f64]) -> SimResult<f64> {
    let (model, meas) = kept_pairs(modeled, measured)?;
    Ok(100.0 * mbd_abs_of(&model, &meas) / mean(&meas))
}

/// `100 * sqrt(mean((model - meas)^2)) / mean(meas)`.
pub fn rmse(modeled: &[f64], measured: &[f64]) -> SimResult<f64> {
    let (model, meas) = kept_pairs(modeled, measured)?;
    Ok(100.0 * rmse_abs_of(&model, &meas) / mean(&meas))
}

pub fn mbd_abs(modeled: &[f64], measured: &[f64]) -> SimResult<f64> {
    let (model, meas) = kept_pairs(modeled, measured)?;
    Ok(mbd_abs_of(&model, &meas))
}

pub fn rmse_abs(modeled: &[f64], measured: &[f64]) -> SimResult<f64> {
    let (model, meas) = kept_pairs(modeled, measured)?;
    Ok(rmse_abs_of(&model, &meas))
}

pub fn performance_stats(modeled: &[f64], measured: &[f64]) -> SimResult<PerformanceStats> {
    let (model, meas) = kept_pairs(modeled, measured)?;
    let mbd_abs = mbd_abs_of(&model, &meas);
    let rmse_abs = rmse_abs_of(&model, &meas);
    let scale = mean(&meas);
    Ok(PerformanceStats {
        mbd: 100.0 * mbd_abs / scale,
        rmse: 100.0 * rmse_abs / scale,
        mbd_abs,
        rmse_abs,
        count: model.len(),
    })
}

fn column(headers: &csv::StringRecord, name: &str, path: &Path) -> SimResult<usize> {
    headers.iter().position(|header| header == name).ok_or_else(|| {
        BifiError::input_validation(
            "INPUT.PERFORMANCE_COLUMN",
            format!("column '{}' not found in '{}'", name, path.display()),
        )
    })
}

/// Reads two numeric columns of a CSV file. Empty or unparseable cells are NaN.
pub fn read_series(path: &Path, modeled: &str, measured: &str) -> SimResult<(Vec<f64>, Vec<f64>)> {
    let read_error = |source: csv::Error| {
        BifiError::io_system(
            "IO.PERFORMANCE_READ",
            format!("failed to read '{}': {}", path.display(), source),
        )
    };
    let mut reader = csv::Reader::from_path(path).map_err(read_error)?;
    let headers = reader.headers().map_err(read_error)?.clone();
    let model_index = column(&headers, modeled, path)?;
    let meas_index = column(&headers, measured, path)?;
    let value = |record: &csv::StringRecord, index: usize| {
        record
            .get(index)
            .and_then(|cell| cell.trim().parse::<f64>().ok())
            .unwrap_or(f64::NAN)
    };
    let mut model = Vec::new();
    let mut meas = Vec::new();
    for record in reader.records() {
        let record = record.map_err(read_error)?;
        model.push(value(&record, model_index));
        meas.push(value(&record, meas_index));
    }
    info!(path = %path.display(), rows = model.len(), "read performance series");
    Ok((model, meas))
}

#[cfg(test)]
mod tests {
    use super::{filter_pairs, mbd, mbd_abs, performance_stats, read_series, rmse, rmse_abs};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn identical_series_have_no_error() {
        let series = [120.0, 340.0, 560.0, 780.0];
        assert_eq!(mbd(&series, &series).expect("mbd should compute"), 0.0);
        assert_eq!(rmse(&series, &series).expect("rmse should compute"), 0.0);
    }

    #[test]
    fn statistics_use_filtered_pairs() {
        let measured = [100.0, 200.0, f64::NAN, 400.0];
        let modeled = [50.0, 220.0, 300.0, 380.0];
        let pairs = filter_pairs(&modeled, &measured);
        assert_eq!(pairs, vec![(220.0, 200.0), (380.0, 400.0)]);

        assert_eq!(mbd_abs(&modeled, &measured).expect("mbd_abs should compute"), 0.0);
        assert!((rmse_abs(&modeled, &measured).expect("rmse_abs should compute") - 20.0).abs() < 1.0e-12);
        let stats = performance_stats(&modeled, &measured).expect("stats should compute");
        assert_eq!(stats.count, 2);
        assert!((stats.rmse - 100.0 * 20.0 / 300.0).abs() < 1.0e-12);
    }

    #[test]
    fn low_irradiance_floor_counts_measurements_paired_with_gaps() {
        let measured = [50.0, 100.0, 200.0, 300.0];
        let modeled = [f64::NAN, 80.0, 210.0, 290.0];
        let pairs = filter_pairs(&modeled, &measured);
        assert_eq!(pairs, vec![(80.0, 100.0), (210.0, 200.0), (290.0, 300.0)]);
        let stats = performance_stats(&modeled, &measured).expect("stats should compute");
        assert_eq!(stats.count, 3);
    }

    #[test]
    fn empty_or_mismatched_series_are_rejected() {
        let error = mbd(&[f64::NAN], &[1.0]).expect_err("no pairs should fail");
        assert_eq!(error.placeholder(), "INPUT.PERFORMANCE_EMPTY");
        let error = rmse(&[1.0, 2.0], &[1.0]).expect_err("length mismatch should fail");
        assert_eq!(error.placeholder(), "INPUT.PERFORMANCE_LENGTH");
    }

    #[test]
    fn series_are_read_by_column_name() {
        let temp = TempDir::new().expect("tempdir should be created");
        let path = temp.path().join("series.csv");
        fs::write(&path, "time,model,meas\n1,10,9\n2,,11\n3,12,12\n").expect("csv should be written");
        let (model, meas) = read_series(&path, "model", "meas").expect("series should read");
        assert_eq!(meas, vec![9.0, 11.0, 12.0]);
        assert!(model[1].is_nan());

        let error = read_series(&path, "missing", "meas").expect_err("unknown column should fail");
        assert_eq!(error.placeholder(), "INPUT.PERFORMANCE_COLUMN");
    }
}
