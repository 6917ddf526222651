use super::{ResultTable, clean_result};
use crate::domain::{BifiError, SimResult};
use crate::modules::serialization::format_python_float;
use crate::modules::tracker::{TrackerDict, TrackerEntry};
use crate::modules::weather::HourKey;
use crate::numerics::nanmean;
use chrono::{Duration, NaiveDate};
use globset::{Glob, GlobMatcher};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Sensor-wise irradiance summed over every loaded tracker entry.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerTotals {
    pub wm2_front: Vec<f64>,
    pub wm2_back: Vec<f64>,
    pub numfiles: usize,
    pub finalkey: Option<String>,
}

fn key_matcher(key: &str, prefix: Option<&str>) -> SimResult<GlobMatcher> {
    let pattern = match prefix {
        Some(prefix) => format!("{prefix}{key}.csv"),
        None => format!("*_{key}.csv"),
    };
    Glob::new(&pattern)
        .map(|glob| glob.compile_matcher())
        .map_err(|source| {
            BifiError::input_validation(
                "INPUT.RESULTS_PATTERN",
                format!("invalid results pattern '{}': {}", pattern, source),
            )
        })
}

fn result_files(results_dir: &Path) -> SimResult<Vec<PathBuf>> {
    let entries = fs::read_dir(results_dir).map_err(|source| {
        BifiError::io_system(
            "IO.RESULTS_DIR",
            format!("failed to list '{}': {}", results_dir.display(), source),
        )
    })?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    files.sort();
    Ok(files)
}

/// Reads the results file of every tracker key from `results_dir`, cleans it
/// and stores the per-sensor values back on the entry.
///
/// Files match `*_<key>.csv`, or `<prefix><key>.csv` when a prefix is given.
/// Keys without a file are skipped.
pub fn load_tracker_dict(
    results_dir: &Path,
    trackerdict: &mut TrackerDict,
    prefix: Option<&str>,
) -> SimResult<TrackerTotals> {
    let files = result_files(results_dir)?;
    info!(files = files.len(), dir = %results_dir.display(), "scanning results");
    let mut totals = TrackerTotals {
        wm2_front: Vec::new(),
        wm2_back: Vec::new(),
        numfiles: 0,
        finalkey: None,
    };
    for entry in &mut trackerdict.entries {
        let matcher = key_matcher(&entry.key, prefix)?;
        let Some(selected) = files.iter().find(|path| {
            path.file_name()
                .is_some_and(|name| matcher.is_match(Path::new(name)))
        }) else {
            continue;
        };
        let mut table = ResultTable::read(selected)?;
        clean_result(&mut table, None);
        let front = table.front_values();
        let back = table.back_values();

        if totals.numfiles == 0 {
            totals.wm2_front = front.clone();
            totals.wm2_back = back.clone();
        } else if totals.wm2_front.len() == front.len() {
            for (total, value) in totals.wm2_front.iter_mut().zip(&front) {
                *total += value;
            }
            for (total, value) in totals.wm2_back.iter_mut().zip(&back) {
                *total += value;
            }
        } else {
            warn!(
                key = %entry.key,
                sensors = front.len(),
                expected = totals.wm2_front.len(),
                "results file has a different sensor count; skipping"
            );
            continue;
        }
        entry.back_ratio = front.iter().zip(&back).map(|(f, b)| b / f).collect();
        entry.wm2_front = front;
        entry.wm2_back = back;
        totals.numfiles += 1;
        totals.finalkey = Some(entry.key.clone());
    }
    if totals.numfiles == 0 {
        return Err(BifiError::input_validation(
            "INPUT.RESULTS_MISSING",
            format!(
                "no results file in '{}' matches a tracker key",
                results_dir.display()
            ),
        ));
    }
    info!(
        files = totals.numfiles,
        front_avg = nanmean(&totals.wm2_front),
        rear_avg = nanmean(&totals.wm2_back),
        finalkey = totals.finalkey.as_deref().unwrap_or(""),
        "loaded tracker results"
    );
    Ok(totals)
}

const EXPORT_HEADER: [&str; 12] = [
    "key",
    "dhi",
    "ghi",
    "Wm2Back",
    "Wm2Front",
    "theta",
    "surf_tilt",
    "surf_azm",
    "clearance_height",
    "Wm2BackAvg",
    "Wm2FrontAvg",
    "BifiRatio",
];

fn optional(value: Option<f64>) -> String {
    value.filter(|v| !v.is_nan()).map(format_python_float).unwrap_or_default()
}

fn sensor_list(values: &[f64]) -> String {
    let rendered: Vec<String> = values
        .iter()
        .map(|value| {
            if value.is_nan() {
                "nan".to_string()
            } else {
                format_python_float(*value)
            }
        })
        .collect();
    format!("[{}]", rendered.join(", "))
}

fn export_row(entry: &TrackerEntry) -> [String; 12] {
    let back_avg = nanmean(&entry.wm2_back);
    let front_avg = nanmean(&entry.wm2_front);
    let average = |values: &[f64], avg: f64| {
        if values.is_empty() { String::new() } else { optional(Some(avg)) }
    };
    [
        entry.key.clone(),
        optional(entry.dhi),
        optional(entry.ghi),
        sensor_list(&entry.wm2_back),
        sensor_list(&entry.wm2_front),
        optional(Some(entry.theta)),
        optional(Some(entry.surf_tilt)),
        optional(Some(entry.surf_azm)),
        optional(entry.clearance_height),
        average(&entry.wm2_back, back_avg),
        average(&entry.wm2_front, front_avg),
        optional(Some(back_avg / front_avg)),
    ]
}

/// Hourly keys between the first and last key, chronologically. The year is
/// irrelevant to `MM_DD_HH` labels.
fn hourly_span(keys: &[HourKey]) -> Vec<HourKey> {
    let (Some(first), Some(last)) = (keys.iter().min(), keys.iter().max()) else {
        return Vec::new();
    };
    let to_datetime = |key: &HourKey| {
        NaiveDate::from_ymd_opt(2001, key.month, key.day)
            .and_then(|date| date.and_hms_opt(key.hour, 0, 0))
    };
    let (Some(mut at), Some(end)) = (to_datetime(first), to_datetime(last)) else {
        return keys.to_vec();
    };
    let mut span = Vec::new();
    while at <= end {
        span.push(HourKey::of(&at));
        at += Duration::hours(1);
    }
    span
}

/// Writes one summary row per tracker entry. With `reindex`, hourly keys are
/// ordered by time and every missing hour in between gets an empty row.
pub fn export_tracker_dict(trackerdict: &TrackerDict, path: &Path, reindex: bool) -> SimResult<()> {
    let write_error = |source: csv::Error| {
        BifiError::io_system(
            "IO.TRACKERDICT_EXPORT",
            format!("failed to write '{}': {}", path.display(), source),
        )
    };
    let mut writer = csv::Writer::from_path(path).map_err(write_error)?;
    writer.write_record(EXPORT_HEADER).map_err(write_error)?;

    let hour_keys: Option<Vec<HourKey>> = trackerdict
        .entries
        .iter()
        .map(|entry| entry.key.parse::<HourKey>().ok())
        .collect();
    match hour_keys.filter(|keys| reindex && !keys.is_empty()) {
        Some(keys) => {
            for key in hourly_span(&keys) {
                let label = key.label();
                let row = match trackerdict.get(&label) {
                    Some(entry) => export_row(entry).to_vec(),
                    None => {
                        let mut empty = vec![String::new(); EXPORT_HEADER.len()];
                        empty[0] = label;
                        empty
                    }
                };
                writer.write_record(&row).map_err(write_error)?;
            }
        }
        None => {
            if reindex {
                warn!("tracker keys are not hourly; exporting without reindexing");
            }
            for entry in &trackerdict.entries {
                writer.write_record(export_row(entry)).map_err(write_error)?;
            }
        }
    }
    writer.flush().map_err(|source| {
        BifiError::io_system(
            "IO.TRACKERDICT_EXPORT",
            format!("failed to flush '{}': {}", path.display(), source),
        )
    })?;
    info!(path = %path.display(), "exported tracker summary");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{export_tracker_dict, load_tracker_dict};
    use crate::modules::results::{RayValue, ResultTable};
    use crate::modules::tracker::{TrackerDict, TrackerEntry};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

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

    fn write_result(dir: &Path, name: &str, front: [f64; 2], back: [f64; 2], rear_mat: &str) {
        let front = [ray(front[0], "a0.PVmodule.6457"), ray(front[1], "a0.PVmodule.6457")];
        let back = [ray(back[0], "a0.PVmodule.2310"), ray(back[1], rear_mat)];
        ResultTable::from_scans(&front, Some(&back))
            .write(&dir.join(name))
            .expect("results should be written");
    }

    fn trackerdict(keys: &[&str]) -> TrackerDict {
        TrackerDict {
            cumulativesky: true,
            entries: keys
                .iter()
                .map(|key| TrackerEntry {
                    key: (*key).to_string(),
                    ..TrackerEntry::default()
                })
                .collect(),
        }
    }

    #[test]
    fn totals_accumulate_cleaned_values_per_sensor() {
        let temp = TempDir::new().expect("tempdir should be created");
        write_result(temp.path(), "irr_1axis_-5.0.csv", [800.0, 700.0], [80.0, 70.0], "a0.PVmodule.2310");
        write_result(temp.path(), "irr_1axis_5.0.csv", [600.0, 500.0], [60.0, 50.0], "tube");
        let mut dict = trackerdict(&["-5.0", "5.0", "10.0"]);

        let totals = load_tracker_dict(temp.path(), &mut dict, None).expect("results should load");
        assert_eq!(totals.numfiles, 2);
        assert_eq!(totals.finalkey.as_deref(), Some("5.0"));
        assert_eq!(totals.wm2_front, vec![1400.0, 1200.0]);
        assert_eq!(totals.wm2_back[0], 140.0);
        assert!(totals.wm2_back[1].is_nan());

        let entry = dict.get("-5.0").expect("entry exists");
        assert_eq!(entry.back_ratio, vec![0.1, 0.1]);
        assert!(dict.get("10.0").expect("entry exists").wm2_front.is_empty());
    }

    #[test]
    fn prefix_narrows_the_match() {
        let temp = TempDir::new().expect("tempdir should be created");
        write_result(temp.path(), "irr_a_5.0.csv", [100.0, 100.0], [10.0, 10.0], "a0.PVmodule.2310");
        write_result(temp.path(), "irr_b_5.0.csv", [300.0, 300.0], [30.0, 30.0], "a0.PVmodule.2310");
        let mut dict = trackerdict(&["5.0"]);
        let totals = load_tracker_dict(temp.path(), &mut dict, Some("irr_b_")).expect("results should load");
        assert_eq!(totals.wm2_front, vec![300.0, 300.0]);

        let mut unmatched = trackerdict(&["7.0"]);
        let error = load_tracker_dict(temp.path(), &mut unmatched, None).expect_err("nothing matches");
        assert_eq!(error.placeholder(), "INPUT.RESULTS_MISSING");
    }

    #[test]
    fn export_reindexes_hourly_keys() {
        let temp = TempDir::new().expect("tempdir should be created");
        let mut dict = trackerdict(&["01_01_13", "01_01_11"]);
        dict.cumulativesky = false;
        for entry in &mut dict.entries {
            entry.ghi = Some(500.0);
            entry.wm2_front = vec![400.0, 600.0];
            entry.wm2_back = vec![50.0, f64::NAN];
        }
        let path = temp.path().join("summary.csv");
        export_tracker_dict(&dict, &path, true).expect("export should succeed");

        let text = fs::read_to_string(&path).expect("summary should be readable");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "key,dhi,ghi,Wm2Back,Wm2Front,theta,surf_tilt,surf_azm,clearance_height,Wm2BackAvg,Wm2FrontAvg,BifiRatio"
        );
        assert_eq!(lines.len(), 4);
        assert!(lines[1].starts_with("01_01_11,,500.0,\"[50.0, nan]\",\"[400.0, 600.0]\","));
        assert!(lines[1].ends_with(",50.0,500.0,0.1"));
        assert_eq!(lines[2], "01_01_12,,,,,,,,,,,");
        assert!(lines[3].starts_with("01_01_13,"));
    }
}
