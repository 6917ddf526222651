//! Single-axis tracking angles and the tracker dictionary built from them.

mod model;

pub use model::{
    AxisGeometry, TrackerAngles, angle_of_incidence, fixed_tilt, round_theta, single_axis,
    surface_orientation,
};

use crate::domain::{BifiError, SimResult};
use crate::modules::serialization::{format_python_float, nullable_floats, round_to};
use crate::modules::weather::{HourKey, MetData, write_year_csv};
use crate::numerics::median;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const TRACKER_CSV_DIR: &str = "EPWs";
pub const TRACKERDICT_FILE: &str = "trackerdict.json";
pub const DEFAULT_CUMULATIVE_ANGLEDELTA: f64 = 5.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerSettings {
    /// Bucket by rounded angle for gencumulativesky; otherwise one entry per hour.
    pub cumulativesky: bool,
    pub axis_azimuth: f64,
    pub limit_angle: f64,
    pub angledelta: Option<f64>,
    pub backtrack: bool,
    pub gcr: f64,
    pub axis_tilt: f64,
    /// Switches to a fixed plane at this tilt facing `axis_azimuth`. The aoi
    /// uses that plane; theta and surface tilt report `limit_angle`.
    pub fixed_tilt_angle: Option<f64>,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            cumulativesky: true,
            axis_azimuth: 180.0,
            limit_angle: 45.0,
            angledelta: None,
            backtrack: true,
            gcr: 1.0 / 3.0,
            axis_tilt: 0.0,
            fixed_tilt_angle: None,
        }
    }
}

impl TrackerSettings {
    pub fn effective_angledelta(&self) -> Option<f64> {
        match self.angledelta {
            None if self.cumulativesky => Some(DEFAULT_CUMULATIVE_ANGLEDELTA),
            other => other,
        }
    }
}

/// Tracker state at one weather timestep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackingStep {
    pub tracker_theta: f64,
    pub surface_tilt: f64,
    pub surface_azimuth: f64,
    pub aoi: f64,
    /// Unrounded surface azimuth, used for bucket medians.
    pub raw_surface_azimuth: f64,
    pub theta_round: f64,
}

pub fn tracking_angles(met: &MetData, settings: &TrackerSettings) -> SimResult<Vec<TrackingStep>> {
    if settings.gcr <= 0.0 {
        return Err(BifiError::input_validation(
            "INPUT.TRACKER_GCR",
            format!("gcr must be positive, got {}", settings.gcr),
        ));
    }
    let axis = AxisGeometry {
        axis_tilt: settings.axis_tilt,
        axis_azimuth: settings.axis_azimuth,
        max_angle: settings.limit_angle,
        backtrack: settings.backtrack,
        gcr: settings.gcr,
    };
    let angledelta = settings.effective_angledelta();
    met.solpos
        .iter()
        .map(|position| -> SimResult<TrackingStep> {
            let angles = match settings.fixed_tilt_angle {
                Some(tilt) => fixed_tilt(
                    position.zenith,
                    position.azimuth,
                    tilt,
                    settings.limit_angle,
                    settings.axis_azimuth,
                ),
                None => single_axis(position.zenith, position.azimuth, &axis),
            };
            Ok(TrackingStep {
                tracker_theta: round_to(angles.tracker_theta, 2),
                surface_tilt: round_to(angles.surface_tilt, 2),
                surface_azimuth: round_to(angles.surface_azimuth, 2),
                aoi: angles.aoi,
                raw_surface_azimuth: angles.surface_azimuth,
                theta_round: if angles.tracker_theta.is_nan() {
                    f64::NAN
                } else {
                    round_theta(angles.tracker_theta, angledelta)?
                },
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrackerEntry {
    pub key: String,
    pub surf_azm: f64,
    pub surf_tilt: f64,
    pub theta: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ghi: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dhi: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csvfile: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub datetime: Vec<String>,
    #[serde(default)]
    pub count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skyfile: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radfile: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub octfile: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clearance_height: Option<f64>,
    #[serde(rename = "Wm2Front", default, with = "nullable_floats", skip_serializing_if = "Vec::is_empty")]
    pub wm2_front: Vec<f64>,
    #[serde(rename = "Wm2Back", default, with = "nullable_floats", skip_serializing_if = "Vec::is_empty")]
    pub wm2_back: Vec<f64>,
    #[serde(rename = "backRatio", default, with = "nullable_floats", skip_serializing_if = "Vec::is_empty")]
    pub back_ratio: Vec<f64>,
}

/// Ordered map from bucket key (rounded angle or `MM_DD_HH`) to its entry.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrackerDict {
    pub cumulativesky: bool,
    pub entries: Vec<TrackerEntry>,
}

impl TrackerDict {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.key.as_str())
    }

    pub fn get(&self, key: &str) -> Option<&TrackerEntry> {
        self.entries.iter().find(|entry| entry.key == key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut TrackerEntry> {
        self.entries.iter_mut().find(|entry| entry.key == key)
    }

    /// Keeps hourly entries between `start` and `end` (inclusive).
    pub fn retain_hours(&mut self, start: Option<HourKey>, end: Option<HourKey>) {
        self.entries.retain(|entry| {
            let Ok(key) = entry.key.parse::<HourKey>() else {
                return true;
            };
            start.is_none_or(|start| key >= start) && end.is_none_or(|end| key <= end)
        });
    }

    pub fn save(&self, path: &Path) -> SimResult<()> {
        let json = serde_json::to_string_pretty(self).map_err(|source| {
            BifiError::internal(
                "SYS.TRACKERDICT_ENCODE",
                format!("failed to encode tracker dictionary: {}", source),
            )
        })?;
        fs::write(path, json).map_err(|source| {
            BifiError::io_system(
                "IO.TRACKERDICT_WRITE",
                format!("failed to write '{}': {}", path.display(), source),
            )
        })
    }

    pub fn load(path: &Path) -> SimResult<Self> {
        let text = fs::read_to_string(path).map_err(|source| {
            BifiError::io_system(
                "IO.TRACKERDICT_READ",
                format!("failed to read '{}': {}", path.display(), source),
            )
        })?;
        serde_json::from_str(&text).map_err(|source| {
            BifiError::input_validation(
                "INPUT.TRACKERDICT_FORMAT",
                format!("invalid tracker dictionary '{}': {}", path.display(), source),
            )
        })
    }
}

/// Computes tracker angles for `met` and groups them into a tracker dictionary.
/// Cumulative buckets also get their zero-masked `GHI DHI` year file under
/// `workdir/EPWs`.
pub fn set_1axis(met: &MetData, settings: &TrackerSettings, workdir: &Path) -> SimResult<TrackerDict> {
    let steps = tracking_angles(met, settings)?;
    let entries = if settings.cumulativesky {
        cumulative_entries(met, &steps, workdir)?
    } else {
        hourly_entries(met, &steps)
    };
    info!(entries = entries.len(), cumulative = settings.cumulativesky, "built tracker dictionary");
    Ok(TrackerDict {
        cumulativesky: settings.cumulativesky,
        entries,
    })
}

fn hourly_entries(met: &MetData, steps: &[TrackingStep]) -> Vec<TrackerEntry> {
    steps
        .iter()
        .enumerate()
        .filter(|(index, step)| met.ghi[*index] > 0.0 && !step.tracker_theta.is_nan())
        .map(|(index, step)| TrackerEntry {
            key: met.time_key(index),
            surf_azm: step.surface_azimuth,
            surf_tilt: step.surface_tilt,
            theta: step.tracker_theta,
            ghi: Some(met.ghi[index]),
            dhi: Some(met.dhi[index]),
            ..TrackerEntry::default()
        })
        .collect()
}

fn cumulative_entries(
    met: &MetData,
    steps: &[TrackingStep],
    workdir: &Path,
) -> SimResult<Vec<TrackerEntry>> {
    let mut thetas: Vec<f64> = steps
        .iter()
        .map(|step| step.theta_round)
        .filter(|theta| !theta.is_nan())
        .collect();
    thetas.sort_by(f64::total_cmp);
    thetas.dedup();

    let mut entries = Vec::with_capacity(thetas.len());
    for theta in thetas {
        let key = format_python_float(theta);
        let members: Vec<usize> = (0..steps.len())
            .filter(|index| steps[*index].theta_round == theta)
            .collect();
        let relative_csv = Path::new(TRACKER_CSV_DIR).join(format!("1axis_{}.csv", key));

        let rows: Vec<(HourKey, (f64, f64))> = members
            .iter()
            .map(|index| {
                let local = met.datetime[*index].naive_local();
                (HourKey::of(&local), (met.ghi[*index], met.dhi[*index]))
            })
            .collect();
        write_year_csv(&workdir.join(&relative_csv), &rows)?;

        let azimuths: Vec<f64> = members
            .iter()
            .map(|index| steps[*index].raw_surface_azimuth)
            .collect();
        let datetime: Vec<String> = members
            .iter()
            .map(|index| met.datetime[*index].format("%Y-%m-%d %H:%M:%S").to_string())
            .collect();
        entries.push(TrackerEntry {
            key,
            surf_azm: median(&azimuths),
            surf_tilt: theta.abs(),
            theta,
            csvfile: Some(relative_csv),
            count: datetime.len(),
            datetime,
            ..TrackerEntry::default()
        });
    }
    Ok(entries)
}
