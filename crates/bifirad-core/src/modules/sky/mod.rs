//! Sky definitions: hourly gendaylit skies and gencumulativesky domes.

use crate::common::constants::DNI_EPSILON;
use crate::domain::{BifiError, SimResult};
use crate::modules::engine::RadianceEngine;
use crate::modules::ground::Ground;
use crate::modules::serialization::{format_python_float, write_text_artifact};
use crate::modules::tracker::TrackerDict;
use crate::modules::weather::{HourKey, MetData};
use crate::modules::weather::solpos::rad_to_deg;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const SKY_DIR: &str = "skies";

/// Hour range handed to gencumulativesky.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CumulativeWindow {
    pub start: HourKey,
    pub end: HourKey,
}

impl Default for CumulativeWindow {
    fn default() -> Self {
        Self {
            start: HourKey::YEAR_START,
            end: HourKey::YEAR_END,
        }
    }
}

fn write_sky(workdir: &Path, relative: &Path, text: &str) -> SimResult<()> {
    write_text_artifact(&workdir.join(relative), text).map_err(|source| {
        BifiError::io_system(
            "IO.SKY_WRITE",
            format!("failed to write sky '{}': {}", relative.display(), source),
        )
    })
}

/// Picks the albedo row for weather index `index`: a single albedo applies
/// to every hour, a series must line up with the weather records.
fn ground_index(ground: &Ground, met: &MetData, index: usize) -> Option<usize> {
    if ground.len() == met.len() {
        Some(index)
    } else if ground.len() == 1 {
        Some(0)
    } else {
        None
    }
}

/// Writes the gendaylit sky for weather record `index`.
///
/// Returns `None` when there is no diffuse light or the albedo series does not
/// match the weather data.
pub fn gendaylit(
    workdir: &Path,
    met: &MetData,
    index: usize,
    ground: &Ground,
) -> SimResult<Option<PathBuf>> {
    let position = met.solpos.get(index).ok_or_else(|| {
        BifiError::input_validation(
            "INPUT.SKY_INDEX",
            format!("time index {} is outside the {} weather records", index, met.len()),
        )
    })?;
    let Some(groundindex) = ground_index(ground, met, index) else {
        warn!(
            albedo = ground.len(),
            weather = met.len(),
            "shape of ground albedos and weather data do not match"
        );
        return Ok(None);
    };
    let (dni, dhi, ghi) = (met.dni[index], met.dhi[index], met.ghi[index]);
    if dhi <= 0.0 {
        return Ok(None);
    }

    let mut sunalt = position.elevation;
    let sunaz = position.azimuth - 180.0;
    if sunalt <= 0.0 {
        sunalt = rad_to_deg(((ghi - dhi) / (dni + DNI_EPSILON)).asin());
        warn!(
            time = %met.datetime[index],
            elevation = sunalt,
            "negative sun elevation; re-calculated from irradiance"
        );
    }

    let site = &met.site;
    let text = format!(
        "# start of sky definition for daylighting studies\n\
         # location name: {} LAT: {} LON: {} Elev: {}\n\
         # Sun position calculated w. PVLib\n\
         !gendaylit -ang {} {} -W {} {} -g {} -O 1 \n\
         skyfunc glow sky_mat\n0\n0\n4 1 1 1 0\n\
         \nsky_mat source sky\n0\n0\n4 0 0 1 180\n{}",
        site.city,
        format_python_float(site.latitude),
        format_python_float(site.longitude),
        format_python_float(site.elevation),
        format_python_float(sunalt),
        format_python_float(sunaz),
        format_python_float(dni),
        format_python_float(dhi),
        format_python_float(ground.refl_avg()[groundindex]),
        ground.ground_string(groundindex, false)?,
    );
    let relative = Path::new(SKY_DIR).join(format!(
        "sky2_{}_{}_{}.rad",
        format_python_float(site.latitude),
        format_python_float(site.longitude),
        met.time_key(index)
    ));
    write_sky(workdir, &relative, &text)?;
    Ok(Some(relative))
}

pub fn gencumsky_args(met: &MetData, window: &CumulativeWindow, csvfile: &Path) -> Vec<String> {
    let site = &met.site;
    let mut args: Vec<String> = ["+s1", "-h", "0", "-a"].iter().map(|s| s.to_string()).collect();
    args.push(format_python_float(site.latitude));
    args.push("-o".to_string());
    args.push(format_python_float(site.longitude));
    args.push("-m".to_string());
    args.push(format_python_float(site.timezone * 15.0));
    args.push("-G".to_string());
    args.push("-time".to_string());
    args.push(window.start.hour.to_string());
    args.push((window.end.hour + 1).to_string());
    args.push("-date".to_string());
    args.push(window.start.month.to_string());
    args.push(window.start.day.to_string());
    args.push(window.end.month.to_string());
    args.push(window.end.day.to_string());
    args.push(csvfile.display().to_string());
    args
}

/// Runs gencumulativesky on a `GHI DHI` year file and writes
/// `skies/<savefile>.rad` referencing the resulting `<savefile>.cal`.
pub fn gencumsky(
    engine: &dyn RadianceEngine,
    workdir: &Path,
    met: &MetData,
    ground: &Ground,
    csvfile: &Path,
    savefile: &str,
    window: &CumulativeWindow,
) -> SimResult<PathBuf> {
    let args = gencumsky_args(met, window, csvfile);
    let calfile = PathBuf::from(format!("{}.cal", savefile));
    let output = engine.gencumulativesky(workdir, &args, &calfile)?;
    if !output.stderr.trim().is_empty() {
        warn!(savefile, stderr = output.stderr.trim(), "gencumulativesky reported a problem");
    }

    let text = format!(
        "#Cumulative Sky Definition\n\
         void brightfunc skyfunc\n\
         2 skybright {}.cal\n0\n0\n\
         \nskyfunc glow sky_glow\n0\n0\n4 1 1 1 0\n\
         \nsky_glow source sky\n0\n0\n4 0 0 1 180\n{}",
        savefile,
        ground.ground_string(0, true)?,
    );
    let relative = Path::new(SKY_DIR).join(format!("{}.rad", savefile));
    write_sky(workdir, &relative, &text)?;
    Ok(relative)
}

/// Hourly tracking skies; entries without a sky are dropped from the dictionary.
pub fn gendaylit_1axis(
    workdir: &Path,
    met: &MetData,
    ground: &Ground,
    trackerdict: &mut TrackerDict,
    start: Option<HourKey>,
    end: Option<HourKey>,
) -> SimResult<usize> {
    trackerdict.retain_hours(start, end);
    let mut kept = Vec::with_capacity(trackerdict.len());
    for mut entry in std::mem::take(&mut trackerdict.entries) {
        let Some(index) = met.index_of(&entry.key) else {
            warn!(key = %entry.key, "tracker entry has no matching weather record");
            continue;
        };
        if let Some(skyfile) = gendaylit(workdir, met, index, ground)? {
            entry.skyfile = Some(skyfile);
            kept.push(entry);
        }
    }
    trackerdict.entries = kept;
    info!(skies = trackerdict.len(), "created gendaylit skies");
    Ok(trackerdict.len())
}

/// One cumulative sky per tracker angle bucket.
pub fn gencumsky_1axis(
    engine: &dyn RadianceEngine,
    workdir: &Path,
    met: &MetData,
    ground: &Ground,
    trackerdict: &mut TrackerDict,
) -> SimResult<usize> {
    for entry in &mut trackerdict.entries {
        let csvfile = entry.csvfile.clone().ok_or_else(|| {
            BifiError::input_validation(
                "INPUT.TRACKERDICT_CSV",
                format!("tracker bucket '{}' has no weather csv", entry.key),
            )
        })?;
        let savefile = format!("1axis_{}", entry.key);
        let skyfile = gencumsky(
            engine,
            workdir,
            met,
            ground,
            &csvfile,
            &savefile,
            &CumulativeWindow::default(),
        )?;
        info!(sky = %skyfile.display(), "created cumulative sky");
        entry.skyfile = Some(skyfile);
    }
    Ok(trackerdict.len())
}

#[cfg(test)]
mod tests {
    use super::{CumulativeWindow, gencumsky, gencumsky_args, gendaylit, gendaylit_1axis};
    use crate::modules::engine::testing::FakeEngine;
    use crate::modules::ground::{Ground, GroundInput, MaterialTable};
    use crate::modules::tracker::{TrackerSettings, set_1axis};
    use crate::modules::weather::{MetData, SiteMetadata, TimestampLabel};
    use chrono::NaiveDate;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn met() -> MetData {
        let site = SiteMetadata {
            city: "Golden".to_string(),
            latitude: 40.0,
            longitude: -105.0,
            timezone: -7.0,
            elevation: 1829.0,
        };
        let date = NaiveDate::from_ymd_opt(2001, 6, 21).expect("date should be valid");
        let at = |hour: u32| date.and_hms_opt(hour, 0, 0).expect("hour should be valid");
        let rows = vec![
            (at(2), 0.0, 0.0, 0.0),
            (at(12), 900.0, 800.0, 100.0),
            (at(13), 880.0, 790.0, 0.0),
        ];
        MetData::from_hourly(site, &rows, TimestampLabel::Right).expect("met data should build")
    }

    fn ground() -> Ground {
        Ground::new(&GroundInput::Albedo(0.2), &MaterialTable::builtin()).expect("albedo is valid")
    }

    #[test]
    fn gendaylit_writes_sun_angles_and_ground() {
        let temp = TempDir::new().expect("tempdir should be created");
        let sky = gendaylit(temp.path(), &met(), 1, &ground())
            .expect("sky should build")
            .expect("noon has diffuse light");
        assert_eq!(sky, Path::new("skies").join("sky2_40.0_-105.0_06_21_12.rad"));
        let text = fs::read_to_string(temp.path().join(&sky)).expect("sky file should exist");
        assert!(text.starts_with("# start of sky definition for daylighting studies\n"));
        assert!(text.contains("# location name: Golden LAT: 40.0 LON: -105.0 Elev: 1829.0\n"));
        assert!(text.contains(" -W 800.0 100.0 -g 0.2 -O 1 \n"));
        assert!(text.contains("\nsky_mat source sky\n0\n0\n4 0 0 1 180\n"));
        assert!(text.contains("custom ring groundplane"));
    }

    #[test]
    fn gendaylit_skips_hours_without_diffuse_light() {
        let temp = TempDir::new().expect("tempdir should be created");
        assert!(gendaylit(temp.path(), &met(), 2, &ground()).expect("no error").is_none());
        let error = gendaylit(temp.path(), &met(), 9, &ground()).expect_err("index is out of range");
        assert_eq!(error.placeholder(), "INPUT.SKY_INDEX");
    }

    #[test]
    fn night_hour_with_diffuse_light_recomputes_elevation() {
        let temp = TempDir::new().expect("tempdir should be created");
        let site = met().site;
        let date = NaiveDate::from_ymd_opt(2001, 6, 21).expect("date should be valid");
        let rows = vec![(date.and_hms_opt(2, 0, 0).expect("valid"), 75.0, 99.999, 25.0)];
        let night = MetData::from_hourly(site, &rows, TimestampLabel::Center).expect("met data");
        let sky = gendaylit(temp.path(), &night, 0, &ground())
            .expect("sky should build")
            .expect("diffuse light exists");
        let text = fs::read_to_string(temp.path().join(sky)).expect("sky file should exist");
        let altitude: f64 = text
            .split("!gendaylit -ang ")
            .nth(1)
            .and_then(|rest| rest.split_whitespace().next())
            .and_then(|value| value.parse().ok())
            .expect("sky should carry a sun altitude");
        assert!((altitude - 30.0).abs() < 1.0e-6);
    }

    #[test]
    fn cumulative_sky_references_cal_file() {
        let temp = TempDir::new().expect("tempdir should be created");
        let engine = FakeEngine::default();
        let met = met();
        let sky = gencumsky(
            &engine,
            temp.path(),
            &met,
            &ground(),
            Path::new("EPWs/epw_temp.csv"),
            "cumulative",
            &CumulativeWindow::default(),
        )
        .expect("cumulative sky should build");
        assert_eq!(sky, Path::new("skies").join("cumulative.rad"));
        let text = fs::read_to_string(temp.path().join(&sky)).expect("sky file should exist");
        assert!(text.starts_with("#Cumulative Sky Definition\nvoid brightfunc skyfunc\n2 skybright cumulative.cal\n"));
        assert!(temp.path().join("cumulative.cal").exists());

        let args = gencumsky_args(&met, &CumulativeWindow::default(), Path::new("EPWs/epw_temp.csv"));
        assert_eq!(
            args.join(" "),
            "+s1 -h 0 -a 40.0 -o -105.0 -m -105.0 -G -time 0 24 -date 1 1 12 31 EPWs/epw_temp.csv"
        );
    }

    #[test]
    fn hourly_tracking_skies_follow_the_tracker_dict() {
        let temp = TempDir::new().expect("tempdir should be created");
        let met = met();
        let settings = TrackerSettings {
            cumulativesky: false,
            ..TrackerSettings::default()
        };
        let mut tracker = set_1axis(&met, &settings, temp.path()).expect("tracker should build");
        assert_eq!(tracker.len(), 2);
        let created = gendaylit_1axis(temp.path(), &met, &ground(), &mut tracker, None, None)
            .expect("skies should build");
        assert_eq!(created, 1);
        assert!(tracker.get("06_21_12").and_then(|entry| entry.skyfile.as_ref()).is_some());
    }
}
