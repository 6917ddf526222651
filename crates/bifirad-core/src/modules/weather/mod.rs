//! Weather files and the solar position attached to every timestep.

mod parser;
pub mod solpos;

pub use parser::SiteMetadata;
pub use solpos::SolarPosition;

use crate::common::constants::HOURS_PER_NON_LEAP_YEAR;
use crate::domain::{BifiError, SimResult};
use crate::modules::serialization::write_text_artifact;
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Timelike};
use parser::WeatherRecord;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

/// Which edge of the averaging interval a timestamp marks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampLabel {
    #[default]
    Right,
    Left,
    Center,
}

impl FromStr for TimestampLabel {
    type Err = BifiError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "right" => Ok(Self::Right),
            "left" => Ok(Self::Left),
            "center" => Ok(Self::Center),
            other => Err(BifiError::input_validation(
                "INPUT.WEATHER_LABEL",
                format!("invalid weather label '{}'; valid inputs: right, left or center", other),
            )),
        }
    }
}

/// Month/day/hour selector written as `MM_DD_HH`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct HourKey {
    pub month: u32,
    pub day: u32,
    pub hour: u32,
}

impl HourKey {
    pub const YEAR_START: Self = Self { month: 1, day: 1, hour: 0 };
    pub const YEAR_END: Self = Self { month: 12, day: 31, hour: 23 };

    pub fn of(timestamp: &NaiveDateTime) -> Self {
        Self {
            month: timestamp.month(),
            day: timestamp.day(),
            hour: timestamp.hour(),
        }
    }

    pub fn label(&self) -> String {
        format!("{:02}_{:02}_{:02}", self.month, self.day, self.hour)
    }

    /// Row of this hour in a non-leap calendar year, if the day exists there.
    pub fn year_row(&self) -> Option<usize> {
        let date = NaiveDate::from_ymd_opt(2001, self.month, self.day)?;
        Some((date.ordinal0() as usize) * 24 + self.hour as usize)
    }
}

impl FromStr for HourKey {
    type Err = BifiError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            BifiError::input_validation(
                "INPUT.TIME_KEY",
                format!("invalid time '{}'; expected MM_DD_HH", value),
            )
        };
        let parts: Vec<u32> = value
            .split(['_', '/'])
            .map(|part| part.parse::<u32>().map_err(|_| invalid()))
            .collect::<Result<_, _>>()?;
        let key = match parts.as_slice() {
            [month, day] => Self { month: *month, day: *day, hour: 0 },
            [month, day, hour] => Self { month: *month, day: *day, hour: *hour },
            _ => return Err(invalid()),
        };
        if key.year_row().is_none() || key.hour > 23 {
            return Err(invalid());
        }
        Ok(key)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherOptions {
    pub start: Option<String>,
    pub end: Option<String>,
    /// Single day as `MM_DD` or `MM/DD`; keeps only its sunlit hours.
    pub daydate: Option<String>,
    pub label: TimestampLabel,
    pub coerce_year: Option<i32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetData {
    pub site: SiteMetadata,
    pub datetime: Vec<DateTime<FixedOffset>>,
    pub ghi: Vec<f64>,
    pub dni: Vec<f64>,
    pub dhi: Vec<f64>,
    pub albedo: Option<Vec<f64>>,
    /// Timestamp at which each sun position was evaluated.
    pub corrected_timestamp: Vec<DateTime<FixedOffset>>,
    pub solpos: Vec<SolarPosition>,
}

/// Reads an EPW (by extension) or TMY3 file, writes the zero-masked
/// `GHI DHI` year file gencumulativesky needs, and returns the selected rows.
pub fn read_weather_file(
    path: &Path,
    options: &WeatherOptions,
    cumulative_csv: Option<&Path>,
) -> SimResult<MetData> {
    let text = fs::read_to_string(path).map_err(|source| {
        BifiError::io_system(
            "IO.WEATHER_READ",
            format!("failed to read weather file '{}': {}", path.display(), source),
        )
    })?;
    let is_epw = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("epw"));
    let (site, records) = if is_epw {
        parser::parse_epw(&text, options.coerce_year.or(Some(2001)))?
    } else {
        parser::parse_tmy3(&text, options.coerce_year)?
    };
    info!(file = %path.display(), records = records.len(), "read weather file");

    let (start, end) = selection_bounds(options)?;
    if let Some(csv_path) = cumulative_csv {
        let rows = records
            .iter()
            .map(|record| {
                let key = HourKey::of(&record.timestamp);
                let inside = start <= key && key <= end;
                (key, if inside { (record.ghi, record.dhi) } else { (0.0, 0.0) })
            })
            .collect::<Vec<_>>();
        write_year_csv(csv_path, &rows)?;
    }

    let mut selected: Vec<WeatherRecord> = records
        .into_iter()
        .filter(|record| {
            let key = HourKey::of(&record.timestamp);
            start <= key && key <= end
        })
        .collect();
    if options.daydate.is_some() {
        selected.retain(|record| record.ghi > 0.0);
    }

    MetData::from_records(site, selected, options.label)
}

fn selection_bounds(options: &WeatherOptions) -> SimResult<(HourKey, HourKey)> {
    if let Some(daydate) = &options.daydate {
        let day: HourKey = daydate.parse()?;
        return Ok((
            HourKey { hour: 0, ..day },
            HourKey { hour: 23, ..day },
        ));
    }
    let start = options
        .start
        .as_deref()
        .map(str::parse)
        .transpose()?
        .unwrap_or(HourKey::YEAR_START);
    let end = options
        .end
        .as_deref()
        .map(str::parse)
        .transpose()?
        .unwrap_or(HourKey::YEAR_END);
    Ok((start, end))
}

/// Writes 8760 space-separated `GHI DHI` rows, zero wherever `rows` has no entry.
pub fn write_year_csv(path: &Path, rows: &[(HourKey, (f64, f64))]) -> SimResult<()> {
    let mut year = vec![(0.0, 0.0); HOURS_PER_NON_LEAP_YEAR];
    for (key, values) in rows {
        if let Some(slot) = key.year_row().and_then(|row| year.get_mut(row)) {
            *slot = *values;
        }
    }
    let mut text = String::with_capacity(year.len() * 8);
    for (ghi, dhi) in year {
        let _ = writeln!(text, "{} {}", ghi, dhi);
    }
    write_text_artifact(path, &text).map_err(|source| {
        BifiError::io_system(
            "IO.WEATHER_WRITE",
            format!("failed to write '{}': {}", path.display(), source),
        )
    })?;
    info!(file = %path.display(), points = rows.len(), "saved year csv");
    Ok(())
}

impl MetData {
    /// Builds met data from `(local timestamp, ghi, dni, dhi)` rows.
    pub fn from_hourly(
        site: SiteMetadata,
        rows: &[(NaiveDateTime, f64, f64, f64)],
        label: TimestampLabel,
    ) -> SimResult<Self> {
        let records = rows
            .iter()
            .map(|(timestamp, ghi, dni, dhi)| WeatherRecord {
                timestamp: *timestamp,
                ghi: *ghi,
                dni: *dni,
                dhi: *dhi,
                albedo: None,
            })
            .collect();
        Self::from_records(site, records, label)
    }

    fn from_records(
        site: SiteMetadata,
        records: Vec<WeatherRecord>,
        label: TimestampLabel,
    ) -> SimResult<Self> {
        if records.is_empty() {
            return Err(BifiError::input_validation(
                "INPUT.WEATHER_EMPTY",
                "no weather records fall inside the requested time range",
            ));
        }
        let offset = FixedOffset::east_opt((site.timezone * 3600.0).round() as i32).ok_or_else(
            || {
                BifiError::input_validation(
                    "INPUT.WEATHER_TIMEZONE",
                    format!("invalid timezone offset {}", site.timezone),
                )
            },
        )?;
        let datetime: Vec<DateTime<FixedOffset>> = records
            .iter()
            .map(|record| localize(&offset, record.timestamp))
            .collect::<SimResult<_>>()?;

        let interval = if datetime.len() > 1 {
            datetime[1] - datetime[0]
        } else {
            warn!("weather interval could not be determined; assuming 1h");
            Duration::hours(1)
        };

        let corrected_timestamp = datetime
            .iter()
            .map(|timestamp| sun_timestamp(*timestamp, interval, label, &site))
            .collect::<Vec<_>>();
        let solpos = corrected_timestamp
            .iter()
            .map(|timestamp| solpos::solar_position(*timestamp, site.latitude, site.longitude))
            .collect();

        let albedo = records
            .iter()
            .map(|record| record.albedo)
            .collect::<Option<Vec<f64>>>();

        Ok(Self {
            site,
            ghi: records.iter().map(|record| record.ghi).collect(),
            dni: records.iter().map(|record| record.dni).collect(),
            dhi: records.iter().map(|record| record.dhi).collect(),
            albedo,
            datetime,
            corrected_timestamp,
            solpos,
        })
    }

    pub fn len(&self) -> usize {
        self.datetime.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datetime.is_empty()
    }

    /// `MM_DD_HH` of the record at `index`.
    pub fn time_key(&self, index: usize) -> String {
        self.datetime
            .get(index)
            .map(|timestamp| HourKey::of(&timestamp.naive_local()).label())
            .unwrap_or_default()
    }

    pub fn index_of(&self, key: &str) -> Option<usize> {
        (0..self.len()).find(|index| self.time_key(*index) == key)
    }
}

fn localize(offset: &FixedOffset, timestamp: NaiveDateTime) -> SimResult<DateTime<FixedOffset>> {
    offset.from_local_datetime(&timestamp).single().ok_or_else(|| {
        BifiError::internal(
            "SYS.WEATHER_TIMESTAMP",
            format!("timestamp {} cannot be localized", timestamp),
        )
    })
}

fn sun_timestamp(
    timestamp: DateTime<FixedOffset>,
    interval: Duration,
    label: TimestampLabel,
    site: &SiteMetadata,
) -> DateTime<FixedOffset> {
    if label == TimestampLabel::Center {
        return timestamp;
    }
    let half_interval = interval.num_minutes() / 2;
    if interval != Duration::hours(1) {
        return timestamp - Duration::minutes(half_interval);
    }

    let sun_times = solpos::sunrise_sunset(
        timestamp.date_naive(),
        site.latitude,
        site.longitude,
        site.timezone,
    );
    let hour = timestamp.hour() as i64;
    let mut delta = half_interval;
    match label {
        TimestampLabel::Right => {
            if let Some((sunrise, sunset)) = sun_times {
                if hour - 1 == sunrise.hour() as i64 {
                    delta = (60 - sunrise.minute() as i64) / 2;
                }
                if hour - 1 == sunset.hour() as i64 {
                    delta = (60 - sunset.minute() as i64) / 2;
                }
            }
            timestamp - Duration::minutes(delta)
        }
        TimestampLabel::Left => {
            if let Some((sunrise, sunset)) = sun_times {
                if hour == sunrise.hour() as i64 {
                    delta = (60 + sunrise.minute() as i64 + 1) / 2;
                }
                if hour == sunset.hour() as i64 {
                    delta = (60 + sunset.minute() as i64 + 1) / 2;
                }
            }
            timestamp + Duration::minutes(delta)
        }
        TimestampLabel::Center => timestamp,
    }
}
