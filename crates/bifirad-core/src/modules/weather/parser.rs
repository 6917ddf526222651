use crate::domain::{BifiError, ParserResult};
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use csv::{ReaderBuilder, StringRecord};
use serde::{Deserialize, Serialize};

const EPW_HEADER_LINES: usize = 8;
const EPW_GHI: usize = 13;
const EPW_DNI: usize = 14;
const EPW_DHI: usize = 15;
const EPW_ALBEDO: usize = 32;
const EPW_MISSING_ALBEDO: f64 = 999.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteMetadata {
    pub city: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Hours east of UTC.
    pub timezone: f64,
    pub elevation: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub(super) struct WeatherRecord {
    /// Local standard time at the end of the averaging interval.
    pub timestamp: NaiveDateTime,
    pub ghi: f64,
    pub dni: f64,
    pub dhi: f64,
    pub albedo: Option<f64>,
}

pub(super) fn parse_epw(
    text: &str,
    coerce_year: Option<i32>,
) -> ParserResult<(SiteMetadata, Vec<WeatherRecord>)> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut site = None;
    let mut records = Vec::new();
    for (line_index, row) in reader.records().enumerate() {
        let row = row.map_err(|source| {
            BifiError::input_validation(
                "INPUT.WEATHER_FORMAT",
                format!("invalid EPW line {}: {}", line_index + 1, source),
            )
        })?;
        if line_index == 0 {
            site = Some(parse_epw_location(&row)?);
            continue;
        }
        if line_index < EPW_HEADER_LINES {
            continue;
        }
        let line = line_index + 1;
        let year = field_f64(&row, 0, line, "year")? as i32;
        let month = field_f64(&row, 1, line, "month")? as u32;
        let day = field_f64(&row, 2, line, "day")? as u32;
        let hour = field_f64(&row, 3, line, "hour")? as i64;
        let date = calendar_date(coerce_year.unwrap_or(year), month, day, line)?;
        let albedo = row
            .get(EPW_ALBEDO)
            .and_then(|raw| raw.trim().parse::<f64>().ok())
            .filter(|value| *value < EPW_MISSING_ALBEDO);
        records.push(WeatherRecord {
            timestamp: date.and_time(NaiveTime::MIN) + Duration::hours(hour),
            ghi: field_f64(&row, EPW_GHI, line, "GHI")?,
            dni: field_f64(&row, EPW_DNI, line, "DNI")?,
            dhi: field_f64(&row, EPW_DHI, line, "DHI")?,
            albedo,
        });
    }

    let site = site.ok_or_else(|| {
        BifiError::input_validation("INPUT.WEATHER_FORMAT", "EPW file is empty")
    })?;
    Ok((site, records))
}

fn parse_epw_location(row: &StringRecord) -> ParserResult<SiteMetadata> {
    if row.get(0).map(str::trim) != Some("LOCATION") {
        return Err(BifiError::input_validation(
            "INPUT.WEATHER_FORMAT",
            "EPW file must start with a LOCATION line",
        ));
    }
    Ok(SiteMetadata {
        city: row.get(1).unwrap_or_default().trim().to_string(),
        latitude: field_f64(row, 6, 1, "latitude")?,
        longitude: field_f64(row, 7, 1, "longitude")?,
        timezone: field_f64(row, 8, 1, "TZ")?,
        elevation: field_f64(row, 9, 1, "elevation")?,
    })
}

pub(super) fn parse_tmy3(
    text: &str,
    coerce_year: Option<i32>,
) -> ParserResult<(SiteMetadata, Vec<WeatherRecord>)> {
    let (header, body) = text.split_once('\n').ok_or_else(|| {
        BifiError::input_validation("INPUT.WEATHER_FORMAT", "TMY3 file has no data header")
    })?;
    let mut meta_reader = ReaderBuilder::new()
        .has_headers(false)
        .from_reader(header.as_bytes());
    let meta = meta_reader
        .records()
        .next()
        .transpose()
        .map_err(|source| {
            BifiError::input_validation(
                "INPUT.WEATHER_FORMAT",
                format!("invalid TMY3 site line: {}", source),
            )
        })?
        .ok_or_else(|| {
            BifiError::input_validation("INPUT.WEATHER_FORMAT", "TMY3 site line is empty")
        })?;
    let site = SiteMetadata {
        city: meta.get(1).unwrap_or_default().trim().trim_matches('"').to_string(),
        timezone: field_f64(&meta, 3, 1, "TZ")?,
        latitude: field_f64(&meta, 4, 1, "latitude")?,
        longitude: field_f64(&meta, 5, 1, "longitude")?,
        elevation: field_f64(&meta, 6, 1, "elevation")?,
    };

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(body.as_bytes());
    let headers = reader
        .headers()
        .map_err(|source| {
            BifiError::input_validation(
                "INPUT.WEATHER_FORMAT",
                format!("invalid TMY3 column header: {}", source),
            )
        })?
        .clone();
    let column = |name: &str| -> ParserResult<usize> {
        headers.iter().position(|h| h.trim() == name).ok_or_else(|| {
            BifiError::input_validation(
                "INPUT.WEATHER_FORMAT",
                format!("TMY3 file is missing column '{}'", name),
            )
        })
    };
    let date_col = column("Date (MM/DD/YYYY)")?;
    let time_col = column("Time (HH:MM)")?;
    let ghi_col = column("GHI (W/m^2)")?;
    let dni_col = column("DNI (W/m^2)")?;
    let dhi_col = column("DHI (W/m^2)")?;
    let albedo_col = column("Alb (unitless)").ok();

    let mut records = Vec::new();
    for (index, row) in reader.records().enumerate() {
        let line = index + 3;
        let row = row.map_err(|source| {
            BifiError::input_validation(
                "INPUT.WEATHER_FORMAT",
                format!("invalid TMY3 line {}: {}", line, source),
            )
        })?;
        let raw_date = row.get(date_col).unwrap_or_default().trim();
        let mut date_parts = raw_date.split('/');
        let (Some(month), Some(day), Some(year)) =
            (date_parts.next(), date_parts.next(), date_parts.next())
        else {
            return Err(BifiError::input_validation(
                "INPUT.WEATHER_FORMAT",
                format!("invalid TMY3 date '{}' at line {}", raw_date, line),
            ));
        };
        let parse_part = |raw: &str| {
            raw.parse::<i64>().map_err(|_| {
                BifiError::input_validation(
                    "INPUT.WEATHER_FORMAT",
                    format!("invalid TMY3 date '{}' at line {}", raw_date, line),
                )
            })
        };
        let year = coerce_year.map_or_else(|| parse_part(year).map(|y| y as i32), Ok)?;
        let date = calendar_date(year, parse_part(month)? as u32, parse_part(day)? as u32, line)?;

        let raw_time = row.get(time_col).unwrap_or_default().trim();
        let (hours, minutes) = raw_time
            .split_once(':')
            .and_then(|(h, m)| Some((h.parse::<i64>().ok()?, m.parse::<i64>().ok()?)))
            .ok_or_else(|| {
                BifiError::input_validation(
                    "INPUT.WEATHER_FORMAT",
                    format!("invalid TMY3 time '{}' at line {}", raw_time, line),
                )
            })?;

        records.push(WeatherRecord {
            timestamp: date.and_time(NaiveTime::MIN)
                + Duration::hours(hours)
                + Duration::minutes(minutes),
            ghi: field_f64(&row, ghi_col, line, "GHI")?,
            dni: field_f64(&row, dni_col, line, "DNI")?,
            dhi: field_f64(&row, dhi_col, line, "DHI")?,
            albedo: albedo_col.and_then(|col| row.get(col)?.trim().parse::<f64>().ok()),
        });
    }
    Ok((site, records))
}

fn calendar_date(year: i32, month: u32, day: u32, line: usize) -> ParserResult<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
        BifiError::input_validation(
            "INPUT.WEATHER_FORMAT",
            format!("invalid date {:04}-{:02}-{:02} at line {}", year, month, day, line),
        )
    })
}

fn field_f64(row: &StringRecord, index: usize, line: usize, name: &str) -> ParserResult<f64> {
    let raw = row.get(index).ok_or_else(|| {
        BifiError::input_validation(
            "INPUT.WEATHER_FORMAT",
            format!("missing {} field at line {}", name, line),
        )
    })?;
    raw.trim().parse::<f64>().map_err(|_| {
        BifiError::input_validation(
            "INPUT.WEATHER_FORMAT",
            format!("invalid {} value '{}' at line {}", name, raw.trim(), line),
        )
    })
}
