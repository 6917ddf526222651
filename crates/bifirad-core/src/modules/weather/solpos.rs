//! NOAA general solar position equations.
//!
//! Accurate to a few hundredths of a degree, which is well inside the
//! resolution of tracker angle buckets.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, Timelike, Utc};
use std::f64::consts::PI;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolarPosition {
    pub zenith: f64,
    pub elevation: f64,
    pub azimuth: f64,
}

pub fn deg_to_rad(deg: f64) -> f64 {
    deg * (PI / 180.0)
}

pub fn rad_to_deg(rad: f64) -> f64 {
    rad * (180.0 / PI)
}

fn days_in_year(year: i32) -> f64 {
    if NaiveDate::from_ymd_opt(year, 2, 29).is_some() {
        366.0
    } else {
        365.0
    }
}

fn fractional_year(day_of_year: u32, utc_hour: f64, year: i32) -> f64 {
    2.0 * PI / days_in_year(year) * (f64::from(day_of_year) - 1.0 + (utc_hour - 12.0) / 24.0)
}

/// Equation of time in minutes.
pub fn equation_of_time(gamma: f64) -> f64 {
    229.18
        * (0.000075 + 0.001868 * gamma.cos()
            - 0.032077 * gamma.sin()
            - 0.014615 * (2.0 * gamma).cos()
            - 0.040849 * (2.0 * gamma).sin())
}

/// Declination in radians.
pub fn declination(gamma: f64) -> f64 {
    0.006918 - 0.399912 * gamma.cos() + 0.070257 * gamma.sin()
        - 0.006758 * (2.0 * gamma).cos()
        + 0.000907 * (2.0 * gamma).sin()
        - 0.002697 * (3.0 * gamma).cos()
        + 0.00148 * (3.0 * gamma).sin()
}

/// True (unrefracted) sun position; azimuth is clockwise from north.
pub fn solar_position(timestamp: DateTime<FixedOffset>, latitude: f64, longitude: f64) -> SolarPosition {
    let utc = timestamp.with_timezone(&Utc);
    let utc_hour = f64::from(utc.hour())
        + f64::from(utc.minute()) / 60.0
        + f64::from(utc.second()) / 3600.0;
    let gamma = fractional_year(utc.ordinal(), utc_hour, utc.year());
    let eot = equation_of_time(gamma);
    let decl = declination(gamma);

    let true_solar_minutes = utc_hour * 60.0 + 4.0 * longitude + eot;
    let hour_angle = deg_to_rad(true_solar_minutes / 4.0 - 180.0);
    let lat = deg_to_rad(latitude);

    let cos_zenith = lat.sin() * decl.sin() + lat.cos() * decl.cos() * hour_angle.cos();
    let zenith = rad_to_deg(cos_zenith.clamp(-1.0, 1.0).acos());

    let azimuth = rad_to_deg(
        (-decl.cos() * hour_angle.sin())
            .atan2(decl.sin() * lat.cos() - decl.cos() * lat.sin() * hour_angle.cos()),
    )
    .rem_euclid(360.0);

    SolarPosition {
        zenith,
        elevation: 90.0 - zenith,
        azimuth,
    }
}

/// Local sunrise and sunset for `date`, or `None` during polar day or night.
pub fn sunrise_sunset(
    date: NaiveDate,
    latitude: f64,
    longitude: f64,
    utc_offset_hours: f64,
) -> Option<(NaiveDateTime, NaiveDateTime)> {
    let gamma = fractional_year(date.ordinal(), 12.0, date.year());
    let eot = equation_of_time(gamma);
    let decl = declination(gamma);
    let lat = deg_to_rad(latitude);
    // 90.833 degrees accounts for refraction and the solar disc.
    let cos_ha = deg_to_rad(90.833).cos() / (lat.cos() * decl.cos()) - lat.tan() * decl.tan();
    if !(-1.0..=1.0).contains(&cos_ha) {
        return None;
    }
    let half_day_minutes = 4.0 * rad_to_deg(cos_ha.acos());
    let solar_noon_utc = 720.0 - 4.0 * longitude - eot;
    let midnight = date.and_hms_opt(0, 0, 0)?;
    let to_local = |utc_minutes: f64| {
        let local = utc_minutes + utc_offset_hours * 60.0;
        midnight + Duration::seconds((local * 60.0).round() as i64)
    };
    Some((
        to_local(solar_noon_utc - half_day_minutes),
        to_local(solar_noon_utc + half_day_minutes),
    ))
}
