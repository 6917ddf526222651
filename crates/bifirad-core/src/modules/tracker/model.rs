use crate::domain::{BifiError, GeometryResult};
use crate::modules::weather::solpos::{deg_to_rad, rad_to_deg};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerAngles {
    pub tracker_theta: f64,
    pub aoi: f64,
    pub surface_tilt: f64,
    pub surface_azimuth: f64,
}

impl TrackerAngles {
    const UNDEFINED: Self = Self {
        tracker_theta: f64::NAN,
        aoi: f64::NAN,
        surface_tilt: f64::NAN,
        surface_azimuth: f64::NAN,
    };
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisGeometry {
    pub axis_tilt: f64,
    pub axis_azimuth: f64,
    pub max_angle: f64,
    pub backtrack: bool,
    pub gcr: f64,
}

fn sind(angle: f64) -> f64 {
    deg_to_rad(angle).sin()
}

fn cosd(angle: f64) -> f64 {
    deg_to_rad(angle).cos()
}

/// Rotation of a single-axis tracker following the sun, with optional
/// backtracking. Everything is undefined while the sun is below the horizon.
pub fn single_axis(zenith: f64, azimuth: f64, axis: &AxisGeometry) -> TrackerAngles {
    if zenith > 90.0 || zenith.is_nan() {
        return TrackerAngles::UNDEFINED;
    }

    let x = sind(zenith) * sind(azimuth);
    let y = sind(zenith) * cosd(azimuth);
    let z = cosd(zenith);

    let xp = x * cosd(axis.axis_azimuth) - y * sind(axis.axis_azimuth);
    let zp = x * sind(axis.axis_tilt) * sind(axis.axis_azimuth)
        + y * sind(axis.axis_tilt) * cosd(axis.axis_azimuth)
        + z * cosd(axis.axis_tilt);

    let ideal = rad_to_deg(xp.atan2(zp));
    let mut theta = ideal;
    if axis.backtrack {
        let temp = (cosd(ideal) / axis.gcr).abs();
        if temp < 1.0 {
            theta = ideal - ideal.signum() * rad_to_deg(temp.acos());
        }
    }
    theta = theta.clamp(-axis.max_angle, axis.max_angle);

    let (surface_tilt, surface_azimuth) =
        surface_orientation(theta, axis.axis_tilt, axis.axis_azimuth);
    TrackerAngles {
        tracker_theta: theta,
        aoi: angle_of_incidence(surface_tilt, surface_azimuth, zenith, azimuth),
        surface_tilt,
        surface_azimuth,
    }
}

/// Fixed plane at `plane_tilt` facing `surface_azimuth`. Only the incidence
/// angle comes from that plane; rotation and surface tilt are `reported_tilt`.
pub fn fixed_tilt(
    zenith: f64,
    azimuth: f64,
    plane_tilt: f64,
    reported_tilt: f64,
    surface_azimuth: f64,
) -> TrackerAngles {
    TrackerAngles {
        tracker_theta: reported_tilt,
        aoi: angle_of_incidence(plane_tilt, surface_azimuth, zenith, azimuth),
        surface_tilt: reported_tilt,
        surface_azimuth,
    }
}

pub fn surface_orientation(theta: f64, axis_tilt: f64, axis_azimuth: f64) -> (f64, f64) {
    let surface_tilt = rad_to_deg((cosd(theta) * cosd(axis_tilt)).clamp(-1.0, 1.0).acos());
    let mut delta = if sind(surface_tilt) == 0.0 {
        90.0
    } else {
        rad_to_deg((sind(theta) / sind(surface_tilt)).clamp(-1.0, 1.0).asin())
    };
    if theta.abs() >= 90.0 {
        delta = -delta + theta.signum() * 180.0;
    }
    (surface_tilt, (axis_azimuth + delta).rem_euclid(360.0))
}

pub fn angle_of_incidence(
    surface_tilt: f64,
    surface_azimuth: f64,
    zenith: f64,
    azimuth: f64,
) -> f64 {
    let projection = cosd(surface_tilt) * cosd(zenith)
        + sind(surface_tilt) * sind(zenith) * cosd(azimuth - surface_azimuth);
    rad_to_deg(projection.clamp(-1.0, 1.0).acos())
}

/// Snaps `theta` to the nearest multiple of `angledelta` (ties to even).
/// `None` leaves the angle untouched; a zero step is rejected.
pub fn round_theta(theta: f64, angledelta: Option<f64>) -> GeometryResult<f64> {
    match angledelta {
        None => Ok(theta),
        Some(delta) if delta == 0.0 => Err(BifiError::input_validation(
            "INPUT.TRACKER_ANGLEDELTA",
            "angledelta = 0; use no angledelta to skip rounding",
        )),
        Some(delta) => {
            let rounded = delta * (theta / delta).round_ties_even();
            Ok(if rounded == 0.0 { 0.0 } else { rounded })
        }
    }
}
