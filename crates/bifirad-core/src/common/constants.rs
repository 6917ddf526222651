//! Shared numeric constants for scene geometry and post-processing.
//!
//! Fit coefficients and the luminance weights are fixed published values; the
//! geometry epsilons are the offsets used when placing sensors just off a
//! module surface.

/// Weights normalising a ground reflectance triple for the glow source.
/// The red weight is 0.216 rather than the ITU 0.2126.
pub const LUMINANCE_RED: f64 = 0.216;
pub const LUMINANCE_GREEN: f64 = 0.7152;
pub const LUMINANCE_BLUE: f64 = 0.0722;

/// Distance (m) sensors sit off the front and rear module surfaces.
pub const DEFAULT_FRONT_SURFACE_OFFSET: f64 = 0.001;
pub const DEFAULT_BACK_SURFACE_OFFSET: f64 = 0.001;

/// Added to the front irradiance before forming back/front ratios.
pub const RATIO_EPSILON: f64 = 0.001;

/// Added to DNI when re-deriving a sun altitude from GHI and DHI.
pub const DNI_EPSILON: f64 = 0.001;

/// Extra thickness of the glass envelope around a module.
pub const GLASS_EDGE: f64 = 0.005;

/// Quadratic MAD-to-mismatch fit, in percent.
pub const MISMATCH_FIT_LINEAR: f64 = 0.142;
pub const MISMATCH_FIT_QUADRATIC: f64 = 0.032;
pub const MISMATCH_ALT_FIT_LINEAR: f64 = 0.054;
pub const MISMATCH_ALT_FIT_QUADRATIC: f64 = 0.068;

/// Mean irradiance below which a module is treated as dark.
pub const DARK_IRRADIANCE_THRESHOLD: f64 = 0.001;

/// Material substrings nulled out of results by default.
pub const DEFAULT_CLEAN_MATCHERS: [&str; 7] = ["sky", "pole", "tube", "bar", "ground", "3267", "1540"];

/// Material tags deep cleaning keeps for the front and rear module faces.
pub const FRONT_FACE_TAG: &str = "PVmodule.6457";
pub const BACK_FACE_TAG: &str = "PVmodule.2310";

/// Centre-index divisor used for both the scene array and sensor placement.
pub const CENTER_INDEX_DIVISOR: f64 = 1.99;
pub const SCENE_CENTER_DIVISOR: f64 = 1.999;

pub const HOURS_PER_NON_LEAP_YEAR: usize = 8760;

#[cfg(test)]
mod tests {
    use super::{
        DEFAULT_CLEAN_MATCHERS, HOURS_PER_NON_LEAP_YEAR, LUMINANCE_BLUE, LUMINANCE_GREEN,
        LUMINANCE_RED, MISMATCH_FIT_LINEAR, MISMATCH_FIT_QUADRATIC,
    };

    #[test]
    fn green_dominates_luminance_weights() {
        assert!(LUMINANCE_GREEN > LUMINANCE_RED);
        assert!(LUMINANCE_RED > LUMINANCE_BLUE);
        let sum = LUMINANCE_RED + LUMINANCE_GREEN + LUMINANCE_BLUE;
        assert!((sum - 1.0034).abs() <= 1.0e-12);
    }

    #[test]
    fn fit_and_calendar_constants_are_consistent() {
        assert!(MISMATCH_FIT_LINEAR > MISMATCH_FIT_QUADRATIC);
        assert_eq!(HOURS_PER_NON_LEAP_YEAR, 365 * 24);
        assert!(DEFAULT_CLEAN_MATCHERS.contains(&"ground"));
    }
}
