use std::fs;
use std::path::Path;

/// Shortest round-trip rendering used inside RADIANCE geometry commands.
///
/// Integral values print without a decimal point and negative zero prints as
/// `0`, so `-0.0` never leaks into an `xform` argument.
pub fn format_number(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    if value.is_nan() {
        return "nan".to_string();
    }
    format!("{value}")
}

/// Float rendering that always carries a fractional part (`40.0`, `-45.0`,
/// `5e-05`). Used for file names, tracker keys and sky headers.
pub fn format_python_float(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if value == 0.0 {
        return "0.0".to_string();
    }
    let magnitude = value.abs();
    if !(1.0e-4..1.0e16).contains(&magnitude) {
        return format_exponent(value);
    }
    let rendered = format!("{value}");
    if rendered.contains('.') {
        rendered
    } else {
        format!("{rendered}.0")
    }
}

fn format_exponent(value: f64) -> String {
    let rendered = format!("{value:e}");
    match rendered.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => rendered,
    }
}

pub fn format_fixed_f64(value: f64, precision: usize) -> String {
    format!("{value:.precision$}", precision = precision)
}

/// Rounds half to even at `places` decimals.
pub fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10_f64.powi(places);
    (value * scale).round_ties_even() / scale
}

pub fn normalize_text_artifact(content: &str) -> String {
    let mut normalized = content.replace("\r\n", "\n").replace('\r', "\n");
    if !normalized.is_empty() && !normalized.ends_with('\n') {
        normalized.push('\n');
    }
    normalized
}

pub fn write_text_artifact(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, normalize_text_artifact(content))
}

/// Serde adapter writing NaN entries of a float vector as JSON `null`.
pub mod nullable_floats {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
        values
            .iter()
            .map(|value| (!value.is_nan()).then_some(*value))
            .collect::<Vec<Option<f64>>>()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
        let values = Vec::<Option<f64>>::deserialize(deserializer)?;
        Ok(values
            .into_iter()
            .map(|value| value.unwrap_or(f64::NAN))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::{
        format_fixed_f64, format_number, format_python_float, normalize_text_artifact, round_to,
        write_text_artifact,
    };
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn geometry_numbers_drop_integral_fraction_and_negative_zero() {
        assert_eq!(format_number(1.0), "1");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(-0.795), "-0.795");
        assert_eq!(format_number(0.1 + 0.2), "0.30000000000000004");
    }

    #[test]
    fn python_style_floats_keep_a_fraction() {
        assert_eq!(format_python_float(40.0), "40.0");
        assert_eq!(format_python_float(-45.0), "-45.0");
        assert_eq!(format_python_float(-0.0), "0.0");
        assert_eq!(format_python_float(-105.18), "-105.18");
        assert_eq!(format_python_float(5.0e-5), "5e-05");
        assert_eq!(format_python_float(1.5e17), "1.5e+17");
    }

    #[test]
    fn rounding_is_half_to_even() {
        assert_eq!(round_to(2.5, 0), 2.0);
        assert_eq!(round_to(3.5, 0), 4.0);
        assert!((round_to(0.123456789, 4) - 0.1235).abs() < 1.0e-12);
        assert_eq!(format_fixed_f64(1.23, 5), "1.23000");
    }

    #[test]
    fn text_writes_canonicalize_line_endings_and_create_parents() {
        let temp = TempDir::new().expect("tempdir should be created");
        let path = temp.path().join("objects").join("module.rad");

        write_text_artifact(&path, "! genbox a\r\n! genbox b\r").expect("write should succeed");
        let written = fs::read_to_string(&path).expect("artifact should be readable");

        assert_eq!(written, "! genbox a\n! genbox b\n");
        assert_eq!(normalize_text_artifact(""), "");
    }
}
