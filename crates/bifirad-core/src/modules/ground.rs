//! Ground reflectance: albedo inputs, the material table and the ground
//! definition appended to every sky file.

use crate::common::constants::{LUMINANCE_BLUE, LUMINANCE_GREEN, LUMINANCE_RED};
use crate::common::materials::{GROUND_MATERIAL_FILE, default_material_library};
use crate::domain::{BifiError, ParserResult, SimResult};
use crate::modules::serialization::{format_fixed_f64, format_python_float, round_to};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Albedo as it appears in a configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroundInput {
    Albedo(f64),
    Series(Vec<f64>),
    Rows(Vec<Vec<f64>>),
    Material(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MaterialTable {
    entries: Vec<(String, [f64; 3])>,
}

impl MaterialTable {
    /// Collects every `plastic` definition: name one token after the keyword,
    /// RGB reflectance five to seven tokens after it.
    pub fn parse(text: &str) -> ParserResult<Self> {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        let mut entries = Vec::new();
        for (index, token) in tokens.iter().enumerate() {
            if *token != "plastic" {
                continue;
            }
            let name = tokens.get(index + 1).ok_or_else(|| {
                BifiError::input_validation(
                    "INPUT.MATERIAL_TABLE",
                    "plastic definition is missing its name",
                )
            })?;
            let mut rgb = [0.0; 3];
            for (channel, value) in rgb.iter_mut().enumerate() {
                let raw = tokens.get(index + 5 + channel).ok_or_else(|| {
                    BifiError::input_validation(
                        "INPUT.MATERIAL_TABLE",
                        format!("material '{name}' is missing reflectance values"),
                    )
                })?;
                *value = raw.parse::<f64>().map_err(|_| {
                    BifiError::input_validation(
                        "INPUT.MATERIAL_TABLE",
                        format!("material '{name}' has invalid reflectance '{raw}'"),
                    )
                })?;
            }
            entries.push(((*name).to_string(), rgb));
        }
        Ok(Self { entries })
    }

    pub fn builtin() -> Self {
        Self::parse(default_material_library()).unwrap_or(Self {
            entries: Vec::new(),
        })
    }

    /// Reads `<material_dir>/ground.rad`, falling back to the built-in table.
    pub fn load(material_dir: &Path) -> SimResult<Self> {
        let path = material_dir.join(GROUND_MATERIAL_FILE);
        if !path.is_file() {
            return Ok(Self::builtin());
        }
        let text = fs::read_to_string(&path).map_err(|source| {
            BifiError::io_system(
                "IO.MATERIAL_READ",
                format!("failed to read material file '{}': {}", path.display(), source),
            )
        })?;
        Self::parse(&text)
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn lookup(&self, name: &str) -> Option<[f64; 3]> {
        self.entries
            .iter()
            .find(|(candidate, _)| candidate == name)
            .map(|(_, rgb)| *rgb)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ground {
    ground_type: String,
    rows: Vec<[f64; 3]>,
    normval: Vec<f64>,
    refl_avg: Vec<f64>,
}

impl Ground {
    pub fn new(input: &GroundInput, table: &MaterialTable) -> SimResult<Self> {
        match input {
            GroundInput::Albedo(value) => Self::from_rows("custom", vec![vec![*value; 3]]),
            GroundInput::Series(values) => Self::from_rows(
                "custom",
                values.iter().map(|value| vec![*value; 3]).collect(),
            ),
            GroundInput::Rows(rows) => Self::from_rows("custom", rows.clone()),
            GroundInput::Material(name) => {
                let rgb = table.lookup(name).ok_or_else(|| {
                    BifiError::input_validation(
                        "INPUT.GROUND_MATERIAL",
                        format!(
                            "ground material '{}' not found; available: {}",
                            name,
                            table.names().join(", ")
                        ),
                    )
                })?;
                Self::from_rows(name, vec![rgb.to_vec()])
            }
        }
    }

    pub fn from_rows(ground_type: &str, rows: Vec<Vec<f64>>) -> SimResult<Self> {
        if rows.is_empty() {
            return Err(BifiError::input_validation(
                "INPUT.GROUND_ALBEDO",
                "albedo input has no values",
            ));
        }
        if rows.iter().any(|row| row.len() > 3) {
            warn!("radiance only traces 3 wavelengths; trimming albedo rows to 3 columns");
        }
        let mut clipped = false;
        let mut triples = Vec::with_capacity(rows.len());
        for row in &rows {
            if row.len() < 3 {
                return Err(BifiError::input_validation(
                    "INPUT.GROUND_ALBEDO",
                    format!("albedo rows need 3 columns, found {}", row.len()),
                ));
            }
            let mut triple = [row[0], row[1], row[2]];
            for value in &mut triple {
                if !(0.0..=1.0).contains(value) {
                    clipped = true;
                    *value = value.clamp(0.0, 1.0);
                }
            }
            triples.push(triple);
        }
        if clipped {
            warn!("albedo values outside [0, 1]; constraining to [0, 1]");
        }

        let normval = triples
            .iter()
            .map(|[r, g, b]| normalized_luminance(*r, *g, *b))
            .collect();
        let refl_avg: Vec<f64> = triples
            .iter()
            .map(|[r, g, b]| round_to((r + g + b) / 3.0, 4))
            .collect();
        info!(
            values = refl_avg.len(),
            average = nonzero_mean(&refl_avg),
            "loaded albedo"
        );

        Ok(Self {
            ground_type: ground_type.to_string(),
            rows: triples,
            normval,
            refl_avg,
        })
    }

    pub fn ground_type(&self) -> &str {
        &self.ground_type
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[[f64; 3]] {
        &self.rows
    }

    pub fn normval(&self) -> &[f64] {
        &self.normval
    }

    pub fn refl_avg(&self) -> &[f64] {
        &self.refl_avg
    }

    /// Albedo used for the sky at `index`; a single value applies everywhere.
    pub fn albedo_at(&self, index: usize) -> f64 {
        if self.refl_avg.len() == 1 {
            self.refl_avg[0]
        } else {
            self.refl_avg.get(index).copied().unwrap_or(f64::NAN)
        }
    }

    pub fn mean_albedo(&self) -> f64 {
        nonzero_mean(&self.refl_avg)
    }

    pub fn ground_string(&self, index: usize, cumulative: bool) -> SimResult<String> {
        let [r, g, b] = if cumulative {
            let channel = |c: usize| {
                let values: Vec<f64> = self.rows.iter().map(|row| row[c]).collect();
                nonzero_mean(&values)
            };
            [channel(0), channel(1), channel(2)]
        } else {
            *self.rows.get(index).ok_or_else(|| {
                BifiError::input_validation(
                    "INPUT.GROUND_INDEX",
                    format!(
                        "index {} passed to albedo with only {} values",
                        index,
                        self.rows.len()
                    ),
                )
            })?
        };
        let mut normval = normalized_luminance(r, g, b);
        if normval == 0.0 {
            normval = 1.0;
        }
        Ok(format!(
            "\nskyfunc glow ground_glow\n0\n0\n4 {} {} {} 0\n\
             \nground_glow source ground\n0\n0\n4 0 0 -1 180\n\
             \nvoid plastic {ty}\n0\n0\n5 {} {} {} 0 0\n\
             \n{ty} ring groundplane\n0\n0\n8\n0 0 -.01\n0 0 1\n0 100",
            format_python_float(r / normval),
            format_python_float(g / normval),
            format_python_float(b / normval),
            format_fixed_f64(r, 3),
            format_fixed_f64(g, 3),
            format_fixed_f64(b, 3),
            ty = self.ground_type,
        ))
    }
}

pub fn normalized_luminance(r: f64, g: f64, b: f64) -> f64 {
    r * LUMINANCE_RED + g * LUMINANCE_GREEN + b * LUMINANCE_BLUE
}

/// Mean of the non-zero, non-NaN values, or the plain mean when that is not
/// positive.
pub fn nonzero_mean(values: &[f64]) -> f64 {
    let finite: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if finite.is_empty() {
        return f64::NAN;
    }
    let mean = finite.iter().sum::<f64>() / finite.len() as f64;
    if mean > 0.0 {
        let nonzero: Vec<f64> = finite.into_iter().filter(|v| *v != 0.0).collect();
        nonzero.iter().sum::<f64>() / nonzero.len() as f64
    } else {
        mean
    }
}

#[cfg(test)]
mod tests {
    use super::{Ground, GroundInput, MaterialTable, nonzero_mean};
    use crate::domain::BifiErrorCategory;
    use tempfile::TempDir;

    fn table() -> MaterialTable {
        MaterialTable::builtin()
    }

    #[test]
    fn material_lookup_returns_litesoil_reflectance() {
        let ground = Ground::new(&GroundInput::Material("litesoil".to_string()), &table())
            .expect("litesoil should be in the built-in table");
        assert_eq!(ground.ground_type(), "litesoil");
        assert_eq!(ground.rows(), &[[0.29, 0.187, 0.163]]);
        assert!((ground.refl_avg()[0] - 0.2133).abs() < 1.0e-9);
        assert!((ground.mean_albedo() - 0.213).abs() < 1.0e-3);
    }

    #[test]
    fn unknown_material_is_rejected() {
        let error = Ground::new(&GroundInput::Material("lava".to_string()), &table())
            .expect_err("unknown material should fail");
        assert_eq!(error.category(), BifiErrorCategory::InputValidationError);
        assert_eq!(error.placeholder(), "INPUT.GROUND_MATERIAL");
    }

    #[test]
    fn scalar_albedo_is_repeated_and_clipped() {
        let ground = Ground::new(&GroundInput::Albedo(0.2), &table()).expect("albedo is valid");
        assert_eq!(ground.ground_type(), "custom");
        assert_eq!(ground.refl_avg(), &[0.2]);

        let clipped = Ground::new(&GroundInput::Albedo(2.0), &table()).expect("albedo is valid");
        assert_eq!(clipped.refl_avg(), &[1.0]);
    }

    #[test]
    fn rgb_series_averages_per_row_and_trims_extra_columns() {
        let ground = Ground::new(
            &GroundInput::Rows(vec![vec![0.2, 0.3, 0.4, 0.9], vec![0.12, 0.13, 0.26]]),
            &table(),
        )
        .expect("rows are valid");
        assert_eq!(ground.len(), 2);
        assert!((ground.refl_avg()[0] - 0.3).abs() < 1.0e-12);
        assert!((ground.refl_avg()[1] - 0.17).abs() < 1.0e-12);
    }

    #[test]
    fn ground_string_describes_glow_plastic_and_ring() {
        let ground = Ground::new(&GroundInput::Material("litesoil".to_string()), &table())
            .expect("litesoil should be in the built-in table");
        let text = ground.ground_string(0, false).expect("index 0 exists");
        assert!(text.starts_with("\nskyfunc glow ground_glow\n0\n0\n4 "));
        assert!(text.contains("\nvoid plastic litesoil\n0\n0\n5 0.290 0.187 0.163 0 0\n"));
        assert!(text.ends_with("\nlitesoil ring groundplane\n0\n0\n8\n0 0 -.01\n0 0 1\n0 100"));

        let missing = ground.ground_string(3, false).expect_err("index 3 is out of range");
        assert_eq!(missing.placeholder(), "INPUT.GROUND_INDEX");
    }

    #[test]
    fn cumulative_ground_uses_nonzero_means() {
        let ground = Ground::new(&GroundInput::Series(vec![0.0, 0.2, 0.4]), &table())
            .expect("series is valid");
        let text = ground.ground_string(0, true).expect("cumulative string");
        assert!(text.contains("5 0.300 0.300 0.300 0 0"));
        assert_eq!(nonzero_mean(&[0.0, 0.0]), 0.0);
    }

    #[test]
    fn material_table_prefers_workspace_file() {
        let temp = TempDir::new().expect("tempdir should be created");
        std::fs::write(
            temp.path().join("ground.rad"),
            "void plastic redclay\n0\n0\n5 0.5 0.2 0.1 0 0\n",
        )
        .expect("material file should be written");
        let table = MaterialTable::load(temp.path()).expect("material file should parse");
        assert_eq!(table.names(), vec!["redclay"]);
        assert_eq!(table.lookup("redclay"), Some([0.5, 0.2, 0.1]));
    }
}
