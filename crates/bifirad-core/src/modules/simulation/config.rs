use crate::domain::{BifiError, SimResult};
use crate::modules::analysis::AnalysisOptions;
use crate::modules::ground::GroundInput;
use crate::modules::pvmodule::ModuleDefinition;
use crate::modules::scene::SceneDefinition;
use crate::modules::tracker::TrackerSettings;
use crate::modules::weather::WeatherOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherConfig {
    /// EPW or TMY3 file, relative to the configuration file.
    pub file: PathBuf,
    #[serde(flatten)]
    pub options: WeatherOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkyMode {
    #[default]
    Cumulative,
    Hourly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SkyConfig {
    pub mode: SkyMode,
}

/// A simulation described as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub name: String,
    pub weather: WeatherConfig,
    /// Falls back to the albedo column of the weather file when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ground: Option<GroundInput>,
    pub module: ModuleDefinition,
    pub scene: SceneDefinition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking: Option<TrackerSettings>,
    #[serde(default)]
    pub sky: SkyConfig,
    #[serde(default)]
    pub analysis: AnalysisOptions,
}

impl SimulationConfig {
    pub fn from_json(text: &str) -> SimResult<Self> {
        let mut config: Self = serde_json::from_str(text).map_err(|source| {
            BifiError::input_validation(
                "INPUT.CONFIG_FORMAT",
                format!("invalid simulation config: {}", source),
            )
        })?;
        if config.name.trim().is_empty() {
            return Err(BifiError::input_validation(
                "INPUT.CONFIG_NAME",
                "simulation config needs a non-empty name",
            ));
        }
        if config.module.name.is_empty() {
            config.module.name = config.name.clone();
        }
        let cumulative = config.sky.mode == SkyMode::Cumulative;
        if let Some(tracking) = config.tracking.as_mut() {
            tracking.cumulativesky = cumulative;
        }
        Ok(config)
    }

    /// Reads `path`, resolving the weather file against its directory.
    pub fn load(path: &Path) -> SimResult<Self> {
        let text = fs::read_to_string(path).map_err(|source| {
            BifiError::io_system(
                "IO.CONFIG_READ",
                format!("failed to read config '{}': {}", path.display(), source),
            )
        })?;
        let mut config = Self::from_json(&text)?;
        if config.weather.file.is_relative() {
            if let Some(parent) = path.parent() {
                config.weather.file = parent.join(&config.weather.file);
            }
        }
        debug!(name = %config.name, tracking = config.tracking.is_some(), "loaded simulation config");
        Ok(config)
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking.is_some()
    }

    pub fn is_cumulative(&self) -> bool {
        self.sky.mode == SkyMode::Cumulative
    }
}

#[cfg(test)]
mod tests {
    use super::{SimulationConfig, SkyMode};
    use crate::modules::analysis::Accuracy;
    use crate::modules::ground::GroundInput;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    const CONFIG: &str = r#"{
        "name": "demo",
        "weather": {"file": "site.csv", "start": "06_21_06", "label": "center"},
        "ground": "litesoil",
        "module": {"x": 1.0, "y": 2.0, "tubeParams": {"diameter": 0.15}},
        "scene": {"pitch": 6.0, "hub_height": 1.5, "nMods": 5, "nRows": 3},
        "tracking": {"limit_angle": 50.0, "cumulativesky": true},
        "sky": {"mode": "hourly"},
        "analysis": {"sensorsy": 4, "accuracy": "high"}
    }"#;

    #[test]
    fn config_fills_defaults_and_follows_sky_mode() {
        let config = SimulationConfig::from_json(CONFIG).expect("config should parse");
        assert_eq!(config.module.name, "demo");
        assert_eq!(config.module.z, 0.02);
        assert_eq!(config.ground, Some(GroundInput::Material("litesoil".to_string())));
        assert_eq!(config.sky.mode, SkyMode::Hourly);
        let tracking = config.tracking.as_ref().expect("tracking is configured");
        assert!(!tracking.cumulativesky);
        assert_eq!(tracking.limit_angle, 50.0);
        assert!(tracking.backtrack);
        assert_eq!(config.analysis.sensorsy, 4);
        assert_eq!(config.analysis.accuracy, Accuracy::High);
        assert_eq!(config.weather.options.start.as_deref(), Some("06_21_06"));
    }

    #[test]
    fn weather_path_is_relative_to_the_config() {
        let temp = TempDir::new().expect("tempdir should be created");
        let path = temp.path().join("config.json");
        fs::write(&path, CONFIG).expect("config should be written");
        let config = SimulationConfig::load(&path).expect("config should load");
        assert_eq!(config.weather.file, temp.path().join("site.csv"));
    }

    #[test]
    fn missing_sections_are_input_errors() {
        let error = SimulationConfig::from_json(r#"{"name": "x"}"#).expect_err("weather is required");
        assert_eq!(error.placeholder(), "INPUT.CONFIG_FORMAT");
        let error = SimulationConfig::load(Path::new("/nonexistent/config.json"))
            .expect_err("missing file should fail");
        assert_eq!(error.placeholder(), "IO.CONFIG_READ");
    }
}
