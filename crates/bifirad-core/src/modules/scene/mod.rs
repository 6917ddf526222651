//! Arrays of modules: an nMods x nRows field written as one `xform` line that
//! instantiates the module file.

use crate::common::constants::{CENTER_INDEX_DIVISOR, SCENE_CENTER_DIVISOR};
use crate::domain::{BifiError, SimResult};
use crate::modules::pvmodule::{OBJECTS_DIR, PvModule};
use crate::modules::serialization::{
    format_fixed_f64, format_number as n, round_to, write_text_artifact,
};
use crate::modules::tracker::{TrackerDict, TrackerEntry};
use crate::modules::weather::solpos::deg_to_rad;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Scene layout as it appears in a configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneDefinition {
    pub tilt: f64,
    pub azimuth: f64,
    #[serde(rename = "nMods")]
    pub n_mods: u32,
    #[serde(rename = "nRows")]
    pub n_rows: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gcr: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hub_height: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clearance_height: Option<f64>,
    pub axis_tilt: f64,
    pub originx: f64,
    pub originy: f64,
}

impl Default for SceneDefinition {
    fn default() -> Self {
        Self {
            tilt: 0.0,
            azimuth: 180.0,
            n_mods: 20,
            n_rows: 7,
            pitch: None,
            gcr: None,
            hub_height: None,
            clearance_height: None,
            axis_tilt: 0.0,
            originx: 0.0,
            originy: 0.0,
        }
    }
}

/// Height of the rotation axis for a module whose lowest edge sits at `clearance`.
pub fn hub_from_clearance(clearance: f64, tilt: f64, sceney: f64, offset: f64) -> f64 {
    let s = deg_to_rad(tilt.abs()).sin();
    clearance + 0.5 * s * sceney - offset * s
}

pub fn clearance_from_hub(hub: f64, tilt: f64, sceney: f64, offset: f64) -> f64 {
    let s = deg_to_rad(tilt.abs()).sin();
    hub - 0.5 * s * sceney + offset * s
}

/// Index of the centre module or row, counting from 1.
pub fn center_index(count: u32, divisor: f64) -> f64 {
    (f64::from(count) / divisor).round_ties_even()
}

/// A laid-out array of one module type.
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub module: PvModule,
    pub definition: SceneDefinition,
    pub hub_height: f64,
    pub clearance_height: f64,
    pub pitch: f64,
    pub gcr: f64,
    pub text: String,
    pub radfile: PathBuf,
}

impl Scene {
    /// Lays out `module` following `definition`. `radname` defaults to the
    /// module name.
    pub fn new(module: &PvModule, definition: &SceneDefinition, radname: Option<&str>) -> SimResult<Self> {
        let def = definition;
        if def.n_mods == 0 || def.n_rows == 0 {
            return Err(BifiError::input_validation(
                "INPUT.SCENE_SIZE",
                format!("nMods and nRows must be positive, got {}x{}", def.n_mods, def.n_rows),
            ));
        }
        let hub_height = match (def.hub_height, def.clearance_height) {
            (Some(hub), clearance) => {
                if clearance.is_some() {
                    warn!("both hub_height and clearance_height passed; using hub_height");
                }
                hub
            }
            (None, Some(clearance)) => {
                hub_from_clearance(clearance, def.tilt, module.sceney, module.offsetfromaxis)
            }
            (None, None) => {
                return Err(BifiError::input_validation(
                    "INPUT.SCENE_HEIGHT",
                    "scene needs hub_height or clearance_height",
                ));
            }
        };
        let clearance_height =
            clearance_from_hub(hub_height, def.tilt, module.sceney, module.offsetfromaxis);

        let pitch = match (def.pitch, def.gcr) {
            (Some(pitch), _) if pitch > 0.0 => pitch,
            (_, Some(gcr)) if gcr > 0.0 => round_to(module.sceney / gcr, 3),
            _ => {
                return Err(BifiError::input_validation(
                    "INPUT.SCENE_PITCH",
                    "no valid pitch or gcr in scene definition",
                ));
            }
        };

        let scenex = module.scenex;
        let mut text = format!(
            "!xform -rx {} -t 0 0 {} -a {} -t {} 0 0 -a {} -t 0 {} 0 -i 1 -t {} {} 0 -rz {} -t {} {} 0 ",
            n(def.tilt),
            n(hub_height),
            def.n_mods,
            n(scenex),
            def.n_rows,
            n(pitch),
            n(-scenex * (center_index(def.n_mods, SCENE_CENTER_DIVISOR) - 1.0)),
            n(-pitch * (center_index(def.n_rows, SCENE_CENTER_DIVISOR) - 1.0)),
            n(180.0 - def.azimuth),
            n(def.originx),
            n(def.originy)
        );
        if def.axis_tilt != 0.0 && def.azimuth == 90.0 {
            warn!("axis tilt sensors may not land on the module surfaces");
            text.push_str(&format!(
                "-rx {} -t 0 0 {} ",
                n(def.axis_tilt),
                n(scenex
                    * (center_index(def.n_mods, CENTER_INDEX_DIVISOR) - 1.0)
                    * deg_to_rad(def.axis_tilt).sin())
            ));
        }
        text.push_str(&module.modulefile.display().to_string().replace('\\', "/"));

        let radname = radname.map_or_else(|| module.name().to_string(), str::to_string);
        let filename = format!(
            "{}_C_{}_rtr_{}_tilt_{}_{}modsx{}rows_origin{},{}.rad",
            radname,
            format_fixed_f64(clearance_height, 5),
            format_fixed_f64(pitch, 5),
            format_fixed_f64(def.tilt, 5),
            def.n_mods,
            def.n_rows,
            n(def.originx),
            n(def.originy)
        );
        debug!(hub_height, clearance_height, pitch, "scene geometry");
        Ok(Self {
            module: module.clone(),
            definition: def.clone(),
            hub_height,
            clearance_height,
            pitch,
            gcr: module.sceney / pitch,
            text,
            radfile: Path::new(OBJECTS_DIR).join(filename),
        })
    }

    pub fn save(&self, workdir: &Path) -> SimResult<PathBuf> {
        let path = workdir.join(&self.radfile);
        write_text_artifact(&path, &self.text).map_err(|source| {
            BifiError::io_system(
                "IO.SCENE_WRITE",
                format!("failed to write scene '{}': {}", path.display(), source),
            )
        })?;
        Ok(self.radfile.clone())
    }
}

/// Tracking scenes need a hub height; a lone clearance is taken as the hub.
pub fn tracking_hub_height(definition: &SceneDefinition) -> SimResult<f64> {
    match (definition.hub_height, definition.clearance_height) {
        (Some(hub), Some(_)) => {
            warn!("hub_height and clearance_height passed; using hub_height for tracking");
            Ok(hub)
        }
        (Some(hub), None) => Ok(hub),
        (None, Some(clearance)) => {
            warn!("clearance_height passed to a tracking scene; treating it as hub_height");
            Ok(clearance)
        }
        (None, None) => Err(BifiError::input_validation(
            "INPUT.SCENE_HEIGHT",
            "tracking scene needs hub_height",
        )),
    }
}

/// Scene for one tracker entry. Azimuths of 180 and above are flipped to the
/// opposite side with negated tilt so the row axis stays fixed.
pub fn tracker_scene(
    module: &PvModule,
    definition: &SceneDefinition,
    hub_height: f64,
    entry: &mut TrackerEntry,
) -> SimResult<Scene> {
    if entry.surf_azm >= 180.0 {
        entry.surf_azm -= 180.0;
        entry.surf_tilt = -entry.surf_tilt;
    }
    let clearance = clearance_from_hub(hub_height, entry.theta, module.sceney, module.offsetfromaxis);
    entry.clearance_height = Some(clearance);
    let scene_definition = SceneDefinition {
        tilt: entry.surf_tilt,
        azimuth: entry.surf_azm,
        hub_height: Some(hub_height),
        clearance_height: None,
        ..definition.clone()
    };
    Scene::new(module, &scene_definition, Some(&format!("1axis{}_", entry.key)))
}

/// Writes one scene per tracker entry. Hourly entries without sunlight are
/// skipped.
pub fn make_scene_1axis(
    workdir: &Path,
    module: &PvModule,
    definition: &SceneDefinition,
    trackerdict: &mut TrackerDict,
) -> SimResult<usize> {
    let hub_height = tracking_hub_height(definition)?;
    let cumulative = trackerdict.cumulativesky;
    let mut count = 0;
    for entry in &mut trackerdict.entries {
        if !cumulative && entry.ghi.unwrap_or(0.0) <= 0.0 {
            continue;
        }
        let scene = tracker_scene(module, definition, hub_height, entry)?;
        entry.radfile = Some(scene.save(workdir)?);
        count += 1;
    }
    info!(scenes = count, "created tracking scene files");
    Ok(count)
}
