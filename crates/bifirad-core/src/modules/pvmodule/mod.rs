//! PV module geometry: the module (or cell array), torque tube, glass and
//! frame, written as RADIANCE `genbox`/`xform` commands.

mod frame;
mod library;
mod tube;

pub use frame::Frame;
pub use library::{MODULE_LIBRARY_FILE, ModuleLibrary};
pub use tube::{TorqueTube, TubeType};

use crate::common::constants::GLASS_EDGE;
use crate::domain::{BifiError, SimResult};
use crate::modules::serialization::{format_number as n, round_to, write_text_artifact};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const OBJECTS_DIR: &str = "objects";

/// Cell-level module layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellModule {
    pub numcellsx: u32,
    pub numcellsy: u32,
    pub xcell: f64,
    pub ycell: f64,
    #[serde(default)]
    pub xcellgap: f64,
    #[serde(default)]
    pub ycellgap: f64,
    /// Gap between the two half-cell blocks of a centre-junction-box module.
    #[serde(rename = "centerJB", default, skip_serializing_if = "Option::is_none")]
    pub center_jb: Option<f64>,
}

impl CellModule {
    pub fn module_x(&self) -> f64 {
        f64::from(self.numcellsx) * self.xcell + f64::from(self.numcellsx - 1) * self.xcellgap
    }

    pub fn module_y(&self) -> f64 {
        f64::from(self.numcellsy) * self.ycell + f64::from(self.numcellsy - 1) * self.ycellgap
    }

    /// Shift that keeps a centre sensor on a cell when the column count is even.
    pub fn center_shift(&self) -> f64 {
        if self.numcellsx % 2 == 0 { self.xcell / 2.0 } else { 0.0 }
    }

    pub fn packaging_factor(&self) -> f64 {
        let cells = self.xcell * self.ycell * f64::from(self.numcellsx * self.numcellsy);
        round_to(cells / (self.module_x() * self.module_y()), 2)
    }
}

/// Module inputs as they appear in a configuration file or `module.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleDefinition {
    pub name: String,
    /// Width along the torque tube or rack (m).
    pub x: Option<f64>,
    /// Length across the row (m). Portrait modules have y > x.
    pub y: Option<f64>,
    pub z: f64,
    pub modulematerial: String,
    pub bifi: f64,
    pub xgap: f64,
    pub ygap: f64,
    /// Distance from the module back to the tube edge.
    pub zgap: f64,
    pub numpanels: u32,
    pub glass: bool,
    pub customtext: String,
    #[serde(rename = "cellModule", skip_serializing_if = "Option::is_none")]
    pub cell_module: Option<CellModule>,
    #[serde(rename = "tubeParams", skip_serializing_if = "Option::is_none")]
    pub tube: Option<TorqueTube>,
    #[serde(rename = "frameParams", skip_serializing_if = "Option::is_none")]
    pub frame: Option<Frame>,
}

impl Default for ModuleDefinition {
    fn default() -> Self {
        Self {
            name: String::new(),
            x: None,
            y: None,
            z: 0.02,
            modulematerial: "black".to_string(),
            bifi: 1.0,
            xgap: 0.01,
            ygap: 0.0,
            zgap: 0.1,
            numpanels: 1,
            glass: false,
            customtext: String::new(),
            cell_module: None,
            tube: None,
            frame: None,
        }
    }
}

impl ModuleDefinition {
    pub fn new(name: &str, x: f64, y: f64) -> Self {
        Self {
            name: name.to_string(),
            x: Some(x),
            y: Some(y),
            ..Self::default()
        }
    }

    /// Name with whitespace replaced, as used for file names and the library key.
    pub fn sanitized_name(&self) -> String {
        self.name.trim().replace(' ', "_")
    }

    pub fn compile(&self) -> SimResult<PvModule> {
        PvModule::from_definition(self.clone())
    }
}

/// A compiled module: its definition plus the derived scene dimensions and
/// RADIANCE text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PvModule {
    #[serde(flatten)]
    pub definition: ModuleDefinition,
    pub scenex: f64,
    pub sceney: f64,
    pub scenez: f64,
    pub offsetfromaxis: f64,
    #[serde(rename = "packagingFactor")]
    pub packaging_factor: f64,
    pub text: String,
    pub modulefile: PathBuf,
}

impl PvModule {
    pub fn from_definition(mut definition: ModuleDefinition) -> SimResult<Self> {
        definition.name = definition.sanitized_name();
        if definition.name.is_empty() {
            return Err(BifiError::input_validation(
                "INPUT.MODULE_NAME",
                "module name must not be empty",
            ));
        }
        if definition.numpanels == 0 {
            return Err(BifiError::input_validation(
                "INPUT.MODULE_NUMPANELS",
                "numpanels must be at least 1",
            ));
        }
        if let Some(frame) = &definition.frame {
            frame.validate()?;
        }
        let def = &definition;
        let ny = def.numpanels;
        let ygap = def.ygap;

        let visible_tube = def.tube.as_ref().filter(|tube| tube.visible);
        let diam = visible_tube.map_or(0.0, |tube| tube.diameter);
        let axisofrotation = def.tube.as_ref().is_some_and(|tube| tube.axisofrotation);
        let mut offsetfromaxis = 0.0;
        if axisofrotation {
            offsetfromaxis = if visible_tube.is_some() {
                round_to(def.zgap + diam / 2.0, 8)
            } else {
                def.zgap
            };
            if let Some(frame) = &def.frame {
                offsetfromaxis += frame.frame_z;
            }
        }

        let (mut text, x, y, cc, packaging_factor) = match &def.cell_module {
            Some(cells) => {
                if cells.numcellsx == 0 || cells.numcellsy == 0 {
                    return Err(BifiError::input_validation(
                        "INPUT.MODULE_CELLS",
                        "cell-level modules need at least one cell in each direction",
                    ));
                }
                let (text, x, y) = cell_level_text(def, cells, offsetfromaxis);
                let factor = cells.packaging_factor();
                info!(packaging_factor = factor, "cell-level module");
                (text, x, y, cells.center_shift(), factor)
            }
            None => {
                let (Some(x), Some(y)) = (def.x, def.y) else {
                    return Err(BifiError::input_validation(
                        "INPUT.MODULE_DIMENSIONS",
                        format!(
                            "module '{}' needs x and y, or cell-level parameters",
                            def.name
                        ),
                    ));
                };
                let text = format!(
                    "! genbox {} {} {} {} {} | xform -t {} {} {} -a {ny} -t 0 {} 0",
                    def.modulematerial,
                    def.name,
                    n(x),
                    n(y),
                    n(def.z),
                    n(-x / 2.0),
                    n(stack_start(y, ny, ygap)),
                    n(offsetfromaxis),
                    n(y + ygap)
                );
                (text, x, y, 0.0, 1.0)
            }
        };

        let scenex = x + def.xgap;
        let sceney = round_to(y * f64::from(ny) + ygap * f64::from(ny - 1), 8);
        let scenez = round_to(def.zgap + diam / 2.0, 8);

        let (z_inc, frame_text) = match &def.frame {
            Some(frame) => frame.text(x, y, ygap, ny, offsetfromaxis)?,
            None => (0.0, String::new()),
        };

        if let Some(tube) = visible_tube {
            text.push_str(&tube.text(z_inc, def.zgap, scenex, cc)?);
        }

        if def.glass {
            let edge = GLASS_EDGE;
            text.push_str(&format!(
                "\r\n! genbox stock_glass {}_Glass {} {} {} | xform -t 0 {} 0 | xform -t {} {} {} -a {ny} -t 0 {} 0",
                def.name,
                n(x + edge),
                n(y + edge),
                n(def.z + edge),
                n(-edge / 2.0),
                n(-x / 2.0 - edge / 2.0 + cc),
                n(stack_start(y, ny, ygap)),
                n(offsetfromaxis - 0.5 * edge + 0.5 * def.z),
                n(y + ygap)
            ));
        }

        text.push_str(&frame_text);
        if !def.customtext.is_empty() {
            if !def.customtext.starts_with(['\n', '\r']) {
                text.push('\n');
            }
            text.push_str(&def.customtext);
        }

        debug!(
            module = %def.name,
            scenex,
            sceney,
            scenez,
            offsetfromaxis,
            "module geometry"
        );
        let modulefile = Path::new(OBJECTS_DIR).join(format!("{}.rad", def.name));
        if def.cell_module.is_some() {
            definition.x = Some(x);
            definition.y = Some(y);
        }
        Ok(Self {
            definition,
            scenex,
            sceney,
            scenez,
            offsetfromaxis,
            packaging_factor,
            text,
            modulefile,
        })
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn x(&self) -> f64 {
        self.definition.x.unwrap_or(0.0)
    }

    pub fn y(&self) -> f64 {
        self.definition.y.unwrap_or(0.0)
    }

    pub fn z(&self) -> f64 {
        self.definition.z
    }

    pub fn numpanels(&self) -> u32 {
        self.definition.numpanels
    }

    pub fn bifi(&self) -> f64 {
        self.definition.bifi
    }

    /// Writes `objects/<name>.rad` under `workdir` and records the module in
    /// `module.json`.
    pub fn save(&self, workdir: &Path) -> SimResult<PathBuf> {
        let path = workdir.join(&self.modulefile);
        write_text_artifact(&path, &self.text).map_err(|source| {
            BifiError::io_system(
                "IO.MODULE_WRITE",
                format!("failed to write module file '{}': {}", path.display(), source),
            )
        })?;
        let library_path = workdir.join(MODULE_LIBRARY_FILE);
        let mut library = ModuleLibrary::load(&library_path)?;
        library.insert(self.clone());
        library.save(&library_path)?;
        info!(module = %self.name(), path = %path.display(), "module updated");
        Ok(path)
    }
}

fn stack_start(y: f64, ny: u32, ygap: f64) -> f64 {
    (-y * f64::from(ny) / 2.0) - (ygap * f64::from(ny - 1) / 2.0)
}

fn cell_level_text(def: &ModuleDefinition, cells: &CellModule, offset: f64) -> (String, f64, f64) {
    let x = cells.module_x();
    let y = cells.module_y();
    let ny = def.numpanels;
    let center_jb = cells.center_jb.unwrap_or(0.0);
    let mut text = format!(
        "! genbox {} cellPVmodule {} {} {} | xform -t {} {} {} -a {} -t {} 0 0 ",
        def.modulematerial,
        n(cells.xcell),
        n(cells.ycell),
        n(def.z),
        n(-x / 2.0 + cells.center_shift()),
        n(stack_start(y, ny, def.ygap) - center_jb / 2.0),
        n(offset),
        cells.numcellsx,
        n(cells.xcell + cells.xcellgap)
    );
    let row_pitch = n(cells.ycell + cells.ycellgap);
    if center_jb != 0.0 {
        text.push_str(&format!("-a {} -t 0 {row_pitch} 0 ", cells.numcellsy / 2));
        text.push_str(&format!("-a 2 -t 0 {} 0 ", n(y / 2.0 + center_jb)));
    } else {
        text.push_str(&format!("-a {} -t 0 {row_pitch} 0 ", cells.numcellsy));
    }
    text.push_str(&format!("-a {ny} -t 0 {} 0", n(y + def.ygap)));
    (text, x, y)
}

#[cfg(test)]
mod tests {
    use super::{CellModule, Frame, ModuleDefinition, ModuleLibrary, TorqueTube};
    use std::fs;
    use tempfile::TempDir;

    fn cells() -> CellModule {
        CellModule {
            numcellsx: 6,
            numcellsy: 10,
            xcell: 0.156,
            ycell: 0.156,
            xcellgap: 0.02,
            ycellgap: 0.02,
            center_jb: None,
        }
    }

    #[test]
    fn plain_module_with_square_tube_below_it() {
        let definition = ModuleDefinition {
            tube: Some(TorqueTube {
                tubetype: "square".to_string(),
                axisofrotation: false,
                ..TorqueTube::default()
            }),
            ..ModuleDefinition::new("square", 1.59, 0.95)
        };
        let module = definition.compile().expect("module should compile");
        assert_eq!(
            module.text,
            "! genbox black square 1.59 0.95 0.02 | xform -t -0.795 -0.475 0 -a 1 -t 0 0.95 0\r\n! genbox Metal_Grey tube1 1.6 0.1 0.1 | xform -t -0.8 -0.05 -0.2"
        );
        assert_eq!(module.offsetfromaxis, 0.0);
        assert_eq!(module.scenez, 0.15);
    }

    #[test]
    fn cell_level_module_derives_size_and_appends_custom_text() {
        let definition = ModuleDefinition {
            name: "test-module".to_string(),
            cell_module: Some(cells()),
            customtext: "!xform -rz 0 customTT.rad | xform -rz 90 -t 0.5 0 -0.15".to_string(),
            ..ModuleDefinition::default()
        };
        let module = definition.compile().expect("cell module should compile");
        assert!((module.x() - 1.036).abs() < 1.0e-12);
        assert!((module.y() - 1.74).abs() < 1.0e-12);
        assert!((module.scenex - 1.046).abs() < 1.0e-12);
        assert_eq!(module.sceney, 1.74);
        assert_eq!(
            module.text,
            "! genbox black cellPVmodule 0.156 0.156 0.02 | xform -t -0.44 -0.87 0 -a 6 -t 0.176 0 0 -a 10 -t 0 0.176 0 -a 1 -t 0 1.74 0\n!xform -rz 0 customTT.rad | xform -rz 90 -t 0.5 0 -0.15"
        );
        assert_eq!(module.packaging_factor, 0.81);
    }

    #[test]
    fn center_junction_box_splits_the_cell_array() {
        let mut layout = cells();
        layout.center_jb = Some(0.01);
        let definition = ModuleDefinition {
            name: "jb".to_string(),
            cell_module: Some(layout),
            ..ModuleDefinition::default()
        };
        let module = definition.compile().expect("cell module should compile");
        assert!(module.text.contains("-a 5 -t 0 0.176 0 -a 2 -t 0 0.88 0 -a 1"));
    }

    #[test]
    fn axis_of_rotation_offsets_follow_tube_and_frame() {
        let offsets = [(true, true, 0.18), (true, false, 0.15), (false, true, 0.13), (false, false, 0.1)];
        for (visible, framed, expected) in offsets {
            let definition = ModuleDefinition {
                tube: Some(TorqueTube {
                    visible,
                    ..TorqueTube::default()
                }),
                frame: framed.then(Frame::default),
                ..ModuleDefinition::new("test-module", 2.0, 1.0)
            };
            let module = definition.compile().expect("module should compile");
            assert!(
                (module.offsetfromaxis - expected).abs() < 1.0e-12,
                "visible={visible} framed={framed} offset={}",
                module.offsetfromaxis
            );
        }
    }

    #[test]
    fn glass_and_frame_follow_tube_in_text_order() {
        let definition = ModuleDefinition {
            glass: true,
            tube: Some(TorqueTube::default()),
            frame: Some(Frame::default()),
            ..ModuleDefinition::new("Prism Solar", 1.0, 2.0)
        };
        let module = definition.compile().expect("module should compile");
        assert_eq!(module.name(), "Prism_Solar");
        let tube = module.text.find("tube1").expect("tube text");
        let glass = module.text.find("Prism_Solar_Glass").expect("glass text");
        let frame = module.text.find("frameside").expect("frame text");
        assert!(tube < glass && glass < frame);
        assert_eq!(module.sceney, 2.0);
        assert!((module.scenex - 1.01).abs() < 1.0e-12);
    }

    #[test]
    fn missing_dimensions_are_rejected() {
        let definition = ModuleDefinition {
            name: "blank".to_string(),
            ..ModuleDefinition::default()
        };
        let error = definition.compile().expect_err("module without size should fail");
        assert_eq!(error.placeholder(), "INPUT.MODULE_DIMENSIONS");
    }

    #[test]
    fn save_writes_rad_file_and_library_entry() {
        let temp = TempDir::new().expect("tempdir should be created");
        let module = ModuleDefinition::new("test module", 1.0, 2.0)
            .compile()
            .expect("module should compile");
        let path = module.save(temp.path()).expect("module should save");
        assert_eq!(path, temp.path().join("objects").join("test_module.rad"));
        let text = fs::read_to_string(&path).expect("module file should be readable");
        assert!(text.starts_with("! genbox black test_module 1 2 0.02"));

        let library = ModuleLibrary::load(&temp.path().join("module.json")).expect("library should load");
        let stored = library.get("test_module").expect("module should be stored");
        assert_eq!(stored.sceney, 2.0);
        assert_eq!(stored.definition.x, Some(1.0));
    }
}
