use crate::domain::{BifiError, SimResult};
use crate::modules::serialization::format_number as n;
use serde::{Deserialize, Serialize};

/// Aluminium frame around each module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Frame {
    pub frame_material: String,
    /// Profile thickness.
    pub frame_thickness: f64,
    /// Depth the frame extends below the module plane.
    pub frame_z: f64,
    /// Length of the bottom lip bolted to the racking.
    pub frame_width: f64,
    /// 2 frames the long sides only; 4 frames every side.
    #[serde(rename = "nSides_frame")]
    pub n_sides: u32,
}

impl Default for Frame {
    fn default() -> Self {
        Self {
            frame_material: "Metal_Grey".to_string(),
            frame_thickness: 0.05,
            frame_z: 0.03,
            frame_width: 0.05,
            n_sides: 4,
        }
    }
}

struct Piece<'a> {
    name: &'a str,
    size: (f64, f64, f64),
    at: (f64, f64, f64),
}

impl Frame {
    pub fn validate(&self) -> SimResult<()> {
        if self.n_sides != 2 && self.n_sides != 4 {
            return Err(BifiError::input_validation(
                "INPUT.FRAME_SIDES",
                format!("nSides_frame must be 2 or 4, got {}", self.n_sides),
            ));
        }
        Ok(())
    }

    /// Returns the extra depth the frame adds below the module and its text.
    pub fn text(
        &self,
        x: f64,
        y: f64,
        ygap: f64,
        numpanels: u32,
        offsetfromaxis: f64,
    ) -> SimResult<(f64, String)> {
        self.validate()?;
        let thick = self.frame_thickness;
        let height = self.frame_z;
        let leg = self.frame_width - thick;
        let ny = numpanels;

        // Two-sided frames on landscape modules are built portrait and rotated.
        let (x_temp, y_temp, frame_y, rotframe, shift) = if x > y && self.n_sides == 2 {
            (y, x, x, 90, x / 2.0 - y / 2.0)
        } else {
            (x, y, y, 0, 0.0)
        };
        let y_half = y * f64::from(ny) / 2.0 + ygap * f64::from(ny - 1) / 2.0;
        let side_y = -y_half - shift;
        let side_z = offsetfromaxis - height;

        let long_sides = [
            Piece {
                name: "frameside",
                size: (thick, frame_y, height),
                at: (-x_temp / 2.0, side_y, side_z),
            },
            Piece {
                name: "frameleg",
                size: (leg, frame_y, thick),
                at: (-x_temp / 2.0 + thick, side_y, side_z),
            },
            Piece {
                name: "frameside",
                size: (thick, frame_y, height),
                at: (x_temp / 2.0 - thick, side_y, side_z),
            },
            Piece {
                name: "frameleg",
                size: (leg, frame_y, thick),
                at: (x_temp / 2.0 - thick - leg, side_y, side_z),
            },
        ];
        let mut text = String::new();
        for piece in &long_sides {
            text.push_str(&self.genbox(piece));
            text.push_str(&format!(
                " -a {ny} -t 0 {} 0 | xform -rz {rotframe}",
                n(y_temp + ygap)
            ));
        }

        if self.n_sides == 4 {
            let filler = (x_temp - 2.0 * thick, thick, height - thick);
            let filler_x = -x_temp / 2.0 + thick;
            let filler_z = offsetfromaxis - height + thick;
            let filler_leg = (x_temp - 2.0 * thick - 2.0 * leg, thick + leg, thick);
            let filler_leg_x = -x_temp / 2.0 + thick + leg;
            let short_sides = [
                Piece {
                    name: "frameside",
                    size: filler,
                    at: (filler_x, -y_half + y - thick, filler_z),
                },
                Piece {
                    name: "frameleg",
                    size: filler_leg,
                    at: (filler_leg_x, -y_half + y - thick - leg, side_z),
                },
                Piece {
                    name: "frameside",
                    size: filler,
                    at: (filler_x, -y_half, filler_z),
                },
                Piece {
                    name: "frameleg",
                    size: filler_leg,
                    at: (filler_leg_x, -y_half, side_z),
                },
            ];
            for piece in &short_sides {
                text.push_str(&self.genbox(piece));
                text.push_str(&format!(" -a {ny} -t 0 {} 0", n(y + ygap)));
            }
        }
        Ok((height, text))
    }

    fn genbox(&self, piece: &Piece<'_>) -> String {
        format!(
            "\r\n! genbox {} {} {} {} {} | xform -t {} {} {}",
            self.frame_material,
            piece.name,
            n(piece.size.0),
            n(piece.size.1),
            n(piece.size.2),
            n(piece.at.0),
            n(piece.at.1),
            n(piece.at.2)
        )
    }
}
