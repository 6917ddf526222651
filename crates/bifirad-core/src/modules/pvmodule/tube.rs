use crate::domain::{BifiError, SimResult};
use crate::modules::serialization::format_number as n;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TubeType {
    Round,
    Square,
    Hex,
    Oct,
}

impl FromStr for TubeType {
    type Err = BifiError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "round" => Ok(Self::Round),
            "square" => Ok(Self::Square),
            "hex" => Ok(Self::Hex),
            "oct" => Ok(Self::Oct),
            _ => Err(BifiError::input_validation(
                "INPUT.TUBE_TYPE",
                format!(
                    "incorrect torque tube type '{}'; available options: square, oct, hex, round",
                    value
                ),
            )),
        }
    }
}

/// Torque tube running along the module row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TorqueTube {
    /// Side length for square tubes, circumscribed diameter for hex.
    pub diameter: f64,
    pub tubetype: String,
    pub material: String,
    /// Rotate about the tube centre instead of the module plane.
    pub axisofrotation: bool,
    /// An invisible tube still sets the module offset but emits no geometry.
    pub visible: bool,
}

impl Default for TorqueTube {
    fn default() -> Self {
        Self {
            diameter: 0.1,
            tubetype: "Round".to_string(),
            material: "Metal_Grey".to_string(),
            axisofrotation: true,
            visible: true,
        }
    }
}

impl TorqueTube {
    pub fn tube_type(&self) -> SimResult<TubeType> {
        self.tubetype.parse()
    }

    /// Geometry for the tube spanning `scenex`, shifted by `cc` so it lines up
    /// with a cell-centred module.
    pub fn text(&self, z_inc: f64, zgap: f64, scenex: f64, cc: f64) -> SimResult<String> {
        let diam = self.diameter;
        let mat = &self.material;
        let x0 = -scenex / 2.0 + cc;
        let text = match self.tube_type()? {
            TubeType::Square => {
                let tto = self.offset(-z_inc - zgap - diam / 2.0);
                format!(
                    "\r\n! genbox {mat} tube1 {} {} {} | xform -t {} {} {}",
                    n(scenex),
                    n(diam),
                    n(diam),
                    n(x0),
                    n(-diam / 2.0),
                    n(-diam / 2.0 + tto)
                )
            }
            TubeType::Round => {
                let tto = self.offset(-z_inc - zgap - diam / 2.0);
                format!(
                    "\r\n! genrev {mat} tube1 t*{} {} 32 | xform -ry 90 -t {} 0 {}",
                    n(scenex),
                    n(diam / 2.0),
                    n(x0),
                    n(tto)
                )
            }
            TubeType::Hex => {
                let radius = 0.5 * diam;
                let half_height = radius * 3.0_f64.sqrt() / 2.0;
                let tto = self.offset(-z_inc - half_height - zgap);
                let size = format!("{} {} {}", n(scenex), n(radius), n(radius * 3.0_f64.sqrt()));
                let mut text = format!(
                    "\r\n! genbox {mat} hextube1a {size} | xform -t {} {} {}",
                    n(x0),
                    n(-radius / 2.0),
                    n(-half_height + tto)
                );
                for (suffix, angle) in [("b", 60), ("c", -60)] {
                    text.push_str(&format!(
                        "\r\n! genbox {mat} hextube1{suffix} {size} | xform -t {} {} {} -rx {angle} -t 0 0 {}",
                        n(x0),
                        n(-radius / 2.0),
                        n(-half_height),
                        n(tto)
                    ));
                }
                text
            }
            TubeType::Oct => {
                let radius = 0.5 * diam;
                let side = diam / (1.0 + 2.0_f64.sqrt());
                let tto = self.offset(-z_inc - radius - zgap);
                let size = format!("{} {} {}", n(scenex), n(side), n(diam));
                let mut text = format!(
                    "\r\n! genbox {mat} octtube1a {size} | xform -t {} {} {}",
                    n(-scenex / 2.0),
                    n(-side / 2.0),
                    n(-radius + tto)
                );
                for (suffix, angle) in [("b", 45), ("c", 90), ("d", 135)] {
                    text.push_str(&format!(
                        "\r\n! genbox {mat} octtube1{suffix} {size} | xform -t {} {} {} -rx {angle} -t 0 0 {}",
                        n(x0),
                        n(-side / 2.0),
                        n(-radius),
                        n(tto)
                    ));
                }
                text.push(' ');
                text
            }
        };
        Ok(text)
    }

    fn offset(&self, below_module: f64) -> f64 {
        if self.axisofrotation { 0.0 } else { below_module }
    }
}

#[cfg(test)]
mod tests {
    use super::{TorqueTube, TubeType};
    use crate::domain::BifiErrorCategory;

    fn tube(tubetype: &str, axisofrotation: bool) -> TorqueTube {
        TorqueTube {
            tubetype: tubetype.to_string(),
            axisofrotation,
            ..TorqueTube::default()
        }
    }

    #[test]
    fn tube_type_parsing_ignores_case() {
        assert_eq!("SQUARE".parse::<TubeType>().expect("square should parse"), TubeType::Square);
        assert_eq!("Oct".parse::<TubeType>().expect("oct should parse"), TubeType::Oct);
        let error = "triangle".parse::<TubeType>().expect_err("triangle should fail");
        assert_eq!(error.category(), BifiErrorCategory::InputValidationError);
        assert_eq!(error.placeholder(), "INPUT.TUBE_TYPE");
    }

    #[test]
    fn square_tube_hangs_below_module_without_axis_of_rotation() {
        let text = tube("square", false)
            .text(0.0, 0.1, 1.59 + 0.01, 0.0)
            .expect("square tube text");
        assert_eq!(text, "\r\n! genbox Metal_Grey tube1 1.6 0.1 0.1 | xform -t -0.8 -0.05 -0.2");
    }

    #[test]
    fn round_tube_is_centred_on_the_axis() {
        let text = tube("round", true).text(0.0, 0.1, 2.0, 0.0).expect("round tube text");
        assert_eq!(text, "\r\n! genrev Metal_Grey tube1 t*2 0.05 32 | xform -ry 90 -t -1 0 0");
    }

    #[test]
    fn polygonal_tubes_emit_rotated_faces() {
        let hex = tube("hex", true).text(0.0, 0.1, 2.0, 0.0).expect("hex tube text");
        assert_eq!(hex.matches("! genbox").count(), 3);
        assert!(hex.contains("hextube1b") && hex.contains("-rx 60 -t 0 0 0"));
        assert!(hex.contains("-rx -60 -t 0 0 0"));

        let oct = tube("oct", true).text(0.0, 0.1, 2.0, 0.0).expect("oct tube text");
        assert_eq!(oct.matches("! genbox").count(), 4);
        assert!(oct.ends_with("-rx 135 -t 0 0 0 "));
    }

    #[test]
    fn invalid_tube_type_fails_text_generation() {
        let error = tube("triangle", true)
            .text(0.0, 0.1, 2.0, 0.0)
            .expect_err("invalid type should fail");
        assert_eq!(error.placeholder(), "INPUT.TUBE_TYPE");
    }
}
