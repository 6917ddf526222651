//! Built-in RADIANCE material definitions written to `materials/ground.rad`.

pub const GROUND_MATERIAL_FILE: &str = "ground.rad";

const DEFAULT_MATERIAL_LIBRARY: &str = "\
# Ground and racking materials

void plastic litesoil
0
0
5 0.29 0.187 0.163 0 0

void plastic concrete
0
0
5 0.3 0.3 0.29 0 0

void plastic white_EPDM
0
0
5 0.76 0.77 0.75 0 0

void plastic beigeroof
0
0
5 0.62 0.58 0.48 0 0

void plastic beigeroof_lite
0
0
5 0.55 0.5 0.4 0 0

void plastic beigeroof_heavy
0
0
5 0.7 0.65 0.55 0 0

void plastic asphalt
0
0
5 0.1 0.1 0.1 0 0

void plastic black
0
0
5 0.01 0.01 0.01 0 0

void metal Metal_Grey
0
0
5 0.25 0.25 0.25 0.5 0.05

void glass stock_glass
0
0
3 0.96 0.96 0.96
";

pub fn default_material_library() -> &'static str {
    DEFAULT_MATERIAL_LIBRARY
}
