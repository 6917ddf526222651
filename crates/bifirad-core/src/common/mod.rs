pub mod constants;
pub mod materials;
