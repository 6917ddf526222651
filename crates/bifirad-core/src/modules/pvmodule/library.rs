use super::PvModule;
use crate::domain::{BifiError, SimResult};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub const MODULE_LIBRARY_FILE: &str = "module.json";

/// Compiled modules keyed by name, persisted as a JSON object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModuleLibrary {
    modules: BTreeMap<String, PvModule>,
}

impl ModuleLibrary {
    /// A missing file is an empty library.
    pub fn load(path: &Path) -> SimResult<Self> {
        if !path.is_file() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path).map_err(|source| {
            BifiError::io_system(
                "IO.MODULE_LIBRARY_READ",
                format!("failed to read '{}': {}", path.display(), source),
            )
        })?;
        let modules = serde_json::from_str(&text).map_err(|source| {
            BifiError::input_validation(
                "INPUT.MODULE_LIBRARY_FORMAT",
                format!("invalid module library '{}': {}", path.display(), source),
            )
        })?;
        Ok(Self { modules })
    }

    pub fn save(&self, path: &Path) -> SimResult<()> {
        let json = serde_json::to_string_pretty(&self.modules).map_err(|source| {
            BifiError::internal(
                "SYS.MODULE_LIBRARY_ENCODE",
                format!("failed to encode module library: {}", source),
            )
        })?;
        fs::write(path, json).map_err(|source| {
            BifiError::io_system(
                "IO.MODULE_LIBRARY_WRITE",
                format!("failed to write '{}': {}", path.display(), source),
            )
        })
    }

    pub fn insert(&mut self, module: PvModule) {
        self.modules.insert(module.name().to_string(), module);
    }

    pub fn get(&self, name: &str) -> Option<&PvModule> {
        self.modules.get(name)
    }

    pub fn module(&self, name: &str) -> SimResult<&PvModule> {
        self.get(name).ok_or_else(|| {
            BifiError::input_validation(
                "INPUT.MODULE_NAME",
                format!(
                    "module '{}' doesn't exist; available: {}",
                    name,
                    self.names().join(", ")
                ),
            )
        })
    }

    pub fn names(&self) -> Vec<&str> {
        self.modules.keys().map(String::as_str).collect()
    }
}
