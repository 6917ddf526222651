use crate::common::materials::{GROUND_MATERIAL_FILE, default_material_library};
use crate::domain::{BifiError, SimResult};
use crate::modules::ground::MaterialTable;
use crate::modules::pvmodule::OBJECTS_DIR;
use crate::modules::results::RESULTS_DIR;
use crate::modules::serialization::write_text_artifact;
use crate::modules::sky::SKY_DIR;
use crate::modules::tracker::TRACKER_CSV_DIR;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const MATERIALS_DIR: &str = "materials";

/// Working directory tree of one simulation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationWorkspace {
    root: PathBuf,
}

impl SimulationWorkspace {
    /// Creates the sub-directories under `root` and writes the default
    /// material file unless one is already there.
    pub fn create(root: &Path) -> SimResult<Self> {
        for dir in [OBJECTS_DIR, SKY_DIR, RESULTS_DIR, TRACKER_CSV_DIR, MATERIALS_DIR] {
            let path = root.join(dir);
            fs::create_dir_all(&path).map_err(|source| {
                BifiError::io_system(
                    "IO.WORKSPACE_DIRECTORY",
                    format!("failed to create '{}': {}", path.display(), source),
                )
            })?;
        }
        let workspace = Self {
            root: root.to_path_buf(),
        };
        let material = root.join(workspace.material_file());
        if !material.is_file() {
            write_text_artifact(&material, default_material_library()).map_err(|source| {
                BifiError::io_system(
                    "IO.MATERIAL_WRITE",
                    format!("failed to write '{}': {}", material.display(), source),
                )
            })?;
            info!(path = %material.display(), "wrote default materials");
        }
        Ok(workspace)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Material file, relative to the root.
    pub fn material_file(&self) -> PathBuf {
        Path::new(MATERIALS_DIR).join(GROUND_MATERIAL_FILE)
    }

    pub fn material_table(&self) -> SimResult<MaterialTable> {
        MaterialTable::load(&self.root.join(MATERIALS_DIR))
    }
}

#[cfg(test)]
mod tests {
    use super::SimulationWorkspace;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn workspace_creates_tree_and_keeps_existing_materials() {
        let temp = TempDir::new().expect("tempdir should be created");
        let workspace = SimulationWorkspace::create(temp.path()).expect("workspace should be created");
        for dir in ["objects", "skies", "results", "EPWs", "materials"] {
            assert!(temp.path().join(dir).is_dir(), "{dir} should exist");
        }
        let table = workspace.material_table().expect("materials should load");
        assert!(table.lookup("litesoil").is_some());

        let custom = "void plastic sand\n0\n0\n5 0.4 0.35 0.3 0 0\n";
        fs::write(temp.path().join("materials/ground.rad"), custom).expect("materials should be written");
        let reopened = SimulationWorkspace::create(temp.path()).expect("workspace should reopen");
        let table = reopened.material_table().expect("materials should load");
        assert_eq!(table.names(), vec!["sand"]);
    }
}
