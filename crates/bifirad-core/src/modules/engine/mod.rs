//! Boundary to the RADIANCE binaries.
//!
//! Everything the pipeline needs from the ray tracer goes through
//! [`RadianceEngine`]; [`ProcessEngine`] spawns the real programs.

use crate::domain::{BifiError, SimResult};
use std::fs::File;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EngineOutput {
    pub stdout: String,
    pub stderr: String,
}

pub trait RadianceEngine {
    /// Compiles `files` (relative to `workdir`) into the octree at `output`.
    fn oconv(&self, workdir: &Path, files: &[PathBuf], output: &Path) -> SimResult<EngineOutput>;

    /// Traces the rays in `stdin` through `octree`.
    fn rtrace(
        &self,
        workdir: &Path,
        args: &[String],
        octree: &Path,
        stdin: &str,
    ) -> SimResult<EngineOutput>;

    /// Runs gencumulativesky, writing its sky function to `output`.
    fn gencumulativesky(
        &self,
        workdir: &Path,
        args: &[String],
        output: &Path,
    ) -> SimResult<EngineOutput>;
}

#[derive(Debug, Clone, Default)]
pub struct ProcessEngine {
    bin_dir: Option<PathBuf>,
}

impl ProcessEngine {
    pub fn new(bin_dir: Option<PathBuf>) -> Self {
        Self { bin_dir }
    }

    fn program(&self, name: &str) -> PathBuf {
        match &self.bin_dir {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        }
    }

    fn run(
        &self,
        name: &str,
        workdir: &Path,
        args: &[String],
        stdin: Option<&str>,
        stdout_file: Option<&Path>,
    ) -> SimResult<EngineOutput> {
        debug!(program = name, ?args, "spawning radiance program");
        let mut command = Command::new(self.program(name));
        command.current_dir(workdir).args(args).stderr(Stdio::piped());
        command.stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() });
        match stdout_file {
            Some(path) => {
                let file = File::create(workdir.join(path)).map_err(|source| {
                    BifiError::io_system(
                        "IO.ENGINE_OUTPUT",
                        format!("failed to create '{}': {}", path.display(), source),
                    )
                })?;
                command.stdout(Stdio::from(file));
            }
            None => {
                command.stdout(Stdio::piped());
            }
        }

        let mut child = command.spawn().map_err(|source| {
            BifiError::io_system(
                "IO.ENGINE_SPAWN",
                format!("failed to start '{}': {}", name, source),
            )
        })?;
        // stdin is written while stdout is drained; rtrace answers rays as it reads.
        let pipe = child.stdin.take();
        let (output, fed) = thread::scope(|scope| {
            let writer = match (stdin, pipe) {
                (Some(input), Some(mut pipe)) => {
                    Some(scope.spawn(move || pipe.write_all(input.as_bytes())))
                }
                _ => None,
            };
            let output = child.wait_with_output();
            let fed = writer.map(|handle| handle.join());
            (output, fed)
        });
        let output = output.map_err(|source| {
            BifiError::io_system(
                "IO.ENGINE_WAIT",
                format!("failed waiting for '{}': {}", name, source),
            )
        })?;
        match fed {
            Some(Ok(Err(source))) if source.kind() != ErrorKind::BrokenPipe => {
                return Err(BifiError::io_system(
                    "IO.ENGINE_STDIN",
                    format!("failed to feed '{}': {}", name, source),
                ));
            }
            Some(Err(_)) => {
                return Err(BifiError::io_system(
                    "IO.ENGINE_STDIN",
                    format!("stdin writer for '{}' panicked", name),
                ));
            }
            _ => {}
        }

        let result = EngineOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        if !output.status.success() {
            return Err(BifiError::computation(
                "RUN.ENGINE_STATUS",
                format!("'{}' exited with {}: {}", name, output.status, result.stderr.trim()),
            ));
        }
        Ok(result)
    }
}

impl RadianceEngine for ProcessEngine {
    fn oconv(&self, workdir: &Path, files: &[PathBuf], output: &Path) -> SimResult<EngineOutput> {
        let args: Vec<String> = files.iter().map(|file| file.display().to_string()).collect();
        self.run("oconv", workdir, &args, None, Some(output))
    }

    fn rtrace(
        &self,
        workdir: &Path,
        args: &[String],
        octree: &Path,
        stdin: &str,
    ) -> SimResult<EngineOutput> {
        let mut full_args = args.to_vec();
        full_args.push(octree.display().to_string());
        self.run("rtrace", workdir, &full_args, Some(stdin), None)
    }

    fn gencumulativesky(
        &self,
        workdir: &Path,
        args: &[String],
        output: &Path,
    ) -> SimResult<EngineOutput> {
        self.run("gencumulativesky", workdir, args, None, Some(output))
    }
}

/// Combines materials, sky and scene files into `<octname>.oct`.
///
/// Returns `None`, with a warning, when any input is absent; batch callers skip
/// that index and move on.
pub fn make_octree(
    engine: &dyn RadianceEngine,
    workdir: &Path,
    files: &[Option<PathBuf>],
    octname: &str,
) -> SimResult<Option<PathBuf>> {
    let mut present = Vec::with_capacity(files.len());
    for file in files {
        match file {
            Some(path) if workdir.join(path).exists() => present.push(path.clone()),
            Some(path) => {
                warn!(octree = octname, missing = %path.display(), "scene file missing; skipping octree");
                return Ok(None);
            }
            None => {
                warn!(octree = octname, "scene file not generated; skipping octree");
                return Ok(None);
            }
        }
    }
    let output = PathBuf::from(format!("{}.oct", octname));
    let result = engine.oconv(workdir, &present, &output)?;
    if !result.stderr.trim().is_empty() {
        warn!(octree = octname, stderr = result.stderr.trim(), "oconv reported a problem");
    }
    Ok(Some(output))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::{EngineOutput, RadianceEngine};
    use crate::domain::SimResult;
    use std::cell::RefCell;
    use std::fs;
    use std::path::{Path, PathBuf};

    /// Engine double: records calls, writes placeholder outputs and answers
    /// every rtrace ray with a fixed RGB and material tag per face.
    #[derive(Debug, Default)]
    pub(crate) struct FakeEngine {
        pub calls: RefCell<Vec<String>>,
        pub front: (f64, String),
        pub back: (f64, String),
        pub stderr: String,
        /// Octrees whose rtrace output is empty.
        pub dark_octrees: Vec<PathBuf>,
    }

    impl FakeEngine {
        pub(crate) fn with_irradiance(front: f64, back: f64) -> Self {
            Self {
                front: (front, "a0.PVmodule.6457".to_string()),
                back: (back, "a0.PVmodule.2310".to_string()),
                ..Self::default()
            }
        }
    }

    impl RadianceEngine for FakeEngine {
        fn oconv(&self, workdir: &Path, files: &[PathBuf], output: &Path) -> SimResult<EngineOutput> {
            self.calls.borrow_mut().push(format!("oconv {}", output.display()));
            let listing: Vec<String> = files.iter().map(|f| f.display().to_string()).collect();
            fs::write(workdir.join(output), listing.join("\n")).expect("fake octree should be written");
            Ok(EngineOutput::default())
        }

        fn rtrace(
            &self,
            _workdir: &Path,
            _args: &[String],
            octree: &Path,
            stdin: &str,
        ) -> SimResult<EngineOutput> {
            self.calls.borrow_mut().push(format!("rtrace {}", octree.display()));
            let mut stdout = String::new();
            if self.dark_octrees.iter().any(|dark| dark == octree) {
                return Ok(EngineOutput {
                    stdout,
                    stderr: self.stderr.clone(),
                });
            }
            for ray in stdin.split('\r').filter(|line| !line.trim().is_empty()) {
                let values: Vec<f64> = ray
                    .split_whitespace()
                    .filter_map(|v| v.parse().ok())
                    .collect();
                let facing_down = values.get(5).is_some_and(|dz| *dz < 0.0);
                let (irradiance, material) = if facing_down { &self.front } else { &self.back };
                stdout.push_str(&format!(
                    "{}\t{}\t{}\t{}\t{}\t{}\t{}\n",
                    values[0], values[1], values[2], irradiance, irradiance, irradiance, material
                ));
            }
            Ok(EngineOutput {
                stdout,
                stderr: self.stderr.clone(),
            })
        }

        fn gencumulativesky(
            &self,
            workdir: &Path,
            args: &[String],
            output: &Path,
        ) -> SimResult<EngineOutput> {
            self.calls
                .borrow_mut()
                .push(format!("gencumulativesky {}", args.join(" ")));
            fs::write(workdir.join(output), "skybright = 1;\n").expect("fake cal file should be written");
            Ok(EngineOutput::default())
        }
    }
}
