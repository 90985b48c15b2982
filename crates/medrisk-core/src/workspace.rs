//! Per-job workspace layout.

use std::path::{Path, PathBuf};

use crate::JobId;

const INPUT_FILE: &str = "input.json";
const RESULTS_DIR: &str = "results";

/// The isolated directory a single job runs in.
///
/// Layout: `<root>/workspace_<job id>/` containing the submitted payload as
/// `input.json` plus a `results/` directory for intermediate analyzer
/// output. The worker creates the directory before the analyzer runs and
/// removes it afterwards; analyzers only read and write inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    dir: PathBuf,
}

impl Workspace {
    /// Workspace location for a job under the given root directory.
    pub fn new(root: &Path, id: JobId) -> Self {
        Self {
            dir: root.join(format!("workspace_{id}")),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where the submitted payload is written.
    pub fn input_path(&self) -> PathBuf {
        self.dir.join(INPUT_FILE)
    }

    /// Scratch directory for analyzer output.
    pub fn results_dir(&self) -> PathBuf {
        self.dir.join(RESULTS_DIR)
    }
}
