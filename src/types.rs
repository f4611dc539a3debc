//! Shared result types used by the batch stages.
//!
//! Both the batch orchestrator and the standalone reprojection batch report one
//! [`FileOutcome`] per input, so failures are data rather than only log lines.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// What happened to one input file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    /// The file produced `output`.
    Produced { source: PathBuf, output: PathBuf },
    /// The file produced nothing; `reason` is the error text that was logged.
    Skipped { source: PathBuf, reason: String },
}

impl FileOutcome {
    pub fn source(&self) -> &Path {
        match self {
            Self::Produced { source, .. } | Self::Skipped { source, .. } => source,
        }
    }

    pub fn output(&self) -> Option<&Path> {
        match self {
            Self::Produced { output, .. } => Some(output),
            Self::Skipped { .. } => None,
        }
    }

    pub fn is_produced(&self) -> bool {
        matches!(self, Self::Produced { .. })
    }
}

/// Per-file outcomes of a batch run, in input order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub outcomes: Vec<FileOutcome>,
}

impl BatchReport {
    /// Paths that were produced, in input order.
    pub fn produced(&self) -> Vec<PathBuf> {
        self.outcomes
            .iter()
            .filter_map(|o| o.output().map(Path::to_path_buf))
            .collect()
    }

    pub fn skipped(&self) -> impl Iterator<Item = &FileOutcome> {
        self.outcomes.iter().filter(|o| !o.is_produced())
    }

    pub fn failure_count(&self) -> usize {
        self.skipped().count()
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }
}

impl From<Vec<FileOutcome>> for BatchReport {
    fn from(outcomes: Vec<FileOutcome>) -> Self {
        Self { outcomes }
    }
}
