//! Build report: what each format did and where its artifact landed.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use bookbinder_shared::{BuildId, ChapterId, Format};

use crate::formats::BuildPhase;

/// Summary of one build run, serializable for `--report`.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub build_id: BuildId,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u128,
    /// Chapters processed, in catalog order.
    pub selected: Vec<ChapterId>,
    /// Chapters skipped because their source file is missing.
    pub missing: Vec<ChapterId>,
    /// Requested ids that are not in the catalog.
    pub unknown: Vec<String>,
    pub formats: Vec<FormatOutcome>,
}

impl BuildReport {
    /// True when any format ended in [`FormatStatus::Failed`].
    pub fn has_failures(&self) -> bool {
        self.formats
            .iter()
            .any(|f| f.status == FormatStatus::Failed)
    }
}

/// Result of driving one format builder.
#[derive(Debug, Clone, Serialize)]
pub struct FormatOutcome {
    pub format: Format,
    pub status: FormatStatus,
    /// Final state of the format's state machine.
    pub phase: BuildPhase,
    /// Last state reached before finishing or failing.
    pub last_completed: BuildPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ArtifactMeta>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<ToolFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatStatus {
    /// Every step ran cleanly and the artifact exists.
    Succeeded,
    /// Finished, but a tool failed along the way or no artifact appeared.
    Degraded,
    /// Stopped before finishing.
    Failed,
}

/// A nonzero exit recorded while continuing in best-effort mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolFailure {
    pub command: String,
    pub exit_code: i32,
}

/// A produced file or directory.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactMeta {
    pub path: PathBuf,
    /// Content hash; files only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    /// File size, or total size of the files under a directory.
    pub size_bytes: u64,
}

impl ArtifactMeta {
    /// Describe `path`, or `None` when nothing exists there.
    pub fn describe(path: &Path) -> Option<Self> {
        if path.is_file() {
            let bytes = std::fs::read(path).ok()?;
            let mut hasher = Sha256::new();
            hasher.update(&bytes);
            Some(Self {
                path: path.to_path_buf(),
                sha256: Some(format!("{:x}", hasher.finalize())),
                size_bytes: bytes.len() as u64,
            })
        } else if path.is_dir() {
            let size_bytes = WalkDir::new(path)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .filter_map(|e| e.metadata().ok())
                .map(|m| m.len())
                .sum();
            Some(Self {
                path: path.to_path_buf(),
                sha256: None,
                size_bytes,
            })
        } else {
            None
        }
    }
}
