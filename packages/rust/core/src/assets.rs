//! Per-chapter asset directories and their distribution into format
//! working areas.

use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use bookbinder_shared::{BookConfig, BookbinderError, ChapterId, Result};

/// Fixed mapping from chapter id to its asset directory, independent of the
/// chapters selected for a build.
#[derive(Debug, Clone, Default)]
pub struct AssetManifest {
    entries: Vec<(ChapterId, PathBuf)>,
}

/// What one distribution pass did.
#[derive(Debug, Clone, Default)]
pub struct DistributionSummary {
    /// Asset directories copied completely.
    pub copied: usize,
    /// Files written across all directories.
    pub files: usize,
    /// Entries that could not be copied, with the reason.
    pub failed: Vec<(ChapterId, String)>,
}

impl AssetManifest {
    pub fn new(ids: &[ChapterId]) -> Self {
        Self {
            entries: ids.iter().map(|id| (id.clone(), asset_dir(id))).collect(),
        }
    }

    pub fn from_config(config: &BookConfig) -> Self {
        Self::new(&config.chapters.assets)
    }

    /// `(chapter, directory relative to the project root)` pairs.
    pub fn entries(&self) -> &[(ChapterId, PathBuf)] {
        &self.entries
    }
}

/// Conventional asset directory of a chapter, relative to the project root.
pub fn asset_dir(id: &ChapterId) -> PathBuf {
    PathBuf::from(id.as_str()).join(format!("{id}-images"))
}

/// Copy every manifest directory into `target_dir/<dir name>`, overwriting
/// existing files. One failing entry does not stop the others.
#[instrument(
    skip_all,
    fields(target = %target_dir.display(), entries = manifest.entries().len())
)]
pub fn distribute(
    manifest: &AssetManifest,
    root: &Path,
    target_dir: &Path,
) -> DistributionSummary {
    let mut summary = DistributionSummary::default();

    for (id, dir) in manifest.entries() {
        let source = root.join(dir);
        let Some(name) = dir.file_name() else {
            summary.failed.push((id.clone(), "asset path has no directory name".into()));
            continue;
        };
        let dest = target_dir.join(name);

        match copy_dir_recursive(&source, &dest) {
            Ok(files) => {
                debug!(chapter = %id, files, dest = %dest.display(), "copied assets");
                summary.copied += 1;
                summary.files += files;
            }
            Err(e) => {
                warn!(chapter = %id, error = %e, "failed to copy assets");
                summary.failed.push((id.clone(), e.to_string()));
            }
        }
    }

    info!(
        copied = summary.copied,
        files = summary.files,
        failed = summary.failed.len(),
        "asset distribution complete"
    );
    summary
}

/// Recursively copy `source` into `dest`. Returns the number of files written.
pub fn copy_dir_recursive(source: &Path, dest: &Path) -> Result<usize> {
    if !source.is_dir() {
        return Err(BookbinderError::io(
            source,
            std::io::Error::new(std::io::ErrorKind::NotFound, "asset directory not found"),
        ));
    }

    let mut files = 0;
    for entry in WalkDir::new(source).follow_links(true) {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| source.to_path_buf());
            BookbinderError::io(path, std::io::Error::from(e))
        })?;

        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| BookbinderError::validation(e.to_string()))?;
        let target = dest.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target).map_err(|e| BookbinderError::io(&target, e))?;
        } else {
            std::fs::copy(entry.path(), &target).map_err(|e| BookbinderError::io(&target, e))?;
            files += 1;
        }
    }

    Ok(files)
}
