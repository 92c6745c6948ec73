//! Chapter catalog and per-build chapter selection.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

use bookbinder_shared::{BookbinderError, Chapter, ChapterId, Result};

/// The canonical chapter catalog, probed against the filesystem once.
#[derive(Debug, Clone)]
pub struct ChapterRegistry {
    chapters: Vec<Chapter>,
}

/// Chapters chosen for one build, in catalog order.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    chapters: Vec<Chapter>,
    missing: Vec<ChapterId>,
    unknown: Vec<String>,
}

impl ChapterRegistry {
    /// Build the registry, probing `<root>/<id>/<id>.<ext>` for every entry.
    pub fn new(catalog: &[ChapterId], root: &Path, source_extension: &str) -> Result<Self> {
        if catalog.is_empty() {
            return Err(BookbinderError::config("chapter catalog is empty"));
        }

        let mut seen = HashSet::new();
        let mut chapters = Vec::with_capacity(catalog.len());
        for id in catalog {
            if !seen.insert(id) {
                return Err(BookbinderError::config(format!(
                    "chapter '{id}' appears twice in the catalog"
                )));
            }
            let source_path = source_path(id, source_extension);
            let exists = root.join(&source_path).is_file();
            debug!(chapter = %id, exists, "probed chapter source");
            chapters.push(Chapter {
                id: id.clone(),
                source_path,
                exists,
            });
        }

        Ok(Self { chapters })
    }

    /// Every catalog chapter, in canonical order.
    pub fn chapters(&self) -> &[Chapter] {
        &self.chapters
    }

    /// Select the requested chapters (all when `requested` is empty) that
    /// have a source file. Ids outside the catalog are ignored.
    #[instrument(skip_all, fields(requested = requested.len()))]
    pub fn resolve(&self, requested: &BTreeSet<String>) -> Selection {
        let mut selection = Selection::default();

        for chapter in &self.chapters {
            if !requested.is_empty() && !requested.contains(chapter.id.as_str()) {
                continue;
            }
            if chapter.exists {
                selection.chapters.push(chapter.clone());
            } else {
                warn!(
                    chapter = %chapter.id,
                    source = %chapter.source_path.display(),
                    "source file missing, skipping chapter"
                );
                selection.missing.push(chapter.id.clone());
            }
        }

        for id in requested {
            if !self.chapters.iter().any(|c| c.id.as_str() == id) {
                warn!(chapter = %id, "requested chapter is not in the catalog, ignoring");
                selection.unknown.push(id.clone());
            }
        }

        info!(
            selected = selection.chapters.len(),
            missing = selection.missing.len(),
            "resolved chapter selection"
        );
        selection
    }
}

/// Conventional source location of a chapter, relative to the project root.
pub fn source_path(id: &ChapterId, source_extension: &str) -> PathBuf {
    PathBuf::from(id.as_str()).join(format!("{id}.{source_extension}"))
}

impl Selection {
    pub fn chapters(&self) -> &[Chapter] {
        &self.chapters
    }

    /// Chapters paired with their 1-based chapter number.
    pub fn numbered(&self) -> impl Iterator<Item = (usize, &Chapter)> {
        self.chapters.iter().enumerate().map(|(i, c)| (i + 1, c))
    }

    pub fn ids(&self) -> Vec<ChapterId> {
        self.chapters.iter().map(|c| c.id.clone()).collect()
    }

    /// Selected-by-request chapters dropped because their source is missing.
    pub fn missing(&self) -> &[ChapterId] {
        &self.missing
    }

    /// Requested ids that are not in the catalog.
    pub fn unknown(&self) -> &[String] {
        &self.unknown
    }

    pub fn len(&self) -> usize {
        self.chapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chapters.is_empty()
    }
}
