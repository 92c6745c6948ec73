//! Core domain types for bookbinder builds.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{BookbinderError, Result};

// ---------------------------------------------------------------------------
// ChapterId
// ---------------------------------------------------------------------------

/// Chapter ids double as directory and file stems, so keep them path-safe.
static CHAPTER_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]*$").expect("valid regex"));

/// Short identifier of one chapter (e.g. `ethercalc`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChapterId(String);

impl ChapterId {
    /// Validate and wrap a chapter identifier.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if CHAPTER_ID_RE.is_match(&id) && !id.contains("..") {
            Ok(Self(id))
        } else {
            Err(BookbinderError::validation(format!(
                "invalid chapter id '{id}': expected letters, digits, '-', '_' or '.'"
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ChapterId {
    type Error = BookbinderError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<ChapterId> for String {
    fn from(id: ChapterId) -> Self {
        id.0
    }
}

impl std::fmt::Display for ChapterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Chapter
// ---------------------------------------------------------------------------

/// One catalog entry with its source location, probed once per build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chapter {
    /// Chapter identifier.
    pub id: ChapterId,
    /// Source file, relative to the project root (`<id>/<id>.<ext>`).
    pub source_path: PathBuf,
    /// Whether the source file existed when the registry was built.
    pub exists: bool,
}

// ---------------------------------------------------------------------------
// Format
// ---------------------------------------------------------------------------

/// Final artifact kinds. The declaration order is the build order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Typeset document.
    Pdf,
    /// E-book package.
    Epub,
    /// E-reader package derived from the e-book.
    Mobi,
    /// Browsable site.
    Html,
}

impl Format {
    /// All formats in build order.
    pub const ALL: [Format; 4] = [Format::Pdf, Format::Epub, Format::Mobi, Format::Html];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Epub => "epub",
            Self::Mobi => "mobi",
            Self::Html => "html",
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Strictness / BuildRequest
// ---------------------------------------------------------------------------

/// What to do when an external tool exits nonzero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strictness {
    /// Log the failure and keep going.
    #[default]
    BestEffort,
    /// Abort the current format on the first failure.
    Strict,
}

/// Immutable description of one build invocation.
#[derive(Debug, Clone, Default)]
pub struct BuildRequest {
    /// Chapter ids to build; empty means the whole catalog.
    pub requested: BTreeSet<String>,
    /// Formats to produce, built in `Format` order.
    pub formats: BTreeSet<Format>,
    /// Run the converter to assemble the e-book instead of only repackaging
    /// an existing one.
    pub assemble_ebook: bool,
    /// Failure handling for external tools.
    pub strictness: Strictness,
}

// ---------------------------------------------------------------------------
// BuildId
// ---------------------------------------------------------------------------

/// A UUID v7 identifying one build run (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildId(pub Uuid);

impl BuildId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for BuildId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BuildId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
