//! Book configuration for bookbinder.
//!
//! The config lives at `<project>/bookbinder.toml`. Every field has a default
//! so a project laid out the conventional way needs no file at all.
//! CLI flags override config file values, which override defaults.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BookbinderError, Result};
use crate::types::ChapterId;

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "bookbinder.toml";

// ---------------------------------------------------------------------------
// Config structs (matching bookbinder.toml schema)
// ---------------------------------------------------------------------------

/// Top-level book config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookConfig {
    #[serde(default)]
    pub book: BookSection,

    #[serde(default)]
    pub chapters: ChaptersSection,

    #[serde(default)]
    pub paths: PathsSection,

    #[serde(default)]
    pub tools: ToolsSection,

    #[serde(default)]
    pub ebook: EbookSection,

    #[serde(default)]
    pub build: BuildSection,
}

/// `[book]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookSection {
    /// Base name of the master document and of every artifact.
    #[serde(default = "default_book_name")]
    pub name: String,

    /// Extension of chapter source files (`<id>/<id>.<ext>`).
    #[serde(default = "default_source_extension")]
    pub source_extension: String,

    /// Directory receiving the final artifacts.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Token identifying the template line replaced by chapter includes.
    #[serde(default = "default_marker")]
    pub marker: String,
}

impl Default for BookSection {
    fn default() -> Self {
        Self {
            name: default_book_name(),
            source_extension: default_source_extension(),
            output_dir: default_output_dir(),
            marker: default_marker(),
        }
    }
}

fn default_book_name() -> String {
    "posa".into()
}
fn default_source_extension() -> String {
    "markdown".into()
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}
fn default_marker() -> String {
    "chapterchapterchapter".into()
}

/// `[chapters]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChaptersSection {
    /// Canonical chapter order.
    #[serde(default = "default_catalog")]
    pub catalog: Vec<ChapterId>,

    /// Chapters with an `<id>/<id>-images` asset directory.
    #[serde(default = "default_assets")]
    pub assets: Vec<ChapterId>,
}

impl Default for ChaptersSection {
    fn default() -> Self {
        Self {
            catalog: default_catalog(),
            assets: default_assets(),
        }
    }
}

fn chapter_ids(ids: &[&str]) -> Vec<ChapterId> {
    ids.iter().filter_map(|id| ChapterId::new(*id).ok()).collect()
}

fn default_catalog() -> Vec<ChapterId> {
    chapter_ids(&[
        "chrome",
        "ethercalc",
        "ninja",
        "pugixml",
        "memshrink",
        "dance",
        "infinispan",
        "talos",
        "zotonic",
        "mobile-perf",
        "warp",
        "khmer",
    ])
}

fn default_assets() -> Vec<ChapterId> {
    chapter_ids(&[
        "ethercalc",
        "warp",
        "zotonic",
        "talos",
        "chrome",
        "mobile-perf",
        "pugixml",
        "infinispan",
        "khmer",
        "memshrink",
        "dance",
    ])
}

/// `[paths]` section: per-format working directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsSection {
    #[serde(default = "default_typeset_dir")]
    pub typeset_dir: PathBuf,

    #[serde(default = "default_ebook_dir")]
    pub ebook_dir: PathBuf,

    #[serde(default = "default_site_dir")]
    pub site_dir: PathBuf,
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            typeset_dir: default_typeset_dir(),
            ebook_dir: default_ebook_dir(),
            site_dir: default_site_dir(),
        }
    }
}

fn default_typeset_dir() -> PathBuf {
    PathBuf::from("tex")
}
fn default_ebook_dir() -> PathBuf {
    PathBuf::from("epub")
}
fn default_site_dir() -> PathBuf {
    PathBuf::from("html")
}

/// `[tools]` section. Each tool is a program followed by leading arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsSection {
    #[serde(default = "default_preprocessor")]
    pub preprocessor: Vec<String>,
    #[serde(default = "default_postprocessor")]
    pub postprocessor: Vec<String>,
    #[serde(default = "default_converter")]
    pub converter: Vec<String>,
    #[serde(default = "default_typesetter")]
    pub typesetter: Vec<String>,
    #[serde(default = "default_bibliography")]
    pub bibliography: Vec<String>,
    #[serde(default = "default_ebook_converter")]
    pub ebook_converter: Vec<String>,
    #[serde(default = "default_archiver")]
    pub archiver: Vec<String>,
    #[serde(default = "default_unarchiver")]
    pub unarchiver: Vec<String>,
    #[serde(default = "default_sync")]
    pub sync: Vec<String>,
    #[serde(default = "default_heading_shift")]
    pub heading_shift: Vec<String>,
    #[serde(default = "default_title_fixup")]
    pub title_fixup: Vec<String>,
    #[serde(default = "default_site_generator")]
    pub site_generator: Vec<String>,

    /// Preprocessor mode flags for the typeset document.
    #[serde(default = "default_typeset_flags")]
    pub typeset_flags: Vec<String>,
    /// Preprocessor mode flags for the e-book.
    #[serde(default = "default_ebook_flags")]
    pub ebook_flags: Vec<String>,
    /// Preprocessor mode flags for the site.
    #[serde(default = "default_site_flags")]
    pub site_flags: Vec<String>,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            preprocessor: default_preprocessor(),
            postprocessor: default_postprocessor(),
            converter: default_converter(),
            typesetter: default_typesetter(),
            bibliography: default_bibliography(),
            ebook_converter: default_ebook_converter(),
            archiver: default_archiver(),
            unarchiver: default_unarchiver(),
            sync: default_sync(),
            heading_shift: default_heading_shift(),
            title_fixup: default_title_fixup(),
            site_generator: default_site_generator(),
            typeset_flags: default_typeset_flags(),
            ebook_flags: default_ebook_flags(),
            site_flags: default_site_flags(),
        }
    }
}

fn words(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

fn default_preprocessor() -> Vec<String> {
    words(&["python", "preprocessor.py"])
}
fn default_postprocessor() -> Vec<String> {
    words(&["python", "postprocessor.py"])
}
fn default_converter() -> Vec<String> {
    words(&["pandoc"])
}
fn default_typesetter() -> Vec<String> {
    words(&["pdflatex", "-interaction", "nonstopmode"])
}
fn default_bibliography() -> Vec<String> {
    words(&["bibtex"])
}
fn default_ebook_converter() -> Vec<String> {
    words(&["ebook-convert"])
}
fn default_archiver() -> Vec<String> {
    words(&["zip"])
}
fn default_unarchiver() -> Vec<String> {
    words(&["unzip", "-o"])
}
fn default_sync() -> Vec<String> {
    words(&["rsync", "-a"])
}
fn default_heading_shift() -> Vec<String> {
    words(&["../increaseheaders.sh"])
}
fn default_title_fixup() -> Vec<String> {
    words(&["./fix_html_title.sh"])
}
fn default_site_generator() -> Vec<String> {
    words(&["make", "html"])
}
fn default_typeset_flags() -> Vec<String> {
    words(&["--markdown"])
}
fn default_ebook_flags() -> Vec<String> {
    words(&["--latex"])
}
fn default_site_flags() -> Vec<String> {
    words(&["--html-refs", "--html-paths", "--latex"])
}

/// `[ebook]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EbookSection {
    /// Files placed before the chapters when assembling, relative to the
    /// e-book working directory.
    #[serde(default = "default_front_matter")]
    pub front_matter: Vec<String>,

    /// Package metadata injected into the archive on every build.
    #[serde(default = "default_package_files")]
    pub package_files: Vec<String>,

    /// File listing the image paths to inject, one per line.
    #[serde(default = "default_asset_list")]
    pub asset_list: PathBuf,
}

impl Default for EbookSection {
    fn default() -> Self {
        Self {
            front_matter: default_front_matter(),
            package_files: default_package_files(),
            asset_list: default_asset_list(),
        }
    }
}

fn default_front_matter() -> Vec<String> {
    words(&["epubtitle.txt", "introduction.markdown"])
}
fn default_package_files() -> Vec<String> {
    words(&[
        "META-INF",
        "mimetype",
        "nav.xhtml",
        "toc.ncx",
        "stylesheet.css",
        "content.opf",
    ])
}
fn default_asset_list() -> PathBuf {
    PathBuf::from("image-list.txt")
}

/// `[build]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSection {
    /// Abort a format on its first external tool failure.
    #[serde(default)]
    pub strict: bool,

    /// Typesetter passes run after bibliography resolution.
    #[serde(default = "default_extra_typeset_passes")]
    pub extra_typeset_passes: u32,
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            strict: false,
            extra_typeset_passes: default_extra_typeset_passes(),
        }
    }
}

fn default_extra_typeset_passes() -> u32 {
    3
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl BookConfig {
    /// Check the invariants serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.chapters.catalog.is_empty() {
            return Err(BookbinderError::config("chapter catalog is empty"));
        }
        ensure_unique("chapters.catalog", &self.chapters.catalog)?;
        ensure_unique("chapters.assets", &self.chapters.assets)?;

        if self.book.name.is_empty() || self.book.name.contains(['/', '\\']) {
            return Err(BookbinderError::config(format!(
                "book.name '{}' must be a plain file stem",
                self.book.name
            )));
        }
        if self.book.marker.trim().is_empty() {
            return Err(BookbinderError::config("book.marker must not be blank"));
        }
        if self.book.source_extension.is_empty() {
            return Err(BookbinderError::config("book.source_extension must not be empty"));
        }

        let tools = &self.tools;
        let required = [
            ("preprocessor", &tools.preprocessor),
            ("postprocessor", &tools.postprocessor),
            ("converter", &tools.converter),
            ("typesetter", &tools.typesetter),
            ("bibliography", &tools.bibliography),
            ("ebook_converter", &tools.ebook_converter),
            ("archiver", &tools.archiver),
            ("unarchiver", &tools.unarchiver),
            ("sync", &tools.sync),
            ("heading_shift", &tools.heading_shift),
            ("title_fixup", &tools.title_fixup),
            ("site_generator", &tools.site_generator),
        ];
        for (name, command) in required {
            if command.first().is_none_or(|program| program.is_empty()) {
                return Err(BookbinderError::config(format!(
                    "tools.{name} must name a program"
                )));
            }
        }

        Ok(())
    }

    /// Path of the master template, relative to the project root.
    pub fn template_path(&self) -> PathBuf {
        self.paths
            .typeset_dir
            .join(format!("{}.template.tex", self.book.name))
    }

    /// Path of the assembled master document, relative to the project root.
    pub fn master_path(&self) -> PathBuf {
        self.paths.typeset_dir.join(format!("{}.tex", self.book.name))
    }
}

fn ensure_unique(field: &str, ids: &[ChapterId]) -> Result<()> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(BookbinderError::config(format!(
                "{field} lists '{id}' more than once"
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Path of the config file inside `project_root`.
pub fn config_file_path(project_root: &Path) -> PathBuf {
    project_root.join(CONFIG_FILE_NAME)
}

/// Load the config from `path`. Returns validated defaults if the file does not exist.
pub fn load_config(path: &Path) -> Result<BookConfig> {
    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        let config = BookConfig::default();
        config.validate()?;
        return Ok(config);
    }

    load_config_from(path)
}

/// Load and validate the config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<BookConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| BookbinderError::io(path, e))?;

    let config: BookConfig = toml::from_str(&content).map_err(|e| {
        BookbinderError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    config.validate()?;
    Ok(config)
}

/// Write a default config file to `path`. Refuses to overwrite an existing file.
pub fn init_config(path: &Path) -> Result<()> {
    if path.exists() {
        return Err(BookbinderError::config(format!(
            "{} already exists",
            path.display()
        )));
    }

    let content = toml::to_string_pretty(&BookConfig::default())
        .map_err(|e| BookbinderError::config(e.to_string()))?;

    std::fs::write(path, content).map_err(|e| BookbinderError::io(path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = BookConfig::default();
        config.validate().expect("defaults validate");
        assert_eq!(config.chapters.catalog.len(), 12);
        assert_eq!(config.chapters.assets.len(), 11);
        assert_eq!(config.template_path(), PathBuf::from("tex/posa.template.tex"));
        assert_eq!(config.master_path(), PathBuf::from("tex/posa.tex"));
    }

    #[test]
    fn config_roundtrip() {
        let config = BookConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: BookConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.book.marker, "chapterchapterchapter");
        assert_eq!(parsed.chapters.catalog[0].as_str(), "chrome");
        assert_eq!(parsed.build.extra_typeset_passes, 3);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[book]
name = "mybook"

[chapters]
catalog = ["intro", "middle", "end"]
"#;
        let config: BookConfig = toml::from_str(toml_str).expect("parse");
        config.validate().expect("valid");
        assert_eq!(config.book.name, "mybook");
        assert_eq!(config.book.source_extension, "markdown");
        assert_eq!(config.chapters.catalog.len(), 3);
        assert_eq!(config.tools.converter, vec!["pandoc".to_string()]);
    }

    #[test]
    fn invalid_chapter_id_fails_to_parse() {
        let toml_str = r#"
[chapters]
catalog = ["ok", "../escape"]
"#;
        assert!(toml::from_str::<BookConfig>(toml_str).is_err());
    }

    #[test]
    fn empty_catalog_rejected() {
        let mut config = BookConfig::default();
        config.chapters.catalog.clear();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("catalog is empty"));
    }

    #[test]
    fn duplicate_catalog_entry_rejected() {
        let mut config = BookConfig::default();
        let first = config.chapters.catalog[0].clone();
        config.chapters.catalog.push(first);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn empty_tool_rejected() {
        let mut config = BookConfig::default();
        config.tools.sync.clear();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("tools.sync"));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let path = std::env::temp_dir().join(format!(
            "bb-config-missing-{}.toml",
            uuid::Uuid::now_v7()
        ));
        let config = load_config(&path).expect("defaults");
        assert_eq!(config.book.name, "posa");
    }

    #[test]
    fn init_then_load() {
        let dir = std::env::temp_dir().join(format!("bb-config-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();

        let path = config_file_path(&dir);
        init_config(&path).expect("init");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded.chapters.catalog.len(), 12);

        // A second init must not clobber the file.
        assert!(init_config(&path).is_err());

        // Any file name is honored, so a later load of the same path sees it.
        let custom = dir.join("custom.toml");
        init_config(&custom).expect("init custom");
        assert!(custom.is_file());
        assert_eq!(load_config_from(&custom).expect("load custom").book.name, "posa");

        let _ = std::fs::remove_dir_all(&dir);
    }
}
