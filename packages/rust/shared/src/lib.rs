//! Shared types, error model, and configuration for bookbinder.
//!
//! This crate is the foundation depended on by the other bookbinder crates.
//! It provides:
//! - [`BookbinderError`]: the unified error type
//! - Domain types ([`ChapterId`], [`Chapter`], [`Format`], [`BuildRequest`])
//! - Configuration ([`BookConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    BookConfig, BookSection, BuildSection, ChaptersSection, CONFIG_FILE_NAME, EbookSection,
    PathsSection, ToolsSection, config_file_path, init_config, load_config, load_config_from,
};
pub use error::{BookbinderError, Result};
pub use types::{BuildId, BuildRequest, Chapter, ChapterId, Format, Strictness};
