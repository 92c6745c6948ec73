//! Core build pipeline for bookbinder.
//!
//! This crate resolves the chapter selection, assembles the master document,
//! and drives each format builder through its phases, running every external
//! tool through a single [`runner::CommandRunner`].

pub mod assets;
pub mod formats;
pub mod pipeline;
pub mod registry;
pub mod report;
pub mod runner;
pub mod stages;
pub mod template;

pub use pipeline::{BuildOrchestrator, ProgressReporter, SilentProgress};
pub use report::{BuildReport, FormatOutcome, FormatStatus};
pub use runner::{CommandRunner, ProcessRunner};
