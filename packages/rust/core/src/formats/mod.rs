//! Format builders and the state machine that drives them.
//!
//! Every format walks the same states:
//!
//! ```text
//! NotStarted → ChaptersProcessed → Assembled → Packaged → Done
//!      └──────────────┴───────────────┴───────────┴──→ Failed
//! ```
//!
//! A builder only supplies the work for each step; [`run_format`] owns the
//! ordering and refuses any transition that skips or repeats a state.

mod ebook;
mod reader;
mod site;
mod typeset;

pub use ebook::EbookBuilder;
pub use reader::ReaderBuilder;
pub use site::SiteBuilder;
pub use typeset::{TypesetBuilder, compile_commands};

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{error, info, warn};

use bookbinder_shared::{BookConfig, BookbinderError, Format, Result, Strictness};

use crate::pipeline::ProgressReporter;
use crate::registry::Selection;
use crate::report::{ArtifactMeta, FormatOutcome, FormatStatus, ToolFailure};
use crate::runner::{CommandResult, CommandRunner, CommandSpec};

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Progress of one format build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildPhase {
    NotStarted,
    ChaptersProcessed,
    Assembled,
    Packaged,
    Done,
    Failed,
}

impl BuildPhase {
    /// Whether `next` is the single legal step forward from `self`.
    pub fn can_advance_to(self, next: BuildPhase) -> bool {
        use BuildPhase::*;
        matches!(
            (self, next),
            (NotStarted, ChaptersProcessed)
                | (ChaptersProcessed, Assembled)
                | (Assembled, Packaged)
                | (Packaged, Done)
                | (NotStarted | ChaptersProcessed | Assembled | Packaged, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, BuildPhase::Done | BuildPhase::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not-started",
            Self::ChaptersProcessed => "chapters-processed",
            Self::Assembled => "assembled",
            Self::Packaged => "packaged",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks the current phase of one format and guards transitions.
#[derive(Debug, Clone)]
pub struct FormatRun {
    format: Format,
    phase: BuildPhase,
    last_completed: BuildPhase,
}

impl FormatRun {
    pub fn new(format: Format) -> Self {
        Self {
            format,
            phase: BuildPhase::NotStarted,
            last_completed: BuildPhase::NotStarted,
        }
    }

    pub fn phase(&self) -> BuildPhase {
        self.phase
    }

    pub fn advance(&mut self, next: BuildPhase) -> Result<()> {
        if !self.phase.can_advance_to(next) {
            return Err(BookbinderError::InvalidTransition {
                format: self.format,
                from: self.phase.to_string(),
                to: next.to_string(),
            });
        }
        info!(format = %self.format, from = %self.phase, to = %next, "phase complete");
        if next != BuildPhase::Failed {
            self.last_completed = next;
        }
        self.phase = next;
        Ok(())
    }

    fn fail(&mut self) {
        if !self.phase.is_terminal() {
            self.phase = BuildPhase::Failed;
        }
    }
}

// ---------------------------------------------------------------------------
// Failure policy
// ---------------------------------------------------------------------------

/// Decides, after every external call, whether a nonzero exit stops the format.
#[derive(Debug, Clone, Copy)]
pub struct FailurePolicy {
    strictness: Strictness,
}

impl FailurePolicy {
    pub fn new(strictness: Strictness) -> Self {
        Self { strictness }
    }

    /// `Ok` to continue, `Err` to abort the current format.
    pub fn check(&self, spec: &CommandSpec, result: &CommandResult) -> Result<()> {
        if result.success() {
            return Ok(());
        }
        match self.strictness {
            Strictness::BestEffort => {
                warn!(
                    command = %spec,
                    exit_code = result.exit_code,
                    "external tool failed, continuing"
                );
                Ok(())
            }
            Strictness::Strict => Err(BookbinderError::ExternalTool {
                command: spec.command_line(),
                exit_code: result.exit_code,
                stderr: result.stderr.clone(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Build context
// ---------------------------------------------------------------------------

/// Everything a builder needs: configuration, the runner, the failure policy,
/// and progress reporting. Records tool failures for the current format.
pub struct BuildContext<'a> {
    pub config: &'a BookConfig,
    pub root: &'a Path,
    pub progress: &'a dyn ProgressReporter,
    runner: &'a dyn CommandRunner,
    policy: FailurePolicy,
    failures: Vec<ToolFailure>,
}

impl<'a> BuildContext<'a> {
    pub fn new(
        config: &'a BookConfig,
        root: &'a Path,
        runner: &'a dyn CommandRunner,
        policy: FailurePolicy,
        progress: &'a dyn ProgressReporter,
    ) -> Self {
        Self {
            config,
            root,
            progress,
            runner,
            policy,
            failures: Vec::new(),
        }
    }

    /// Run one external command and consult the failure policy.
    pub fn exec(&mut self, spec: &CommandSpec) -> Result<CommandResult> {
        let result = self.runner.run(spec);
        if !result.success() {
            self.failures.push(ToolFailure {
                command: spec.command_line(),
                exit_code: result.exit_code,
            });
        }
        self.policy.check(spec, &result)?;
        Ok(result)
    }

    /// Resolve a project-relative path.
    pub fn abs(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.root.join(relative)
    }

    /// Absolute output directory.
    pub fn output_dir(&self) -> PathBuf {
        self.abs(&self.config.book.output_dir)
    }

    /// Path of a final artifact (`<output>/<book>.<ext>`).
    pub fn output_artifact(&self, extension: &str) -> PathBuf {
        self.output_dir()
            .join(format!("{}.{extension}", self.config.book.name))
    }

    fn take_failures(&mut self) -> Vec<ToolFailure> {
        std::mem::take(&mut self.failures)
    }
}

// ---------------------------------------------------------------------------
// Builder trait and driver
// ---------------------------------------------------------------------------

/// Work for each step of one format. Steps a format does not need are no-ops.
pub trait FormatBuilder {
    fn format(&self) -> Format;

    /// Checked before any work starts.
    fn check_preconditions(&self, _ctx: &BuildContext<'_>) -> Result<()> {
        Ok(())
    }

    fn process_chapters(&self, ctx: &mut BuildContext<'_>, selection: &Selection) -> Result<()>;

    fn assemble(&self, ctx: &mut BuildContext<'_>, selection: &Selection) -> Result<()>;

    fn package(&self, ctx: &mut BuildContext<'_>) -> Result<()>;

    /// Place the artifact and return where it is expected to be.
    fn finish(&self, ctx: &mut BuildContext<'_>) -> Result<PathBuf>;
}

/// Drive `builder` through every phase and summarize the result.
pub fn run_format(
    builder: &dyn FormatBuilder,
    ctx: &mut BuildContext<'_>,
    selection: &Selection,
) -> FormatOutcome {
    let format = builder.format();
    let mut run = FormatRun::new(format);
    info!(%format, chapters = selection.len(), "building format");

    let result = drive(builder, ctx, selection, &mut run);
    let failures = ctx.take_failures();

    match result {
        Ok(artifact_path) => {
            let artifact = ArtifactMeta::describe(&artifact_path);
            if artifact.is_none() {
                warn!(
                    %format,
                    path = %artifact_path.display(),
                    "expected artifact was not produced"
                );
            }
            let status = if artifact.is_some() && failures.is_empty() {
                FormatStatus::Succeeded
            } else {
                FormatStatus::Degraded
            };
            info!(%format, ?status, tool_failures = failures.len(), "format finished");
            FormatOutcome {
                format,
                status,
                phase: run.phase,
                last_completed: run.last_completed,
                artifact,
                failures,
                error: None,
            }
        }
        Err(e) => {
            run.fail();
            error!(%format, phase = %run.last_completed, error = %e, "format build failed");
            FormatOutcome {
                format,
                status: FormatStatus::Failed,
                phase: run.phase,
                last_completed: run.last_completed,
                artifact: None,
                failures,
                error: Some(e.to_string()),
            }
        }
    }
}

fn drive(
    builder: &dyn FormatBuilder,
    ctx: &mut BuildContext<'_>,
    selection: &Selection,
    run: &mut FormatRun,
) -> Result<PathBuf> {
    builder.check_preconditions(ctx)?;

    builder.process_chapters(ctx, selection)?;
    run.advance(BuildPhase::ChaptersProcessed)?;

    builder.assemble(ctx, selection)?;
    run.advance(BuildPhase::Assembled)?;

    builder.package(ctx)?;
    run.advance(BuildPhase::Packaged)?;

    let artifact = builder.finish(ctx)?;
    run.advance(BuildPhase::Done)?;

    Ok(artifact)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Move a file, falling back to copy + delete across filesystems.
pub(crate) fn move_file(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent).map_err(|e| BookbinderError::io(parent, e))?;
    }
    if std::fs::rename(from, to).is_ok() {
        return Ok(());
    }
    std::fs::copy(from, to).map_err(|e| BookbinderError::io(from, e))?;
    std::fs::remove_file(from).map_err(|e| BookbinderError::io(from, e))?;
    Ok(())
}

/// Copy a file, creating the destination directory.
pub(crate) fn copy_file(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent).map_err(|e| BookbinderError::io(parent, e))?;
    }
    std::fs::copy(from, to).map_err(|e| BookbinderError::io(from, e))?;
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::pipeline::SilentProgress;
    use crate::runner::testing::ScriptedRunner;

    #[test]
    fn phases_advance_strictly_in_order() {
        use BuildPhase::*;
        assert!(NotStarted.can_advance_to(ChaptersProcessed));
        assert!(ChaptersProcessed.can_advance_to(Assembled));
        assert!(Assembled.can_advance_to(Packaged));
        assert!(Packaged.can_advance_to(Done));

        assert!(!NotStarted.can_advance_to(Assembled));
        assert!(!Assembled.can_advance_to(ChaptersProcessed));
        assert!(!Done.can_advance_to(Failed));
        assert!(!Failed.can_advance_to(Done));
        assert!(Assembled.can_advance_to(Failed));
    }

    #[test]
    fn format_run_rejects_skipped_step() {
        let mut run = FormatRun::new(Format::Pdf);
        let err = run.advance(BuildPhase::Packaged).unwrap_err();
        assert!(matches!(err, BookbinderError::InvalidTransition { .. }));
        assert_eq!(run.phase(), BuildPhase::NotStarted);
    }

    #[test]
    fn best_effort_policy_continues_strict_aborts() {
        let spec = CommandSpec::new("bibtex", ".").arg("book");
        let failed = CommandResult {
            exit_code: 2,
            stdout: String::new(),
            stderr: "no database".into(),
        };

        assert!(FailurePolicy::new(Strictness::BestEffort).check(&spec, &failed).is_ok());
        let err = FailurePolicy::new(Strictness::Strict)
            .check(&spec, &failed)
            .unwrap_err();
        match err {
            BookbinderError::ExternalTool { exit_code, stderr, .. } => {
                assert_eq!(exit_code, 2);
                assert_eq!(stderr, "no database");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn context_records_failures() {
        let tmp = temp_dir("context");
        let config = small_config(&["a"]);
        let runner = ScriptedRunner::new().failing("bibtex");
        let mut ctx = BuildContext::new(
            &config,
            &tmp,
            &runner,
            FailurePolicy::new(Strictness::BestEffort),
            &SilentProgress,
        );

        ctx.exec(&CommandSpec::new("pdflatex", &tmp)).unwrap();
        ctx.exec(&CommandSpec::new("bibtex", &tmp).arg("book")).unwrap();

        let failures = ctx.take_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].command, "bibtex book");
        assert!(ctx.take_failures().is_empty());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn move_file_creates_destination_dir() {
        let tmp = temp_dir("move");
        std::fs::write(tmp.join("a.pdf"), "pdf").unwrap();
        move_file(&tmp.join("a.pdf"), &tmp.join("out/a.pdf")).unwrap();
        assert!(!tmp.join("a.pdf").exists());
        assert_eq!(std::fs::read_to_string(tmp.join("out/a.pdf")).unwrap(), "pdf");
        let _ = std::fs::remove_dir_all(&tmp);
    }
}
