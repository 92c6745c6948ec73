//! End-to-end build: resolve chapters → assemble master → build each format.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use bookbinder_shared::{
    BookConfig, BookbinderError, BuildId, BuildRequest, ChapterId, Format, Result,
};

use crate::assets::{AssetManifest, distribute};
use crate::formats::{
    BuildContext, EbookBuilder, FailurePolicy, FormatBuilder, ReaderBuilder, SiteBuilder,
    TypesetBuilder, run_format,
};
use crate::registry::ChapterRegistry;
use crate::report::{BuildReport, FormatOutcome};
use crate::runner::CommandRunner;
use crate::stages::site_pages_dir;
use crate::template::TemplateAssembler;

/// Progress callback for reporting build status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called before a chapter's stages run for a format.
    fn chapter(&self, format: Format, id: &ChapterId, current: usize, total: usize);
    /// Called when one format finishes, successfully or not.
    fn format_done(&self, outcome: &FormatOutcome);
    /// Called when the build completes.
    fn done(&self, report: &BuildReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn chapter(&self, _format: Format, _id: &ChapterId, _current: usize, _total: usize) {}
    fn format_done(&self, _outcome: &FormatOutcome) {}
    fn done(&self, _report: &BuildReport) {}
}

/// Top-level driver. Holds the immutable configuration and the runner every
/// external command goes through.
pub struct BuildOrchestrator<'a> {
    config: &'a BookConfig,
    root: PathBuf,
    runner: &'a dyn CommandRunner,
}

impl<'a> BuildOrchestrator<'a> {
    pub fn new(
        config: &'a BookConfig,
        root: impl Into<PathBuf>,
        runner: &'a dyn CommandRunner,
    ) -> Self {
        Self {
            config,
            root: root.into(),
            runner,
        }
    }

    /// Run one build.
    ///
    /// 1. Clear (or create) the output directory
    /// 2. Resolve the chapter selection
    /// 3. Assemble the master document
    /// 4. For each requested format, in order: distribute assets, then build
    ///
    /// Errors from steps 1–3 abort the build. A failing format is recorded in
    /// the report and the next format still runs.
    #[instrument(
        skip_all,
        fields(build_id = tracing::field::Empty, formats = request.formats.len())
    )]
    pub fn build(
        &self,
        request: &BuildRequest,
        progress: &dyn ProgressReporter,
    ) -> Result<BuildReport> {
        let start = Instant::now();
        let started_at = Utc::now();
        let build_id = BuildId::new();
        tracing::Span::current().record("build_id", tracing::field::display(&build_id));

        info!(
            %build_id,
            root = %self.root.display(),
            strictness = ?request.strictness,
            "starting build"
        );

        // --- Phase 1: Output directory ---
        progress.phase("Preparing output directory");
        prepare_output_dir(&self.root.join(&self.config.book.output_dir))?;

        // --- Phase 2: Chapters ---
        progress.phase("Resolving chapters");
        let registry = ChapterRegistry::new(
            &self.config.chapters.catalog,
            &self.root,
            &self.config.book.source_extension,
        )?;
        let selection = registry.resolve(&request.requested);
        if selection.is_empty() {
            warn!("no chapter selected, formats build without chapter content");
        }

        // --- Phase 3: Master document ---
        progress.phase("Assembling master document");
        TemplateAssembler::from_config(self.config, &self.root).assemble(selection.chapters())?;

        // --- Phase 4: Formats ---
        let manifest = AssetManifest::from_config(self.config);
        let mut outcomes = Vec::with_capacity(request.formats.len());

        for &format in &request.formats {
            progress.phase(&format!("Building {format}"));

            if let Some(target) = asset_target(self.config, format) {
                let target = self.root.join(target);
                let summary = distribute(&manifest, &self.root, &target);
                if !summary.failed.is_empty() {
                    warn!(
                        %format,
                        failed = summary.failed.len(),
                        "some asset directories were not copied"
                    );
                }
            }

            let builder = builder_for(format, request);
            let mut ctx = BuildContext::new(
                self.config,
                &self.root,
                self.runner,
                FailurePolicy::new(request.strictness),
                progress,
            );
            let outcome = run_format(builder.as_ref(), &mut ctx, &selection);
            progress.format_done(&outcome);
            outcomes.push(outcome);
        }

        let report = BuildReport {
            build_id,
            started_at,
            elapsed_ms: start.elapsed().as_millis(),
            selected: selection.ids(),
            missing: selection.missing().to_vec(),
            unknown: selection.unknown().to_vec(),
            formats: outcomes,
        };

        info!(
            build_id = %report.build_id,
            chapters = report.selected.len(),
            formats = report.formats.len(),
            failed = report.has_failures(),
            elapsed_ms = report.elapsed_ms,
            "build complete"
        );
        progress.done(&report);
        Ok(report)
    }
}

/// Working directory that receives the chapter assets before `format` builds.
pub fn asset_target(config: &BookConfig, format: Format) -> Option<PathBuf> {
    match format {
        Format::Pdf => Some(config.paths.typeset_dir.clone()),
        Format::Epub => Some(config.paths.ebook_dir.clone()),
        Format::Mobi => None,
        Format::Html => Some(site_pages_dir(config)),
    }
}

fn builder_for(format: Format, request: &BuildRequest) -> Box<dyn FormatBuilder> {
    match format {
        Format::Pdf => Box::new(TypesetBuilder),
        Format::Epub => Box::new(EbookBuilder::new(request.assemble_ebook)),
        Format::Mobi => Box::new(ReaderBuilder),
        Format::Html => Box::new(SiteBuilder),
    }
}

/// Create `dir`, or remove its top-level files when it already exists.
/// Subdirectories are left in place.
pub fn prepare_output_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir).map_err(|e| BookbinderError::io(dir, e))?;
        debug!(path = %dir.display(), "created output directory");
        return Ok(());
    }

    let entries = std::fs::read_dir(dir).map_err(|e| BookbinderError::io(dir, e))?;
    let mut removed = 0usize;
    for entry in entries {
        let entry = entry.map_err(|e| BookbinderError::io(dir, e))?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| BookbinderError::io(&path, e))?;
        if file_type.is_dir() {
            info!(path = %path.display(), "leaving subdirectory of output directory in place");
            continue;
        }
        std::fs::remove_file(&path).map_err(|e| BookbinderError::io(&path, e))?;
        removed += 1;
    }
    debug!(path = %dir.display(), removed, "cleared output directory");
    Ok(())
}

#[cfg(test)]
mod tests {
    use bookbinder_shared::Strictness;

    use super::*;
    use crate::formats::BuildPhase;
    use crate::formats::test_support::*;
    use crate::report::FormatStatus;
    use crate::runner::testing::ScriptedRunner;

    const TEMPLATE: &str =
        "\\documentclass{book}\n\\begin{document}\nchapterchapterchapter\n\\end{document}\n";

    fn project(names: &[&str], present: &[&str]) -> (PathBuf, BookConfig) {
        let tmp = temp_dir("pipeline");
        write_sources(&tmp, present);
        std::fs::create_dir_all(tmp.join("tex")).unwrap();
        std::fs::write(tmp.join("tex/book.template.tex"), TEMPLATE).unwrap();
        (tmp, small_config(names))
    }

    fn request(formats: &[Format], requested: &[&str]) -> BuildRequest {
        BuildRequest {
            requested: requested.iter().map(|s| s.to_string()).collect(),
            formats: formats.iter().copied().collect(),
            ..Default::default()
        }
    }

    fn master(root: &Path) -> String {
        std::fs::read_to_string(root.join("tex/book.tex")).unwrap()
    }

    fn preprocessed_outputs(runner: &ScriptedRunner) -> Vec<String> {
        runner
            .calls()
            .iter()
            .filter(|c| c.args.first().is_some_and(|a| a == "preprocessor.py"))
            .filter_map(|c| c.args.iter().find(|a| a.starts_with("--output=")).cloned())
            .collect()
    }

    #[test]
    fn all_chapters_build_one_document() {
        let (tmp, config) = project(&["intro", "middle", "end"], &["intro", "middle", "end"]);
        let runner = ScriptedRunner::new().creating("pdflatex", tmp.join("tex/book.pdf"));

        let report = BuildOrchestrator::new(&config, &tmp, &runner)
            .build(&request(&[Format::Pdf], &[]), &SilentProgress)
            .unwrap();

        let ids: Vec<&str> = report.selected.iter().map(|c| c.as_str()).collect();
        assert_eq!(ids, vec!["intro", "middle", "end"]);
        assert_eq!(report.formats.len(), 1);
        assert_eq!(report.formats[0].status, FormatStatus::Succeeded);
        assert!(tmp.join("output/book.pdf").is_file());
        assert_eq!(
            preprocessed_outputs(&runner),
            vec![
                "--output=tex/intro.markdown",
                "--output=tex/middle.markdown",
                "--output=tex/end.markdown",
            ]
        );
        assert_eq!(
            master(&tmp),
            "\\documentclass{book}\n\\begin{document}\n\\include{intro}\n\\include{middle}\n\
             \\include{end}\n\\end{document}\n"
        );

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn missing_source_is_skipped_without_failure() {
        let (tmp, config) = project(&["intro", "middle", "end"], &["intro", "end"]);
        let runner = ScriptedRunner::new().creating("pdflatex", tmp.join("tex/book.pdf"));

        let report = BuildOrchestrator::new(&config, &tmp, &runner)
            .build(&request(&[Format::Pdf], &[]), &SilentProgress)
            .unwrap();

        assert_eq!(report.missing, vec![ChapterId::new("middle").unwrap()]);
        assert!(!report.has_failures());
        assert_eq!(
            preprocessed_outputs(&runner),
            vec!["--output=tex/intro.markdown", "--output=tex/end.markdown"]
        );
        assert!(!master(&tmp).contains("middle"));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn requested_subset_keeps_catalog_order() {
        let (tmp, config) = project(&["intro", "middle", "end"], &["intro", "middle", "end"]);
        let runner = ScriptedRunner::new();

        let report = BuildOrchestrator::new(&config, &tmp, &runner)
            .build(&request(&[], &["end", "intro", "nope"]), &SilentProgress)
            .unwrap();

        let ids: Vec<&str> = report.selected.iter().map(|c| c.as_str()).collect();
        assert_eq!(ids, vec!["intro", "end"]);
        assert_eq!(report.unknown, vec!["nope".to_string()]);
        assert!(report.formats.is_empty());
        assert!(runner.calls().is_empty());
        assert!(master(&tmp).contains("\\include{intro}\n\\include{end}\n"));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn reader_without_ebook_reports_missing_precondition() {
        let (tmp, config) = project(&["intro"], &["intro"]);
        // A stale package from an earlier run is cleared with the output directory.
        std::fs::create_dir_all(tmp.join("output")).unwrap();
        std::fs::write(tmp.join("output/book.epub"), "stale").unwrap();
        let runner = ScriptedRunner::new();

        let report = BuildOrchestrator::new(&config, &tmp, &runner)
            .build(&request(&[Format::Mobi], &[]), &SilentProgress)
            .unwrap();

        let outcome = &report.formats[0];
        assert_eq!(outcome.format, Format::Mobi);
        assert_eq!(outcome.status, FormatStatus::Failed);
        assert_eq!(outcome.last_completed, BuildPhase::NotStarted);
        assert!(outcome.error.as_deref().unwrap().contains("cannot build mobi"));
        assert!(!runner.programs().contains(&"ebook-convert".to_string()));
        assert!(report.has_failures());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn ebook_then_reader_in_one_run() {
        let (tmp, config) = project(&["intro"], &["intro"]);
        std::fs::create_dir_all(tmp.join("epub")).unwrap();
        std::fs::write(tmp.join("epub/image-list.txt"), "intro-images/a.png\n").unwrap();
        let runner = ScriptedRunner::new()
            .creating("pandoc", tmp.join("epub/book.epub"))
            .creating("ebook-convert", tmp.join("output/book.mobi"));

        let mut req = request(&[Format::Mobi, Format::Epub], &[]);
        req.assemble_ebook = true;
        let report = BuildOrchestrator::new(&config, &tmp, &runner)
            .build(&req, &SilentProgress)
            .unwrap();

        let formats: Vec<Format> = report.formats.iter().map(|f| f.format).collect();
        assert_eq!(formats, vec![Format::Epub, Format::Mobi]);
        assert!(report.formats.iter().all(|f| f.status == FormatStatus::Succeeded));
        assert!(tmp.join("output/book.epub").is_file());
        assert!(tmp.join("output/book.mobi").is_file());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn assets_are_copied_for_unselected_chapters() {
        let (tmp, config) = project(&["intro", "end"], &["intro", "end"]);
        std::fs::create_dir_all(tmp.join("end/end-images")).unwrap();
        std::fs::write(tmp.join("end/end-images/plot.png"), "png").unwrap();
        let runner = ScriptedRunner::new().creating("make", tmp.join("html/output/index.html"));

        BuildOrchestrator::new(&config, &tmp, &runner)
            .build(&request(&[Format::Pdf, Format::Html], &["intro"]), &SilentProgress)
            .unwrap();

        assert!(tmp.join("tex/end-images/plot.png").is_file());
        assert!(tmp.join("html/content/pages/end-images/plot.png").is_file());
        assert!(tmp.join("html/output/pages/end-images/plot.png").is_file());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn missing_marker_aborts_before_any_format() {
        let (tmp, config) = project(&["intro"], &["intro"]);
        std::fs::write(tmp.join("tex/book.template.tex"), "no marker here\n").unwrap();
        let runner = ScriptedRunner::new();

        let err = BuildOrchestrator::new(&config, &tmp, &runner)
            .build(&request(&[Format::Pdf], &[]), &SilentProgress)
            .unwrap_err();

        assert!(matches!(err, BookbinderError::TemplateMarkerMissing { .. }));
        assert!(!tmp.join("tex/book.tex").exists());
        assert!(runner.calls().is_empty());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn strict_failure_stops_format_but_not_the_build() {
        let (tmp, config) = project(&["intro", "end"], &["intro", "end"]);
        let runner = ScriptedRunner::new().failing("pandoc");

        let mut req = request(&[Format::Pdf, Format::Html], &[]);
        req.strictness = Strictness::Strict;
        let report = BuildOrchestrator::new(&config, &tmp, &runner)
            .build(&req, &SilentProgress)
            .unwrap();

        assert_eq!(report.formats.len(), 2);
        for outcome in &report.formats {
            assert_eq!(outcome.status, FormatStatus::Failed);
            assert_eq!(outcome.last_completed, BuildPhase::NotStarted);
            assert_eq!(outcome.failures.len(), 1);
        }
        // One preprocess and one convert per format, nothing after.
        assert_eq!(runner.programs(), vec!["python", "pandoc", "python", "pandoc"]);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn best_effort_keeps_going_after_failures() {
        let (tmp, config) = project(&["intro", "end"], &["intro", "end"]);
        let runner = ScriptedRunner::new()
            .failing("pandoc")
            .creating("pdflatex", tmp.join("tex/book.pdf"));

        let report = BuildOrchestrator::new(&config, &tmp, &runner)
            .build(&request(&[Format::Pdf], &[]), &SilentProgress)
            .unwrap();

        let outcome = &report.formats[0];
        assert_eq!(outcome.status, FormatStatus::Degraded);
        assert_eq!(outcome.phase, BuildPhase::Done);
        assert_eq!(outcome.failures.len(), 2);
        assert!(!report.has_failures());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn output_dir_clear_is_not_recursive() {
        let tmp = temp_dir("outdir");
        let out = tmp.join("output");
        std::fs::create_dir_all(out.join("keep")).unwrap();
        std::fs::write(out.join("old.pdf"), "old").unwrap();
        std::fs::write(out.join("keep/inner.txt"), "inner").unwrap();

        prepare_output_dir(&out).unwrap();

        assert!(!out.join("old.pdf").exists());
        assert!(out.join("keep/inner.txt").exists());

        prepare_output_dir(&tmp.join("fresh")).unwrap();
        assert!(tmp.join("fresh").is_dir());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn asset_targets_follow_working_dirs() {
        let config = BookConfig::default();
        assert_eq!(asset_target(&config, Format::Pdf), Some(PathBuf::from("tex")));
        assert_eq!(asset_target(&config, Format::Epub), Some(PathBuf::from("epub")));
        assert_eq!(asset_target(&config, Format::Mobi), None);
        assert_eq!(
            asset_target(&config, Format::Html),
            Some(PathBuf::from("html/content/pages"))
        );
    }
}
