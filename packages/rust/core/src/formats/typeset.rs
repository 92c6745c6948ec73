//! Typeset document (PDF) builder.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use bookbinder_shared::{BookConfig, Format, Result};

use super::{BuildContext, FormatBuilder, move_file};
use crate::registry::Selection;
use crate::runner::CommandSpec;
use crate::stages::{StageInvoker, StageMode};

/// Converts every chapter to LaTeX, compiles the master document, and moves
/// the PDF into the output directory.
#[derive(Debug, Default, Clone, Copy)]
pub struct TypesetBuilder;

/// The multi-pass compile: one typesetter pass, bibliography resolution,
/// then a fixed number of further passes so cross-references settle.
pub fn compile_commands(config: &BookConfig, cwd: &Path) -> Vec<CommandSpec> {
    let tools = &config.tools;
    let name = &config.book.name;
    let pass = || CommandSpec::tool(&tools.typesetter, cwd).arg(name.clone());

    let mut commands = vec![
        pass(),
        CommandSpec::tool(&tools.bibliography, cwd).arg(name.clone()),
    ];
    commands.extend((0..config.build.extra_typeset_passes).map(|_| pass()));
    commands
}

impl FormatBuilder for TypesetBuilder {
    fn format(&self) -> Format {
        Format::Pdf
    }

    fn process_chapters(&self, ctx: &mut BuildContext<'_>, selection: &Selection) -> Result<()> {
        let invoker = StageInvoker::new(ctx.config, ctx.root);
        for (number, chapter) in selection.numbered() {
            ctx.progress
                .chapter(Format::Pdf, &chapter.id, number, selection.len());
            invoker.run_chapter_pipeline(ctx, chapter, number, StageMode::Latex)?;
        }
        Ok(())
    }

    fn assemble(&self, ctx: &mut BuildContext<'_>, _selection: &Selection) -> Result<()> {
        let tex_dir = ctx.abs(&ctx.config.paths.typeset_dir);
        for spec in compile_commands(ctx.config, &tex_dir) {
            ctx.exec(&spec)?;
        }
        Ok(())
    }

    fn package(&self, ctx: &mut BuildContext<'_>) -> Result<()> {
        let compiled = compiled_pdf(ctx);
        if !compiled.is_file() {
            warn!(path = %compiled.display(), "typesetter produced no PDF, nothing to move");
            return Ok(());
        }
        let target = ctx.output_artifact("pdf");
        move_file(&compiled, &target)?;
        info!(path = %target.display(), "typeset document ready");
        Ok(())
    }

    fn finish(&self, ctx: &mut BuildContext<'_>) -> Result<PathBuf> {
        Ok(ctx.output_artifact("pdf"))
    }
}

fn compiled_pdf(ctx: &BuildContext<'_>) -> PathBuf {
    ctx.abs(&ctx.config.paths.typeset_dir)
        .join(format!("{}.pdf", ctx.config.book.name))
}

#[cfg(test)]
mod tests {
    use bookbinder_shared::Strictness;

    use super::super::test_support::*;
    use super::super::{BuildPhase, FailurePolicy, run_format};
    use super::*;
    use crate::pipeline::SilentProgress;
    use crate::report::FormatStatus;
    use crate::runner::testing::ScriptedRunner;

    #[test]
    fn compile_sequence_is_pass_bib_then_three_passes() {
        let config = small_config(&["a"]);
        let lines: Vec<String> = compile_commands(&config, Path::new("/book/tex"))
            .iter()
            .map(|c| c.command_line())
            .collect();
        assert_eq!(
            lines,
            vec![
                "pdflatex -interaction nonstopmode book",
                "bibtex book",
                "pdflatex -interaction nonstopmode book",
                "pdflatex -interaction nonstopmode book",
                "pdflatex -interaction nonstopmode book",
            ]
        );
    }

    #[test]
    fn builds_chapters_in_order_and_moves_pdf() {
        let tmp = temp_dir("typeset");
        let config = small_config(&["intro", "middle", "end"]);
        write_sources(&tmp, &["intro", "middle", "end"]);
        let selection = select_all(&config, &tmp);

        let runner = ScriptedRunner::new().creating("pdflatex", tmp.join("tex/book.pdf"));
        let mut ctx = BuildContext::new(
            &config,
            &tmp,
            &runner,
            FailurePolicy::new(Strictness::BestEffort),
            &SilentProgress,
        );

        let outcome = run_format(&TypesetBuilder, &mut ctx, &selection);
        assert_eq!(outcome.status, FormatStatus::Succeeded);
        assert_eq!(outcome.phase, BuildPhase::Done);
        assert!(tmp.join("output/book.pdf").exists());
        assert!(!tmp.join("tex/book.pdf").exists());

        let postprocessed: Vec<String> = runner
            .calls()
            .iter()
            .filter(|c| c.args.first().is_some_and(|a| a == "postprocessor.py"))
            .map(|c| c.args[1].clone())
            .collect();
        assert_eq!(
            postprocessed,
            vec![
                "--output=tex/intro.tex",
                "--output=tex/middle.tex",
                "--output=tex/end.tex"
            ]
        );

        // Compile passes run inside the typeset working directory.
        let compile_cwds: Vec<PathBuf> = runner
            .calls()
            .iter()
            .filter(|c| c.program == "pdflatex" || c.program == "bibtex")
            .map(|c| c.cwd.clone())
            .collect();
        assert_eq!(compile_cwds.len(), 5);
        assert!(compile_cwds.iter().all(|cwd| *cwd == tmp.join("tex")));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn missing_pdf_degrades_the_format() {
        let tmp = temp_dir("typeset-nopdf");
        let config = small_config(&["intro"]);
        write_sources(&tmp, &["intro"]);
        let selection = select_all(&config, &tmp);

        let runner = ScriptedRunner::new().failing("pdflatex");
        let mut ctx = BuildContext::new(
            &config,
            &tmp,
            &runner,
            FailurePolicy::new(Strictness::BestEffort),
            &SilentProgress,
        );

        let outcome = run_format(&TypesetBuilder, &mut ctx, &selection);
        assert_eq!(outcome.status, FormatStatus::Degraded);
        assert_eq!(outcome.phase, BuildPhase::Done);
        assert!(outcome.artifact.is_none());
        assert!(outcome.error.is_none());
        assert_eq!(outcome.failures.len(), 4);
        assert!(!tmp.join("output/book.pdf").exists());

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
