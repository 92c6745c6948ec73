//! Per-chapter stage pipeline: preprocess → convert → postprocess.
//!
//! Command construction is pure and lives on [`StageInvoker`]; running a
//! chapter hands each command to the build context, which executes it and
//! applies the failure policy.

use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use bookbinder_shared::{BookConfig, Chapter, ChapterId, Result};

use crate::formats::BuildContext;
use crate::runner::CommandSpec;

/// Target a chapter is being prepared for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageMode {
    /// LaTeX fragment for the typeset document.
    Latex,
    /// Markdown only, for the e-book.
    MarkdownOnly,
    /// HTML page for the site.
    Html,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Preprocess,
    Convert,
    Postprocess,
}

impl StageMode {
    /// Stages run for this mode, in order.
    pub fn stages(self) -> &'static [Stage] {
        match self {
            Self::Latex => &[Stage::Preprocess, Stage::Convert, Stage::Postprocess],
            Self::MarkdownOnly => &[Stage::Preprocess],
            Self::Html => &[Stage::Preprocess, Stage::Convert],
        }
    }
}

/// Builds and runs the stage commands for one chapter.
#[derive(Debug, Clone, Copy)]
pub struct StageInvoker<'c> {
    config: &'c BookConfig,
    root: &'c Path,
}

impl<'c> StageInvoker<'c> {
    pub fn new(config: &'c BookConfig, root: &'c Path) -> Self {
        Self { config, root }
    }

    /// Where the preprocessor writes its intermediate.
    pub fn preprocessed_path(&self, id: &ChapterId, mode: StageMode) -> PathBuf {
        let paths = &self.config.paths;
        match mode {
            StageMode::Latex => paths.typeset_dir.join(format!("{id}.markdown")),
            StageMode::MarkdownOnly => paths.ebook_dir.join(format!("{id}.markdown.1")),
            StageMode::Html => paths.site_dir.join(format!("{id}.markdown.1")),
        }
    }

    /// Where the converter writes its fragment.
    pub fn converted_path(&self, id: &ChapterId, mode: StageMode) -> Option<PathBuf> {
        let paths = &self.config.paths;
        match mode {
            StageMode::Latex => Some(paths.typeset_dir.join(format!("{id}.tex.1"))),
            StageMode::MarkdownOnly => None,
            StageMode::Html => Some(site_page_path(self.config, id)),
        }
    }

    /// The chapter's final artifact for `mode`.
    pub fn artifact_path(&self, id: &ChapterId, mode: StageMode) -> PathBuf {
        match mode {
            StageMode::Latex => self.config.paths.typeset_dir.join(format!("{id}.tex")),
            StageMode::MarkdownOnly => self.preprocessed_path(id, mode),
            StageMode::Html => site_page_path(self.config, id),
        }
    }

    pub fn preprocess_command(
        &self,
        chapter: &Chapter,
        number: usize,
        mode: StageMode,
    ) -> CommandSpec {
        let tools = &self.config.tools;
        let output = self.preprocessed_path(&chapter.id, mode);

        let mut spec = CommandSpec::tool(&tools.preprocessor, self.root);
        // The typeset document numbers its own chapters.
        if mode != StageMode::Latex {
            spec = spec.arg("--chapter").arg(number.to_string());
        }
        let flags = match mode {
            StageMode::Latex => &tools.typeset_flags,
            StageMode::MarkdownOnly => &tools.ebook_flags,
            StageMode::Html => &tools.site_flags,
        };
        spec.arg(format!("--output={}", output.display()))
            .args(flags.iter().cloned())
            .path_arg(&chapter.source_path)
    }

    pub fn convert_command(&self, chapter: &Chapter, mode: StageMode) -> Option<CommandSpec> {
        let id = &chapter.id;
        let input = self.preprocessed_path(id, mode);
        let output = self.converted_path(id, mode)?;
        let converter = &self.config.tools.converter;
        let typeset_dir = &self.config.paths.typeset_dir;

        let spec = match mode {
            StageMode::Latex => CommandSpec::tool(converter, self.root)
                .args(["-V".to_string(), format!("chaptertoken=s:{id}")])
                .args(["-t", "latex", "--chapters", "-S"])
                .arg("-f")
                .arg("markdown+mmd_title_block+tex_math_dollars")
                .arg(format!(
                    "--template={}",
                    typeset_dir.join("chaptertemplate.tex").display()
                )),
            StageMode::Html => CommandSpec::tool(converter, self.root)
                .arg("--csl=ieee.csl")
                .arg(format!(
                    "--bibliography={}",
                    typeset_dir
                        .join(format!("{}.bib", self.config.book.name))
                        .display()
                ))
                .args(["-t", "html", "-f", "markdown+citations"]),
            StageMode::MarkdownOnly => return None,
        };

        Some(spec.arg("-o").path_arg(&output).path_arg(&input))
    }

    pub fn postprocess_command(&self, chapter: &Chapter, mode: StageMode) -> Option<CommandSpec> {
        if mode != StageMode::Latex {
            return None;
        }
        let input = self.converted_path(&chapter.id, mode)?;
        let output = self.artifact_path(&chapter.id, mode);
        Some(
            CommandSpec::tool(&self.config.tools.postprocessor, self.root)
                .arg(format!("--output={}", output.display()))
                .path_arg(&input),
        )
    }

    /// The command for one stage, if `mode` runs that stage.
    pub fn command(
        &self,
        stage: Stage,
        chapter: &Chapter,
        number: usize,
        mode: StageMode,
    ) -> Option<CommandSpec> {
        match stage {
            Stage::Preprocess => Some(self.preprocess_command(chapter, number, mode)),
            Stage::Convert => self.convert_command(chapter, mode),
            Stage::Postprocess => self.postprocess_command(chapter, mode),
        }
    }

    /// Run every stage of `mode` for one chapter, strictly in order.
    /// Returns the chapter artifact path, relative to the project root.
    #[instrument(skip_all, fields(chapter = %chapter.id, number = number, mode = ?mode))]
    pub fn run_chapter_pipeline(
        &self,
        ctx: &mut BuildContext<'_>,
        chapter: &Chapter,
        number: usize,
        mode: StageMode,
    ) -> Result<PathBuf> {
        for stage in mode.stages() {
            if let Some(spec) = self.command(*stage, chapter, number, mode) {
                debug!(?stage, "running stage");
                ctx.exec(&spec)?;
            }
        }
        Ok(self.artifact_path(&chapter.id, mode))
    }
}

/// Site page for a chapter, relative to the project root.
pub fn site_page_path(config: &BookConfig, id: &ChapterId) -> PathBuf {
    site_pages_dir(config).join(format!("{id}.md"))
}

/// Directory the site generator reads pages from.
pub fn site_pages_dir(config: &BookConfig) -> PathBuf {
    config.paths.site_dir.join("content").join("pages")
}
