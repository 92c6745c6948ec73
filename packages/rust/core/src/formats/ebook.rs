//! E-book (EPUB) builder.
//!
//! Chapters are preprocessed to Markdown and have their headings shifted by
//! chapter number. The converter may then assemble a fresh package. Either
//! way the package is repacked: the converter cannot embed the package
//! metadata and images itself, so they are zipped in, the archive is unpacked
//! and synced back over the working directory, and the result is copied to
//! the output directory.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use bookbinder_shared::{BookConfig, BookbinderError, ChapterId, Format, Result};

use super::{BuildContext, FormatBuilder, copy_file};
use crate::registry::Selection;
use crate::runner::CommandSpec;
use crate::stages::{StageInvoker, StageMode};

/// Scratch directory (inside the e-book working directory) for unpacking.
pub const UNPACK_DIR: &str = "tmp-epub-contents";

#[derive(Debug, Clone, Copy)]
pub struct EbookBuilder {
    assemble: bool,
}

impl EbookBuilder {
    /// `assemble` runs the converter; otherwise an existing package is
    /// repacked as is.
    pub fn new(assemble: bool) -> Self {
        Self { assemble }
    }

    fn package_name(config: &BookConfig) -> String {
        format!("{}.epub", config.book.name)
    }
}

/// `<shift> <id>.markdown.1 <id>.markdown <number>`, run in `cwd`.
pub fn heading_shift_command(
    config: &BookConfig,
    cwd: &Path,
    id: &ChapterId,
    number: usize,
) -> CommandSpec {
    CommandSpec::tool(&config.tools.heading_shift, cwd)
        .arg(format!("{id}.markdown.1"))
        .arg(format!("{id}.markdown"))
        .arg(number.to_string())
}

/// Converter call assembling the package from front matter and chapters.
pub fn assemble_command(config: &BookConfig, cwd: &Path, chapters: &[ChapterId]) -> CommandSpec {
    CommandSpec::tool(&config.tools.converter, cwd)
        .args(["--chapters", "-S", "-f", "markdown+mmd_title_block"])
        .arg("--highlight-style=kate")
        .arg("-o")
        .arg(EbookBuilder::package_name(config))
        .args(config.ebook.front_matter.iter().cloned())
        .args(chapters.iter().map(|id| format!("{id}.markdown")))
}

/// Archive, unpack, and sync commands, in order.
pub fn repackage_commands(config: &BookConfig, cwd: &Path, assets: &[String]) -> Vec<CommandSpec> {
    let package = EbookBuilder::package_name(config);
    let tools = &config.tools;
    vec![
        CommandSpec::tool(&tools.archiver, cwd)
            .arg(package.clone())
            .args(config.ebook.package_files.iter().cloned())
            .args(assets.iter().cloned()),
        CommandSpec::tool(&tools.unarchiver, cwd)
            .arg(package)
            .arg("-d")
            .arg(format!("{UNPACK_DIR}/")),
        CommandSpec::tool(&tools.sync, cwd)
            .arg(format!("{UNPACK_DIR}/"))
            .arg("./"),
    ]
}

/// Non-empty, trimmed lines of the asset list file.
pub fn read_asset_list(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path).map_err(|e| BookbinderError::io(path, e))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect())
}

impl FormatBuilder for EbookBuilder {
    fn format(&self) -> Format {
        Format::Epub
    }

    fn process_chapters(&self, ctx: &mut BuildContext<'_>, selection: &Selection) -> Result<()> {
        let invoker = StageInvoker::new(ctx.config, ctx.root);
        let work_dir = ctx.abs(&ctx.config.paths.ebook_dir);
        std::fs::create_dir_all(&work_dir).map_err(|e| BookbinderError::io(&work_dir, e))?;

        for (number, chapter) in selection.numbered() {
            ctx.progress
                .chapter(Format::Epub, &chapter.id, number, selection.len());
            invoker.run_chapter_pipeline(ctx, chapter, number, StageMode::MarkdownOnly)?;
            ctx.exec(&heading_shift_command(ctx.config, &work_dir, &chapter.id, number))?;
        }
        Ok(())
    }

    fn assemble(&self, ctx: &mut BuildContext<'_>, selection: &Selection) -> Result<()> {
        if !self.assemble {
            info!("e-book assembly not requested, repackaging the existing package");
            return Ok(());
        }
        let work_dir = ctx.abs(&ctx.config.paths.ebook_dir);
        ctx.exec(&assemble_command(ctx.config, &work_dir, &selection.ids()))?;
        Ok(())
    }

    fn package(&self, ctx: &mut BuildContext<'_>) -> Result<()> {
        let work_dir = ctx.abs(&ctx.config.paths.ebook_dir);
        let assets = read_asset_list(&work_dir.join(&ctx.config.ebook.asset_list))?;
        debug!(assets = assets.len(), "read e-book asset list");

        let unpack_dir = work_dir.join(UNPACK_DIR);
        reset_dir(&unpack_dir)?;

        let repacked = repackage_commands(ctx.config, &work_dir, &assets)
            .iter()
            .try_for_each(|spec| ctx.exec(spec).map(drop));

        let cleaned =
            std::fs::remove_dir_all(&unpack_dir).map_err(|e| BookbinderError::io(&unpack_dir, e));
        repacked.and(cleaned)
    }

    fn finish(&self, ctx: &mut BuildContext<'_>) -> Result<PathBuf> {
        let package = ctx
            .abs(&ctx.config.paths.ebook_dir)
            .join(Self::package_name(ctx.config));
        let target = ctx.output_artifact("epub");
        copy_file(&package, &target)?;
        info!(path = %target.display(), "e-book ready");
        Ok(target)
    }
}

fn reset_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        std::fs::remove_dir_all(dir).map_err(|e| BookbinderError::io(dir, e))?;
    }
    std::fs::create_dir_all(dir).map_err(|e| BookbinderError::io(dir, e))
}
