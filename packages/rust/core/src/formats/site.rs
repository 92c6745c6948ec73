//! Static site builder.
//!
//! Chapters become HTML pages under the site's content directory, each page
//! gets its title rewritten, the site generator runs, and the chapter images
//! are copied next to the generated pages.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use bookbinder_shared::{BookConfig, BookbinderError, ChapterId, Format, Result};

use super::{BuildContext, FormatBuilder};
use crate::assets::{AssetManifest, distribute};
use crate::registry::Selection;
use crate::runner::CommandSpec;
use crate::stages::{StageInvoker, StageMode, site_page_path, site_pages_dir};

#[derive(Debug, Default, Clone, Copy)]
pub struct SiteBuilder;

/// Directory the site generator writes, relative to the project root.
pub fn site_output_dir(config: &BookConfig) -> PathBuf {
    config.paths.site_dir.join("output")
}

/// `<title-fixup> html/content/pages/<id>.md`, run at the root.
pub fn title_fixup_command(config: &BookConfig, root: &Path, id: &ChapterId) -> CommandSpec {
    CommandSpec::tool(&config.tools.title_fixup, root).path_arg(&site_page_path(config, id))
}

impl FormatBuilder for SiteBuilder {
    fn format(&self) -> Format {
        Format::Html
    }

    fn process_chapters(&self, ctx: &mut BuildContext<'_>, selection: &Selection) -> Result<()> {
        let pages = ctx.abs(site_pages_dir(ctx.config));
        std::fs::create_dir_all(&pages).map_err(|e| BookbinderError::io(&pages, e))?;

        let invoker = StageInvoker::new(ctx.config, ctx.root);
        for (number, chapter) in selection.numbered() {
            ctx.progress
                .chapter(Format::Html, &chapter.id, number, selection.len());
            invoker.run_chapter_pipeline(ctx, chapter, number, StageMode::Html)?;
            ctx.exec(&title_fixup_command(ctx.config, ctx.root, &chapter.id))?;
        }
        Ok(())
    }

    fn assemble(&self, ctx: &mut BuildContext<'_>, _selection: &Selection) -> Result<()> {
        let site_dir = ctx.abs(&ctx.config.paths.site_dir);
        ctx.exec(&CommandSpec::tool(&ctx.config.tools.site_generator, &site_dir))?;
        Ok(())
    }

    fn package(&self, ctx: &mut BuildContext<'_>) -> Result<()> {
        let target = ctx.abs(site_output_dir(ctx.config).join("pages"));
        let summary = distribute(&AssetManifest::from_config(ctx.config), ctx.root, &target);
        if !summary.failed.is_empty() {
            warn!(failed = summary.failed.len(), "some chapter images were not published");
        }
        Ok(())
    }

    fn finish(&self, ctx: &mut BuildContext<'_>) -> Result<PathBuf> {
        let output = ctx.abs(site_output_dir(ctx.config));
        info!(path = %output.display(), "site ready");
        Ok(output)
    }
}
