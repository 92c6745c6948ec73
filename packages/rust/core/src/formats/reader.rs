//! E-reader (MOBI) builder: a single conversion of the finished e-book.

use std::path::{Path, PathBuf};

use tracing::info;

use bookbinder_shared::{BookConfig, BookbinderError, Format, Result};

use super::{BuildContext, FormatBuilder};
use crate::registry::Selection;
use crate::runner::CommandSpec;

#[derive(Debug, Default, Clone, Copy)]
pub struct ReaderBuilder;

/// `<ebook-converter> output/<book>.epub output/<book>.mobi`, run at the root.
pub fn convert_command(config: &BookConfig, root: &Path) -> CommandSpec {
    let output = &config.book.output_dir;
    let name = &config.book.name;
    CommandSpec::tool(&config.tools.ebook_converter, root)
        .path_arg(&output.join(format!("{name}.epub")))
        .path_arg(&output.join(format!("{name}.mobi")))
}

impl FormatBuilder for ReaderBuilder {
    fn format(&self) -> Format {
        Format::Mobi
    }

    fn check_preconditions(&self, ctx: &BuildContext<'_>) -> Result<()> {
        let epub = ctx.output_artifact("epub");
        if !epub.is_file() {
            return Err(BookbinderError::precondition(
                Format::Mobi,
                format!(
                    "{} does not exist; build the e-book in the same run",
                    epub.display()
                ),
            ));
        }
        Ok(())
    }

    fn process_chapters(&self, _ctx: &mut BuildContext<'_>, _selection: &Selection) -> Result<()> {
        Ok(())
    }

    fn assemble(&self, _ctx: &mut BuildContext<'_>, _selection: &Selection) -> Result<()> {
        Ok(())
    }

    fn package(&self, ctx: &mut BuildContext<'_>) -> Result<()> {
        ctx.exec(&convert_command(ctx.config, ctx.root))?;
        Ok(())
    }

    fn finish(&self, ctx: &mut BuildContext<'_>) -> Result<PathBuf> {
        let target = ctx.output_artifact("mobi");
        info!(path = %target.display(), "e-reader file ready");
        Ok(target)
    }
}
