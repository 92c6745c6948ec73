//! Master document assembly.
//!
//! The master template carries a single marker line; assembly swaps it for
//! one `\include{<id>}` line per selected chapter and leaves every other line
//! exactly as it was.

use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use bookbinder_shared::{BookConfig, BookbinderError, Chapter, ChapterId, Result};

/// Reads the master template and writes the assembled master document.
#[derive(Debug, Clone)]
pub struct TemplateAssembler {
    template_path: PathBuf,
    output_path: PathBuf,
    marker: String,
}

impl TemplateAssembler {
    pub fn new(
        template_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
        marker: impl Into<String>,
    ) -> Self {
        Self {
            template_path: template_path.into(),
            output_path: output_path.into(),
            marker: marker.into(),
        }
    }

    pub fn from_config(config: &BookConfig, root: &Path) -> Self {
        Self::new(
            root.join(config.template_path()),
            root.join(config.master_path()),
            config.book.marker.clone(),
        )
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Replace the marker line of `template` with the chapter includes.
    pub fn render(&self, template: &str, chapters: &[Chapter]) -> Result<String> {
        let marker_lines = template
            .split_inclusive('\n')
            .filter(|line| line.contains(&self.marker))
            .count();

        match marker_lines {
            0 => {
                return Err(BookbinderError::TemplateMarkerMissing {
                    path: self.template_path.clone(),
                    marker: self.marker.clone(),
                });
            }
            1 => {}
            n => {
                return Err(BookbinderError::config(format!(
                    "template {} has {n} lines containing marker '{}', expected exactly one",
                    self.template_path.display(),
                    self.marker
                )));
            }
        }

        let mut out = String::with_capacity(template.len() + chapters.len() * 32);
        for line in template.split_inclusive('\n') {
            if !line.contains(&self.marker) {
                out.push_str(line);
                continue;
            }

            let ending = if line.ends_with("\r\n") {
                "\r\n"
            } else if line.ends_with('\n') {
                "\n"
            } else {
                ""
            };
            let separator = if ending.is_empty() { "\n" } else { ending };

            let includes: Vec<String> = chapters
                .iter()
                .map(|c| include_directive(&c.id))
                .collect();
            if !includes.is_empty() {
                out.push_str(&includes.join(separator));
                out.push_str(ending);
            }
        }

        Ok(out)
    }

    /// Read the template, render it, and write the master document.
    /// Nothing is written when rendering fails.
    #[instrument(
        skip_all,
        fields(template = %self.template_path.display(), chapters = chapters.len())
    )]
    pub fn assemble(&self, chapters: &[Chapter]) -> Result<PathBuf> {
        let template = std::fs::read_to_string(&self.template_path)
            .map_err(|e| BookbinderError::io(&self.template_path, e))?;

        let rendered = self.render(&template, chapters)?;
        write_atomic(&self.output_path, &rendered)?;

        info!(
            output = %self.output_path.display(),
            includes = chapters.len(),
            "assembled master document"
        );
        Ok(self.output_path.clone())
    }
}

/// The include line for one chapter.
pub fn include_directive(id: &ChapterId) -> String {
    format!("\\include{{{id}}}")
}

/// Write to a temp sibling, then rename over the target.
fn write_atomic(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| BookbinderError::io(parent, e))?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = path.with_file_name(format!(".{file_name}.tmp"));

    std::fs::write(&temp, content).map_err(|e| BookbinderError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| BookbinderError::io(path, e))?;

    debug!(path = %path.display(), bytes = content.len(), "wrote file");
    Ok(())
}
