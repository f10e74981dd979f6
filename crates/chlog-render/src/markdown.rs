use crate::output::{write_file, Output};
use crate::template::{Format, Template};
use crate::view::{BodyView, ReleaseView, Templates};
use chlog_core::pipeline::Renderer;
use chlog_core::registry::Plugin;
use chlog_core::{ChangelogError, Result, SourceRecord};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const INDEX_FILE: &str = "changelog.md";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MarkdownOptions {
    /// Output file, or output directory with `split_versions`.
    pub output: Option<PathBuf>,
    /// File holding the item template.
    pub template: Option<PathBuf>,
    pub allow_duplicates: bool,
    /// One file per release plus an index.
    pub split_versions: bool,
    pub title: String,
}

impl Default for MarkdownOptions {
    fn default() -> Self {
        Self {
            output: None,
            template: None,
            allow_duplicates: false,
            split_versions: false,
            title: "Changelog".to_string(),
        }
    }
}

pub struct MarkdownRenderer {
    options: MarkdownOptions,
    templates: Templates,
}

impl MarkdownRenderer {
    pub fn new(options: MarkdownOptions) -> Result<Self> {
        let explicit = options.template.as_deref().map(Template::from_file).transpose()?;
        Ok(Self {
            templates: Templates::new(Format::Markdown, explicit),
            options,
        })
    }

    fn render_single(&mut self, records: &mut dyn Iterator<Item = SourceRecord>) -> Result<()> {
        let mut out = format!("# {}\n\n", self.options.title);
        for record in records {
            for release in self.templates.views(&record, self.options.allow_duplicates)? {
                write_release(&mut out, &release, 2);
            }
        }
        Output::from_option(self.options.output.as_deref()).emit(&out)
    }

    fn render_split(&mut self, records: &mut dyn Iterator<Item = SourceRecord>) -> Result<()> {
        let dir = self
            .options
            .output
            .clone()
            .ok_or_else(|| ChangelogError::config("split_versions needs an output directory"))?;
        prepare_dir(&dir)?;

        let mut index = format!("# {}\n\n", self.options.title);
        for record in records {
            for release in self.templates.views(&record, self.options.allow_duplicates)? {
                let file = release_file_name(&release.name);
                let mut page = String::new();
                write_release(&mut page, &release, 1);
                write_file(&dir.join(&file), &page)?;
                index.push_str(&format!("- [{}]({file})\n", release.name));
            }
        }
        write_file(&dir.join(INDEX_FILE), &index)
    }
}

impl Renderer for MarkdownRenderer {
    fn render(&mut self, records: &mut dyn Iterator<Item = SourceRecord>) -> Result<()> {
        if self.options.split_versions {
            self.render_split(records)
        } else {
            self.render_single(records)
        }
    }
}

fn prepare_dir(dir: &Path) -> Result<()> {
    if dir.exists() && !dir.is_dir() {
        return Err(ChangelogError::config(format!(
            "{} exists and is not a directory",
            dir.display()
        )));
    }
    fs::create_dir_all(dir)?;
    Ok(())
}

/// `changelog_<release>.md`, with path separators and blanks replaced.
pub fn release_file_name(release: &str) -> String {
    let slug: String = release
        .chars()
        .map(|c| if c == '/' || c == '\\' || c.is_whitespace() { '_' } else { c })
        .collect();
    format!("changelog_{slug}.md")
}

fn write_release(out: &mut String, release: &ReleaseView, level: usize) {
    let hashes = "#".repeat(level);
    out.push_str(&format!("{hashes} {}\n\n", release.name));
    match &release.body {
        BodyView::List(lines) => write_list(out, lines),
        BodyView::Topics(topics) => {
            for (topic, lines) in topics {
                out.push_str(&format!("{hashes}# {topic}\n\n"));
                write_list(out, lines);
            }
        }
    }
}

fn write_list(out: &mut String, lines: &[String]) {
    if lines.is_empty() {
        return;
    }
    for line in lines {
        let mut parts = line.lines();
        out.push_str(&format!("- {}\n", parts.next().unwrap_or_default()));
        for rest in parts {
            if rest.is_empty() {
                out.push('\n');
            } else {
                out.push_str(&format!("  {rest}\n"));
            }
        }
    }
    out.push('\n');
}

pub struct MarkdownPlugin;

impl MarkdownPlugin {
    pub const IDENTITY: &'static str = "MarkdownRendererSpecification";
}

impl Plugin<dyn Renderer> for MarkdownPlugin {
    fn description(&self) -> &str {
        "Markdown document, optionally one file per release"
    }

    fn create(&self, config: &serde_json::Value) -> anyhow::Result<Box<dyn Renderer>> {
        let options: MarkdownOptions = serde_json::from_value(config.clone())?;
        Ok(Box::new(MarkdownRenderer::new(options)?))
    }
}
