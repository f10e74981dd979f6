//! reStructuredText for Sphinx: `=` title, `-` releases, `~` topics.

use crate::output::Output;
use crate::template::{Format, Template};
use crate::view::{BodyView, ReleaseView, Templates};
use chlog_core::pipeline::Renderer;
use chlog_core::registry::Plugin;
use chlog_core::{Result, SourceRecord};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RstOptions {
    pub output: Option<PathBuf>,
    pub template: Option<PathBuf>,
    pub allow_duplicates: bool,
    pub title: String,
}

impl Default for RstOptions {
    fn default() -> Self {
        Self {
            output: None,
            template: None,
            allow_duplicates: false,
            title: "Changelog".to_string(),
        }
    }
}

pub struct RstRenderer {
    options: RstOptions,
    templates: Templates,
}

impl RstRenderer {
    pub fn new(options: RstOptions) -> Result<Self> {
        let explicit = options.template.as_deref().map(Template::from_file).transpose()?;
        Ok(Self {
            templates: Templates::new(Format::Rst, explicit),
            options,
        })
    }
}

impl Renderer for RstRenderer {
    fn render(&mut self, records: &mut dyn Iterator<Item = SourceRecord>) -> Result<()> {
        let mut out = String::new();
        heading(&mut out, &self.options.title, '=');
        for record in records {
            for release in self.templates.views(&record, self.options.allow_duplicates)? {
                write_release(&mut out, &release);
            }
        }
        Output::from_option(self.options.output.as_deref()).emit(&out)
    }
}

fn heading(out: &mut String, text: &str, underline: char) {
    let width = text.chars().count().max(1);
    out.push_str(text);
    out.push('\n');
    out.extend(std::iter::repeat(underline).take(width));
    out.push_str("\n\n");
}

fn write_release(out: &mut String, release: &ReleaseView) {
    heading(out, &release.name, '-');
    match &release.body {
        BodyView::List(lines) => write_list(out, lines),
        BodyView::Topics(topics) => {
            for (topic, lines) in topics {
                heading(out, topic, '~');
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
        out.push_str(&format!("* {}\n", parts.next().unwrap_or_default()));
        for rest in parts.filter(|l| !l.trim().is_empty()) {
            out.push_str(&format!("  {rest}\n"));
        }
    }
    out.push('\n');
}

pub struct RstPlugin;

impl RstPlugin {
    pub const IDENTITY: &'static str = "RstRendererSpecification";
}

impl Plugin<dyn Renderer> for RstPlugin {
    fn description(&self) -> &str {
        "reStructuredText document for Sphinx"
    }

    fn create(&self, config: &serde_json::Value) -> anyhow::Result<Box<dyn Renderer>> {
        let options: RstOptions = serde_json::from_value(config.clone())?;
        Ok(Box::new(RstRenderer::new(options)?))
    }
}
