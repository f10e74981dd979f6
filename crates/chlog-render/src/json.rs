use crate::output::Output;
use crate::template::{Format, Template};
use crate::view::{BodyView, Templates};
use chlog_core::pipeline::Renderer;
use chlog_core::registry::Plugin;
use chlog_core::{ChangelogError, Result, SourceRecord};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JsonOptions {
    pub output: Option<PathBuf>,
    /// Spaces per level; `null` for compact output.
    pub indent: Option<usize>,
    pub sort_keys: bool,
    /// Inline item template, e.g. `{{ title }} (#{{ number }})`.
    pub template: Option<String>,
    pub allow_duplicates: bool,
}

impl Default for JsonOptions {
    fn default() -> Self {
        Self {
            output: None,
            indent: Some(2),
            sort_keys: false,
            template: None,
            allow_duplicates: false,
        }
    }
}

/// `{release: {topic: [item]}}` or `{release: [item]}`.
pub struct JsonRenderer {
    options: JsonOptions,
    templates: Templates,
}

impl JsonRenderer {
    pub fn new(options: JsonOptions) -> Result<Self> {
        let explicit = options.template.as_deref().map(Template::parse).transpose()?;
        Ok(Self {
            templates: Templates::new(Format::Json, explicit),
            options,
        })
    }

    pub fn document(&mut self, records: &mut dyn Iterator<Item = SourceRecord>) -> Result<Value> {
        let mut doc = Map::new();
        for record in records {
            for release in self.templates.views(&record, self.options.allow_duplicates)? {
                let body = match release.body {
                    BodyView::Topics(topics) => Value::Object(
                        topics
                            .into_iter()
                            .map(|(topic, lines)| (topic, lines.into()))
                            .collect(),
                    ),
                    BodyView::List(lines) => lines.into(),
                };
                doc.insert(release.name, body);
            }
        }
        let doc = Value::Object(doc);
        Ok(if self.options.sort_keys { sorted(doc) } else { doc })
    }
}

impl Renderer for JsonRenderer {
    fn render(&mut self, records: &mut dyn Iterator<Item = SourceRecord>) -> Result<()> {
        let doc = self.document(records)?;
        let text = to_text(&doc, self.options.indent)?;
        Output::from_option(self.options.output.as_deref()).emit(&text)
    }
}

fn sorted(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(entries.into_iter().map(|(k, v)| (k, sorted(v))).collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sorted).collect()),
        other => other,
    }
}

fn to_text(value: &Value, indent: Option<usize>) -> Result<String> {
    let Some(width) = indent else {
        return Ok(format!("{}\n", serde_json::to_string(value)?));
    };
    let spaces = " ".repeat(width);
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(spaces.as_bytes());
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    buf.push(b'\n');
    String::from_utf8(buf).map_err(|e| ChangelogError::Render(e.to_string()))
}

pub struct JsonPlugin;

impl JsonPlugin {
    pub const IDENTITY: &'static str = "JsonRendererSpecification";
}

impl Plugin<dyn Renderer> for JsonPlugin {
    fn description(&self) -> &str {
        "JSON object keyed by release, then topic"
    }

    fn create(&self, config: &Value) -> anyhow::Result<Box<dyn Renderer>> {
        let options: JsonOptions = serde_json::from_value(config.clone())?;
        Ok(Box::new(JsonRenderer::new(options)?))
    }
}
