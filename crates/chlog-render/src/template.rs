//! `{{ field }}` interpolation over the JSON form of a change item.

use chlog_core::{ChangeItem, ChangelogError, Result};
use regex::Regex;
use serde_json::Value;
use std::path::Path;

const PLACEHOLDER: &str = r"\{\{\s*([A-Za-z_][A-Za-z0-9_.]*)\s*\}\}";

const GIT_ITEM: &str = include_str!("../templates/git_item.md.tmpl");
const GITHUB_ITEM_MD: &str = include_str!("../templates/github_item.md.tmpl");
const GITHUB_ITEM_RST: &str = include_str!("../templates/github_item.rst.tmpl");
const GITHUB_ITEM_JSON: &str = include_str!("../templates/github_item.json.tmpl");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Markdown,
    Json,
    Rst,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Field(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self> {
        let re = Regex::new(PLACEHOLDER).map_err(|e| ChangelogError::Render(e.to_string()))?;
        let source = source.trim_end_matches(['\n', '\r']);
        let mut segments = Vec::new();
        let mut last = 0;
        for caps in re.captures_iter(source) {
            let (Some(whole), Some(field)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if whole.start() > last {
                segments.push(Segment::Text(source[last..whole.start()].to_string()));
            }
            segments.push(Segment::Field(field.as_str().to_string()));
            last = whole.end();
        }
        if last < source.len() {
            segments.push(Segment::Text(source[last..].to_string()));
        }
        Ok(Self { segments })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            ChangelogError::config(format!("cannot read template {}: {e}", path.display()))
        })?;
        Self::parse(&source)
    }

    /// Built-in item template for `source_kind` in `format`.
    pub fn default_for(source_kind: &str, format: Format) -> Result<Self> {
        let source = match (source_kind, format) {
            ("github", Format::Markdown) => GITHUB_ITEM_MD,
            ("github", Format::Rst) => GITHUB_ITEM_RST,
            ("github", Format::Json) => GITHUB_ITEM_JSON,
            _ => GIT_ITEM,
        };
        Self::parse(source)
    }

    pub fn render(&self, item: &ChangeItem) -> Result<String> {
        let context = serde_json::to_value(item)?;
        self.render_value(&context)
    }

    pub fn render_value(&self, context: &Value) -> Result<String> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(t) => out.push_str(t),
                Segment::Field(path) => {
                    let value = lookup(context, path).ok_or_else(|| {
                        ChangelogError::Render(format!("unknown template field `{path}`"))
                    })?;
                    out.push_str(&display(value));
                }
            }
        }
        Ok(out)
    }
}

fn lookup<'v>(context: &'v Value, path: &str) -> Option<&'v Value> {
    path.split('.').try_fold(context, |v, key| match v {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(display).collect::<Vec<_>>().join(", "),
        other => other.to_string(),
    }
}
