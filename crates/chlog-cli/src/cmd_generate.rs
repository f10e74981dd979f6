use crate::catalogue;
use anyhow::Context;
use chlog_core::pipeline::{Limit, Pipeline, SkipEmpty};
use chlog_core::range::{RangeResolver, DEFAULT_UNRELEASED};
use chlog_core::source::{Selection, SourceStage};
use clap::Args;
use serde_json::{Map, Value};
use std::path::PathBuf;

// ── CLI Schema ──

#[derive(Args, Debug, Default)]
pub struct GenerateArgs {
    /// Source plugin (git, github)
    #[arg(long, default_value = "git")]
    pub source: String,
    /// Renderer plugin (markdown, json, rst)
    #[arg(long, default_value = "markdown")]
    pub renderer: String,

    // ── Release selection ──
    /// Render only this release
    #[arg(long)]
    pub release: Option<String>,
    /// Leave out changes after the newest release
    #[arg(long)]
    pub no_unreleased: bool,
    /// Name of the unreleased section
    #[arg(long, default_value = DEFAULT_UNRELEASED)]
    pub unreleased_name: String,
    /// Regex with one capture group deriving release names from tags
    #[arg(long)]
    pub release_pattern: Option<String>,
    /// Stop after this many releases
    #[arg(long)]
    pub limit: Option<usize>,
    /// Drop releases without changes
    #[arg(long)]
    pub skip_empty: bool,

    // ── git ──
    /// Repository path
    #[arg(long)]
    pub path: Option<PathBuf>,
    /// Drop commits whose message contains this text (repeatable)
    #[arg(long = "exclude")]
    pub exclude: Vec<String>,
    /// Do not apply the built-in merge/bump exclusions
    #[arg(long)]
    pub no_default_excludes: bool,

    // ── github ──
    /// Repository as owner/name
    #[arg(long)]
    pub repo: Option<String>,
    /// API token (defaults to GITHUB_TOKEN)
    #[arg(long)]
    pub token: Option<String>,
    #[arg(long)]
    pub api_url: Option<String>,
    /// JSON object mapping topics to labels
    #[arg(long)]
    pub label_map: Option<PathBuf>,
    /// JSON array of labels to ignore
    #[arg(long)]
    pub ignore_labels: Option<PathBuf>,
    /// Keep pull requests
    #[arg(long)]
    pub no_filter_pull_requests: bool,
    /// List issues without grouping them by topic
    #[arg(long)]
    pub no_topics_from_labels: bool,
    /// Keep unlabeled issues under --unlabeled-label
    #[arg(long)]
    pub no_filter_unlabeled: bool,
    #[arg(long)]
    pub unlabeled_label: Option<String>,
    /// List an issue under every topic its labels map to
    #[arg(long)]
    pub split_issues_between_topics: bool,
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,
    /// Do not read or write the on-disk issue cache
    #[arg(long)]
    pub no_cache: bool,

    // ── rendering ──
    /// Output file (directory with --split-versions); stdout when omitted
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Item template (file for markdown/rst, inline text for json)
    #[arg(long)]
    pub template: Option<String>,
    /// Keep repeated entries
    #[arg(long)]
    pub allow_duplicates: bool,
    /// Markdown: one file per release plus an index
    #[arg(long)]
    pub split_versions: bool,
    /// JSON indent width
    #[arg(long)]
    pub indent: Option<usize>,
    /// JSON: sort object keys
    #[arg(long)]
    pub sort_keys: bool,
    #[arg(long)]
    pub title: Option<String>,

    /// Extra source option as key=value (repeatable)
    #[arg(long = "source-option", value_name = "KEY=VALUE")]
    pub source_options: Vec<String>,
    /// Extra renderer option as key=value (repeatable)
    #[arg(long = "renderer-option", value_name = "KEY=VALUE")]
    pub renderer_options: Vec<String>,
}

// ── Plugin configuration ──

fn put(map: &mut Map<String, Value>, key: &str, value: impl Into<Value>) {
    map.insert(key.to_string(), value.into());
}

fn put_opt<T: Into<Value>>(map: &mut Map<String, Value>, key: &str, value: Option<T>) {
    if let Some(v) = value {
        put(map, key, v);
    }
}

fn path_value(p: &std::path::Path) -> Value {
    Value::String(p.to_string_lossy().into_owned())
}

/// Parse a string value into an appropriate JSON value (bool/number/JSON/string).
fn parse_value(s: &str) -> Value {
    match s {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => {
            if let Ok(n) = s.parse::<i64>() {
                Value::Number(n.into())
            } else if s.starts_with('[') || s.starts_with('{') {
                serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.to_string()))
            } else {
                Value::String(s.to_string())
            }
        }
    }
}

fn apply_extra(map: &mut Map<String, Value>, pairs: &[String]) -> anyhow::Result<()> {
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("expected KEY=VALUE, got `{pair}`"))?;
        put(map, key.trim(), parse_value(value));
    }
    Ok(())
}

/// Configuration handed to the source plugin. Keys a plugin does not know
/// are ignored, so git and github options share one map.
pub fn source_config(args: &GenerateArgs) -> anyhow::Result<Value> {
    let mut map = Map::new();
    put_opt(&mut map, "path", args.path.as_deref().map(path_value));
    put_opt(&mut map, "release_pattern", args.release_pattern.clone());
    if args.no_default_excludes || !args.exclude.is_empty() {
        let mut exclude = if args.no_default_excludes {
            Vec::new()
        } else {
            chlog_core::commits::default_excludes()
        };
        exclude.extend(args.exclude.iter().cloned());
        put(&mut map, "exclude", exclude);
    }

    put_opt(&mut map, "repo", args.repo.clone());
    put_opt(&mut map, "token", args.token.clone());
    put_opt(&mut map, "api_url", args.api_url.clone());
    put_opt(&mut map, "label_map_file", args.label_map.as_deref().map(path_value));
    put_opt(&mut map, "ignore_labels_file", args.ignore_labels.as_deref().map(path_value));
    put_opt(&mut map, "cache_dir", args.cache_dir.as_deref().map(path_value));
    put_opt(&mut map, "unlabeled_label", args.unlabeled_label.clone());
    put(&mut map, "filter_pull_requests", !args.no_filter_pull_requests);
    put(&mut map, "topics_from_labels", !args.no_topics_from_labels);
    put(&mut map, "filter_unlabeled", !args.no_filter_unlabeled);
    put(&mut map, "split_issues_between_topics", args.split_issues_between_topics);
    put(&mut map, "no_cache", args.no_cache);

    apply_extra(&mut map, &args.source_options)?;
    Ok(Value::Object(map))
}

pub fn renderer_config(args: &GenerateArgs) -> anyhow::Result<Value> {
    let mut map = Map::new();
    put_opt(&mut map, "output", args.output.as_deref().map(path_value));
    put_opt(&mut map, "template", args.template.clone());
    put_opt(&mut map, "indent", args.indent);
    put_opt(&mut map, "title", args.title.clone());
    put(&mut map, "allow_duplicates", args.allow_duplicates);
    put(&mut map, "split_versions", args.split_versions);
    put(&mut map, "sort_keys", args.sort_keys);

    apply_extra(&mut map, &args.renderer_options)?;
    Ok(Value::Object(map))
}

// ── Command ──

/// `chlog generate`
pub fn execute(args: &GenerateArgs) -> anyhow::Result<()> {
    let sources = catalogue::sources(true)?;
    let renderers = catalogue::renderers(true);

    let source = sources
        .require(&args.source)?
        .create(&source_config(args)?)
        .with_context(|| format!("cannot set up source `{}`", args.source))?;
    let mut renderer = renderers
        .require(&args.renderer)?
        .create(&renderer_config(args)?)
        .with_context(|| format!("cannot set up renderer `{}`", args.renderer))?;

    let selection = match &args.release {
        Some(name) => Selection::Single(name.clone()),
        None => Selection::All,
    };
    let stream = SourceStage::new(source)
        .resolver(RangeResolver::new(args.unreleased_name.as_str()))
        .selection(selection)
        .include_unreleased(!args.no_unreleased)
        .open()?;

    let mut pipeline = Pipeline::new(stream);
    if args.skip_empty {
        pipeline = pipeline.stage(SkipEmpty);
    }
    if let Some(n) = args.limit {
        pipeline = pipeline.stage(Limit(n));
    }
    let summary = pipeline.run(renderer.as_mut())?;
    tracing::info!(
        rendered = summary.rendered,
        skipped = summary.skipped,
        "changelog generated"
    );
    Ok(())
}
