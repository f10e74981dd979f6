use crate::template::{Format, Template};
use chlog_core::{ChangeItem, ReleaseBody, Result, SourceRecord};
use std::collections::HashMap;
use std::collections::HashSet;

/// One release with every item already rendered to text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseView {
    pub name: String,
    pub body: BodyView,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyView {
    /// Topic → lines.
    Topics(Vec<(String, Vec<String>)>),
    List(Vec<String>),
}

/// Item template resolution shared by the renderers: an explicit template
/// wins, otherwise the built-in one for the record's source kind.
pub struct Templates {
    format: Format,
    explicit: Option<Template>,
    defaults: HashMap<String, Template>,
}

impl Templates {
    pub fn new(format: Format, explicit: Option<Template>) -> Self {
        Self {
            format,
            explicit,
            defaults: HashMap::new(),
        }
    }

    fn for_kind(&mut self, kind: &str) -> Result<&Template> {
        if let Some(t) = &self.explicit {
            return Ok(t);
        }
        if !self.defaults.contains_key(kind) {
            let t = Template::default_for(kind, self.format)?;
            self.defaults.insert(kind.to_string(), t);
        }
        self.defaults
            .get(kind)
            .ok_or_else(|| chlog_core::ChangelogError::Render(format!("no template for `{kind}`")))
    }

    /// Render every release of `record`.
    pub fn views(
        &mut self,
        record: &SourceRecord,
        allow_duplicates: bool,
    ) -> Result<Vec<ReleaseView>> {
        let template = self.for_kind(&record.source_kind)?;
        record
            .items
            .releases
            .iter()
            .map(|(name, body)| {
                Ok(ReleaseView {
                    name: name.clone(),
                    body: body_view(body, template, allow_duplicates)?,
                })
            })
            .collect()
    }
}

fn body_view(body: &ReleaseBody, template: &Template, allow_duplicates: bool) -> Result<BodyView> {
    Ok(match body {
        // Each bucket is one logical change; its commits only repeat it.
        ReleaseBody::Messages(buckets) => {
            let mut lines = Vec::new();
            for (_, items) in buckets.iter() {
                let take = if allow_duplicates { items.len() } else { 1 };
                for item in items.iter().take(take) {
                    lines.push(template.render(item)?);
                }
            }
            BodyView::List(dedupe(lines, allow_duplicates))
        }
        ReleaseBody::Topics(buckets) => BodyView::Topics(
            buckets
                .iter()
                .map(|(topic, items)| {
                    Ok((topic.to_string(), render_all(items, template, allow_duplicates)?))
                })
                .collect::<Result<_>>()?,
        ),
        ReleaseBody::Flat(items) => BodyView::List(render_all(items, template, allow_duplicates)?),
    })
}

fn render_all(
    items: &[ChangeItem],
    template: &Template,
    allow_duplicates: bool,
) -> Result<Vec<String>> {
    let lines = items
        .iter()
        .map(|i| template.render(i))
        .collect::<Result<Vec<_>>>()?;
    Ok(dedupe(lines, allow_duplicates))
}

fn dedupe(lines: Vec<String>, allow_duplicates: bool) -> Vec<String> {
    if allow_duplicates {
        return lines;
    }
    let mut seen = HashSet::new();
    lines.into_iter().filter(|l| seen.insert(l.clone())).collect()
}
