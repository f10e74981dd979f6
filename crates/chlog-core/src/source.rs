use crate::error::{ChangelogError, Result};
use crate::model::{AggregatedChangelog, ReleaseRange, SourceRecord, VersionMarker};
use crate::pipeline::RecordStream;
use crate::range::{select, RangeResolver};
use std::collections::{HashSet, VecDeque};

/// A history or tracker that changes can be read from.
///
/// Policy options (exclusions, label maps, ...) are bound when the source
/// is created by its plugin.
pub trait ChangelogSource {
    /// Plugin kind, used by renderers to pick default templates.
    fn kind(&self) -> &str;

    /// Release markers, ascending (oldest first).
    fn versions(&mut self) -> Result<Vec<VersionMarker>>;

    /// Aggregate the changes attributed to `range`.
    fn changes_since(&mut self, range: &ReleaseRange) -> Result<AggregatedChangelog>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Selection {
    /// Every release, newest first.
    #[default]
    All,
    /// One named release.
    Single(String),
}

/// First pipeline stage: resolves ranges, then reads one release per pull.
pub struct SourceStage {
    source: Box<dyn ChangelogSource>,
    resolver: RangeResolver,
    selection: Selection,
    include_unreleased: bool,
}

impl SourceStage {
    pub fn new(source: Box<dyn ChangelogSource>) -> Self {
        Self {
            source,
            resolver: RangeResolver::default(),
            selection: Selection::All,
            include_unreleased: true,
        }
    }

    pub fn resolver(mut self, resolver: RangeResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn selection(mut self, selection: Selection) -> Self {
        self.selection = selection;
        self
    }

    /// Whether a leading range runs from the newest marker to the tip.
    /// On by default.
    pub fn include_unreleased(mut self, include: bool) -> Self {
        self.include_unreleased = include;
        self
    }

    /// Resolve versions and ranges now; read changes lazily.
    ///
    /// An unknown single release fails here, before anything is read.
    pub fn open(mut self) -> Result<RecordStream> {
        let markers = self.source.versions()?;
        let wants_unreleased = matches!(
            &self.selection,
            Selection::Single(name) if name == self.resolver.unreleased_name()
        );
        let ranges = self
            .resolver
            .resolve(&markers, self.include_unreleased || wants_unreleased);
        ensure_unique_names(&ranges)?;
        let ranges: VecDeque<ReleaseRange> = match &self.selection {
            Selection::All => ranges.into(),
            Selection::Single(name) => VecDeque::from([select(ranges, name)?]),
        };
        tracing::info!(
            source = self.source.kind(),
            markers = markers.len(),
            releases = ranges.len(),
            "resolved release ranges"
        );
        Ok(Box::new(ReleaseStream {
            source: self.source,
            ranges,
        }))
    }
}

/// Release names key the rendered output, so two ranges may not share one.
fn ensure_unique_names(ranges: &[ReleaseRange]) -> Result<()> {
    let mut seen = HashSet::new();
    for range in ranges {
        if !seen.insert(range.release_name.as_str()) {
            return Err(ChangelogError::config(format!(
                "release name `{}` is used by more than one release; \
                 check the tag names, the release pattern and the unreleased name",
                range.release_name
            )));
        }
    }
    Ok(())
}

struct ReleaseStream {
    source: Box<dyn ChangelogSource>,
    ranges: VecDeque<ReleaseRange>,
}

impl Iterator for ReleaseStream {
    type Item = Result<SourceRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let range = self.ranges.pop_front()?;
        tracing::debug!(release = %range.release_name, "reading release");
        let kind = self.source.kind().to_string();
        Some(self.source.changes_since(&range).map(|items| SourceRecord {
            items,
            source_kind: kind,
        }))
    }
}
