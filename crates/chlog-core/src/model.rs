use serde::Serialize;
use std::collections::HashMap;
use time::{OffsetDateTime, PrimitiveDateTime};

// ── Markers and ranges ──

/// A named release point in history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionMarker {
    pub name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Opaque handle into the history (commit id, tag sha).
    pub reference: String,
}

impl VersionMarker {
    pub fn new(
        name: impl Into<String>,
        timestamp: OffsetDateTime,
        reference: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            timestamp,
            reference: reference.into(),
        }
    }
}

/// One edge of a release range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bound {
    /// Before the first commit / issue.
    Beginning,
    Marker(VersionMarker),
    /// Current tip of history (HEAD, or "now" for trackers).
    Tip,
}

impl Bound {
    pub fn marker(&self) -> Option<&VersionMarker> {
        match self {
            Bound::Marker(m) => Some(m),
            _ => None,
        }
    }

    /// Timestamp with the offset dropped; `None` for open edges.
    pub fn naive_time(&self) -> Option<PrimitiveDateTime> {
        self.marker().map(|m| naive(m.timestamp))
    }
}

/// Interval `(lower, upper]` attributed to one release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseRange {
    pub release_name: String,
    pub lower: Bound,
    pub upper: Bound,
}

/// Strip the UTC offset, keeping the wall-clock value.
pub fn naive(ts: OffsetDateTime) -> PrimitiveDateTime {
    PrimitiveDateTime::new(ts.date(), ts.time())
}

// ── Change items ──

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitChange {
    pub id: String,
    pub message: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueChange {
    pub number: u64,
    pub title: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub closed_at: Option<OffsetDateTime>,
    pub labels: Vec<String>,
    pub is_pull_request: bool,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ChangeItem {
    Commit(CommitChange),
    Issue(IssueChange),
}

impl From<CommitChange> for ChangeItem {
    fn from(c: CommitChange) -> Self {
        ChangeItem::Commit(c)
    }
}

impl From<IssueChange> for ChangeItem {
    fn from(i: IssueChange) -> Self {
        ChangeItem::Issue(i)
    }
}

// ── Buckets ──

/// Insertion-ordered `key → items` mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buckets<T> {
    entries: Vec<(String, Vec<T>)>,
    index: HashMap<String, usize>,
}

impl<T> Default for Buckets<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T> Buckets<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: &str, item: T) {
        match self.index.get(key) {
            Some(&i) => self.entries[i].1.push(item),
            None => {
                self.index.insert(key.to_string(), self.entries.len());
                self.entries.push((key.to_string(), vec![item]));
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&[T]> {
        self.index.get(key).map(|&i| self.entries[i].1.as_slice())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[T])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of items across all buckets.
    pub fn item_count(&self) -> usize {
        self.entries.iter().map(|(_, v)| v.len()).sum()
    }

    pub fn map_items<U>(self, mut f: impl FnMut(T) -> U) -> Buckets<U> {
        Buckets {
            entries: self
                .entries
                .into_iter()
                .map(|(k, v)| (k, v.into_iter().map(&mut f).collect()))
                .collect(),
            index: self.index,
        }
    }
}

// ── Aggregates ──

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseBody {
    /// Commits grouped by trimmed message; each group is one logical change.
    Messages(Buckets<ChangeItem>),
    /// Items grouped by topic.
    Topics(Buckets<ChangeItem>),
    /// Topic classification disabled.
    Flat(Vec<ChangeItem>),
}

impl ReleaseBody {
    pub fn is_empty(&self) -> bool {
        match self {
            ReleaseBody::Messages(b) | ReleaseBody::Topics(b) => b.is_empty(),
            ReleaseBody::Flat(items) => items.is_empty(),
        }
    }
}

/// Release name → body, newest release first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregatedChangelog {
    pub releases: Vec<(String, ReleaseBody)>,
}

impl AggregatedChangelog {
    pub fn single(release: impl Into<String>, body: ReleaseBody) -> Self {
        Self {
            releases: vec![(release.into(), body)],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.releases.iter().all(|(_, body)| body.is_empty())
    }
}

/// Unit exchanged between pipeline stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRecord {
    pub items: AggregatedChangelog,
    /// Plugin kind that produced the record (`git`, `github`).
    pub source_kind: String,
}
