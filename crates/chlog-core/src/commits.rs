//! Commit graph walk for one release range.

use crate::error::{ChangelogError, Result};
use crate::model::{Bound, Buckets, CommitChange, ReleaseRange};
use crate::range::Ancestry;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use time::OffsetDateTime;

/// Commit messages dropped by default.
pub const DEFAULT_EXCLUDES: &[&str] = &[
    "Merge branch",
    "Merge pull request",
    "Merge remote-tracking branch",
    "Bump version",
    "Fix linting",
];

pub fn default_excludes() -> Vec<String> {
    DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub id: String,
    pub parents: Vec<String>,
    pub time: OffsetDateTime,
    pub message: String,
}

/// In-memory commit graph plus named references.
#[derive(Debug, Clone, Default)]
pub struct History {
    commits: HashMap<String, Commit>,
    refs: HashMap<String, String>,
    head: Option<String>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, commit: Commit) {
        self.commits.insert(commit.id.clone(), commit);
    }

    pub fn set_ref(&mut self, name: impl Into<String>, target: impl Into<String>) {
        self.refs.insert(name.into(), target.into());
    }

    pub fn set_head(&mut self, id: impl Into<String>) {
        self.head = Some(id.into());
    }

    pub fn len(&self) -> usize {
        self.commits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }

    pub fn commit(&self, id: &str) -> Option<&Commit> {
        self.commits.get(id)
    }

    pub fn tip(&self) -> Option<&str> {
        self.head.as_deref()
    }

    /// Resolve a ref name, `HEAD` or a commit id to a known commit.
    pub fn resolve(&self, reference: &str) -> Option<&str> {
        if reference == "HEAD" {
            return self.tip().filter(|id| self.commits.contains_key(*id));
        }
        let id = self.refs.get(reference).map(String::as_str).unwrap_or(reference);
        self.commits.get_key_value(id).map(|(k, _)| k.as_str())
    }

    /// Every commit reachable from `start`, `start` included.
    fn reachable(&self, start: &str) -> HashSet<String> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([start.to_string()]);
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id.clone()) {
                continue;
            }
            if let Some(c) = self.commits.get(&id) {
                queue.extend(c.parents.iter().cloned());
            }
        }
        seen
    }
}

impl Ancestry for History {
    fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Option<bool> {
        let a = self.resolve(ancestor)?;
        let d = self.resolve(descendant)?;
        Some(a != d && self.reachable(d).contains(a))
    }
}

/// Heap entry: newest commit pops first, id breaks ties.
#[derive(PartialEq, Eq)]
struct Ready<'a> {
    time: OffsetDateTime,
    id: &'a str,
}

impl Ord for Ready<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .cmp(&other.time)
            .then_with(|| other.id.cmp(self.id))
    }
}

impl PartialOrd for Ready<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn bound_commit<'h>(
    history: &'h History,
    range: &ReleaseRange,
    bound: &Bound,
) -> Result<Option<&'h str>> {
    let reference = match bound {
        Bound::Beginning => return Ok(None),
        Bound::Tip => "HEAD",
        Bound::Marker(m) => m.reference.as_str(),
    };
    match history.resolve(reference) {
        Some(id) => Ok(Some(id)),
        // An empty repository has no HEAD and nothing to walk.
        None if matches!(bound, Bound::Tip) && history.is_empty() => Ok(None),
        None => Err(ChangelogError::RangeResolution {
            release: range.release_name.clone(),
            reference: reference.to_string(),
        }),
    }
}

/// Commits in `(range.lower, range.upper]`, topologically ordered with
/// newer-first tie-break, excluding those whose message contains any of
/// `exclude`. Grouped by trimmed message.
pub fn classify(
    history: &History,
    range: &ReleaseRange,
    exclude: &[String],
) -> Result<Buckets<CommitChange>> {
    let upper = bound_commit(history, range, &range.upper)?;
    let lower = bound_commit(history, range, &range.lower)?;

    let mut buckets = Buckets::new();
    let Some(upper) = upper else {
        return Ok(buckets);
    };

    let hidden = lower.map(|l| history.reachable(l)).unwrap_or_default();
    let members: HashSet<&str> = history
        .reachable(upper)
        .iter()
        .filter(|id| !hidden.contains(*id))
        .filter_map(|id| history.commit(id).map(|c| c.id.as_str()))
        .collect();

    // Children count inside the walk; a commit is ready once all its
    // descendants in range have been emitted.
    let mut pending: HashMap<&str, usize> = members.iter().map(|id| (*id, 0)).collect();
    for id in &members {
        if let Some(c) = history.commit(id) {
            for p in &c.parents {
                if let Some(n) = pending.get_mut(p.as_str()) {
                    *n += 1;
                }
            }
        }
    }

    let mut heap: BinaryHeap<Ready<'_>> = pending
        .iter()
        .filter(|(_, n)| **n == 0)
        .filter_map(|(id, _)| history.commit(id))
        .map(|c| Ready { time: c.time, id: &c.id })
        .collect();

    let mut visited = 0usize;
    while let Some(Ready { id, .. }) = heap.pop() {
        let Some(commit) = history.commit(id) else { continue };
        visited += 1;

        if exclude.iter().any(|pat| commit.message.contains(pat.as_str())) {
            tracing::trace!(commit = %commit.id, "excluded by message pattern");
        } else {
            buckets.push(
                commit.message.trim(),
                CommitChange {
                    id: commit.id.clone(),
                    message: commit.message.trim().to_string(),
                    timestamp: commit.time,
                },
            );
        }

        for p in &commit.parents {
            if let Some(n) = pending.get_mut(p.as_str()) {
                *n -= 1;
                if *n == 0 {
                    if let Some(pc) = history.commit(p) {
                        heap.push(Ready { time: pc.time, id: &pc.id });
                    }
                }
            }
        }
    }

    tracing::debug!(
        release = %range.release_name,
        visited,
        kept = buckets.item_count(),
        "classified commits"
    );
    Ok(buckets)
}
