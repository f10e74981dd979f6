//! Partition history into per-release ranges.
//!
//! Markers arrive ascending (oldest first); ranges come out newest first,
//! each spanning `(next older marker, marker]`.

use crate::error::{ChangelogError, Result};
use crate::model::{Bound, ReleaseRange, VersionMarker};
use regex::Regex;

pub const DEFAULT_UNRELEASED: &str = "Development";

/// Answers reachability questions about history references.
pub trait Ancestry {
    /// `Some(true)` if `ancestor` is reachable from `descendant`,
    /// `None` when the relation cannot be determined.
    fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Option<bool>;
}

/// For sources without a commit graph (issue trackers).
pub struct NoAncestry;

impl Ancestry for NoAncestry {
    fn is_ancestor(&self, _ancestor: &str, _descendant: &str) -> Option<bool> {
        None
    }
}

/// Sort markers ascending by timestamp. Equal timestamps are ordered so an
/// ancestor precedes its descendant; unrelated markers fall back to name order.
pub fn order_markers(
    mut markers: Vec<VersionMarker>,
    ancestry: &dyn Ancestry,
) -> Vec<VersionMarker> {
    markers.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.name.cmp(&b.name)));

    let mut out = Vec::with_capacity(markers.len());
    let mut rest = markers.into_iter().peekable();
    while let Some(first) = rest.next() {
        let mut group = vec![first];
        while rest
            .peek()
            .is_some_and(|m| m.timestamp == group[0].timestamp)
        {
            group.extend(rest.next());
        }
        out.extend(order_tied(group, ancestry));
    }
    out
}

fn order_tied(mut group: Vec<VersionMarker>, ancestry: &dyn Ancestry) -> Vec<VersionMarker> {
    let mut ordered = Vec::with_capacity(group.len());
    while !group.is_empty() {
        // First (by name) marker with no remaining ancestor in the group.
        let pick = (0..group.len())
            .find(|&i| {
                !group.iter().enumerate().any(|(j, other)| {
                    j != i
                        && other.reference != group[i].reference
                        && ancestry.is_ancestor(&other.reference, &group[i].reference) == Some(true)
                })
            })
            .unwrap_or(0);
        ordered.push(group.remove(pick));
    }
    ordered
}

/// Derives display names for releases from tag names.
#[derive(Debug, Clone, Default)]
pub struct ReleaseNaming {
    pattern: Option<Regex>,
}

impl ReleaseNaming {
    /// `pattern` must contain one capture group, e.g. `([0-9.]+)`.
    pub fn new(pattern: Option<&str>) -> Result<Self> {
        let pattern = pattern
            .map(|p| {
                let re = Regex::new(p).map_err(|e| {
                    ChangelogError::config(format!("invalid release pattern `{p}`: {e}"))
                })?;
                if re.captures_len() < 2 {
                    return Err(ChangelogError::config(format!(
                        "release pattern `{p}` needs a capture group"
                    )));
                }
                Ok(re)
            })
            .transpose()?;
        Ok(Self { pattern })
    }

    pub fn name(&self, tag: &str) -> String {
        self.pattern
            .as_ref()
            .and_then(|re| re.captures(tag))
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| tag.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct RangeResolver {
    unreleased_name: String,
}

impl Default for RangeResolver {
    fn default() -> Self {
        Self::new(DEFAULT_UNRELEASED)
    }
}

impl RangeResolver {
    pub fn new(unreleased_name: impl Into<String>) -> Self {
        Self {
            unreleased_name: unreleased_name.into(),
        }
    }

    pub fn unreleased_name(&self) -> &str {
        &self.unreleased_name
    }

    /// `markers` must already be ascending (see [`order_markers`]).
    pub fn resolve(
        &self,
        markers: &[VersionMarker],
        include_unreleased_tip: bool,
    ) -> Vec<ReleaseRange> {
        if markers.is_empty() {
            return vec![ReleaseRange {
                release_name: self.unreleased_name.clone(),
                lower: Bound::Beginning,
                upper: Bound::Tip,
            }];
        }

        let mut ranges = Vec::with_capacity(markers.len() + 1);
        if include_unreleased_tip {
            if let Some(newest) = markers.last() {
                ranges.push(ReleaseRange {
                    release_name: self.unreleased_name.clone(),
                    lower: Bound::Marker(newest.clone()),
                    upper: Bound::Tip,
                });
            }
        }

        let newest_first: Vec<&VersionMarker> = markers.iter().rev().collect();
        for (i, marker) in newest_first.iter().enumerate() {
            let lower = newest_first
                .get(i + 1)
                .map(|older| Bound::Marker((*older).clone()))
                .unwrap_or(Bound::Beginning);
            ranges.push(ReleaseRange {
                release_name: marker.name.clone(),
                lower,
                upper: Bound::Marker((*marker).clone()),
            });
        }
        ranges
    }
}

/// Pick the range of a single named release.
pub fn select(ranges: Vec<ReleaseRange>, name: &str) -> Result<ReleaseRange> {
    let known: Vec<String> = ranges.iter().map(|r| r.release_name.clone()).collect();
    ranges
        .into_iter()
        .find(|r| r.release_name == name)
        .ok_or_else(|| {
            ChangelogError::config(format!(
                "cannot find version {name} (known: {})",
                known.join(", ")
            ))
        })
}
