//! Assign closed tracker issues to releases and topics.

use crate::error::{ChangelogError, Result};
use crate::model::{naive, Buckets, IssueChange, ReleaseRange};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

pub const UNCATEGORIZED: &str = "Uncategorized";

/// Ordered label → topic mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelMap {
    entries: Vec<(String, String)>,
}

impl LabelMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `label` to `topic`. A label seen before keeps its position.
    pub fn insert(&mut self, label: impl Into<String>, topic: impl Into<String>) {
        let label = label.into();
        let topic = topic.into();
        match self.entries.iter_mut().find(|(l, _)| *l == label) {
            Some(entry) => entry.1 = topic,
            None => self.entries.push((label, topic)),
        }
    }

    pub fn topic(&self, label: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, t)| t.as_str())
    }

    /// Labels in map order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(l, _)| l.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Invert a `{"Topic": ["label", ...]}` document into label → topic.
    pub fn from_topic_json(json: &str) -> Result<Self> {
        let doc: serde_json::Map<String, serde_json::Value> = serde_json::from_str(json)
            .map_err(|e| ChangelogError::config(format!("label map must be a JSON object: {e}")))?;
        let mut map = Self::new();
        for (topic, labels) in doc {
            let labels: Vec<String> = serde_json::from_value(labels).map_err(|e| {
                ChangelogError::config(format!(
                    "labels for topic `{topic}` must be a string array: {e}"
                ))
            })?;
            for label in labels {
                map.insert(label, topic.clone());
            }
        }
        Ok(map)
    }
}

pub fn load_label_map_file(path: &Path) -> Result<LabelMap> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        ChangelogError::config(format!("cannot read label map {}: {e}", path.display()))
    })?;
    LabelMap::from_topic_json(&content)
}

pub fn load_ignore_labels_file(path: &Path) -> Result<HashSet<String>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        ChangelogError::config(format!("cannot read ignore labels {}: {e}", path.display()))
    })?;
    let labels: Vec<String> = serde_json::from_str(&content).map_err(|e| {
        ChangelogError::config(format!(
            "ignore labels {} must be a JSON array of strings: {e}",
            path.display()
        ))
    })?;
    Ok(labels.into_iter().collect())
}

/// Classification policy, bound once per source.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IssuePolicy {
    #[serde(skip)]
    pub label_map: Option<LabelMap>,
    #[serde(skip)]
    pub ignore_labels: HashSet<String>,
    pub filter_pull_requests: bool,
    pub topics_from_labels: bool,
    pub filter_unlabeled: bool,
    #[serde(rename = "unlabeled_label")]
    pub unlabeled_topic: String,
    #[serde(rename = "split_issues_between_topics")]
    pub split_across_topics: bool,
}

impl Default for IssuePolicy {
    fn default() -> Self {
        Self {
            label_map: None,
            ignore_labels: HashSet::new(),
            filter_pull_requests: true,
            topics_from_labels: true,
            filter_unlabeled: true,
            unlabeled_topic: UNCATEGORIZED.to_string(),
            split_across_topics: false,
        }
    }
}

/// Closed within `(lower, upper]`, compared on naive date-times, and not a
/// filtered pull request.
pub fn is_eligible(issue: &IssueChange, range: &ReleaseRange, filter_pull_requests: bool) -> bool {
    if filter_pull_requests && issue.is_pull_request {
        return false;
    }
    let Some(closed) = issue.closed_at.map(naive) else {
        return false;
    };
    let after_lower = range.lower.naive_time().map_or(true, |lower| closed > lower);
    let before_upper = range.upper.naive_time().map_or(true, |upper| closed <= upper);
    after_lower && before_upper
}

/// Topics for one eligible issue, in insertion order.
fn topics_for<'a>(issue: &'a IssueChange, policy: &'a IssuePolicy) -> Vec<&'a str> {
    let ignored = |label: &str| policy.ignore_labels.contains(label);

    if issue.labels.is_empty() {
        return if policy.filter_unlabeled {
            Vec::new()
        } else {
            vec![policy.unlabeled_topic.as_str()]
        };
    }

    // An empty map behaves like no map at all.
    let map = policy.label_map.as_ref().filter(|m| !m.is_empty());
    match (map, policy.split_across_topics) {
        (None, true) => issue
            .labels
            .iter()
            .map(String::as_str)
            .filter(|l| !ignored(*l))
            .collect(),
        (None, false) => {
            let first = issue.labels[0].as_str();
            if ignored(first) {
                Vec::new()
            } else {
                vec![first]
            }
        }
        (Some(map), true) => issue
            .labels
            .iter()
            .filter(|l| !ignored(l.as_str()))
            .filter_map(|l| map.topic(l))
            .collect(),
        (Some(map), false) => {
            // Any ignored label drops the issue outright in non-split mode.
            if issue.labels.iter().any(|l| ignored(l.as_str())) {
                return Vec::new();
            }
            map.labels()
                .find(|label| issue.labels.iter().any(|l| l == label))
                .and_then(|label| map.topic(label))
                .into_iter()
                .collect()
        }
    }
}

/// Bucket the issues closed within `range` by topic.
pub fn classify(
    issues: &[IssueChange],
    range: &ReleaseRange,
    policy: &IssuePolicy,
) -> Buckets<IssueChange> {
    let mut buckets = Buckets::new();
    for issue in issues
        .iter()
        .filter(|i| is_eligible(i, range, policy.filter_pull_requests))
    {
        for topic in topics_for(issue, policy) {
            buckets.push(topic, issue.clone());
        }
    }
    tracing::debug!(
        release = %range.release_name,
        topics = buckets.len(),
        issues = buckets.item_count(),
        "classified issues"
    );
    buckets
}

/// Eligible issues without topic assignment.
pub fn classify_flat(
    issues: &[IssueChange],
    range: &ReleaseRange,
    policy: &IssuePolicy,
) -> Vec<IssueChange> {
    issues
        .iter()
        .filter(|i| is_eligible(i, range, policy.filter_pull_requests))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Bound, VersionMarker};
    use time::macros::datetime;
    use time::OffsetDateTime;

    fn issue(number: u64, labels: &[&str], closed_at: Option<OffsetDateTime>) -> IssueChange {
        IssueChange {
            number,
            title: format!("Issue {number}"),
            closed_at,
            labels: labels.iter().map(|s| s.to_string()).collect(),
            is_pull_request: false,
            url: format!("https://github.com/o/r/issues/{number}"),
        }
    }

    fn range() -> ReleaseRange {
        ReleaseRange {
            release_name: "v2".into(),
            lower: Bound::Marker(VersionMarker::new("v1", datetime!(2021-01-01 00:00 UTC), "a")),
            upper: Bound::Marker(VersionMarker::new("v2", datetime!(2021-02-01 00:00 UTC), "b")),
        }
    }

    fn inside() -> Option<OffsetDateTime> {
        Some(datetime!(2021-01-15 12:00 UTC))
    }

    fn fixes_and_features() -> LabelMap {
        LabelMap::from_topic_json(r#"{"Fixes": ["bug"], "Features": ["enhancement"]}"#).unwrap()
    }

    fn policy() -> IssuePolicy {
        IssuePolicy::default()
    }

    #[test]
    fn boundary_lower_exclusive_upper_inclusive() {
        let r = range();
        let at_lower = issue(1, &[], Some(datetime!(2021-01-01 00:00 UTC)));
        let at_upper = issue(2, &[], Some(datetime!(2021-02-01 00:00 UTC)));
        assert!(!is_eligible(&at_lower, &r, true));
        assert!(is_eligible(&at_upper, &r, true));
    }

    #[test]
    fn comparison_ignores_offsets() {
        // 2021-02-01 00:30 +02:00 is before the bound in UTC but after it on the wall clock.
        let wall = issue(1, &[], Some(datetime!(2021-02-01 00:30 +2)));
        assert!(!is_eligible(&wall, &range(), true));
    }

    #[test]
    fn open_issues_and_pull_requests_are_ineligible() {
        let r = range();
        assert!(!is_eligible(&issue(1, &[], None), &r, true));
        let mut pr = issue(2, &[], inside());
        pr.is_pull_request = true;
        assert!(!is_eligible(&pr, &r, true));
        assert!(is_eligible(&pr, &r, false));
    }

    #[test]
    fn open_ended_range_accepts_everything_closed() {
        let r = ReleaseRange {
            release_name: "Development".into(),
            lower: Bound::Beginning,
            upper: Bound::Tip,
        };
        assert!(is_eligible(&issue(1, &[], inside()), &r, true));
    }

    #[test]
    fn unlabeled_issues_follow_filter_flag() {
        let issues = vec![issue(1, &[], inside())];
        assert!(classify(&issues, &range(), &policy()).is_empty());

        let keep = IssuePolicy {
            filter_unlabeled: false,
            unlabeled_topic: "Misc".into(),
            ..policy()
        };
        let out = classify(&issues, &range(), &keep);
        assert_eq!(out.keys().collect::<Vec<_>>(), vec!["Misc"]);
    }

    #[test]
    fn first_label_without_map() {
        let issues = vec![issue(1, &["bug", "ui"], inside())];
        let out = classify(&issues, &range(), &policy());
        assert_eq!(out.keys().collect::<Vec<_>>(), vec!["bug"]);
    }

    #[test]
    fn split_without_map_skips_ignored() {
        let p = IssuePolicy {
            split_across_topics: true,
            ignore_labels: ["wontfix".to_string()].into(),
            ..policy()
        };
        let issues = vec![issue(1, &["bug", "wontfix", "ui"], inside())];
        let out = classify(&issues, &range(), &p);
        assert_eq!(out.keys().collect::<Vec<_>>(), vec!["bug", "ui"]);
    }

    #[test]
    fn label_map_first_key_wins_without_split() {
        let map = fixes_and_features();
        let p = IssuePolicy {
            label_map: Some(map),
            ..policy()
        };
        let issues = vec![issue(1, &["enhancement", "bug"], inside())];
        let out = classify(&issues, &range(), &p);
        assert_eq!(out.keys().collect::<Vec<_>>(), vec!["Fixes"]);
        assert_eq!(out.item_count(), 1);
    }

    #[test]
    fn label_map_split_lands_in_every_topic() {
        let map = fixes_and_features();
        let p = IssuePolicy {
            label_map: Some(map),
            split_across_topics: true,
            ..policy()
        };
        let issues = vec![issue(1, &["enhancement", "bug", "unmapped"], inside())];
        let out = classify(&issues, &range(), &p);
        assert_eq!(out.keys().collect::<Vec<_>>(), vec!["Features", "Fixes"]);
    }

    #[test]
    fn empty_label_map_falls_back_to_labels() {
        let issues = vec![issue(1, &["bug", "ui"], inside())];
        for split in [false, true] {
            let p = IssuePolicy {
                label_map: Some(LabelMap::from_topic_json("{}").unwrap()),
                split_across_topics: split,
                ..policy()
            };
            let out = classify(&issues, &range(), &p);
            let expected = if split { vec!["bug", "ui"] } else { vec!["bug"] };
            assert_eq!(out.keys().collect::<Vec<_>>(), expected);
        }
    }

    #[test]
    fn ignored_label_asymmetry_between_modes() {
        let map =
            LabelMap::from_topic_json(r#"{"Fixes": ["bug"], "Internal": ["chore"]}"#).unwrap();
        let base = IssuePolicy {
            label_map: Some(map),
            ignore_labels: ["chore".to_string()].into(),
            ..policy()
        };
        let issues = vec![issue(1, &["bug", "chore"], inside())];

        // Non-split: any ignored label drops the issue.
        assert!(classify(&issues, &range(), &base).is_empty());

        // Split: only the ignored label's topic is skipped.
        let split = IssuePolicy {
            split_across_topics: true,
            ..base
        };
        let out = classify(&issues, &range(), &split);
        assert_eq!(out.keys().collect::<Vec<_>>(), vec!["Fixes"]);
    }

    #[test]
    fn all_labels_ignored_is_empty_in_both_modes() {
        let ignore: HashSet<String> = ["A".to_string(), "B".to_string()].into();
        let issues = vec![issue(1, &["A", "B"], inside())];
        for split in [false, true] {
            let p = IssuePolicy {
                ignore_labels: ignore.clone(),
                split_across_topics: split,
                ..policy()
            };
            assert!(classify(&issues, &range(), &p).is_empty(), "split={split}");

            let mapped = IssuePolicy {
                label_map: Some(LabelMap::from_topic_json(r#"{"T": ["A", "B"]}"#).unwrap()),
                ..p
            };
            assert!(classify(&issues, &range(), &mapped).is_empty(), "split={split}");
        }
    }

    #[test]
    fn bucket_order_is_enumeration_order() {
        let issues = vec![
            issue(3, &["bug"], inside()),
            issue(1, &["bug"], inside()),
            issue(2, &["bug"], inside()),
        ];
        let out = classify(&issues, &range(), &policy());
        let numbers: Vec<_> = out.get("bug").unwrap().iter().map(|i| i.number).collect();
        assert_eq!(numbers, vec![3, 1, 2]);
    }

    #[test]
    fn flat_mode_keeps_eligible_only() {
        let issues = vec![issue(1, &["bug"], inside()), issue(2, &["bug"], None)];
        let flat = classify_flat(&issues, &range(), &policy());
        assert_eq!(flat.len(), 1);
        assert_eq!(flat[0].number, 1);
    }

    #[test]
    fn label_map_json_is_inverted_in_file_order() {
        let map = LabelMap::from_topic_json(
            r#"{"Zeta": ["z1", "z2"], "Alpha": ["a1"], "Again": ["z1"]}"#,
        )
        .unwrap();
        assert_eq!(map.labels().collect::<Vec<_>>(), vec!["z1", "z2", "a1"]);
        assert_eq!(map.topic("z1"), Some("Again"));
    }

    #[test]
    fn malformed_files_are_configuration_errors() {
        let dir = tempfile::tempdir().unwrap();
        let bad_map = dir.path().join("map.json");
        std::fs::write(&bad_map, r#"["not", "an", "object"]"#).unwrap();
        assert!(matches!(
            load_label_map_file(&bad_map),
            Err(ChangelogError::Configuration(_))
        ));

        let bad_ignore = dir.path().join("ignore.json");
        std::fs::write(&bad_ignore, r#"{"a": 1}"#).unwrap();
        assert!(matches!(
            load_ignore_labels_file(&bad_ignore),
            Err(ChangelogError::Configuration(_))
        ));

        let good_ignore = dir.path().join("ok.json");
        std::fs::write(&good_ignore, r#"["wontfix", "duplicate"]"#).unwrap();
        assert!(load_ignore_labels_file(&good_ignore).unwrap().contains("wontfix"));
    }
}
