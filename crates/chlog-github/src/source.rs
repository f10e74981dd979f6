use crate::client::{GithubClient, RawIssue};
use crate::transport::{Transport, UreqTransport};
use chlog_core::issues::{
    classify, classify_flat, load_ignore_labels_file, load_label_map_file, IssuePolicy,
};
use chlog_core::range::{order_markers, NoAncestry, ReleaseNaming};
use chlog_core::registry::Plugin;
use chlog_core::source::ChangelogSource;
use chlog_core::{
    AggregatedChangelog, ChangeItem, ChangelogError, IssueChange, ReleaseBody, ReleaseRange,
    Result, VersionMarker,
};
use chlog_store::{DiskCache, IssueCache, LockGuard, MemoryCache};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://api.github.com";

const CLOSED_TTL: Duration = Duration::from_secs(24 * 3600);
const OPEN_TTL: Duration = Duration::from_secs(3600);
const INDEX_KEY: &str = "index";

// ── Options ──

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GithubOptions {
    /// `owner/name`.
    pub repo: String,
    /// Falls back to `GITHUB_TOKEN`.
    pub token: Option<String>,
    pub api_url: String,
    pub release_pattern: Option<String>,
    /// JSON array of labels to ignore.
    pub ignore_labels_file: Option<PathBuf>,
    /// JSON object `topic → [labels]`.
    pub label_map_file: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    /// Keep the issue cache in memory for this run only.
    pub no_cache: bool,
    #[serde(flatten)]
    pub policy: IssuePolicy,
}

impl Default for GithubOptions {
    fn default() -> Self {
        Self {
            repo: String::new(),
            token: None,
            api_url: DEFAULT_API_URL.to_string(),
            release_pattern: None,
            ignore_labels_file: None,
            label_map_file: None,
            cache_dir: None,
            no_cache: false,
            policy: IssuePolicy::default(),
        }
    }
}

impl GithubOptions {
    fn validate(&self) -> Result<()> {
        let mut parts = self.repo.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty() => Ok(()),
            _ => Err(ChangelogError::config(format!(
                "github repo must be `owner/name`, got `{}`",
                self.repo
            ))),
        }
    }

    /// Policy with the label files loaded.
    fn resolved_policy(&self) -> Result<IssuePolicy> {
        let mut policy = self.policy.clone();
        if let Some(path) = &self.label_map_file {
            policy.label_map = Some(load_label_map_file(path)?);
        }
        if let Some(path) = &self.ignore_labels_file {
            policy.ignore_labels = load_ignore_labels_file(path)?;
        }
        Ok(policy)
    }
}

// ── Source ──

pub struct GithubSource {
    client: GithubClient,
    cache: Box<dyn IssueCache>,
    policy: IssuePolicy,
    naming: ReleaseNaming,
    issues: Option<Vec<IssueChange>>,
    _lock: Option<LockGuard>,
}

impl GithubSource {
    /// Network transport and on-disk cache (unless `no_cache`). Options and
    /// label files are checked before the cache directory is touched.
    pub fn new(options: GithubOptions) -> Result<Self> {
        let (policy, naming) = Self::prepare(&options)?;
        let token = options
            .token
            .clone()
            .or_else(|| std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty()));
        if token.is_none() {
            tracing::warn!("no GitHub token set; requests are subject to anonymous rate limits");
        }
        let transport = Box::new(UreqTransport::new(token));

        if options.no_cache {
            let cache = Box::new(MemoryCache::new());
            return Ok(Self::assemble(&options, policy, naming, transport, cache, None));
        }
        let dir = options
            .cache_dir
            .clone()
            .unwrap_or_else(|| chlog_store::cache_dir("github", &options.repo));
        let cache = DiskCache::new(dir);
        let lock = cache.lock().map_err(|e| {
            ChangelogError::config(format!("cannot lock cache {}: {e}", cache.dir().display()))
        })?;
        tracing::debug!(dir = %cache.dir().display(), "using issue cache");
        Ok(Self::assemble(&options, policy, naming, transport, Box::new(cache), Some(lock)))
    }

    pub fn with_parts(
        options: GithubOptions,
        transport: Box<dyn Transport>,
        cache: Box<dyn IssueCache>,
        lock: Option<LockGuard>,
    ) -> Result<Self> {
        let (policy, naming) = Self::prepare(&options)?;
        Ok(Self::assemble(&options, policy, naming, transport, cache, lock))
    }

    fn prepare(options: &GithubOptions) -> Result<(IssuePolicy, ReleaseNaming)> {
        options.validate()?;
        let policy = options.resolved_policy()?;
        let naming = ReleaseNaming::new(options.release_pattern.as_deref())?;
        Ok((policy, naming))
    }

    fn assemble(
        options: &GithubOptions,
        policy: IssuePolicy,
        naming: ReleaseNaming,
        transport: Box<dyn Transport>,
        cache: Box<dyn IssueCache>,
        lock: Option<LockGuard>,
    ) -> Self {
        Self {
            client: GithubClient::new(transport, &options.api_url, &options.repo),
            cache,
            policy,
            naming,
            issues: None,
            _lock: lock,
        }
    }

    fn remember(&self, issue: &RawIssue) {
        let ttl = if issue.is_closed() { CLOSED_TTL } else { OPEN_TTL };
        let stored = serde_json::to_value(issue)
            .map_err(anyhow::Error::from)
            .and_then(|v| self.cache.set(&format!("issue:{}", issue.number), &v, ttl));
        if let Err(e) = stored {
            tracing::warn!(issue = issue.number, error = %e, "cannot cache issue");
        }
    }

    fn cached(&self, number: u64) -> Option<RawIssue> {
        let value = self.cache.get(&format!("issue:{number}"))?;
        serde_json::from_value(value).ok()
    }

    fn fetch_listing(&self) -> Result<Vec<RawIssue>> {
        let raw = self.client.issues().map_err(|e| ChangelogError::UpstreamFetch {
            item: format!("issue listing of {}", self.client.base()),
            reason: e.to_string(),
        })?;
        for issue in &raw {
            self.remember(issue);
        }
        let numbers: Vec<u64> = raw.iter().map(|i| i.number).collect();
        if let Err(e) = self.cache.set(INDEX_KEY, &serde_json::json!(numbers), OPEN_TTL) {
            tracing::warn!(error = %e, "cannot cache issue index");
        }
        tracing::info!(issues = raw.len(), "fetched issue listing");
        Ok(raw)
    }

    /// Issues behind a valid index; stale entries are refetched one by one.
    fn from_index(&self, numbers: &[u64]) -> Vec<RawIssue> {
        let mut refetched = 0usize;
        let issues: Vec<RawIssue> = numbers
            .iter()
            .filter_map(|&n| {
                if let Some(issue) = self.cached(n) {
                    return Some(issue);
                }
                refetched += 1;
                match self.client.issue(n) {
                    Ok(issue) => {
                        self.remember(&issue);
                        Some(issue)
                    }
                    Err(e) => {
                        let err = ChangelogError::UpstreamFetch {
                            item: format!("issue #{n}"),
                            reason: e.to_string(),
                        };
                        tracing::warn!(error = %err, "skipping issue");
                        None
                    }
                }
            })
            .collect();
        tracing::debug!(issues = issues.len(), refetched, "issues from cache index");
        issues
    }

    fn issues(&mut self) -> Result<&[IssueChange]> {
        let issues = match self.issues.take() {
            Some(issues) => issues,
            None => {
                let index = self
                    .cache
                    .get(INDEX_KEY)
                    .and_then(|v| serde_json::from_value::<Vec<u64>>(v).ok());
                let raw = match index {
                    Some(numbers) => self.from_index(&numbers),
                    None => self.fetch_listing()?,
                };
                raw.into_iter().map(RawIssue::into_change).collect()
            }
        };
        Ok(self.issues.insert(issues).as_slice())
    }
}

impl ChangelogSource for GithubSource {
    fn kind(&self) -> &str {
        "github"
    }

    /// Tags with their commit dates. Issues are loaded here too, so a failed
    /// listing stops the run before anything is rendered.
    fn versions(&mut self) -> Result<Vec<VersionMarker>> {
        let tags = self.client.tags().map_err(|e| ChangelogError::UpstreamFetch {
            item: format!("tags of {}", self.client.base()),
            reason: e.to_string(),
        })?;
        let mut markers = Vec::with_capacity(tags.len());
        for tag in tags {
            match self.client.commit_date(&tag.commit.sha) {
                Ok(when) => {
                    let name = self.naming.name(&tag.name);
                    markers.push(VersionMarker::new(name, when, tag.commit.sha));
                }
                Err(e) => {
                    let err = ChangelogError::UpstreamFetch {
                        item: format!("commit of tag {}", tag.name),
                        reason: e.to_string(),
                    };
                    tracing::warn!(error = %err, "skipping tag");
                }
            }
        }
        self.issues()?;
        Ok(order_markers(markers, &NoAncestry))
    }

    fn changes_since(&mut self, range: &ReleaseRange) -> Result<AggregatedChangelog> {
        let policy = self.policy.clone();
        let issues = self.issues()?;
        let body = if policy.topics_from_labels {
            ReleaseBody::Topics(classify(issues, range, &policy).map_items(ChangeItem::Issue))
        } else {
            ReleaseBody::Flat(
                classify_flat(issues, range, &policy)
                    .into_iter()
                    .map(ChangeItem::Issue)
                    .collect(),
            )
        };
        Ok(AggregatedChangelog::single(range.release_name.clone(), body))
    }
}

// ── Plugin ──

pub struct GithubPlugin;

impl GithubPlugin {
    pub const IDENTITY: &'static str = "GithubChangelogSourceSpecification";

    pub fn factory() -> anyhow::Result<Box<dyn Plugin<dyn ChangelogSource>>> {
        Ok(Box::new(Self))
    }
}

impl Plugin<dyn ChangelogSource> for GithubPlugin {
    fn description(&self) -> &str {
        "Closed issues of a GitHub repository, released by tags"
    }

    fn create(&self, config: &serde_json::Value) -> anyhow::Result<Box<dyn ChangelogSource>> {
        let options: GithubOptions = serde_json::from_value(config.clone())?;
        Ok(Box::new(GithubSource::new(options)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Page;
    use chlog_core::model::Bound;
    use chlog_core::range::RangeResolver;
    use serde_json::{json, Value};
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::rc::Rc;
    use std::sync::Arc;

    const BASE: &str = "https://api.test/repos/acme/widgets";

    /// Serves canned pages and records every URL requested.
    #[derive(Clone, Default)]
    struct Fake {
        pages: Rc<RefCell<HashMap<String, Page>>>,
        calls: Rc<RefCell<Vec<String>>>,
    }

    impl Fake {
        fn serve(&self, path: &str, body: Value) {
            self.pages.borrow_mut().insert(
                format!("{BASE}{path}"),
                Page { body, next: None },
            );
        }

        fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }
    }

    impl Transport for Fake {
        fn get(&self, url: &str) -> anyhow::Result<Page> {
            self.calls.borrow_mut().push(url.to_string());
            self.pages
                .borrow()
                .get(url)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("http status: 404 for {url}"))
        }
    }

    /// Cache shared between source instances of one test.
    #[derive(Clone, Default)]
    struct Shared(Arc<MemoryCache>);

    impl IssueCache for Shared {
        fn get(&self, key: &str) -> Option<Value> {
            self.0.get(key)
        }
        fn set(&self, key: &str, value: &Value, ttl: Duration) -> anyhow::Result<()> {
            self.0.set(key, value, ttl)
        }
    }

    fn options(extra: Value) -> GithubOptions {
        let mut base = json!({"repo": "acme/widgets", "api_url": "https://api.test"});
        if let (Some(b), Some(e)) = (base.as_object_mut(), extra.as_object()) {
            b.extend(e.clone());
        }
        serde_json::from_value(base).unwrap()
    }

    fn issue(number: u64, state: &str, closed_at: Option<&str>, labels: &[&str]) -> Value {
        json!({
            "number": number,
            "title": format!("Issue {number}"),
            "state": state,
            "closed_at": closed_at,
            "labels": labels.iter().map(|l| json!({"name": l})).collect::<Vec<_>>(),
            "html_url": format!("https://github.com/acme/widgets/issues/{number}"),
        })
    }

    fn commit_at(date: &str) -> Value {
        json!({"commit": {"committer": {"date": date}}})
    }

    fn cached_source(fake: &Fake, cache: &Shared) -> GithubSource {
        GithubSource::with_parts(
            options(json!({})),
            Box::new(fake.clone()),
            Box::new(cache.clone()),
            None,
        )
        .unwrap()
    }

    fn fixture() -> Fake {
        let fake = Fake::default();
        fake.serve(
            "/tags?per_page=100",
            json!([
                {"name": "v2.0", "commit": {"sha": "bbb"}},
                {"name": "v1.0", "commit": {"sha": "aaa"}},
                {"name": "broken", "commit": {"sha": "zzz"}},
            ]),
        );
        fake.serve("/commits/aaa", commit_at("2024-01-10T00:00:00Z"));
        fake.serve("/commits/bbb", commit_at("2024-02-10T00:00:00Z"));
        fake.serve(
            "/issues?state=all&per_page=100",
            json!([
                issue(1, "closed", Some("2024-01-05T12:00:00Z"), &["bug"]),
                issue(2, "closed", Some("2024-01-20T12:00:00Z"), &["enhancement"]),
                issue(3, "closed", Some("2024-02-01T12:00:00Z"), &[]),
                issue(4, "open", None, &["bug"]),
                {
                    "number": 5,
                    "title": "Merge feature",
                    "state": "closed",
                    "closed_at": "2024-01-21T00:00:00Z",
                    "labels": [],
                    "html_url": "https://github.com/acme/widgets/pull/5",
                    "pull_request": {"html_url": "https://github.com/acme/widgets/pull/5"}
                },
            ]),
        );
        fake
    }

    fn topics(agg: &AggregatedChangelog) -> Vec<(String, Vec<u64>)> {
        match &agg.releases[0].1 {
            ReleaseBody::Topics(b) => b
                .iter()
                .map(|(k, items)| {
                    let numbers = items
                        .iter()
                        .map(|i| match i {
                            ChangeItem::Issue(i) => i.number,
                            ChangeItem::Commit(_) => 0,
                        })
                        .collect();
                    (k.to_string(), numbers)
                })
                .collect(),
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn releases_from_tags_and_issue_topics() {
        let fake = fixture();
        let mut source = GithubSource::with_parts(
            options(json!({"filter_unlabeled": false})),
            Box::new(fake.clone()),
            Box::new(MemoryCache::new()),
            None,
        )
        .unwrap();

        let markers = source.versions().unwrap();
        let names: Vec<&str> = markers.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["v1.0", "v2.0"]);
        assert_eq!(markers[0].reference, "aaa");

        let ranges = RangeResolver::default().resolve(&markers, false);
        assert_eq!(ranges[0].release_name, "v2.0");
        assert!(matches!(ranges[1].lower, Bound::Beginning));

        let v2 = source.changes_since(&ranges[0]).unwrap();
        assert_eq!(
            topics(&v2),
            vec![("enhancement".to_string(), vec![2]), ("Uncategorized".to_string(), vec![3])]
        );
        let v1 = source.changes_since(&ranges[1]).unwrap();
        assert_eq!(topics(&v1), vec![("bug".to_string(), vec![1])]);

        // One listing, no per-issue probing.
        let listings = fake.calls().iter().filter(|u| u.contains("/issues")).count();
        assert_eq!(listings, 1);
    }

    #[test]
    fn warm_cache_skips_the_network() {
        let fake = fixture();
        let cache = Shared::default();
        cached_source(&fake, &cache).issues().unwrap();
        let before = fake.calls().len();

        let mut second = cached_source(&fake, &cache);
        assert_eq!(second.issues().unwrap().len(), 5);
        assert_eq!(fake.calls().len(), before);
    }

    #[test]
    fn missing_cache_entries_are_refetched_individually() {
        let fake = fixture();
        fake.serve("/issues/2", issue(2, "closed", Some("2024-01-20T12:00:00Z"), &["enhancement"]));
        let cache = Shared::default();
        cache.set(INDEX_KEY, &json!([1, 2, 9]), OPEN_TTL).unwrap();
        cache
            .set("issue:1", &issue(1, "closed", Some("2024-01-05T12:00:00Z"), &["bug"]), CLOSED_TTL)
            .unwrap();

        let mut source = cached_source(&fake, &cache);
        let numbers: Vec<u64> = source.issues().unwrap().iter().map(|i| i.number).collect();
        assert_eq!(numbers, vec![1, 2]);
        assert_eq!(
            fake.calls(),
            vec![format!("{BASE}/issues/2"), format!("{BASE}/issues/9")]
        );
        assert!(cache.get("issue:2").is_some());
    }

    #[test]
    fn flat_mode_without_topics() {
        let fake = fixture();
        let mut source = GithubSource::with_parts(
            options(json!({"topics_from_labels": false})),
            Box::new(fake),
            Box::new(MemoryCache::new()),
            None,
        )
        .unwrap();
        let markers = source.versions().unwrap();
        let ranges = RangeResolver::default().resolve(&markers, false);
        let v1 = source.changes_since(&ranges[1]).unwrap();
        match &v1.releases[0].1 {
            ReleaseBody::Flat(items) => assert_eq!(items.len(), 1),
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn label_files_are_loaded() {
        let tmp = tempfile::tempdir().unwrap();
        let map = tmp.path().join("labels.json");
        std::fs::write(&map, r#"{"Fixes": ["bug"], "Features": ["enhancement"]}"#).unwrap();
        let ignore = tmp.path().join("ignore.json");
        std::fs::write(&ignore, r#"["wontfix"]"#).unwrap();

        let source = GithubSource::with_parts(
            options(json!({"label_map_file": map, "ignore_labels_file": ignore})),
            Box::new(Fake::default()),
            Box::new(MemoryCache::new()),
            None,
        )
        .unwrap();
        assert_eq!(
            source.policy.label_map.as_ref().and_then(|m| m.topic("bug")),
            Some("Fixes")
        );
        assert!(source.policy.ignore_labels.contains("wontfix"));
    }

    #[test]
    fn bad_repo_and_listing_failure() {
        let err = GithubSource::with_parts(
            options(json!({"repo": "widgets"})),
            Box::new(Fake::default()),
            Box::new(MemoryCache::new()),
            None,
        )
        .err()
        .unwrap();
        assert!(matches!(err, ChangelogError::Configuration(_)));

        let fake = Fake::default();
        fake.serve("/tags?per_page=100", json!([]));
        let mut source = GithubSource::with_parts(
            options(json!({})),
            Box::new(fake),
            Box::new(MemoryCache::new()),
            None,
        )
        .unwrap();
        let err = source.versions().unwrap_err();
        assert!(matches!(err, ChangelogError::UpstreamFetch { .. }));
    }

    #[test]
    fn bad_label_map_leaves_cache_untouched() {
        let tmp = tempfile::tempdir().unwrap();
        let label_map = tmp.path().join("labels.json");
        std::fs::write(&label_map, "[\"not\", \"an\", \"object\"]").unwrap();
        let cache_dir = tmp.path().join("cache");

        let err = GithubSource::new(options(json!({
            "cache_dir": cache_dir,
            "label_map_file": label_map,
        })))
        .err()
        .unwrap();
        assert!(matches!(err, ChangelogError::Configuration(_)));
        assert!(!cache_dir.exists());
    }

    #[test]
    fn options_defaults() {
        let o: GithubOptions = serde_json::from_value(json!({"repo": "a/b"})).unwrap();
        assert_eq!(o.api_url, DEFAULT_API_URL);
        assert!(o.policy.filter_pull_requests);
        assert!(o.policy.topics_from_labels);
        assert_eq!(o.policy.unlabeled_topic, "Uncategorized");
        assert!(!o.policy.split_across_topics);

        let o: GithubOptions = serde_json::from_value(json!({
            "repo": "a/b",
            "split_issues_between_topics": true,
            "unlabeled_label": "Other",
        }))
        .unwrap();
        assert!(o.policy.split_across_topics);
        assert_eq!(o.policy.unlabeled_topic, "Other");
    }
}
