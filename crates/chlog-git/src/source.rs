use crate::repo::GitRepo;
use chlog_core::commits::{classify, default_excludes, History};
use chlog_core::range::{order_markers, ReleaseNaming};
use chlog_core::registry::Plugin;
use chlog_core::source::ChangelogSource;
use chlog_core::{AggregatedChangelog, ChangeItem, ReleaseBody, ReleaseRange, Result, VersionMarker};
use serde::Deserialize;
use std::path::PathBuf;

// ── Options ──

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GitOptions {
    pub path: PathBuf,
    /// Messages containing any of these substrings are dropped.
    pub exclude: Vec<String>,
    /// Regex with one capture group deriving the release name from a tag.
    pub release_pattern: Option<String>,
}

impl Default for GitOptions {
    fn default() -> Self {
        Self {
            path: PathBuf::from("."),
            exclude: default_excludes(),
            release_pattern: None,
        }
    }
}

// ── Source ──

pub struct GitSource {
    repo: GitRepo,
    exclude: Vec<String>,
    naming: ReleaseNaming,
    history: Option<History>,
}

impl GitSource {
    pub fn new(options: GitOptions) -> Result<Self> {
        Ok(Self {
            repo: GitRepo::open(&options.path)?,
            naming: ReleaseNaming::new(options.release_pattern.as_deref())?,
            exclude: options.exclude,
            history: None,
        })
    }

    fn history(&mut self) -> Result<&History> {
        let history = match self.history.take() {
            Some(h) => h,
            None => self.repo.load_history()?,
        };
        Ok(&*self.history.insert(history))
    }
}

impl ChangelogSource for GitSource {
    fn kind(&self) -> &str {
        "git"
    }

    fn versions(&mut self) -> Result<Vec<VersionMarker>> {
        let tags = self.repo.tags()?;
        let naming = self.naming.clone();
        let history = self.history()?;
        let markers: Vec<VersionMarker> = tags
            .into_iter()
            .filter_map(|tag| match history.commit(&tag.target) {
                Some(commit) => {
                    Some(VersionMarker::new(naming.name(&tag.name), commit.time, &commit.id))
                }
                None => {
                    tracing::debug!(
                        tag = %tag.name,
                        target = %tag.target,
                        "tag does not point at a commit"
                    );
                    None
                }
            })
            .collect();
        Ok(order_markers(markers, history))
    }

    fn changes_since(&mut self, range: &ReleaseRange) -> Result<AggregatedChangelog> {
        let exclude = self.exclude.clone();
        let history = self.history()?;
        let buckets = classify(history, range, &exclude)?;
        tracing::debug!(
            release = %range.release_name,
            changes = buckets.len(),
            commits = buckets.item_count(),
            "classified commits"
        );
        Ok(AggregatedChangelog::single(
            range.release_name.clone(),
            ReleaseBody::Messages(buckets.map_items(ChangeItem::Commit)),
        ))
    }
}

// ── Plugin ──

pub struct GitPlugin {
    version: String,
}

impl GitPlugin {
    pub const IDENTITY: &'static str = "GitChangelogSourceSpecification";

    /// Factory: fails when no usable `git` binary is on `PATH`.
    pub fn detect() -> anyhow::Result<Box<dyn Plugin<dyn ChangelogSource>>> {
        let version = GitRepo::detect()?;
        tracing::trace!(%version, "git available");
        Ok(Box::new(Self { version }))
    }
}

impl Plugin<dyn ChangelogSource> for GitPlugin {
    fn description(&self) -> &str {
        "Commits from a local git repository, released by tags"
    }

    fn create(&self, config: &serde_json::Value) -> anyhow::Result<Box<dyn ChangelogSource>> {
        let options: GitOptions = serde_json::from_value(config.clone())?;
        tracing::debug!(git = %self.version, path = %options.path.display(), "opening repository");
        let source = GitSource::new(options)?;
        Ok(Box::new(source))
    }
}
