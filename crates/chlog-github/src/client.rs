use crate::transport::Transport;
use chlog_core::IssueChange;
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

const PER_PAGE: u32 = 100;

// ── Wire types ──

#[derive(Debug, Clone, Deserialize)]
pub struct RawTag {
    pub name: String,
    pub commit: RawTagCommit,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawTagCommit {
    pub sha: String,
}

/// Subset of the issue payload we keep; also the cached form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawIssue {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub state: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub closed_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub labels: Vec<RawLabel>,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub pull_request: Option<RawPullRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLabel {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPullRef {
    #[serde(default)]
    pub html_url: Option<String>,
}

impl RawIssue {
    pub fn is_closed(&self) -> bool {
        self.state == "closed"
    }

    /// The issues endpoint also returns pull requests; they link to themselves.
    pub fn is_pull_request(&self) -> bool {
        self.pull_request
            .as_ref()
            .and_then(|pr| pr.html_url.as_deref())
            .is_some_and(|url| url == self.html_url)
    }

    pub fn into_change(self) -> IssueChange {
        let is_pull_request = self.is_pull_request();
        IssueChange {
            number: self.number,
            title: self.title,
            closed_at: self.closed_at,
            labels: self.labels.into_iter().map(|l| l.name).collect(),
            is_pull_request,
            url: self.html_url,
        }
    }
}

// ── Client ──

/// Thin REST client scoped to one `owner/name` repository.
pub struct GithubClient {
    transport: Box<dyn Transport>,
    base: String,
}

impl GithubClient {
    pub fn new(transport: Box<dyn Transport>, api_url: &str, repo: &str) -> Self {
        Self {
            transport,
            base: format!("{}/repos/{repo}", api_url.trim_end_matches('/')),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Follow `Link: rel="next"` until the listing is exhausted.
    fn paginate(&self, first: String) -> anyhow::Result<Vec<serde_json::Value>> {
        let mut out = Vec::new();
        let mut url = Some(first);
        let mut pages = 0usize;
        while let Some(current) = url.take() {
            let page = self.transport.get(&current)?;
            pages += 1;
            match page.body {
                serde_json::Value::Array(items) => out.extend(items),
                other => anyhow::bail!("expected a JSON array from {current}, got {other}"),
            }
            url = page.next;
        }
        tracing::debug!(pages, items = out.len(), "paginated listing");
        Ok(out)
    }

    pub fn tags(&self) -> anyhow::Result<Vec<RawTag>> {
        let tags = self
            .paginate(format!("{}/tags?per_page={PER_PAGE}", self.base))?
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<RawTag>, _>>()?;
        Ok(tags)
    }

    /// Committer date of `sha`.
    pub fn commit_date(&self, sha: &str) -> anyhow::Result<OffsetDateTime> {
        let page = self.transport.get(&format!("{}/commits/{sha}", self.base))?;
        let raw = page.body["commit"]["committer"]["date"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("commit {sha} has no committer date"))?;
        Ok(OffsetDateTime::parse(raw, &Rfc3339)?)
    }

    /// Every issue and pull request, any state.
    pub fn issues(&self) -> anyhow::Result<Vec<RawIssue>> {
        let issues = self
            .paginate(format!("{}/issues?state=all&per_page={PER_PAGE}", self.base))?
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<RawIssue>, _>>()?;
        Ok(issues)
    }

    pub fn issue(&self, number: u64) -> anyhow::Result<RawIssue> {
        let page = self.transport.get(&format!("{}/issues/{number}", self.base))?;
        Ok(serde_json::from_value(page.body)?)
    }
}
