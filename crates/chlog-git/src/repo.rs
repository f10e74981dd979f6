use crate::log::{parse_log, parse_tags, TagRef, LOG_FORMAT, TAG_FORMAT};
use chlog_core::commits::History;
use chlog_core::{ChangelogError, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

/// A working tree (or bare repository) driven through the `git` binary.
#[derive(Debug, Clone)]
pub struct GitRepo {
    path: PathBuf,
}

impl GitRepo {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let repo = Self { path: path.into() };
        repo.run(&["rev-parse", "--git-dir"])?;
        Ok(repo)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn run(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.path)
            .output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ChangelogError::config(format!(
                "git {} failed in {}: {}",
                args.first().copied().unwrap_or_default(),
                self.path.display(),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// The whole commit graph, with `HEAD` set when the repository has one.
    pub fn load_history(&self) -> Result<History> {
        let raw = self.run(&["log", "--all", "--topo-order", LOG_FORMAT])?;
        let mut history = parse_log(&raw)?;
        match self.run(&["rev-parse", "--verify", "--quiet", "HEAD^{commit}"]) {
            Ok(head) => history.set_head(head.trim()),
            Err(e) => tracing::debug!(error = %e, "repository has no HEAD"),
        }
        tracing::debug!(commits = history.len(), path = %self.path.display(), "loaded git history");
        Ok(history)
    }

    pub fn tags(&self) -> Result<Vec<TagRef>> {
        let raw = self.run(&["for-each-ref", "refs/tags", TAG_FORMAT])?;
        Ok(parse_tags(&raw))
    }

    /// `git --version`, used to check the binary is usable at all.
    pub fn detect() -> anyhow::Result<String> {
        let output = Command::new("git").arg("--version").output()?;
        if !output.status.success() {
            anyhow::bail!("git --version exited with {}", output.status);
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
