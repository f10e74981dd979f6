use chlog_core::{ChangelogError, Result};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Where a rendered document goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    Stdout,
    File(PathBuf),
}

impl Output {
    pub fn from_option(path: Option<&Path>) -> Self {
        match path {
            Some(p) if p.as_os_str() != "-" => Output::File(p.to_path_buf()),
            _ => Output::Stdout,
        }
    }

    pub fn emit(&self, text: &str) -> Result<()> {
        match self {
            Output::Stdout => {
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(text.as_bytes())?;
                stdout.flush()?;
                Ok(())
            }
            Output::File(path) => write_file(path, text),
        }
    }
}

pub(crate) fn write_file(path: &Path, text: &str) -> Result<()> {
    chlog_store::write_atomic(path, text.as_bytes())
        .map_err(|e| ChangelogError::Render(format!("cannot write {}: {e}", path.display())))?;
    tracing::info!(path = %path.display(), bytes = text.len(), "wrote changelog");
    Ok(())
}
