use fs2::FileExt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

mod cache;

pub use cache::{DiskCache, IssueCache, MemoryCache};

/// Stable file-name key: blake3(key) → hex string (first 32 chars).
pub fn key_hash(key: &str) -> String {
    let hash = blake3::hash(key.as_bytes());
    hash.to_hex()[..32].to_string()
}

/// Return the per-user store root: `~/.cache/chlog/`
/// Falls back to `~/.chlog/`, then a local `.chlog-store`.
pub fn store_root() -> PathBuf {
    if let Some(cache_dir) = dirs::cache_dir() {
        cache_dir.join("chlog")
    } else if let Some(home) = dirs::home_dir() {
        home.join(".chlog")
    } else {
        PathBuf::from(".chlog-store")
    }
}

/// Cache directory for one upstream, e.g. `store_root/github/<hash of owner/repo>`.
pub fn cache_dir(kind: &str, scope: &str) -> PathBuf {
    store_root().join(kind).join(key_hash(scope))
}

/// Atomic write: write to temp file in same dir, then rename.
pub fn write_atomic(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        Some(_) => Path::new("."),
        None => anyhow::bail!("no parent dir for {}", path.display()),
    };
    fs::create_dir_all(parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(data)?;
    tmp.flush()?;
    tmp.persist(path)?;
    Ok(())
}

/// File-based exclusive lock guard.
pub struct LockGuard {
    _file: fs::File,
}

/// Acquire an exclusive file lock. Creates the lock file if needed.
pub fn lock_file(path: &Path) -> anyhow::Result<LockGuard> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)?;
    file.lock_exclusive()?;
    Ok(LockGuard { _file: file })
}
