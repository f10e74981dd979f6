use thiserror::Error;

/// Failure to build or query a plugin registry.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The catalogue itself could not be enumerated.
    #[error("cannot enumerate plugin catalogue `{catalogue}`: {reason}")]
    Catalogue { catalogue: String, reason: String },
    /// A requested plugin name has no registered implementation.
    #[error("no plugin named `{name}` (available: {})", available.join(", "))]
    NotRegistered {
        name: String,
        available: Vec<String>,
    },
}

#[derive(Debug, Error)]
pub enum ChangelogError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    /// A version reference could not be located in history. Only the
    /// release it belongs to is lost.
    #[error("cannot resolve `{reference}` for release {release}")]
    RangeResolution { release: String, reference: String },
    #[error("configuration error: {0}")]
    Configuration(String),
    /// One upstream item could not be fetched; callers treat it as absent.
    #[error("failed to fetch {item}: {reason}")]
    UpstreamFetch { item: String, reason: String },
    #[error("render error: {0}")]
    Render(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ChangelogError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Errors that cost one record but leave the rest of the run intact.
    pub fn is_per_record(&self) -> bool {
        matches!(
            self,
            ChangelogError::RangeResolution { .. } | ChangelogError::UpstreamFetch { .. }
        )
    }
}

pub type Result<T, E = ChangelogError> = std::result::Result<T, E>;
