pub mod commits;
pub mod error;
pub mod issues;
pub mod model;
pub mod pipeline;
pub mod range;
pub mod registry;
pub mod source;

pub use error::{ChangelogError, DiscoveryError, Result};
pub use model::*;
