//! `git` changelog source: reads the commit graph and tags by shelling out
//! to the `git` binary.

mod log;
mod repo;
mod source;

pub use log::{parse_log, parse_tags, TagRef, LOG_FORMAT, TAG_FORMAT};
pub use repo::GitRepo;
pub use source::{GitOptions, GitPlugin, GitSource};
