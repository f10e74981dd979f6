//! `github` changelog source: releases from repository tags, changes from
//! closed issues classified by label.

mod client;
mod source;
mod transport;

pub use client::{GithubClient, RawIssue, RawTag};
pub use source::{GithubOptions, GithubPlugin, GithubSource};
pub use transport::{parse_next_link, Page, Transport, UreqTransport};
