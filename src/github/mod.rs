pub mod client;
pub mod types;

pub use client::GitHubClient;
pub use types::{GitHubComment, GitHubPull, GitHubPullFile, GitHubUser};

use crate::error::Result;
use async_trait::async_trait;

/// Page size used when listing changed files of a PR.
pub const FILES_PER_PAGE: u32 = 100;

#[async_trait]
pub trait PullRequestSource: Send + Sync {
    /// One page of closed PRs, most recently updated first. Pages start at 1.
    async fn list_closed(&self, page: u32, per_page: u32) -> Result<Vec<GitHubPull>>;

    async fn get_pull(&self, number: u64) -> Result<GitHubPull>;

    /// Every changed file of a PR, across all pages.
    async fn list_files(&self, number: u64) -> Result<Vec<GitHubPullFile>>;

    async fn list_comments(&self, number: u64) -> Result<Vec<GitHubComment>>;
}
