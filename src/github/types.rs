use crate::model::{FileChangeRecord, PullRequestDetail, PullRequestSummary};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Login used when GitHub returns no user (deleted accounts).
pub const UNKNOWN_AUTHOR: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubUser {
    pub login: String,
}

/// Item of `GET /repos/{owner}/{repo}/pulls` and body of `GET .../pulls/{number}`.
///
/// The list endpoint omits the counters, hence the defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubPull {
    pub number: u64,
    pub title: String,
    pub html_url: String,
    pub user: Option<GitHubUser>,
    pub merged_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub additions: u64,
    #[serde(default)]
    pub deletions: u64,
    #[serde(default)]
    pub changed_files: u64,
    #[serde(default)]
    pub commits: u64,
}

impl GitHubPull {
    pub fn author(&self) -> &str {
        self.user.as_ref().map(|u| u.login.as_str()).unwrap_or(UNKNOWN_AUTHOR)
    }

    /// `None` for PRs that were closed without merging.
    pub fn to_summary(&self) -> Option<PullRequestSummary> {
        let merged_at = self.merged_at?;
        Some(PullRequestSummary {
            number: self.number,
            title: self.title.clone(),
            url: self.html_url.clone(),
            author: self.author().to_string(),
            merged_at,
            updated_at: self.updated_at,
        })
    }

    pub fn into_detail(self, summary: PullRequestSummary, files: Vec<GitHubPullFile>) -> PullRequestDetail {
        PullRequestDetail {
            summary,
            additions: self.additions,
            deletions: self.deletions,
            changed_files: self.changed_files,
            commits: self.commits,
            files: files.into_iter().map(FileChangeRecord::from).collect(),
        }
    }
}

/// Item of `GET /repos/{owner}/{repo}/pulls/{number}/files`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubPullFile {
    pub filename: String,
    pub additions: u64,
    pub deletions: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changes: Option<u64>,
}

impl From<GitHubPullFile> for FileChangeRecord {
    fn from(file: GitHubPullFile) -> Self {
        FileChangeRecord::new(file.filename, file.additions, file.deletions, file.changes)
    }
}

/// Item of `GET /repos/{owner}/{repo}/issues/{number}/comments`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubComment {
    pub user: Option<GitHubUser>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub body: String,
}

impl GitHubComment {
    pub fn author(&self) -> &str {
        self.user.as_ref().map(|u| u.login.as_str()).unwrap_or(UNKNOWN_AUTHOR)
    }
}
