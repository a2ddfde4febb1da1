use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestSummary {
    pub number: u64,
    pub title: String,
    pub url: String,
    pub author: String,
    pub merged_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChangeRecord {
    pub path: String,
    pub additions: u64,
    pub deletions: u64,
    pub changes: u64,
}

impl FileChangeRecord {
    /// `changes` falls back to additions + deletions when the source gave no count.
    pub fn new(path: impl Into<String>, additions: u64, deletions: u64, changes: Option<u64>) -> Self {
        Self {
            path: path.into(),
            additions,
            deletions,
            changes: changes.unwrap_or(additions + deletions),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestDetail {
    pub summary: PullRequestSummary,
    pub additions: u64,
    pub deletions: u64,
    pub changed_files: u64,
    pub commits: u64,
    pub files: Vec<FileChangeRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateRange {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn new() -> Self {
        Self { since: None, until: None }
    }

    pub fn with_since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn with_until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn contains(&self, timestamp: &DateTime<Utc>) -> bool {
        if let Some(since) = self.since {
            if timestamp < &since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if timestamp > &until {
                return false;
            }
        }
        true
    }

    /// Both bounds, when the range is fully specified.
    pub fn bounds(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        self.since.zip(self.until)
    }
}

/// Reference to a PR inside a contributor row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequestRef {
    pub number: u64,
    pub title: String,
    pub url: String,
    pub merged_at: DateTime<Utc>,
}

impl From<&PullRequestSummary> for PullRequestRef {
    fn from(summary: &PullRequestSummary) -> Self {
        Self {
            number: summary.number,
            title: summary.title.clone(),
            url: summary.url.clone(),
            merged_at: summary.merged_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Averages {
    pub lines_added: f64,
    pub lines_deleted: f64,
    pub files_changed: f64,
    pub commits: f64,
}

impl Averages {
    pub fn per_pr(lines_added: u64, lines_deleted: u64, files_changed: u64, commits: u64, pr_count: u64) -> Self {
        Self {
            lines_added: ratio(lines_added, pr_count),
            lines_deleted: ratio(lines_deleted, pr_count),
            files_changed: ratio(files_changed, pr_count),
            commits: ratio(commits, pr_count),
        }
    }
}

/// Division that yields 0 for an empty denominator.
pub fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributorAggregate {
    pub owner: String,
    pub lines_added: u64,
    pub lines_deleted: u64,
    pub files_changed: u64,
    pub commits: u64,
    pub pr_count: u64,
    pub averages: Averages,
    pub pull_requests: Vec<PullRequestRef>,
}

impl ContributorAggregate {
    pub fn new(owner: String) -> Self {
        Self {
            owner,
            lines_added: 0,
            lines_deleted: 0,
            files_changed: 0,
            commits: 0,
            pr_count: 0,
            averages: Averages::default(),
            pull_requests: Vec::new(),
        }
    }

    /// Folds one PR's filtered file set into the running totals.
    pub fn add_pull_request(&mut self, pr: &PullRequestDetail, files: &[&FileChangeRecord]) {
        self.lines_added += files.iter().map(|f| f.additions).sum::<u64>();
        self.lines_deleted += files.iter().map(|f| f.deletions).sum::<u64>();
        self.files_changed += files.len() as u64;
        self.commits += pr.commits;
        self.pr_count += 1;
        self.pull_requests.push(PullRequestRef::from(&pr.summary));
        self.averages = Averages::per_pr(
            self.lines_added,
            self.lines_deleted,
            self.files_changed,
            self.commits,
            self.pr_count,
        );
    }

    pub fn total_changes(&self) -> u64 {
        self.lines_added + self.lines_deleted
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAggregate {
    pub path: String,
    pub lines_added: u64,
    pub lines_deleted: u64,
    pub changes: u64,
    pub pr_count: u64,
    #[serde(skip)]
    last_pr: Option<u64>,
}

impl FileAggregate {
    pub fn new(path: String) -> Self {
        Self {
            path,
            lines_added: 0,
            lines_deleted: 0,
            changes: 0,
            pr_count: 0,
            last_pr: None,
        }
    }

    pub fn add_change(&mut self, pr_number: u64, change: &FileChangeRecord) {
        self.lines_added += change.additions;
        self.lines_deleted += change.deletions;
        self.changes += change.changes;
        // PRs are folded one at a time, so a repeat number is the same PR.
        if self.last_pr != Some(pr_number) {
            self.pr_count += 1;
            self.last_pr = Some(pr_number);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Period {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Totals {
    pub pr_count: u64,
    pub owner_count: u64,
    pub file_count: u64,
    pub lines_added: u64,
    pub lines_deleted: u64,
    pub files_changed: u64,
    pub commits: u64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReportAverages {
    #[serde(flatten)]
    pub per_pr: Averages,
    pub prs_per_owner: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub version: u32,
    pub generated_at: DateTime<Utc>,
    pub owner: String,
    pub repo: String,
    pub period: Period,
    pub totals: Totals,
    pub averages: ReportAverages,
    pub owners: Vec<ContributorAggregate>,
    pub files: Vec<FileAggregate>,
}

impl Report {
    pub fn is_empty(&self) -> bool {
        self.totals.pr_count == 0
    }
}
