use crate::error::{PrStatError, Result};
use crate::github::{GitHubPull, GitHubPullFile};
use crate::model::PullRequestSummary;
use crate::util::{end_of_day, file_safe_timestamp};
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// JSON files under `<cache_dir>/<owner>/<repo>/`: `pr/<n>.json`,
/// `pr-files/<n>.json` and `range/since-<ts>-until-<ts>.json`. No TTL.
#[derive(Debug, Clone)]
pub struct FileCache {
    root: PathBuf,
}

impl FileCache {
    pub fn new<P: AsRef<Path>>(cache_dir: P, owner: &str, repo: &str) -> Self {
        Self {
            root: cache_dir.as_ref().join(owner).join(repo),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn pull_path(&self, number: u64) -> PathBuf {
        self.root.join("pr").join(format!("{number}.json"))
    }

    pub fn files_path(&self, number: u64) -> PathBuf {
        self.root.join("pr-files").join(format!("{number}.json"))
    }

    pub fn range_path(&self, since: &DateTime<Utc>, until: &DateTime<Utc>) -> PathBuf {
        self.root.join("range").join(format!(
            "since-{}-until-{}.json",
            file_safe_timestamp(since),
            file_safe_timestamp(until)
        ))
    }

    pub async fn load_pull(&self, number: u64) -> Result<Option<GitHubPull>> {
        read_entry(&self.pull_path(number)).await
    }

    pub async fn store_pull(&self, pull: &GitHubPull) -> Result<()> {
        write_entry(&self.pull_path(pull.number), pull).await
    }

    pub async fn load_files(&self, number: u64) -> Result<Option<Vec<GitHubPullFile>>> {
        read_entry(&self.files_path(number)).await
    }

    pub async fn store_files(&self, number: u64, files: &[GitHubPullFile]) -> Result<()> {
        write_entry(&self.files_path(number), &files).await
    }

    pub async fn load_range(
        &self,
        since: &DateTime<Utc>,
        until: &DateTime<Utc>,
    ) -> Result<Option<Vec<PullRequestSummary>>> {
        read_entry(&self.range_path(since, until)).await
    }

    pub async fn store_range(
        &self,
        since: &DateTime<Utc>,
        until: &DateTime<Utc>,
        pulls: &[PullRequestSummary],
    ) -> Result<()> {
        write_entry(&self.range_path(since, until), &pulls).await
    }
}

/// A window whose `until` is on or before the end of yesterday can gain no
/// new merges, so its listing may be cached.
pub fn range_is_closed(until: &DateTime<Utc>, now: DateTime<Utc>) -> bool {
    let yesterday = now.date_naive() - Duration::days(1);
    *until <= end_of_day(yesterday)
}

async fn read_entry<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "cache miss");
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };
    debug!(path = %path.display(), "cache hit");
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| PrStatError::CacheCorrupt {
            path: path.to_path_buf(),
            source,
        })
}

async fn write_entry<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| PrStatError::Cache(format!("No parent directory for {}", path.display())))?;
    // Succeeds when another fetch created the directory first.
    fs::create_dir_all(dir).await?;

    let json = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).await?;
    fs::rename(&tmp, path).await?;
    debug!(path = %path.display(), "cache write");
    Ok(())
}
