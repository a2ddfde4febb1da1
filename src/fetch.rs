use crate::cache::{range_is_closed, FileCache};
use crate::config::{clamp_concurrency, FetchOptions};
use crate::error::{PrStatError, Result};
use crate::github::{GitHubPull, GitHubPullFile, PullRequestSource};
use crate::model::{PullRequestDetail, PullRequestSummary};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use indicatif::ProgressBar;
use std::collections::HashSet;
use tracing::{debug, info, warn};

pub struct Fetcher<S> {
    source: S,
    cache: Option<FileCache>,
    options: FetchOptions,
    progress: ProgressBar,
}

impl<S: PullRequestSource> Fetcher<S> {
    pub fn new(source: S, cache: Option<FileCache>, options: FetchOptions) -> Self {
        Self {
            source,
            cache,
            options,
            progress: ProgressBar::hidden(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Details of every merged PR selected by the options.
    ///
    /// The first failing PR aborts the whole fetch; fetches still in flight
    /// are dropped. Result order is unspecified.
    pub async fn fetch(&self, now: DateTime<Utc>) -> Result<Vec<PullRequestDetail>> {
        let summaries = self.list_merged(now).await?;
        info!(count = summaries.len(), "merged pull requests selected");

        let concurrency = clamp_concurrency(Some(i64::try_from(self.options.concurrency).unwrap_or(i64::MAX)));
        self.progress.set_length(summaries.len() as u64);
        self.progress.set_position(0);
        self.progress.set_message("Fetching pull request details...");

        let details: Vec<PullRequestDetail> = stream::iter(summaries)
            .map(|summary| self.fetch_detail(summary))
            .buffer_unordered(concurrency)
            .try_collect()
            .await?;

        self.progress
            .finish_with_message(format!("Fetched {} pull requests", details.len()));
        Ok(details)
    }

    /// Merged PRs inside the window, newest update first, honouring `limit`.
    pub async fn list_merged(&self, now: DateTime<Utc>) -> Result<Vec<PullRequestSummary>> {
        let Some((cache, since, until)) = self.range_cache(now) else {
            return self.list_from_source().await;
        };

        match cache.load_range(&since, &until).await {
            Ok(Some(pulls)) => {
                info!(count = pulls.len(), "listing served from range cache");
                return Ok(pulls);
            }
            Ok(None) => {}
            Err(PrStatError::CacheCorrupt { path, source }) => {
                warn!(path = %path.display(), error = %source, "ignoring unreadable range cache entry");
            }
            Err(e) => return Err(e),
        }

        let pulls = self.list_from_source().await?;
        if let Err(e) = cache.store_range(&since, &until, &pulls).await {
            warn!(error = %e, "could not write range cache entry");
        }
        Ok(pulls)
    }

    /// The range cache applies to closed windows only, and never to a
    /// limited listing.
    fn range_cache(&self, now: DateTime<Utc>) -> Option<(&FileCache, DateTime<Utc>, DateTime<Utc>)> {
        let cache = self.cache.as_ref()?;
        if self.options.limit.is_some() {
            return None;
        }
        let (since, until) = self.options.range.bounds()?;
        range_is_closed(&until, now).then_some((cache, since, until))
    }

    async fn list_from_source(&self) -> Result<Vec<PullRequestSummary>> {
        let range = self.options.range;
        let per_page = self.options.page_size.max(1);
        let mut selected = Vec::new();
        let mut seen = HashSet::new();
        let mut page = 1u32;

        loop {
            self.progress
                .set_message(format!("Listing closed pull requests (page {page})..."));
            let batch = self.source.list_closed(page, per_page).await?;
            let batch_len = batch.len();
            debug!(page, batch_len, selected = selected.len(), "listed closed pull requests");

            for pull in batch {
                // Sorted by update time: nothing further down can have merged
                // inside the window.
                if range.since.is_some_and(|since| pull.updated_at < since) {
                    debug!(number = pull.number, "reached pull requests older than the window");
                    return Ok(selected);
                }
                let Some(summary) = pull.to_summary() else {
                    continue;
                };
                if !range.contains(&summary.merged_at) {
                    continue;
                }
                // A PR updated mid-listing shifts onto the next page as well.
                if !seen.insert(summary.number) {
                    debug!(number = summary.number, "skipping repeated pull request");
                    continue;
                }
                selected.push(summary);
                if self.options.limit.is_some_and(|limit| selected.len() >= limit) {
                    return Ok(selected);
                }
            }

            if batch_len < per_page as usize {
                return Ok(selected);
            }
            page += 1;
        }
    }

    async fn fetch_detail(&self, summary: PullRequestSummary) -> Result<PullRequestDetail> {
        let number = summary.number;
        let pull = self.pull(number).await?;
        let files = self.files(number, true).await?;
        debug!(number, files = files.len(), "pull request detail ready");
        self.progress.inc(1);
        Ok(pull.into_detail(summary, files))
    }

    /// PR detail, from the cache when present. Only merged PRs are stored.
    pub async fn pull(&self, number: u64) -> Result<GitHubPull> {
        if let Some(cache) = &self.cache {
            if let Some(pull) = cache.load_pull(number).await? {
                return Ok(pull);
            }
        }
        let pull = self.source.get_pull(number).await?;
        if let Some(cache) = &self.cache {
            if pull.merged_at.is_some() {
                cache.store_pull(&pull).await?;
            }
        }
        Ok(pull)
    }

    /// Changed files of a PR, from the cache when present.
    pub async fn files(&self, number: u64, persist: bool) -> Result<Vec<GitHubPullFile>> {
        if let Some(cache) = &self.cache {
            if let Some(files) = cache.load_files(number).await? {
                return Ok(files);
            }
        }
        let files = self.source.list_files(number).await?;
        if let Some(cache) = &self.cache {
            if persist {
                cache.store_files(number, &files).await?;
            }
        }
        Ok(files)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::github::{GitHubComment, GitHubUser};
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    /// In-memory source that records calls and concurrent entries.
    #[derive(Default)]
    pub(crate) struct ScriptedSource {
        pub pulls: Vec<GitHubPull>,
        pub files: HashMap<u64, Vec<GitHubPullFile>>,
        pub delay_ms: u64,
        pub fail_on: Option<u64>,
        pub list_calls: AtomicUsize,
        pub pull_calls: AtomicUsize,
        pub file_calls: AtomicUsize,
        in_flight: AtomicUsize,
        pub max_in_flight: AtomicUsize,
    }

    impl ScriptedSource {
        pub fn new(pulls: Vec<GitHubPull>) -> Self {
            Self {
                pulls,
                ..Default::default()
            }
        }

        pub fn with_files(mut self, number: u64, files: Vec<GitHubPullFile>) -> Self {
            self.files.insert(number, files);
            self
        }

        async fn enter(&self) {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if self.delay_ms > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
            } else {
                tokio::task::yield_now().await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl PullRequestSource for ScriptedSource {
        async fn list_closed(&self, page: u32, per_page: u32) -> Result<Vec<GitHubPull>> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            let start = (page as usize - 1) * per_page as usize;
            Ok(self
                .pulls
                .iter()
                .skip(start)
                .take(per_page as usize)
                .cloned()
                .collect())
        }

        async fn get_pull(&self, number: u64) -> Result<GitHubPull> {
            self.pull_calls.fetch_add(1, Ordering::SeqCst);
            self.enter().await;
            if self.fail_on == Some(number) {
                return Err(PrStatError::Api {
                    status: 500,
                    url: format!("pulls/{number}"),
                });
            }
            self.pulls
                .iter()
                .find(|p| p.number == number)
                .cloned()
                .ok_or_else(|| PrStatError::Api {
                    status: 404,
                    url: format!("pulls/{number}"),
                })
        }

        async fn list_files(&self, number: u64) -> Result<Vec<GitHubPullFile>> {
            self.file_calls.fetch_add(1, Ordering::SeqCst);
            self.enter().await;
            Ok(self.files.get(&number).cloned().unwrap_or_default())
        }

        async fn list_comments(&self, _number: u64) -> Result<Vec<GitHubComment>> {
            Ok(Vec::new())
        }
    }

    pub(crate) fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
    }

    pub(crate) fn merged(number: u64, login: &str, merged_at: DateTime<Utc>) -> GitHubPull {
        GitHubPull {
            number,
            title: format!("PR {number}"),
            html_url: format!("https://github.com/o/r/pull/{number}"),
            user: Some(GitHubUser { login: login.to_string() }),
            merged_at: Some(merged_at),
            updated_at: merged_at + Duration::minutes(5),
            additions: 0,
            deletions: 0,
            changed_files: 0,
            commits: 1,
        }
    }

    fn file(name: &str, additions: u64, deletions: u64) -> GitHubPullFile {
        GitHubPullFile {
            filename: name.to_string(),
            additions,
            deletions,
            changes: None,
        }
    }

    /// Five merged PRs, newest first: #5 on the 5th .. #1 on the 1st.
    fn five_merged() -> Vec<GitHubPull> {
        (1..=5u64).rev().map(|n| merged(n, "alice", at(n as u32, 12))).collect()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn options(concurrency: usize) -> FetchOptions {
        FetchOptions {
            concurrency,
            ..FetchOptions::default()
        }
    }

    fn numbers(details: &[PullRequestDetail]) -> Vec<u64> {
        let mut numbers: Vec<u64> = details.iter().map(|d| d.summary.number).collect();
        numbers.sort_unstable();
        numbers
    }

    #[tokio::test]
    async fn limit_returns_newest_without_extra_pages() {
        for page_size in [1u32, 2, 100] {
            let fetch_options = FetchOptions {
                limit: Some(1),
                page_size,
                ..options(6)
            };
            let fetcher = Fetcher::new(ScriptedSource::new(five_merged()), None, fetch_options);
            let details = fetcher.fetch(now()).await.unwrap();

            assert_eq!(numbers(&details), vec![5]);
            assert_eq!(fetcher.source().list_calls.load(Ordering::SeqCst), 1);
            assert_eq!(fetcher.source().pull_calls.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn limit_spanning_pages_stops_at_the_page_that_fills_it() {
        let fetch_options = FetchOptions {
            limit: Some(3),
            page_size: 2,
            ..options(6)
        };
        let fetcher = Fetcher::new(ScriptedSource::new(five_merged()), None, fetch_options);
        let details = fetcher.fetch(now()).await.unwrap();

        assert_eq!(numbers(&details), vec![3, 4, 5]);
        assert_eq!(fetcher.source().list_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unmerged_and_out_of_window_pulls_are_dropped() {
        let mut pulls = five_merged();
        let mut closed = merged(6, "bob", at(6, 12));
        closed.merged_at = None;
        pulls.insert(0, closed);

        let fetch_options = FetchOptions {
            range: crate::model::DateRange::new().with_since(at(2, 0)).with_until(at(4, 23)),
            page_size: 2,
            ..options(6)
        };
        let fetcher = Fetcher::new(ScriptedSource::new(pulls), None, fetch_options);
        let details = fetcher.fetch(now()).await.unwrap();

        assert_eq!(numbers(&details), vec![2, 3, 4]);
        // #1 was last updated before `since`, so the fourth page is never requested.
        assert_eq!(fetcher.source().list_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn concurrency_cap_bounds_in_flight_requests() {
        let pulls: Vec<_> = (1..=10u64).rev().map(|n| merged(n, "alice", at(n as u32, 12))).collect();
        let source = ScriptedSource {
            delay_ms: 10,
            ..ScriptedSource::new(pulls)
        };
        let fetcher = Fetcher::new(source, None, options(2));
        let details = fetcher.fetch(now()).await.unwrap();

        assert_eq!(details.len(), 10);
        assert_eq!(fetcher.source().max_in_flight.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn first_failure_aborts_the_fetch() {
        let source = ScriptedSource {
            fail_on: Some(3),
            ..ScriptedSource::new(five_merged())
        };
        let fetcher = Fetcher::new(source, None, options(2));
        let err = fetcher.fetch(now()).await.unwrap_err();
        assert!(matches!(err, PrStatError::Api { status: 500, .. }));
    }

    #[tokio::test]
    async fn cached_details_skip_the_network() {
        let dir = tempdir().unwrap();
        let cache = FileCache::new(dir.path(), "o", "r");
        let pulls = vec![merged(1, "alice", at(1, 12))];

        let first = Fetcher::new(
            ScriptedSource::new(pulls.clone()).with_files(1, vec![file("a.ts", 10, 2)]),
            Some(cache.clone()),
            options(6),
        );
        let fetched = first.fetch(now()).await.unwrap();
        assert_eq!(first.source().pull_calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.source().file_calls.load(Ordering::SeqCst), 1);

        // Same listing, but the source has no files: everything must come from disk.
        let second = Fetcher::new(ScriptedSource::new(pulls), Some(cache), options(6));
        let cached = second.fetch(now()).await.unwrap();
        assert_eq!(second.source().pull_calls.load(Ordering::SeqCst), 0);
        assert_eq!(second.source().file_calls.load(Ordering::SeqCst), 0);
        assert_eq!(cached, fetched);
        assert_eq!(cached[0].files[0].path, "a.ts");
    }

    #[tokio::test]
    async fn corrupt_detail_entry_is_fatal() {
        let dir = tempdir().unwrap();
        let cache = FileCache::new(dir.path(), "o", "r");
        let path = cache.pull_path(1);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "not json").unwrap();

        let fetcher = Fetcher::new(
            ScriptedSource::new(vec![merged(1, "alice", at(1, 12))]),
            Some(cache),
            options(6),
        );
        let err = fetcher.fetch(now()).await.unwrap_err();
        assert!(matches!(err, PrStatError::CacheCorrupt { .. }));
    }

    #[tokio::test]
    async fn closed_window_listing_is_cached() {
        let dir = tempdir().unwrap();
        let cache = FileCache::new(dir.path(), "o", "r");
        let range = crate::model::DateRange::new().with_since(at(1, 0)).with_until(at(31, 23));
        let fetch_options = FetchOptions { range, ..options(6) };

        let first = Fetcher::new(ScriptedSource::new(five_merged()), Some(cache.clone()), fetch_options.clone());
        let listed = first.list_merged(now()).await.unwrap();
        assert_eq!(listed.len(), 5);
        assert!(cache.range_path(&at(1, 0), &at(31, 23)).exists());

        let second = Fetcher::new(ScriptedSource::new(Vec::new()), Some(cache), fetch_options);
        let replayed = second.list_merged(now()).await.unwrap();
        assert_eq!(second.source().list_calls.load(Ordering::SeqCst), 0);
        assert_eq!(replayed, listed);
    }

    #[tokio::test]
    async fn window_reaching_today_is_never_cached() {
        let dir = tempdir().unwrap();
        let cache = FileCache::new(dir.path(), "o", "r");
        let now = at(20, 9);
        let until = at(20, 23);
        let range = crate::model::DateRange::new().with_since(at(1, 0)).with_until(until);
        let fetch_options = FetchOptions { range, ..options(6) };

        let fetcher = Fetcher::new(ScriptedSource::new(five_merged()), Some(cache.clone()), fetch_options);
        fetcher.list_merged(now).await.unwrap();
        fetcher.list_merged(now).await.unwrap();

        assert!(!cache.range_path(&at(1, 0), &until).exists());
        assert_eq!(fetcher.source().list_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn limited_listing_bypasses_range_cache() {
        let dir = tempdir().unwrap();
        let cache = FileCache::new(dir.path(), "o", "r");
        let range = crate::model::DateRange::new().with_since(at(1, 0)).with_until(at(31, 23));
        let fetch_options = FetchOptions {
            range,
            limit: Some(2),
            ..options(6)
        };

        let fetcher = Fetcher::new(ScriptedSource::new(five_merged()), Some(cache.clone()), fetch_options);
        assert_eq!(fetcher.list_merged(now()).await.unwrap().len(), 2);
        assert!(!cache.range_path(&at(1, 0), &at(31, 23)).exists());
    }

    #[tokio::test]
    async fn unreadable_range_entry_falls_back_to_listing() {
        let dir = tempdir().unwrap();
        let cache = FileCache::new(dir.path(), "o", "r");
        let path = cache.range_path(&at(1, 0), &at(31, 23));
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "[{\"broken\": true}]").unwrap();

        let range = crate::model::DateRange::new().with_since(at(1, 0)).with_until(at(31, 23));
        let fetcher = Fetcher::new(
            ScriptedSource::new(five_merged()),
            Some(cache.clone()),
            FetchOptions { range, ..options(6) },
        );
        assert_eq!(fetcher.list_merged(now()).await.unwrap().len(), 5);
        assert_eq!(fetcher.source().list_calls.load(Ordering::SeqCst), 1);
        // The broken entry was replaced by a fresh listing.
        assert_eq!(cache.load_range(&at(1, 0), &at(31, 23)).await.unwrap().map(|p| p.len()), Some(5));
    }

    #[tokio::test]
    async fn pull_repeated_across_pages_is_counted_once() {
        let pulls = vec![
            merged(3, "alice", at(3, 12)),
            merged(2, "alice", at(2, 12)),
            merged(2, "alice", at(2, 12)),
            merged(1, "alice", at(1, 12)),
        ];
        let source = ScriptedSource::new(pulls).with_files(2, vec![file("a.ts", 10, 0)]);
        let fetch_options = FetchOptions {
            page_size: 2,
            ..options(6)
        };
        let fetcher = Fetcher::new(source, None, fetch_options);
        let details = fetcher.fetch(now()).await.unwrap();

        assert_eq!(numbers(&details), vec![1, 2, 3]);
        assert_eq!(fetcher.source().pull_calls.load(Ordering::SeqCst), 3);

        let filter = crate::filter::FileFilter::allow_all();
        let (owners, files) =
            crate::aggregate::Aggregator::new(&filter, crate::config::OwnerOrder::Changes).aggregate(&details);
        assert_eq!((owners[0].pr_count, owners[0].lines_added), (3, 10));
        assert_eq!((files[0].lines_added, files[0].pr_count), (10, 1));
    }

    #[tokio::test]
    async fn zero_concurrency_falls_back_to_the_default() {
        let pulls: Vec<_> = (1..=10u64).rev().map(|n| merged(n, "alice", at(n as u32, 12))).collect();
        let source = ScriptedSource {
            delay_ms: 10,
            ..ScriptedSource::new(pulls)
        };
        let fetcher = Fetcher::new(source, None, options(0));
        fetcher.fetch(now()).await.unwrap();
        assert_eq!(
            fetcher.source().max_in_flight.load(Ordering::SeqCst),
            crate::config::DEFAULT_CONCURRENCY
        );
    }

    #[tokio::test]
    async fn failed_range_write_is_not_fatal() {
        let dir = tempdir().unwrap();
        let cache = FileCache::new(dir.path(), "o", "r");
        let range = crate::model::DateRange::new().with_since(at(1, 0)).with_until(at(31, 23));
        // A directory in place of the temp file makes the write fail.
        std::fs::create_dir_all(cache.range_path(&at(1, 0), &at(31, 23)).with_extension("json.tmp")).unwrap();

        let fetcher = Fetcher::new(
            ScriptedSource::new(five_merged()),
            Some(cache.clone()),
            FetchOptions { range, ..options(6) },
        );
        assert_eq!(fetcher.list_merged(now()).await.unwrap().len(), 5);
        assert!(!cache.range_path(&at(1, 0), &at(31, 23)).exists());
    }

    #[tokio::test]
    async fn failed_detail_write_aborts_the_fetch() {
        let dir = tempdir().unwrap();
        let cache = FileCache::new(dir.path(), "o", "r");
        std::fs::create_dir_all(cache.pull_path(1).with_extension("json.tmp")).unwrap();

        let fetcher = Fetcher::new(
            ScriptedSource::new(vec![merged(1, "alice", at(1, 12))]),
            Some(cache),
            options(6),
        );
        let err = fetcher.fetch(now()).await.unwrap_err();
        assert!(matches!(err, PrStatError::Io(_)));
    }
}
