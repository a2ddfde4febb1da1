use crate::config::OwnerOrder;
use crate::filter::FileFilter;
use crate::model::{
    ratio, Averages, ContributorAggregate, DateRange, FileAggregate, Period, PullRequestDetail, Report,
    ReportAverages, Totals, SCHEMA_VERSION,
};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Folds fetched PRs into owner and file rows.
///
/// Both tables are built from the same filtered file set of each PR.
pub struct Aggregator<'a> {
    filter: &'a FileFilter,
    order: OwnerOrder,
}

impl<'a> Aggregator<'a> {
    pub fn new(filter: &'a FileFilter, order: OwnerOrder) -> Self {
        Self { filter, order }
    }

    pub fn aggregate(&self, prs: &[PullRequestDetail]) -> (Vec<ContributorAggregate>, Vec<FileAggregate>) {
        // Fetch order is arbitrary; fold in merge order so PR lists are stable.
        let mut ordered: Vec<&PullRequestDetail> = prs.iter().collect();
        ordered.sort_by(|a, b| {
            a.summary
                .merged_at
                .cmp(&b.summary.merged_at)
                .then(a.summary.number.cmp(&b.summary.number))
        });

        let mut owners: HashMap<String, ContributorAggregate> = HashMap::new();
        let mut files: HashMap<String, FileAggregate> = HashMap::new();

        for pr in ordered {
            let kept = self.filter.filter_files(&pr.files);

            owners
                .entry(pr.summary.author.clone())
                .or_insert_with(|| ContributorAggregate::new(pr.summary.author.clone()))
                .add_pull_request(pr, &kept);

            for change in kept {
                files
                    .entry(change.path.clone())
                    .or_insert_with(|| FileAggregate::new(change.path.clone()))
                    .add_change(pr.summary.number, change);
            }
        }

        let mut owners: Vec<_> = owners.into_values().collect();
        owners.sort_by(|a, b| compare_owners(a, b, self.order));

        let mut files: Vec<_> = files.into_values().collect();
        files.sort_by(|a, b| b.changes.cmp(&a.changes).then_with(|| a.path.cmp(&b.path)));

        (owners, files)
    }

    pub fn build_report(
        &self,
        owner: &str,
        repo: &str,
        prs: &[PullRequestDetail],
        range: &DateRange,
        now: DateTime<Utc>,
    ) -> Report {
        let (owners, files) = self.aggregate(prs);

        let mut totals = Totals {
            owner_count: owners.len() as u64,
            file_count: files.len() as u64,
            ..Totals::default()
        };
        for row in &owners {
            totals.pr_count += row.pr_count;
            totals.lines_added += row.lines_added;
            totals.lines_deleted += row.lines_deleted;
            totals.files_changed += row.files_changed;
            totals.commits += row.commits;
        }

        let averages = ReportAverages {
            per_pr: Averages::per_pr(
                totals.lines_added,
                totals.lines_deleted,
                totals.files_changed,
                totals.commits,
                totals.pr_count,
            ),
            prs_per_owner: ratio(totals.pr_count, totals.owner_count),
        };

        Report {
            version: SCHEMA_VERSION,
            generated_at: now,
            owner: owner.to_string(),
            repo: repo.to_string(),
            period: period(prs, range, now),
            totals,
            averages,
            owners,
            files,
        }
    }
}

pub fn compare_owners(a: &ContributorAggregate, b: &ContributorAggregate, order: OwnerOrder) -> Ordering {
    let primary = match order {
        OwnerOrder::Changes => b
            .total_changes()
            .cmp(&a.total_changes())
            .then_with(|| b.pr_count.cmp(&a.pr_count)),
        OwnerOrder::Prs => b.pr_count.cmp(&a.pr_count),
    };
    primary.then_with(|| a.owner.cmp(&b.owner))
}

/// Explicit bounds win; otherwise the observed merge span, or epoch..now
/// when nothing merged.
pub fn period(prs: &[PullRequestDetail], range: &DateRange, now: DateTime<Utc>) -> Period {
    let merged = prs.iter().map(|pr| pr.summary.merged_at);
    let start = range
        .since
        .or_else(|| merged.clone().min())
        .unwrap_or_default();
    let end = range.until.or_else(|| merged.max()).unwrap_or(now);
    Period { start, end }
}
