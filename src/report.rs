use crate::aggregate::Aggregator;
use crate::cache::FileCache;
use crate::cli::{CommonArgs, ReportArgs};
use crate::config::{cache_dir, ReportConfig, SourceConfig};
use crate::fetch::Fetcher;
use crate::filter::FileFilter;
use crate::github::GitHubClient;
use crate::model::{ContributorAggregate, FileAggregate, Period, Report};
use anyhow::Context;
use chrono::Utc;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::fmt::{self, Write};
use std::time::Duration;
use tracing::info;

pub async fn exec(common: CommonArgs, args: ReportArgs) -> anyhow::Result<()> {
    let now = Utc::now();
    let config = ReportConfig::from_args(&args, now).context("Invalid report options")?;
    let filter = FileFilter::new(&config.filter).context("Invalid file filter")?;

    let source = GitHubClient::new(&SourceConfig::from_args(&common)).context("Failed to create GitHub client")?;
    let cache = cache_dir(&common).map(|dir| FileCache::new(dir, &common.owner, &common.repo));
    let fetcher = Fetcher::new(source, cache, config.fetch.clone()).with_progress(progress_bar(config.json));

    let details = fetcher
        .fetch(now)
        .await
        .with_context(|| format!("Failed to fetch pull requests for {}/{}", common.owner, common.repo))?;

    let report = Aggregator::new(&filter, config.order).build_report(
        &common.owner,
        &common.repo,
        &details,
        &config.fetch.range,
        now,
    );
    info!(
        prs = report.totals.pr_count,
        owners = report.totals.owner_count,
        files = report.totals.file_count,
        "report built"
    );

    if config.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let mut out = String::new();
        render(&mut out, &report, config.top)?;
        print!("{out}");
    }
    Ok(())
}

fn progress_bar(json: bool) -> ProgressBar {
    if json {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg} {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

pub fn render(out: &mut impl Write, report: &Report, top: usize) -> fmt::Result {
    writeln!(
        out,
        "{} {}/{}",
        style("Merged pull requests in").bold(),
        report.owner,
        report.repo
    )?;
    writeln!(out, "Period: {}", format_period(&report.period))?;

    if report.is_empty() {
        writeln!(out, "\nNo merged pull requests found")?;
        return Ok(());
    }

    writeln!(out)?;
    render_owners(out, &report.owners, top)?;
    writeln!(out)?;
    render_files(out, &report.files, top)?;
    writeln!(out)?;

    let t = &report.totals;
    let a = &report.averages;
    writeln!(out, "{}", style("Totals").bold())?;
    writeln!(
        out,
        "  {} PRs by {} owners touching {} files",
        t.pr_count, t.owner_count, t.file_count
    )?;
    writeln!(
        out,
        "  +{} / -{} lines, {} file changes, {} commits",
        t.lines_added, t.lines_deleted, t.files_changed, t.commits
    )?;
    writeln!(
        out,
        "  per PR: +{:.1} / -{:.1} lines, {:.1} files, {:.1} commits; {:.1} PRs per owner",
        a.per_pr.lines_added, a.per_pr.lines_deleted, a.per_pr.files_changed, a.per_pr.commits, a.prs_per_owner
    )
}

fn render_owners(out: &mut impl Write, owners: &[ContributorAggregate], top: usize) -> fmt::Result {
    writeln!(
        out,
        "{:<24} {:>5} {:>8} {:>8} {:>8} {:>6} {:>7} {:>10}",
        style("Owner").bold(),
        style("PRs").bold(),
        style("Added").bold(),
        style("Deleted").bold(),
        style("Changes").bold(),
        style("Files").bold(),
        style("Commits").bold(),
        style("Avg/PR").bold()
    )?;
    writeln!(out, "{}", "─".repeat(83))?;
    for o in owners.iter().take(top) {
        writeln!(
            out,
            "{:<24} {:>5} {:>8} {:>8} {:>8} {:>6} {:>7} {:>10.1}",
            o.owner,
            o.pr_count,
            o.lines_added,
            o.lines_deleted,
            o.total_changes(),
            o.files_changed,
            o.commits,
            o.averages.lines_added + o.averages.lines_deleted
        )?;
    }
    more(out, owners.len(), top, "owners")
}

fn render_files(out: &mut impl Write, files: &[FileAggregate], top: usize) -> fmt::Result {
    writeln!(
        out,
        "{:<50} {:>5} {:>8} {:>8} {:>8}",
        style("Path").bold(),
        style("PRs").bold(),
        style("Added").bold(),
        style("Deleted").bold(),
        style("Changes").bold()
    )?;
    writeln!(out, "{}", "─".repeat(83))?;
    for f in files.iter().take(top) {
        writeln!(
            out,
            "{:<50} {:>5} {:>8} {:>8} {:>8}",
            f.path, f.pr_count, f.lines_added, f.lines_deleted, f.changes
        )?;
    }
    more(out, files.len(), top, "files")
}

fn more(out: &mut impl Write, len: usize, top: usize, what: &str) -> fmt::Result {
    if len > top {
        writeln!(out, "... and {} more {what}", len - top)?;
    }
    Ok(())
}

fn format_period(period: &Period) -> String {
    format!(
        "{} .. {}",
        period.start.format("%Y-%m-%d %H:%M UTC"),
        period.end.format("%Y-%m-%d %H:%M UTC")
    )
}
