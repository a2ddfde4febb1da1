use crate::cache::FileCache;
use crate::cli::CommonArgs;
use crate::config::{cache_dir, normalize_extension, FetchOptions, FilterConfig, SourceConfig};
use crate::fetch::Fetcher;
use crate::filter::FileFilter;
use crate::github::{GitHubClient, GitHubComment, GitHubPull, GitHubPullFile, PullRequestSource};
use crate::model::FileChangeRecord;
use anyhow::Context;
use chrono::{DateTime, Utc};
use console::style;
use serde::Serialize;
use std::fmt::{self, Write};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PullInspection {
    pub number: u64,
    pub title: String,
    pub url: String,
    pub author: String,
    pub merged_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub additions: u64,
    pub deletions: u64,
    pub changed_files: u64,
    pub commits: u64,
    pub files: Vec<InspectedFile>,
    pub comments: Vec<InspectedComment>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InspectedFile {
    #[serde(flatten)]
    pub change: FileChangeRecord,
    pub counted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InspectedComment {
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub body: String,
}

pub async fn exec(
    common: CommonArgs,
    number: u64,
    ignore: Vec<String>,
    ext: Vec<String>,
    json: bool,
) -> anyhow::Result<()> {
    let filter = FileFilter::new(&FilterConfig {
        ignore,
        extensions: ext.iter().map(|e| normalize_extension(e)).collect(),
    })
    .context("Invalid file filter")?;

    let source = GitHubClient::new(&SourceConfig::from_args(&common)).context("Failed to create GitHub client")?;
    let cache = cache_dir(&common).map(|dir| FileCache::new(dir, &common.owner, &common.repo));
    let fetcher = Fetcher::new(source, cache, FetchOptions::default());

    let inspection = inspect(&fetcher, number, &filter)
        .await
        .with_context(|| format!("Failed to load pull request #{number}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&inspection)?);
    } else {
        let mut out = String::new();
        render(&mut out, &inspection)?;
        print!("{out}");
    }
    Ok(())
}

/// Comments are always fetched live; detail and files go through the cache.
pub async fn inspect<S: PullRequestSource>(
    fetcher: &Fetcher<S>,
    number: u64,
    filter: &FileFilter,
) -> crate::error::Result<PullInspection> {
    let pull = fetcher.pull(number).await?;
    let files = fetcher.files(number, pull.merged_at.is_some()).await?;
    let comments = fetcher.source().list_comments(number).await?;
    Ok(build(pull, files, comments, filter))
}

fn build(pull: GitHubPull, files: Vec<GitHubPullFile>, comments: Vec<GitHubComment>, filter: &FileFilter) -> PullInspection {
    let files = files
        .into_iter()
        .map(FileChangeRecord::from)
        .map(|change| InspectedFile {
            counted: filter.accepts(&change.path),
            change,
        })
        .collect();
    let comments = comments
        .into_iter()
        .map(|c| InspectedComment {
            author: c.author().to_string(),
            created_at: c.created_at,
            body: c.body,
        })
        .collect();

    PullInspection {
        author: pull.author().to_string(),
        number: pull.number,
        title: pull.title,
        url: pull.html_url,
        merged_at: pull.merged_at,
        updated_at: pull.updated_at,
        additions: pull.additions,
        deletions: pull.deletions,
        changed_files: pull.changed_files,
        commits: pull.commits,
        files,
        comments,
    }
}

pub fn render(out: &mut impl Write, pr: &PullInspection) -> fmt::Result {
    writeln!(out, "{} {}", style(format!("#{}", pr.number)).bold(), pr.title)?;
    writeln!(out, "  {}", pr.url)?;
    writeln!(out, "  author:  {}", pr.author)?;
    let merged = pr
        .merged_at
        .map(|m| m.to_rfc3339())
        .unwrap_or_else(|| "not merged".to_string());
    writeln!(out, "  merged:  {merged}")?;
    writeln!(
        out,
        "  +{} / -{} in {} files, {} commits",
        pr.additions, pr.deletions, pr.changed_files, pr.commits
    )?;

    writeln!(
        out,
        "\n  {:<58} {:>8} {:>8} {:>8}",
        style("File").bold(),
        style("Added").bold(),
        style("Deleted").bold(),
        style("Changes").bold()
    )?;
    for f in &pr.files {
        let marker = if f.counted { style("+").green() } else { style("-").dim() };
        writeln!(
            out,
            "{marker} {:<58} {:>8} {:>8} {:>8}",
            f.change.path, f.change.additions, f.change.deletions, f.change.changes
        )?;
    }

    writeln!(out, "\n{} ({})", style("Comments").bold(), pr.comments.len())?;
    for c in &pr.comments {
        writeln!(out, "  {} at {}", style(&c.author).cyan(), c.created_at.format("%Y-%m-%d %H:%M"))?;
        for line in c.body.lines() {
            writeln!(out, "    {line}")?;
        }
    }
    Ok(())
}
