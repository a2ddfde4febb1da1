use crate::cli::{CommonArgs, ReportArgs};
use crate::error::{PrStatError, Result};
use crate::model::DateRange;
use crate::util::{last_week, parse_date, Bound};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_CONCURRENCY: usize = 6;
pub const MAX_CONCURRENCY: usize = 25;
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Caps in-flight fetches to `[1, MAX_CONCURRENCY]`; absent or
/// non-positive values fall back to the default.
pub fn clamp_concurrency(requested: Option<i64>) -> usize {
    match requested {
        Some(n) if n >= 1 => (n as u64).min(MAX_CONCURRENCY as u64) as usize,
        _ => DEFAULT_CONCURRENCY,
    }
}

/// Lower-cases an extension and makes sure it carries its leading dot.
pub fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim().to_lowercase();
    if ext.starts_with('.') {
        ext
    } else {
        format!(".{ext}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OwnerOrder {
    /// Total changed lines, then PR count, then login.
    #[default]
    Changes,
    /// PR count, then login.
    Prs,
}

#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub owner: String,
    pub repo: String,
    pub api_url: String,
    pub token: Option<String>,
    pub timeout: Duration,
}

impl SourceConfig {
    pub fn from_args(common: &CommonArgs) -> Self {
        Self {
            owner: common.owner.clone(),
            repo: common.repo.clone(),
            api_url: common.api_url.clone(),
            token: common.token.clone().filter(|t| !t.trim().is_empty()),
            timeout: *common.timeout,
        }
    }
}

/// Cache directory to use, or `None` when caching is disabled.
pub fn cache_dir(common: &CommonArgs) -> Option<PathBuf> {
    if common.no_cache {
        None
    } else {
        Some(common.cache_dir.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    pub range: DateRange,
    pub limit: Option<usize>,
    pub concurrency: usize,
    pub page_size: u32,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            range: DateRange::new(),
            limit: None,
            concurrency: DEFAULT_CONCURRENCY,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterConfig {
    pub ignore: Vec<String>,
    pub extensions: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ReportConfig {
    pub fetch: FetchOptions,
    pub filter: FilterConfig,
    pub order: OwnerOrder,
    pub top: usize,
    pub json: bool,
}

impl ReportConfig {
    pub fn from_args(args: &ReportArgs, now: DateTime<Utc>) -> Result<Self> {
        let range = resolve_range(args, now)?;

        let extensions = if args.all_files {
            Vec::new()
        } else {
            args.ext.iter().map(|e| normalize_extension(e)).collect()
        };

        Ok(Self {
            fetch: FetchOptions {
                range,
                limit: args.limit.map(|l| l as usize),
                concurrency: clamp_concurrency(args.concurrency),
                page_size: DEFAULT_PAGE_SIZE,
            },
            filter: FilterConfig {
                ignore: args.ignore.clone(),
                extensions,
            },
            order: args.sort,
            top: args.top,
            json: args.json,
        })
    }
}

fn resolve_range(args: &ReportArgs, now: DateTime<Utc>) -> Result<DateRange> {
    if args.last_week {
        let (since, until) = last_week(now);
        return Ok(DateRange::new().with_since(since).with_until(until));
    }

    let since = args
        .since
        .as_deref()
        .map(|s| parse_date(s, Bound::Start, now))
        .transpose()?;
    let until = args
        .until
        .as_deref()
        .map(|u| parse_date(u, Bound::End, now))
        .transpose()?;

    if let (Some(s), Some(u)) = (since, until) {
        if s > u {
            return Err(PrStatError::InvalidDate(format!(
                "Invalid range: since ({s}) is after until ({u})"
            )));
        }
    }

    let mut range = DateRange::new();
    if let Some(s) = since {
        range = range.with_since(s);
    }
    if let Some(u) = until {
        range = range.with_until(u);
    }
    Ok(range)
}
