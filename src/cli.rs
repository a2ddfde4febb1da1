use crate::config::OwnerOrder;
use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "prstat")]
#[command(about = "Merged pull request statistics per contributor and per file")]
#[command(version)]
pub struct Cli {
    #[clap(flatten)]
    pub common: CommonArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Clone, Debug)]
pub struct CommonArgs {
    #[arg(long, env = "PRSTAT_OWNER", help = "Repository owner (user or organisation)")]
    pub owner: String,

    #[arg(long, env = "PRSTAT_REPO", help = "Repository name")]
    pub repo: String,

    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true, help = "Bearer token for the GitHub API")]
    pub token: Option<String>,

    #[arg(long, env = "GITHUB_API_URL", default_value = "https://api.github.com", help = "GitHub API base URL")]
    pub api_url: String,

    #[arg(long, env = "PRSTAT_CACHE_DIR", default_value = ".prstat-cache", help = "Directory for cached API payloads")]
    pub cache_dir: PathBuf,

    #[arg(long, help = "Disable the on-disk cache", default_value_t = false)]
    pub no_cache: bool,

    #[arg(long, default_value = "30s", help = "HTTP request timeout (e.g. 30s, 2m)")]
    pub timeout: humantime::Duration,

    #[arg(short, long, action = clap::ArgAction::Count, global = true, help = "Increase log verbosity (-v, -vv)")]
    pub verbose: u8,
}

#[derive(Args, Clone, Debug)]
pub struct ReportArgs {
    #[arg(long, help = "Only PRs merged at or after this date (RFC3339, YYYY-MM-DD, today, yesterday, '<duration> ago')")]
    pub since: Option<String>,

    #[arg(long, help = "Only PRs merged at or before this date (same formats as --since)")]
    pub until: Option<String>,

    #[arg(long, conflicts_with_all = ["since", "until"], help = "Report on the previous Monday..Sunday")]
    pub last_week: bool,

    #[arg(long, value_parser = clap::value_parser!(u32).range(1..), help = "Stop after this many merged PRs (newest first)")]
    pub limit: Option<u32>,

    #[arg(long, allow_negative_numbers = true, help = "Concurrent PR fetches (default 6, max 25)")]
    pub concurrency: Option<i64>,

    #[arg(long = "ignore", value_name = "GLOB", help = "Exclude files matching this glob (repeatable)")]
    pub ignore: Vec<String>,

    #[arg(long = "ext", value_name = "EXT", value_delimiter = ',', default_values = [".ts", ".tsx"], help = "Only count files with these extensions")]
    pub ext: Vec<String>,

    #[arg(long, help = "Count files of every extension", default_value_t = false)]
    pub all_files: bool,

    #[arg(long, value_enum, default_value_t = OwnerOrder::Changes, help = "Owner table ordering")]
    pub sort: OwnerOrder,

    #[arg(long, default_value_t = 20, help = "Rows shown per table")]
    pub top: usize,

    #[arg(long, help = "Output as JSON")]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Aggregate merged PRs into owner and file tables
    Report(ReportArgs),
    /// Inspect a single pull request
    Pr {
        #[arg(help = "Pull request number")]
        number: u64,

        #[arg(long = "ignore", value_name = "GLOB", help = "Mark files matching this glob as excluded")]
        ignore: Vec<String>,

        #[arg(long = "ext", value_name = "EXT", value_delimiter = ',', help = "Mark files without these extensions as excluded")]
        ext: Vec<String>,

        #[arg(long, help = "Output as JSON")]
        json: bool,
    },
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Report(args) => crate::report::exec(self.common, args).await,
            Commands::Pr { number, ignore, ext, json } => {
                crate::inspect::exec(self.common, number, ignore, ext, json).await
            }
        }
    }
}
