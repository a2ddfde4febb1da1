use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PrStatError>;

#[derive(Error, Debug)]
pub enum PrStatError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: status {status} from {url}")]
    Api { status: u16, url: String },
    #[error("Cache error: {0}")]
    Cache(String),
    #[error("Corrupt cache entry {}: {source}", path.display())]
    CacheCorrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid date: {0}")]
    InvalidDate(String),
    #[error("Invalid glob pattern: {0}")]
    Glob(#[from] globset::Error),
}
