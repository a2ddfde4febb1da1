use crate::config::{normalize_extension, FilterConfig};
use crate::error::Result;
use crate::model::FileChangeRecord;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::collections::BTreeSet;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct FileFilter {
    ignore: Option<GlobSet>,
    extensions: BTreeSet<String>,
}

impl FileFilter {
    /// Builds the filter; an invalid glob is a configuration error.
    pub fn new(config: &FilterConfig) -> Result<Self> {
        let patterns: Vec<&str> = config
            .ignore
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .collect();

        let ignore = if patterns.is_empty() {
            None
        } else {
            let mut builder = GlobSetBuilder::new();
            for pattern in patterns {
                // `*` stays within one path segment; wildcards match dot files.
                builder.add(GlobBuilder::new(pattern).literal_separator(true).build()?);
            }
            Some(builder.build()?)
        };

        let extensions = config
            .extensions
            .iter()
            .filter(|e| !e.trim().is_empty())
            .map(|e| normalize_extension(e))
            .collect();

        Ok(Self { ignore, extensions })
    }

    /// Passes everything.
    pub fn allow_all() -> Self {
        Self {
            ignore: None,
            extensions: BTreeSet::new(),
        }
    }

    pub fn accepts(&self, path: &str) -> bool {
        !self.is_ignored(path) && self.has_allowed_extension(path)
    }

    pub fn is_ignored(&self, path: &str) -> bool {
        self.ignore.as_ref().is_some_and(|set| set.is_match(path))
    }

    pub fn has_allowed_extension(&self, path: &str) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        extension_of(path).is_some_and(|ext| self.extensions.contains(&ext))
    }

    /// The filtered file set of one PR.
    pub fn filter_files<'a>(&self, files: &'a [FileChangeRecord]) -> Vec<&'a FileChangeRecord> {
        files.iter().filter(|f| self.accepts(&f.path)).collect()
    }
}

/// Lower-cased extension with its leading dot, e.g. `.tsx`.
pub fn extension_of(path: &str) -> Option<String> {
    Path::new(path)
        .extension()
        .and_then(|s| s.to_str())
        .map(|ext| format!(".{}", ext.to_lowercase()))
}
