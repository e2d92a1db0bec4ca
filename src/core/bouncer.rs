// FILE: src/core/bouncer.rs
//! The Bouncer: decides which files on disk get into the catalog.
//!
//! Only regular files whose extension is in the configured audio set are
//! admitted. Matching is case-insensitive; a leading dot in the configured
//! extension is tolerated.

use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct Bouncer {
    extensions: HashSet<String>,
}

impl Bouncer {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .map(|e| e.as_ref().trim().trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        Self { extensions }
    }

    /// Decides by name alone whether `path` looks like a recognized audio file.
    pub fn admits(&self, path: &Path) -> bool {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => self.extensions.contains(&ext.to_lowercase()),
            None => false,
        }
    }
}
