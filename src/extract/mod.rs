// FILE: src/extract/mod.rs
//! Tag extraction: the narrow contract between the catalog and whatever reads
//! metadata out of audio bytes.

pub mod id3v1;
pub mod symphonia_tags;

use crate::error::Result;
use std::collections::HashMap;
use std::path::Path;

pub use symphonia_tags::SymphoniaExtractor;

/// Field name -> text value, as reported by an extractor.
pub type TagMap = HashMap<String, String>;

pub trait TagExtractor: Send + Sync {
    /// Reads every tag of the file at `path`.
    ///
    /// An error means the file could not be parsed at all; missing fields are
    /// simply absent from the map.
    fn extract(&self, path: &Path) -> Result<TagMap>;
}

/// Test extractor reading `key=value` lines. A file starting with `!corrupt`
/// fails extraction.
#[cfg(test)]
pub(crate) struct KeyValueExtractor;

#[cfg(test)]
impl TagExtractor for KeyValueExtractor {
    fn extract(&self, path: &Path) -> Result<TagMap> {
        let content = std::fs::read_to_string(path)?;
        if content.starts_with("!corrupt") {
            return Err(crate::error::TagFsError::Extraction {
                path: path.to_path_buf(),
                reason: "corrupt fixture".into(),
            });
        }
        Ok(content
            .lines()
            .filter_map(|line| line.split_once('='))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect())
    }
}
