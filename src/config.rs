// FILE: src/config.rs
//! Runtime configuration.
//!
//! Every field has a default, so an empty JSON object (or no file at all) is
//! a valid configuration.

use crate::core::taxonomy::Taxonomy;
use crate::error::{Result, TagFsError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_DIR_NAME: &str = "tagfs";
const CONFIG_FILE_NAME: &str = "config.json";

/// How the mount root presents the three taxonomies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RootListing {
    /// One `<Taxonomy>/<key>` entry per group.
    Flattened,
    /// One directory per taxonomy.
    Taxonomies,
}

/// Candidate metadata fields per taxonomy, most specific first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldCandidates {
    pub artist: Vec<String>,
    pub genre: Vec<String>,
    pub year: Vec<String>,
}

impl FieldCandidates {
    pub fn for_taxonomy(&self, taxonomy: Taxonomy) -> &[String] {
        match taxonomy {
            Taxonomy::Artist => &self.artist,
            Taxonomy::Genre => &self.genre,
            Taxonomy::Year => &self.year,
        }
    }
}

impl Default for FieldCandidates {
    fn default() -> Self {
        let owned = |fields: &[&str]| fields.iter().map(|f| f.to_string()).collect();
        Self {
            artist: owned(&["artist", "TPE1"]),
            genre: owned(&["genre", "TCON"]),
            year: owned(&["release_date", "date", "TDRC", "TYER", "original_date"]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Recognized audio file extensions, matched case-insensitively.
    pub extensions: Vec<String>,
    pub fields: FieldCandidates,
    pub root_listing: RootListing,
    /// Serve real files addressed by their path relative to the source root.
    pub passthrough: bool,
    pub attr_ttl_secs: u64,
    pub allow_other: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            extensions: vec!["mp3".to_string()],
            fields: FieldCandidates::default(),
            root_listing: RootListing::Flattened,
            passthrough: true,
            attr_ttl_secs: 1,
            allow_other: false,
        }
    }
}

impl Config {
    /// Loads `explicit` if given, else the per-user config file if it exists,
    /// else the defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        match Self::default_path() {
            Some(path) if path.is_file() => {
                tracing::info!("[Config] Loading {}", path.display());
                Self::from_file(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| TagFsError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config = Self::from_json(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    pub fn validate(&self) -> Result<()> {
        if self.extensions.iter().all(|e| e.trim().trim_start_matches('.').is_empty()) {
            return Err(TagFsError::Config("at least one audio extension is required".into()));
        }
        Ok(())
    }
}
