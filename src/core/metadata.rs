// FILE: src/core/metadata.rs
//! Metadata Resolver: turns a file's raw tag map into one group key per taxonomy.

use crate::config::FieldCandidates;
use crate::core::taxonomy::Taxonomy;
use crate::extract::TagMap;

/// Group keys for one file, addressed by taxonomy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupKeys([String; 3]);

impl GroupKeys {
    pub fn get(&self, taxonomy: Taxonomy) -> &str {
        &self.0[taxonomy.slot()]
    }
}

#[derive(Debug, Clone, Default)]
pub struct MetadataResolver {
    fields: FieldCandidates,
}

impl MetadataResolver {
    pub fn new(fields: FieldCandidates) -> Self {
        Self { fields }
    }

    pub fn resolve_all(&self, tags: &TagMap) -> GroupKeys {
        GroupKeys(Taxonomy::ALL.map(|t| self.resolve(tags, t)))
    }

    /// Picks the first usable candidate field, normalizes it, or falls back.
    pub fn resolve(&self, tags: &TagMap, taxonomy: Taxonomy) -> String {
        let picked = self
            .fields
            .for_taxonomy(taxonomy)
            .iter()
            .filter_map(|field| tags.get(field))
            .find_map(|value| usable(value));

        let normalized = match (taxonomy, picked) {
            (Taxonomy::Year, Some(value)) => year_part(value),
            (_, picked) => picked.map(sanitize),
        };

        normalized.unwrap_or_else(|| taxonomy.fallback_key().to_string())
    }
}

fn usable(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        return None;
    }
    Some(trimmed)
}

/// "1999-05-01" -> "1999"
fn year_part(value: &str) -> Option<String> {
    let year = value.split('-').next().unwrap_or_default();
    usable(year).map(sanitize)
}

/// Keys must stay a single path segment.
fn sanitize(value: &str) -> String {
    value.replace(['/', '\0'], "_")
}
