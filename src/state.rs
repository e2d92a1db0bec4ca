// FILE: src/state.rs
//! The catalog: the immutable result of the initial scan.
//!
//! Built once by the Librarian, then shared read-only (`Arc<Catalog>`) with
//! every filesystem callback. Nothing here is mutated after `finish()`.

use crate::core::taxonomy::Taxonomy;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A real audio file on disk.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceFile {
    pub path: PathBuf,
    pub size: u64,
}

impl SourceFile {
    pub fn base_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// The files carrying one group key, addressed by display name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Group {
    entries: BTreeMap<String, Arc<SourceFile>>,
}

impl Group {
    pub fn get(&self, name: &str) -> Option<&Arc<SourceFile>> {
        self.entries.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn files(&self) -> impl Iterator<Item = &Arc<SourceFile>> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Files are named in path order; a base name already taken gets the
    /// smallest free " (N)" suffix, e.g. "song.mp3" -> "song (1).mp3".
    fn from_files(files: BTreeSet<Arc<SourceFile>>) -> Self {
        let mut entries = BTreeMap::new();
        for file in files {
            let base = file.base_name();
            let mut name = base.clone();
            let mut n = 1;
            while entries.contains_key(&name) {
                name = numbered_name(&base, n);
                n += 1;
            }
            if name != base {
                tracing::debug!("[Catalog] Duplicate name {} for {} exposed as {}", base, file.path.display(), name);
            }
            entries.insert(name, file);
        }
        Self { entries }
    }
}

fn numbered_name(name: &str, n: usize) -> String {
    let path = Path::new(name);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(name);
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{} ({}).{}", stem, n, ext),
        None => format!("{} ({})", stem, n),
    }
}

/// Group key -> group, for one taxonomy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupIndex {
    groups: BTreeMap<String, Group>,
}

impl GroupIndex {
    pub fn get(&self, key: &str) -> Option<&Group> {
        self.groups.get(key)
    }

    /// Like `get`, also returning the catalog's own copy of the key.
    pub fn get_key_value(&self, key: &str) -> Option<(&str, &Group)> {
        self.groups.get_key_value(key).map(|(k, g)| (k.as_str(), g))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Group)> {
        self.groups.iter().map(|(k, g)| (k.as_str(), g))
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub indexed: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    source_root: PathBuf,
    indexes: [GroupIndex; 3],
    stats: ScanStats,
}

impl Catalog {
    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    pub fn index(&self, taxonomy: Taxonomy) -> &GroupIndex {
        &self.indexes[taxonomy.slot()]
    }

    pub fn group(&self, taxonomy: Taxonomy, key: &str) -> Option<&Group> {
        self.index(taxonomy).get(key)
    }

    pub fn stats(&self) -> ScanStats {
        self.stats
    }
}

/// Accumulates group membership during the scan.
#[derive(Debug)]
pub struct CatalogBuilder {
    source_root: PathBuf,
    groups: [BTreeMap<String, BTreeSet<Arc<SourceFile>>>; 3],
    stats: ScanStats,
}

impl CatalogBuilder {
    pub fn new(source_root: impl Into<PathBuf>) -> Self {
        Self {
            source_root: source_root.into(),
            groups: Default::default(),
            stats: ScanStats::default(),
        }
    }

    /// Adds `file` under `key` in `taxonomy`. Inserting the same file twice
    /// under one key is a no-op.
    pub fn insert(&mut self, taxonomy: Taxonomy, key: &str, file: Arc<SourceFile>) {
        self.groups[taxonomy.slot()]
            .entry(key.to_string())
            .or_default()
            .insert(file);
    }

    pub fn record_indexed(&mut self) {
        self.stats.indexed += 1;
    }

    pub fn record_skipped(&mut self) {
        self.stats.skipped += 1;
    }

    pub fn finish(self) -> Catalog {
        let indexes = self.groups.map(|groups| GroupIndex {
            groups: groups
                .into_iter()
                .map(|(key, files)| (key, Group::from_files(files)))
                .collect(),
        });
        Catalog {
            source_root: self.source_root,
            indexes,
            stats: self.stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str) -> Arc<SourceFile> {
        Arc::new(SourceFile { path: PathBuf::from(path), size: 1 })
    }

    #[test]
    fn test_numbered_name() {
        assert_eq!(numbered_name("song.mp3", 1), "song (1).mp3");
        assert_eq!(numbered_name("README", 2), "README (2)");
    }

    #[test]
    fn test_duplicate_base_names_are_suffixed_in_path_order() {
        let mut builder = CatalogBuilder::new("/src");
        builder.insert(Taxonomy::Genre, "Rock", file("/src/b/song.mp3"));
        builder.insert(Taxonomy::Genre, "Rock", file("/src/a/song.mp3"));
        builder.insert(Taxonomy::Genre, "Rock", file("/src/c/song.mp3"));
        let catalog = builder.finish();

        let group = catalog.group(Taxonomy::Genre, "Rock").unwrap();
        assert_eq!(group.names().collect::<Vec<_>>(), vec!["song (1).mp3", "song (2).mp3", "song.mp3"]);
        assert_eq!(group.get("song.mp3").unwrap().path, PathBuf::from("/src/a/song.mp3"));
        assert_eq!(group.get("song (1).mp3").unwrap().path, PathBuf::from("/src/b/song.mp3"));
        assert_eq!(group.get("song (2).mp3").unwrap().path, PathBuf::from("/src/c/song.mp3"));
    }

    #[test]
    fn test_suffix_skips_names_already_taken() {
        let mut builder = CatalogBuilder::new("/src");
        builder.insert(Taxonomy::Artist, "A", file("/src/1/x.mp3"));
        builder.insert(Taxonomy::Artist, "A", file("/src/2/x (1).mp3"));
        builder.insert(Taxonomy::Artist, "A", file("/src/3/x.mp3"));
        let catalog = builder.finish();

        let group = catalog.group(Taxonomy::Artist, "A").unwrap();
        assert_eq!(group.len(), 3);
        assert_eq!(group.get("x (1).mp3").unwrap().path, PathBuf::from("/src/2/x (1).mp3"));
        assert_eq!(group.get("x (2).mp3").unwrap().path, PathBuf::from("/src/3/x.mp3"));
    }

    #[test]
    fn test_insert_is_set_semantics() {
        let mut builder = CatalogBuilder::new("/src");
        builder.insert(Taxonomy::Year, "1999", file("/src/a.mp3"));
        builder.insert(Taxonomy::Year, "1999", file("/src/a.mp3"));
        let catalog = builder.finish();
        assert_eq!(catalog.group(Taxonomy::Year, "1999").unwrap().len(), 1);
    }

    #[test]
    fn test_same_key_text_in_different_taxonomies() {
        let mut builder = CatalogBuilder::new("/src");
        builder.insert(Taxonomy::Artist, "1999", file("/src/a.mp3"));
        builder.insert(Taxonomy::Year, "1999", file("/src/b.mp3"));
        let catalog = builder.finish();
        assert!(catalog.group(Taxonomy::Artist, "1999").unwrap().get("a.mp3").is_some());
        assert!(catalog.group(Taxonomy::Year, "1999").unwrap().get("b.mp3").is_some());
        assert!(catalog.group(Taxonomy::Genre, "1999").is_none());
    }
}
