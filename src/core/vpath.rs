// FILE: src/core/vpath.rs
//! Virtual path parsing and resolution.
//!
//! ```text
//! /                        root
//! /<Taxonomy>              taxonomy directory
//! /<Taxonomy>/<key>        group directory
//! /<Taxonomy>/<key>/<name> leaf, backed by a real file
//! /<relative real path>    pass-through to a file under the source root
//! ```

use crate::core::taxonomy::Taxonomy;
use crate::state::{Catalog, Group};
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VirtualPath<'p> {
    Root,
    Taxonomy(Taxonomy),
    Group { taxonomy: Taxonomy, key: &'p str },
    Leaf { taxonomy: Taxonomy, key: &'p str, name: &'p str },
    /// Anything else, relative to the source root.
    Real(&'p str),
}

impl<'p> VirtualPath<'p> {
    pub fn parse(path: &'p str) -> Self {
        let rel = path.trim_start_matches('/').trim_end_matches('/');
        if rel.is_empty() {
            return VirtualPath::Root;
        }

        let segments: Vec<&'p str> = rel.split('/').collect();
        let Some(taxonomy) = Taxonomy::from_segment(segments[0]) else {
            return VirtualPath::Real(rel);
        };

        match segments[1..] {
            [] => VirtualPath::Taxonomy(taxonomy),
            [key] if !key.is_empty() => VirtualPath::Group { taxonomy, key },
            [key, name] if !key.is_empty() && !name.is_empty() => VirtualPath::Leaf { taxonomy, key, name },
            _ => VirtualPath::Real(rel),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved<'c> {
    Root,
    Taxonomy(Taxonomy),
    Group { taxonomy: Taxonomy, key: &'c str, group: &'c Group },
    /// A leaf or pass-through path; `real` is the file that serves its bytes.
    File { real: PathBuf },
}

impl Resolved<'_> {
    pub fn is_dir(&self) -> bool {
        !matches!(self, Resolved::File { .. })
    }
}

pub struct PathResolver<'c> {
    catalog: &'c Catalog,
    passthrough: bool,
}

impl<'c> PathResolver<'c> {
    pub fn new(catalog: &'c Catalog, passthrough: bool) -> Self {
        Self { catalog, passthrough }
    }

    /// Classifies `path`. `None` means not found.
    pub fn resolve(&self, path: &str) -> Option<Resolved<'c>> {
        self.resolve_structured(VirtualPath::parse(path))
            .or_else(|| self.resolve_real(path.trim_start_matches('/').trim_end_matches('/')))
    }

    fn resolve_structured(&self, vpath: VirtualPath<'_>) -> Option<Resolved<'c>> {
        match vpath {
            VirtualPath::Root => Some(Resolved::Root),
            VirtualPath::Taxonomy(taxonomy) => Some(Resolved::Taxonomy(taxonomy)),
            VirtualPath::Group { taxonomy, key } => {
                let (key, group) = self.catalog.index(taxonomy).get_key_value(key)?;
                Some(Resolved::Group { taxonomy, key, group })
            }
            VirtualPath::Leaf { taxonomy, key, name } => {
                let file = self.catalog.group(taxonomy, key)?.get(name)?;
                Some(Resolved::File { real: file.path.clone() })
            }
            VirtualPath::Real(_) => None,
        }
    }

    /// Pass-through: a regular file under the source root, never above it.
    /// Symlinks are followed only while their target stays inside the root.
    fn resolve_real(&self, rel: &str) -> Option<Resolved<'c>> {
        if !self.passthrough || rel.is_empty() {
            return None;
        }
        let rel = Path::new(rel);
        if !rel.components().all(|c| matches!(c, Component::Normal(_))) {
            return None;
        }
        let real = self.catalog.source_root().join(rel);
        let meta = std::fs::metadata(&real).ok()?;
        if !meta.is_file() {
            return None;
        }

        let root = std::fs::canonicalize(self.catalog.source_root()).ok()?;
        let target = std::fs::canonicalize(&real).ok()?;
        if !target.starts_with(&root) {
            tracing::debug!("[PathResolver] {} leaves the source root, not served", real.display());
            return None;
        }
        Some(Resolved::File { real })
    }
}
