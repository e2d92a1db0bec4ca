// FILE: src/librarian.rs
//! The Librarian: walks the source tree once and files every audio file
//! under one group key per taxonomy.

use crate::config::Config;
use crate::core::bouncer::Bouncer;
use crate::core::metadata::MetadataResolver;
use crate::core::taxonomy::Taxonomy;
use crate::error::{Result, TagFsError};
use crate::extract::TagExtractor;
use crate::state::{Catalog, CatalogBuilder, SourceFile};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

pub struct Librarian<'a> {
    bouncer: Bouncer,
    resolver: MetadataResolver,
    extractor: &'a dyn TagExtractor,
}

impl<'a> Librarian<'a> {
    pub fn new(config: &Config, extractor: &'a dyn TagExtractor) -> Self {
        Self {
            bouncer: Bouncer::new(&config.extensions),
            resolver: MetadataResolver::new(config.fields.clone()),
            extractor,
        }
    }

    /// Builds the catalog for `root`.
    ///
    /// Fails only when `root` itself cannot be scanned. Unreadable entries and
    /// files whose tags cannot be extracted are logged and left out.
    pub fn scan(&self, root: &Path) -> Result<Catalog> {
        let meta = std::fs::metadata(root)
            .map_err(|e| TagFsError::InvalidSource(format!("{}: {}", root.display(), e)))?;
        if !meta.is_dir() {
            return Err(TagFsError::InvalidSource(format!("{} is not a directory", root.display())));
        }
        // Probe readability up front so a vanished or locked root aborts the scan.
        std::fs::read_dir(root)
            .map_err(|e| TagFsError::InvalidSource(format!("{}: {}", root.display(), e)))?;

        tracing::info!("[Librarian] 🚀 Starting scan of {}", root.display());
        let started = Instant::now();
        let mut builder = CatalogBuilder::new(root);

        for entry in walkdir::WalkDir::new(root).follow_links(false).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("[Librarian] Skipping unreadable entry: {}", e);
                    continue;
                }
            };

            let path = entry.path();
            if !self.bouncer.admits(path) {
                continue;
            }

            // Symlinks count when they point at a regular file.
            let meta = match std::fs::metadata(path) {
                Ok(meta) => meta,
                Err(e) => {
                    tracing::warn!("[Librarian] Skipping {}: {}", path.display(), e);
                    continue;
                }
            };
            if !meta.is_file() {
                continue;
            }

            let tags = match self.extractor.extract(path) {
                Ok(tags) => tags,
                Err(e) => {
                    tracing::warn!("[Librarian] Tag extraction failed, leaving out {}: {}", path.display(), e);
                    builder.record_skipped();
                    continue;
                }
            };

            let keys = self.resolver.resolve_all(&tags);
            let file = Arc::new(SourceFile {
                path: path.to_path_buf(),
                size: meta.len(),
            });
            for taxonomy in Taxonomy::ALL {
                builder.insert(taxonomy, keys.get(taxonomy), Arc::clone(&file));
            }
            builder.record_indexed();
            tracing::debug!(
                "[Librarian] {} -> {} | {} | {}",
                path.display(),
                keys.get(Taxonomy::Artist),
                keys.get(Taxonomy::Genre),
                keys.get(Taxonomy::Year)
            );
        }

        let catalog = builder.finish();
        let stats = catalog.stats();
        tracing::info!(
            "[Librarian] Scan complete in {:?}: {} indexed, {} skipped, {} artists, {} genres, {} years",
            started.elapsed(),
            stats.indexed,
            stats.skipped,
            catalog.index(Taxonomy::Artist).len(),
            catalog.index(Taxonomy::Genre).len(),
            catalog.index(Taxonomy::Year).len()
        );
        Ok(catalog)
    }
}
