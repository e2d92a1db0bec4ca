// FILE: src/extract/symphonia_tags.rs
//! Tag extraction backed by symphonia's format probe.
//!
//! Each tag is recorded under its raw container key (`TPE1`, `TCON`, ...) and,
//! when symphonia recognizes it, under a lower-case canonical name as well.
//! An ID3v1 trailer fills in whatever the leading tags left out.

use super::id3v1;
use super::{TagExtractor, TagMap};
use crate::error::{Result, TagFsError};
use std::fs::File;
use std::path::Path;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::{MetadataOptions, MetadataRevision, StandardTagKey, Tag, Value};
use symphonia::core::probe::Hint;

#[derive(Debug, Default, Clone, Copy)]
pub struct SymphoniaExtractor;

impl TagExtractor for SymphoniaExtractor {
    fn extract(&self, path: &Path) -> Result<TagMap> {
        let file = File::open(path)?;
        let trailer_source = file.try_clone()?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let mut probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| TagFsError::Extraction {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let mut tags = TagMap::new();

        // Tags found ahead of the stream (ID3v2) land in the probe metadata.
        if let Some(metadata) = probed.metadata.get() {
            if let Some(revision) = metadata.current() {
                collect_revision(revision, &mut tags);
            }
        }

        let metadata = probed.format.metadata();
        if let Some(revision) = metadata.current() {
            collect_revision(revision, &mut tags);
        }

        match id3v1::read_trailer(&trailer_source) {
            Ok(Some(v1)) => {
                for (key, value) in v1 {
                    tags.entry(key).or_insert(value);
                }
            }
            Ok(None) => {}
            Err(e) => tracing::debug!("[Extractor] No ID3v1 trailer read from {}: {}", path.display(), e),
        }

        tracing::trace!("[Extractor] {} -> {} fields", path.display(), tags.len());
        Ok(tags)
    }
}

fn collect_revision(revision: &MetadataRevision, tags: &mut TagMap) {
    for tag in revision.tags() {
        collect_tag(tag, tags);
    }
}

/// First occurrence of a key wins.
fn collect_tag(tag: &Tag, tags: &mut TagMap) {
    let Some(mut value) = text_value(&tag.value) else { return };
    if is_genre(tag) {
        value = id3v1::genre_name(&value);
    }

    if let Some(name) = tag.std_key.as_ref().and_then(canonical_name) {
        tags.entry(name.to_string()).or_insert_with(|| value.clone());
    }
    tags.entry(tag.key.clone()).or_insert(value);
}

fn is_genre(tag: &Tag) -> bool {
    matches!(tag.std_key, Some(StandardTagKey::Genre)) || tag.key == "TCON" || tag.key == "TCO"
}

fn text_value(value: &Value) -> Option<String> {
    match value {
        Value::Binary(_) | Value::Flag => None,
        other => Some(other.to_string()),
    }
}

fn canonical_name(key: &StandardTagKey) -> Option<&'static str> {
    let name = match key {
        StandardTagKey::Artist => "artist",
        StandardTagKey::AlbumArtist => "album_artist",
        StandardTagKey::Performer => "performer",
        StandardTagKey::Composer => "composer",
        StandardTagKey::Album => "album",
        StandardTagKey::TrackTitle => "title",
        StandardTagKey::Genre => "genre",
        StandardTagKey::Date => "date",
        StandardTagKey::ReleaseDate => "release_date",
        StandardTagKey::OriginalDate => "original_date",
        _ => return None,
    };
    Some(name)
}
