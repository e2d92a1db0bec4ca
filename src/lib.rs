//! TagFS: a read-only tag view of a music library
//!
//! One process, three parts:
//! - Librarian (walks the source tree once and builds the catalog)
//! - VirtualFs (answers every filesystem operation by path)
//! - Hollow Drive (FUSE loop, maps inodes to paths and hands reads to tokio)

pub mod config;
pub mod core;
pub mod error;
pub mod extract;
pub mod hollow_drive;
pub mod librarian;
pub mod state;
pub mod virtual_fs;

pub use config::Config;
pub use crate::core::taxonomy::Taxonomy;
pub use error::{FsError, Result, TagFsError};
pub use state::{Catalog, SourceFile};
