// FILE: src/core/taxonomy.rs
//! The three fixed grouping dimensions of the virtual tree.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Taxonomy {
    Artist,
    Genre,
    Year,
}

impl Taxonomy {
    /// Every taxonomy, in listing order.
    pub const ALL: [Taxonomy; 3] = [Taxonomy::Artist, Taxonomy::Genre, Taxonomy::Year];

    /// Name of the top-level directory for this taxonomy.
    pub fn segment(self) -> &'static str {
        match self {
            Taxonomy::Artist => "Artist",
            Taxonomy::Genre => "Genre",
            Taxonomy::Year => "Year",
        }
    }

    pub fn from_segment(segment: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.segment() == segment)
    }

    /// Key used when a file carries no usable value for this taxonomy.
    pub fn fallback_key(self) -> &'static str {
        match self {
            Taxonomy::Artist => "no artist",
            Taxonomy::Genre => "no genre",
            Taxonomy::Year => "no date",
        }
    }

    pub(crate) fn slot(self) -> usize {
        match self {
            Taxonomy::Artist => 0,
            Taxonomy::Genre => 1,
            Taxonomy::Year => 2,
        }
    }
}

impl fmt::Display for Taxonomy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.segment())
    }
}
