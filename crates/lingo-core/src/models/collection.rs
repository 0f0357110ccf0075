//! Collection model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// One of the two remote collections mirrored by the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    /// Vocabulary entries (words the learner studies)
    Vocabularies,
    /// Learning resources (articles, videos, links)
    Resources,
}

impl Collection {
    /// All collections in sync priority order. Vocabularies drive most screens,
    /// so they are synced first.
    pub const ALL: [Self; 2] = [Self::Vocabularies, Self::Resources];

    /// Stable wire name, also used as the remote path segment.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Vocabularies => "vocabularies",
            Self::Resources => "resources",
        }
    }

    /// Local table holding this collection's cached items.
    #[must_use]
    pub const fn table_name(self) -> &'static str {
        self.as_str()
    }

    /// Name of the local-only flag for this collection.
    #[must_use]
    pub const fn local_flag_name(self) -> &'static str {
        match self {
            Self::Vocabularies => "is_favorite",
            Self::Resources => "is_bookmarked",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vocabularies" | "vocabulary" | "vocab" => Ok(Self::Vocabularies),
            "resources" | "resource" => Ok(Self::Resources),
            other => Err(Error::InvalidInput(format!("Unknown collection: {other}"))),
        }
    }
}
