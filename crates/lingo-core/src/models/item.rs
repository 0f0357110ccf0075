//! Cached item model

use serde::{Deserialize, Serialize};

use super::collection::Collection;

/// A word or phrase the learner studies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vocabulary {
    /// The word itself
    pub word: String,
    /// Meaning in the learner's language
    pub translation: Option<String>,
    /// Phonetic spelling
    pub pronunciation: Option<String>,
    /// Part of speech, used as the category filter
    pub part_of_speech: Option<String>,
    /// Difficulty level (e.g. "A1", "B2")
    pub level: Option<String>,
    /// Example sentences
    pub examples: Vec<String>,
    /// Related words
    pub synonyms: Vec<String>,
}

impl Vocabulary {
    /// Create a vocabulary body with only the required word.
    #[must_use]
    pub fn new(word: impl Into<String>) -> Self {
        Self {
            word: word.into(),
            translation: None,
            pronunciation: None,
            part_of_speech: None,
            level: None,
            examples: Vec::new(),
            synonyms: Vec::new(),
        }
    }
}

/// An external learning resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Display title
    pub title: String,
    /// Short description
    pub description: Option<String>,
    /// Link to the resource
    pub url: Option<String>,
    /// Resource category (e.g. "video", "article")
    pub category: Option<String>,
    /// Free-form tags
    pub tags: Vec<String>,
}

impl Resource {
    /// Create a resource body with only the required title.
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            url: None,
            category: None,
            tags: Vec::new(),
        }
    }
}

/// Domain fields of a cached item, one variant per collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemBody {
    Vocabulary(Vocabulary),
    Resource(Resource),
}

impl ItemBody {
    /// Collection this body belongs to.
    #[must_use]
    pub const fn collection(&self) -> Collection {
        match self {
            Self::Vocabulary(_) => Collection::Vocabularies,
            Self::Resource(_) => Collection::Resources,
        }
    }
}

/// An item mirrored from a remote collection, plus its local-only flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheItem {
    /// Stable remote identifier
    pub id: String,
    /// Creation timestamp (Unix ms), orders full-sync pagination
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
    /// Favorite (vocabularies) or bookmark (resources). Never sourced remotely.
    pub local_flag: bool,
    /// Domain fields
    pub body: ItemBody,
}

impl CacheItem {
    /// Create an item with the local flag cleared.
    #[must_use]
    pub fn new(id: impl Into<String>, created_at: i64, updated_at: i64, body: ItemBody) -> Self {
        Self {
            id: id.into(),
            created_at,
            updated_at,
            local_flag: false,
            body,
        }
    }

    /// Shorthand for a vocabulary item.
    #[must_use]
    pub fn vocabulary(id: impl Into<String>, created_at: i64, updated_at: i64, body: Vocabulary) -> Self {
        Self::new(id, created_at, updated_at, ItemBody::Vocabulary(body))
    }

    /// Shorthand for a resource item.
    #[must_use]
    pub fn resource(id: impl Into<String>, created_at: i64, updated_at: i64, body: Resource) -> Self {
        Self::new(id, created_at, updated_at, ItemBody::Resource(body))
    }

    #[must_use]
    pub const fn collection(&self) -> Collection {
        self.body.collection()
    }

    /// Primary searchable text (word or title).
    #[must_use]
    pub fn primary_text(&self) -> &str {
        match &self.body {
            ItemBody::Vocabulary(vocabulary) => &vocabulary.word,
            ItemBody::Resource(resource) => &resource.title,
        }
    }

    /// Secondary searchable text (translation or description).
    #[must_use]
    pub fn secondary_text(&self) -> Option<&str> {
        match &self.body {
            ItemBody::Vocabulary(vocabulary) => vocabulary.translation.as_deref(),
            ItemBody::Resource(resource) => resource.description.as_deref(),
        }
    }

    /// Value used by category filters.
    #[must_use]
    pub fn category(&self) -> Option<&str> {
        match &self.body {
            ItemBody::Vocabulary(vocabulary) => vocabulary.part_of_speech.as_deref(),
            ItemBody::Resource(resource) => resource.category.as_deref(),
        }
    }
}

/// Optional predicates for cache reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFilter {
    /// Case-insensitive substring over the primary and secondary text
    pub search: Option<String>,
    /// Exact category match
    pub category: Option<String>,
    /// Only items whose local flag equals this value
    pub local_flag: Option<bool>,
}

impl ItemFilter {
    #[must_use]
    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    #[must_use]
    pub const fn with_local_flag(mut self, value: bool) -> Self {
        self.local_flag = Some(value);
        self
    }

    /// Whether the caller is actively searching or narrowing by category.
    ///
    /// Such reads skip the background sync trigger.
    #[must_use]
    pub fn is_search(&self) -> bool {
        let non_blank = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.trim().is_empty());
        non_blank(&self.search) || non_blank(&self.category)
    }
}

/// Position after the last item of a full-sync page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCursor {
    pub id: String,
    pub created_at: i64,
}

impl From<&CacheItem> for PageCursor {
    fn from(item: &CacheItem) -> Self {
        Self {
            id: item.id.clone(),
            created_at: item.created_at,
        }
    }
}
