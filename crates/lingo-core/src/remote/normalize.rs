//! Normalization of raw remote records into [`CacheItem`]s.
//!
//! Remote documents were entered by hand over several years, so the same field
//! can arrive as a native list, a JSON-encoded string, or not at all, and
//! timestamps come in three shapes. Everything is folded into the strict model
//! here; records that lack required fields are dropped.

use chrono::DateTime;
use serde_json::{Map, Value};

use crate::models::{CacheItem, Collection, ItemBody, Resource, Vocabulary};
use crate::util::normalize_text_option;

/// Normalize a batch, silently dropping malformed records.
pub fn normalize_records(collection: Collection, records: &[Value]) -> Vec<CacheItem> {
    let items: Vec<CacheItem> = records
        .iter()
        .filter_map(|record| normalize_record(collection, record))
        .collect();

    let dropped = records.len() - items.len();
    if dropped > 0 {
        tracing::debug!("Dropped {dropped} malformed {collection} records");
    }
    items
}

/// Normalize one record, `None` if it is malformed.
pub fn normalize_record(collection: Collection, record: &Value) -> Option<CacheItem> {
    let object = record.as_object()?;
    let id = text(object, &["id", "_id", "docId"])?;

    let created_at = field(object, &["createdAt", "created_at"]).and_then(parse_timestamp);
    let updated_at = field(object, &["updatedAt", "updated_at"]).and_then(parse_timestamp);
    let (created_at, updated_at) = match (created_at, updated_at) {
        (Some(created), Some(updated)) => (created, updated),
        (Some(only), None) | (None, Some(only)) => (only, only),
        (None, None) => return None,
    };

    let body = match collection {
        Collection::Vocabularies => ItemBody::Vocabulary(vocabulary_body(object)?),
        Collection::Resources => ItemBody::Resource(resource_body(object)?),
    };

    Some(CacheItem::new(id, created_at, updated_at, body))
}

fn vocabulary_body(object: &Map<String, Value>) -> Option<Vocabulary> {
    Some(Vocabulary {
        word: text(object, &["word", "term"])?,
        translation: text(object, &["translation", "meaning", "definition"]),
        pronunciation: text(object, &["pronunciation", "phonetic"]),
        part_of_speech: text(object, &["partOfSpeech", "part_of_speech", "category"]),
        level: text(object, &["level", "difficulty"]),
        examples: parse_string_list(field(object, &["examples", "exampleSentences"])),
        synonyms: parse_string_list(field(object, &["synonyms"])),
    })
}

fn resource_body(object: &Map<String, Value>) -> Option<Resource> {
    Some(Resource {
        title: text(object, &["title", "name"])?,
        description: text(object, &["description", "summary"]),
        url: text(object, &["url", "link"]),
        category: text(object, &["category", "type"]),
        tags: parse_string_list(field(object, &["tags"])),
    })
}

/// First non-null value among `names`.
fn field<'a>(object: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .filter_map(|name| object.get(*name))
        .find(|value| !value.is_null())
}

/// Non-blank text value, numbers included.
fn text(object: &Map<String, Value>, names: &[&str]) -> Option<String> {
    match field(object, names)? {
        Value::String(value) => normalize_text_option(Some(value.clone())),
        Value::Number(value) => Some(value.to_string()),
        _ => None,
    }
}

/// Parse a timestamp into Unix milliseconds.
///
/// Accepts integer milliseconds, RFC 3339 strings, numeric strings, and
/// `{seconds, nanoseconds}` objects (with or without leading underscores).
#[allow(clippy::cast_possible_truncation)]
pub fn parse_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|ms| ms.round() as i64)),
        Value::String(raw) => {
            let raw = raw.trim();
            raw.parse::<i64>().ok().or_else(|| {
                DateTime::parse_from_rfc3339(raw)
                    .ok()
                    .map(|parsed| parsed.timestamp_millis())
            })
        }
        Value::Object(object) => {
            let seconds = field(object, &["seconds", "_seconds"])?.as_i64()?;
            let nanos = field(object, &["nanoseconds", "_nanoseconds"])
                .and_then(Value::as_i64)
                .unwrap_or(0);
            Some(seconds.saturating_mul(1000).saturating_add(nanos / 1_000_000))
        }
        _ => None,
    }
}

/// Parse a list that may be a JSON array, a JSON-encoded string, or absent.
pub fn parse_string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(values)) => values.iter().filter_map(list_entry).collect(),
        Some(Value::String(raw)) => {
            let raw = raw.trim();
            if raw.is_empty() {
                return Vec::new();
            }
            match serde_json::from_str::<Value>(raw) {
                Ok(Value::Array(values)) => values.iter().filter_map(list_entry).collect(),
                _ => vec![raw.to_string()],
            }
        }
        _ => Vec::new(),
    }
}

fn list_entry(value: &Value) -> Option<String> {
    match value {
        Value::String(entry) => normalize_text_option(Some(entry.clone())),
        Value::Number(entry) => Some(entry.to_string()),
        _ => None,
    }
}
