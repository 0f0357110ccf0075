//! REST remote source.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;

use super::normalize::normalize_records;
use super::RemoteSource;
use crate::error::{Error, Result};
use crate::models::{CacheItem, Collection, PageCursor};
use crate::util::{compact_text, is_http_url, normalize_text_option};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Remote source speaking the collection REST API.
///
/// `GET {base}/{collection}` returns a JSON array of records (or an object
/// with an `items` array); `GET {base}/{collection}/count` returns
/// `{ "count": n }`.
#[derive(Clone)]
pub struct HttpRemoteSource {
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpRemoteSource {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpRemoteSource")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RecordsResponse {
    Bare(Vec<Value>),
    Wrapped { items: Vec<Value> },
}

impl RecordsResponse {
    fn into_records(self) -> Vec<Value> {
        match self {
            Self::Bare(records) | Self::Wrapped { items: records } => records,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: usize,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

impl HttpRemoteSource {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn collection_url(&self, collection: Collection) -> String {
        format!("{}/{}", self.base_url, collection.as_str())
    }

    async fn send(&self, url: &str, query: &[(&str, String)]) -> Result<reqwest::Response> {
        tracing::debug!("GET {url} {query:?}");
        Ok(self
            .client
            .get(url)
            .query(query)
            .header("Accept", "application/json")
            .send()
            .await?)
    }

    async fn get_records(
        &self,
        collection: Collection,
        query: &[(&str, String)],
    ) -> Result<Vec<CacheItem>> {
        let response = self.send(&self.collection_url(collection), query).await?;
        let records: RecordsResponse = read_json(response).await?;
        Ok(normalize_records(collection, &records.into_records()))
    }
}

#[async_trait]
impl RemoteSource for HttpRemoteSource {
    async fn query_page(
        &self,
        collection: Collection,
        limit: usize,
        cursor: Option<&PageCursor>,
    ) -> Result<Vec<CacheItem>> {
        self.get_records(collection, &page_query(limit, cursor)).await
    }

    async fn query_all(&self, collection: Collection) -> Result<Vec<CacheItem>> {
        self.get_records(collection, &[]).await
    }

    async fn query_since(
        &self,
        collection: Collection,
        updated_after: i64,
    ) -> Result<Vec<CacheItem>> {
        let query = [
            ("order_by", "updated_at".to_string()),
            ("updated_after", updated_after.to_string()),
        ];
        self.get_records(collection, &query).await
    }

    async fn count(&self, collection: Collection) -> Result<Option<usize>> {
        let url = format!("{}/count", self.collection_url(collection));
        let response = self.send(&url, &[]).await?;
        // Servers without a count endpoint still page fine
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let payload: CountResponse = read_json(response).await?;
        Ok(Some(payload.count))
    }
}

async fn read_json<T>(response: reqwest::Response) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(status_error(status, &body));
    }
    Ok(response.json::<T>().await?)
}

fn page_query(limit: usize, cursor: Option<&PageCursor>) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("order_by", "created_at".to_string()),
        ("limit", limit.to_string()),
    ];
    if let Some(cursor) = cursor {
        query.push(("after_created_at", cursor.created_at.to_string()));
        query.push(("after_id", cursor.id.clone()));
    }
    query
}

fn status_error(status: StatusCode, body: &str) -> Error {
    let message = parse_api_error(status, body);
    match status {
        StatusCode::PRECONDITION_FAILED | StatusCode::NOT_IMPLEMENTED => {
            Error::QueryUnsupported(message)
        }
        _ => Error::Remote(message),
    }
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", compact_text(&message), status.as_u16());
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{trimmed} ({})", status.as_u16())
    }
}

fn normalize_base_url(raw: String) -> Result<String> {
    let base_url = normalize_text_option(Some(raw))
        .ok_or_else(|| Error::Config("remote URL must not be empty".to_string()))?;
    if is_http_url(&base_url) {
        Ok(base_url.trim_end_matches('/').to_string())
    } else {
        Err(Error::Config(
            "remote URL must include http:// or https://".to_string(),
        ))
    }
}
