//! Chroma vector-store backend.
//!
//! Documents live in a Chroma collection keyed by a sanitized path id, with
//! the real path and an `updated_at` stamp in the document metadata. On top
//! of the uniform file contract this backend offers [`ChromaBackend::query`]
//! for semantic search; the matching itself is Chroma's business.
//!
//! Contents are text: bytes go through a lossy UTF-8 conversion on write,
//! matching what a vector store can actually index.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

use crate::backend::Backend;
use crate::error::{BackendError, BackendResult};
use crate::types::Entry;

pub struct ChromaBackend {
    client: Client,
    endpoint: String,
    collection_id: String,
}

#[derive(Serialize)]
struct CreateCollectionRequest {
    name: String,
    get_or_create: bool,
}

#[derive(Deserialize)]
struct CollectionResponse {
    id: String,
}

#[derive(Serialize)]
struct UpsertRequest {
    ids: Vec<String>,
    documents: Vec<String>,
    metadatas: Vec<HashMap<String, Value>>,
}

#[derive(Serialize)]
struct GetRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    ids: Option<Vec<String>>,
    include: Vec<String>,
}

#[derive(Deserialize)]
struct GetResponse {
    ids: Vec<String>,
    #[serde(default)]
    documents: Option<Vec<Option<String>>>,
    #[serde(default)]
    metadatas: Option<Vec<Option<HashMap<String, Value>>>>,
}

#[derive(Serialize)]
struct QueryRequest {
    query_texts: Vec<String>,
    n_results: usize,
    include: Vec<String>,
}

#[derive(Deserialize)]
struct QueryResponse {
    ids: Vec<Vec<String>>,
    #[serde(default)]
    documents: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    metadatas: Option<Vec<Vec<Option<HashMap<String, Value>>>>>,
    #[serde(default)]
    distances: Option<Vec<Vec<f32>>>,
}

/// One semantic-search hit.
#[derive(Debug, Clone)]
pub struct QueryHit {
    /// Path of the matching document.
    pub path: String,
    /// Document contents, when the store returned them.
    pub document: Option<String>,
    /// Similarity score (1.0 - distance), higher is closer.
    pub score: f32,
}

impl ChromaBackend {
    /// Connect to a Chroma server, creating the collection if needed.
    pub async fn new(endpoint: &str, collection: &str) -> BackendResult<Self> {
        let client = Client::new();
        let endpoint = endpoint.trim_end_matches('/').to_string();

        let response = client
            .post(format!("{endpoint}/api/v1/collections"))
            .json(&CreateCollectionRequest {
                name: collection.to_string(),
                get_or_create: true,
            })
            .send()
            .await
            .map_err(|e| BackendError::Other(format!("failed to connect to chroma: {e}")))?;
        let response = check_status(response, "create collection").await?;

        let created: CollectionResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Other(format!("bad chroma response: {e}")))?;

        Ok(ChromaBackend {
            client,
            endpoint,
            collection_id: created.id,
        })
    }

    fn op_url(&self, op: &str) -> String {
        format!(
            "{}/api/v1/collections/{}/{op}",
            self.endpoint, self.collection_id
        )
    }

    /// Document ids cannot contain slashes; flatten the path.
    fn path_to_id(path: &str) -> String {
        path.replace('/', "_").trim_start_matches('_').to_string()
    }

    fn normalize(path: &str) -> String {
        path.trim_matches('/').to_string()
    }

    async fn get_documents(&self, ids: Option<Vec<String>>, include: Vec<String>) -> BackendResult<GetResponse> {
        let response = self
            .client
            .post(self.op_url("get"))
            .json(&GetRequest { ids, include })
            .send()
            .await
            .map_err(|e| BackendError::Other(format!("chroma request failed: {e}")))?;
        let response = check_status(response, "get").await?;
        response
            .json()
            .await
            .map_err(|e| BackendError::Other(format!("bad chroma response: {e}")))
    }

    /// Ids of every document whose metadata path sits under `prefix`
    /// (a directory path with a trailing slash).
    async fn ids_under(&self, prefix: &str) -> BackendResult<Vec<String>> {
        let result = self
            .get_documents(None, vec!["metadatas".to_string()])
            .await?;
        let mut ids = Vec::new();
        for (i, id) in result.ids.iter().enumerate() {
            let doc_path = result
                .metadatas
                .as_ref()
                .and_then(|m| m.get(i))
                .and_then(|m| m.as_ref())
                .and_then(|m| m.get("path"))
                .and_then(|v| v.as_str());
            if doc_path.is_some_and(|p| p.starts_with(prefix)) {
                ids.push(id.clone());
            }
        }
        Ok(ids)
    }

    async fn upsert(&self, path: &str, content: &str) -> BackendResult<()> {
        let normalized = Self::normalize(path);
        let mut meta = HashMap::new();
        meta.insert("path".to_string(), Value::String(normalized.clone()));
        meta.insert(
            "updated_at".to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );

        let response = self
            .client
            .post(self.op_url("upsert"))
            .json(&UpsertRequest {
                ids: vec![Self::path_to_id(&normalized)],
                documents: vec![content.to_string()],
                metadatas: vec![meta],
            })
            .send()
            .await
            .map_err(|e| BackendError::Other(format!("chroma request failed: {e}")))?;
        check_status(response, "upsert").await?;
        Ok(())
    }

    /// Semantic search over the collection.
    #[instrument(skip(self), fields(backend = "chroma"))]
    pub async fn query(&self, text: &str, limit: usize) -> BackendResult<Vec<QueryHit>> {
        let response = self
            .client
            .post(self.op_url("query"))
            .json(&QueryRequest {
                query_texts: vec![text.to_string()],
                n_results: limit,
                include: vec![
                    "documents".to_string(),
                    "metadatas".to_string(),
                    "distances".to_string(),
                ],
            })
            .send()
            .await
            .map_err(|e| BackendError::Other(format!("chroma query failed: {e}")))?;
        let response = check_status(response, "query").await?;

        let result: QueryResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Other(format!("bad chroma response: {e}")))?;

        let ids = result.ids.into_iter().next().unwrap_or_default();
        let documents = result
            .documents
            .and_then(|d| d.into_iter().next())
            .unwrap_or_default();
        let metadatas = result
            .metadatas
            .and_then(|m| m.into_iter().next())
            .unwrap_or_default();
        let distances = result
            .distances
            .and_then(|d| d.into_iter().next())
            .unwrap_or_default();

        let mut hits = Vec::with_capacity(ids.len());
        for (i, id) in ids.into_iter().enumerate() {
            let path = metadatas
                .get(i)
                .and_then(|m| m.as_ref())
                .and_then(|m| m.get("path"))
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .unwrap_or(id);
            let distance = distances.get(i).copied().unwrap_or(0.0);
            hits.push(QueryHit {
                path,
                document: documents.get(i).cloned().flatten(),
                score: 1.0 - distance,
            });
        }
        Ok(hits)
    }
}

async fn check_status(
    response: reqwest::Response,
    op: &str,
) -> BackendResult<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(BackendError::Other(format!(
        "chroma {op} failed: {status} - {body}"
    )))
}

fn modified_from(meta: &HashMap<String, Value>) -> Option<DateTime<Utc>> {
    meta.get("updated_at")
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

#[async_trait]
impl Backend for ChromaBackend {
    #[instrument(skip(self), fields(backend = "chroma", path = %path))]
    async fn read(&self, path: &str) -> BackendResult<Vec<u8>> {
        let normalized = Self::normalize(path);
        if normalized.is_empty() {
            return Err(BackendError::IsADirectory(path.to_string()));
        }
        let id = Self::path_to_id(&normalized);
        let result = self
            .get_documents(Some(vec![id]), vec!["documents".to_string()])
            .await?;
        if result.ids.is_empty() {
            return Err(BackendError::NotFound(path.to_string()));
        }
        let doc = result
            .documents
            .and_then(|d| d.into_iter().next())
            .flatten()
            .ok_or_else(|| BackendError::NotFound(path.to_string()))?;
        Ok(doc.into_bytes())
    }

    #[instrument(skip(self, data), fields(backend = "chroma", path = %path, size = data.len()))]
    async fn write(&self, path: &str, data: &[u8]) -> BackendResult<()> {
        if Self::normalize(path).is_empty() {
            return Err(BackendError::IsADirectory(path.to_string()));
        }
        let text = String::from_utf8_lossy(data);
        self.upsert(path, &text).await
    }

    #[instrument(skip(self, data), fields(backend = "chroma", path = %path, size = data.len()))]
    async fn append(&self, path: &str, data: &[u8]) -> BackendResult<()> {
        let existing = match self.read(path).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(BackendError::NotFound(_)) => String::new(),
            Err(err) => return Err(err),
        };
        let combined = format!("{existing}{}", String::from_utf8_lossy(data));
        self.upsert(path, &combined).await
    }

    #[instrument(skip(self), fields(backend = "chroma", path = %path))]
    async fn delete(&self, path: &str) -> BackendResult<()> {
        let normalized = Self::normalize(path);
        let mut ids = match self.read(path).await {
            Ok(_) => vec![Self::path_to_id(&normalized)],
            Err(BackendError::NotFound(_) | BackendError::IsADirectory(_)) => Vec::new(),
            Err(err) => return Err(err),
        };
        if ids.is_empty() {
            // Implicit directory: drop every document below it.
            ids = self.ids_under(&format!("{normalized}/")).await?;
            if ids.is_empty() {
                return Err(BackendError::NotFound(path.to_string()));
            }
        }
        let response = self
            .client
            .post(self.op_url("delete"))
            .json(&serde_json::json!({ "ids": ids }))
            .send()
            .await
            .map_err(|e| BackendError::Other(format!("chroma request failed: {e}")))?;
        check_status(response, "delete").await?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "chroma", path = %path))]
    async fn list(&self, path: &str) -> BackendResult<Vec<Entry>> {
        let normalized = Self::normalize(path);
        let prefix = if normalized.is_empty() {
            String::new()
        } else {
            format!("{normalized}/")
        };

        let result = self
            .get_documents(None, vec!["metadatas".to_string()])
            .await?;

        let mut entries = Vec::new();
        let mut seen_dirs = HashSet::new();
        for i in 0..result.ids.len() {
            let Some(meta) = result
                .metadatas
                .as_ref()
                .and_then(|m| m.get(i))
                .and_then(|m| m.as_ref())
            else {
                continue;
            };
            let Some(doc_path) = meta.get("path").and_then(|v| v.as_str()) else {
                continue;
            };
            let relative = match doc_path.strip_prefix(&prefix) {
                Some(rest) if !rest.is_empty() => rest,
                _ => continue,
            };

            match relative.find('/') {
                Some(slash) => {
                    let dir_name = &relative[..slash];
                    if seen_dirs.insert(dir_name.to_string()) {
                        entries.push(Entry::dir(
                            format!("{prefix}{dir_name}"),
                            dir_name.to_string(),
                            None,
                        ));
                    }
                }
                None => {
                    // Size is not tracked by the store.
                    entries.push(Entry {
                        path: doc_path.to_string(),
                        name: relative.to_string(),
                        is_dir: false,
                        size: None,
                        modified: modified_from(meta),
                    });
                }
            }
        }

        if !normalized.is_empty() && entries.is_empty() {
            // A document at the path itself is a file, not a directory.
            let result = self
                .get_documents(
                    Some(vec![Self::path_to_id(&normalized)]),
                    vec!["metadatas".to_string()],
                )
                .await?;
            if !result.ids.is_empty() {
                return Err(BackendError::NotADirectory(path.to_string()));
            }
            return Err(BackendError::NotFound(path.to_string()));
        }

        entries.sort_by(|a, b| match (a.is_dir, b.is_dir) {
            (true, false) => std::cmp::Ordering::Less,
            (false, true) => std::cmp::Ordering::Greater,
            _ => a.name.cmp(&b.name),
        });
        Ok(entries)
    }

    #[instrument(skip(self), fields(backend = "chroma", path = %path))]
    async fn exists(&self, path: &str) -> BackendResult<bool> {
        let normalized = Self::normalize(path);
        if normalized.is_empty() {
            return Ok(true);
        }
        match self.read(path).await {
            Ok(_) => Ok(true),
            Err(BackendError::NotFound(_)) => {
                // Implicit directory: present when any document sits below it.
                let ids = self
                    .ids_under(&format!("{normalized}/"))
                    .await
                    .unwrap_or_default();
                Ok(!ids.is_empty())
            }
            Err(err) => Err(err),
        }
    }

    #[instrument(skip(self), fields(backend = "chroma", path = %path))]
    async fn stat(&self, path: &str) -> BackendResult<Entry> {
        let normalized = Self::normalize(path);
        if normalized.is_empty() {
            return Ok(Entry::dir("", "", None));
        }
        let id = Self::path_to_id(&normalized);
        let result = self
            .get_documents(
                Some(vec![id]),
                vec!["documents".to_string(), "metadatas".to_string()],
            )
            .await?;
        if result.ids.is_empty() {
            if !self.ids_under(&format!("{normalized}/")).await?.is_empty() {
                let name = normalized
                    .rsplit('/')
                    .next()
                    .unwrap_or(&normalized)
                    .to_string();
                return Ok(Entry::dir(normalized, name, None));
            }
            return Err(BackendError::NotFound(path.to_string()));
        }

        let size = result
            .documents
            .as_ref()
            .and_then(|d| d.first())
            .and_then(|d| d.as_ref())
            .map(|d| d.len() as u64);
        let modified = result
            .metadatas
            .as_ref()
            .and_then(|m| m.first())
            .and_then(|m| m.as_ref())
            .and_then(modified_from);
        let name = normalized
            .rsplit('/')
            .next()
            .unwrap_or(&normalized)
            .to_string();

        Ok(Entry {
            path: normalized,
            name,
            is_dir: false,
            size,
            modified,
        })
    }
}
