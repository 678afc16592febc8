use crate::error::RagError;
use crate::models::{Chunk, CollectionInfo, IndexedPoint, RetrievedCandidate};
use crate::traits::VectorIndex;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, info};
use url::Url;

pub struct QdrantStore {
    endpoint: Url,
    api_key: Option<String>,
    client: Client,
}

impl QdrantStore {
    pub fn new(endpoint: &str, api_key: Option<String>) -> Result<Self, RagError> {
        let mut endpoint = Url::parse(endpoint)?;
        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }

        Ok(Self {
            endpoint,
            api_key,
            client: Client::new(),
        })
    }

    fn collection_url(&self, name: &str, suffix: &str) -> Result<Url, RagError> {
        Ok(self.endpoint.join(&format!("collections/{name}{suffix}"))?)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("api-key", key),
            None => request,
        }
    }
}

async fn backend_error(response: Response) -> RagError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    RagError::BackendResponse {
        backend: "qdrant".to_string(),
        details: format!("{status}: {body}"),
    }
}

#[async_trait]
impl VectorIndex for QdrantStore {
    async fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>, RagError> {
        let url = self.collection_url(name, "")?;
        let response = self.authorized(self.client.get(url)).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(backend_error(response).await);
        }

        let parsed: Value = response.json().await?;
        parse_collection_info(&parsed).map(Some)
    }

    async fn create_collection(&self, name: &str, dimension: usize) -> Result<bool, RagError> {
        let url = self.collection_url(name, "")?;
        let response = self
            .authorized(self.client.put(url))
            .json(&json!({
                "vectors": { "size": dimension, "distance": "Cosine" }
            }))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            info!(collection = name, dimension, "created qdrant collection");
            return Ok(true);
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::CONFLICT || body.contains("already exists") {
            debug!(collection = name, "collection created concurrently");
            return Ok(false);
        }

        Err(RagError::BackendResponse {
            backend: "qdrant".to_string(),
            details: format!("{status}: {body}"),
        })
    }

    async fn upsert(&self, collection: &str, points: &[IndexedPoint]) -> Result<(), RagError> {
        if points.is_empty() {
            return Ok(());
        }

        let points = points
            .iter()
            .map(|point| {
                Ok(json!({
                    "id": point.point_id,
                    "vector": point.vector,
                    "payload": serde_json::to_value(&point.payload)?,
                }))
            })
            .collect::<Result<Vec<_>, RagError>>()?;

        let url = self.collection_url(collection, "/points?wait=true")?;
        let response = self
            .authorized(self.client.put(url))
            .json(&json!({ "points": points }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response).await);
        }

        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query_vector: &[f32],
        limit: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<RetrievedCandidate>, RagError> {
        let mut body = json!({
            "vector": query_vector,
            "limit": limit,
            "with_payload": true,
        });
        if let Some(threshold) = score_threshold {
            body["score_threshold"] = json!(threshold);
        }

        let url = self.collection_url(collection, "/points/search")?;
        let response = self
            .authorized(self.client.post(url))
            .json(&body)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(backend_error(response).await);
        }

        let parsed: Value = response.json().await?;
        Ok(parse_search_hits(&parsed))
    }
}

fn parse_collection_info(parsed: &Value) -> Result<CollectionInfo, RagError> {
    let dimension = parsed
        .pointer("/result/config/params/vectors/size")
        .and_then(Value::as_u64)
        .ok_or_else(|| RagError::BackendResponse {
            backend: "qdrant".to_string(),
            details: "collection info has no single unnamed vector size".to_string(),
        })?;
    let points_count = parsed
        .pointer("/result/points_count")
        .and_then(Value::as_u64)
        .unwrap_or(0);

    Ok(CollectionInfo {
        dimension: dimension as usize,
        points_count,
    })
}

fn parse_search_hits(parsed: &Value) -> Vec<RetrievedCandidate> {
    let hits = parsed
        .pointer("/result")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    hits.into_iter()
        .map(|hit| {
            let text_field = |field: &str| {
                hit.pointer(&format!("/payload/{field}"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            };
            let page_field = |field: &str| {
                hit.pointer(&format!("/payload/{field}"))
                    .and_then(Value::as_u64)
                    .and_then(|page| u32::try_from(page).ok())
                    .unwrap_or(0)
            };
            let point_id = match hit.pointer("/id") {
                Some(Value::String(id)) => id.clone(),
                Some(Value::Number(id)) => id.to_string(),
                _ => String::new(),
            };
            let chunk_id = match text_field("chunk_id") {
                id if id.is_empty() => point_id,
                id => id,
            };

            RetrievedCandidate {
                chunk: Chunk {
                    doc_id: text_field("doc_id"),
                    filename: text_field("filename"),
                    page_start: page_field("page_start"),
                    page_end: page_field("page_end"),
                    chunk_id,
                    text: text_field("text"),
                },
                similarity: hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0) as f32,
            }
        })
        .collect()
}
