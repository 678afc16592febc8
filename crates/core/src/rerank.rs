//! Second-stage scoring of coarse search candidates.
//!
//! The vector search casts a wide net; a cross-encoder then scores each
//! (query, candidate) pair jointly and only the best few survive.

use crate::error::RagError;
use crate::models::{RankedResult, RetrievedCandidate};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_RERANK_KEEP: usize = 4;

/// Token-overlap scorer that needs no model. Scores are the cosine between the
/// sets of lowercase alphanumeric terms of the query and the candidate.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicalScorer;

impl LexicalScorer {
    pub fn score(&self, query: &str, text: &str) -> f32 {
        let query_terms = terms(query);
        let text_terms = terms(text);
        if query_terms.is_empty() || text_terms.is_empty() {
            return 0.0;
        }

        let shared = query_terms.intersection(&text_terms).count() as f32;
        shared / ((query_terms.len() * text_terms.len()) as f32).sqrt()
    }
}

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|term| !term.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[derive(Debug, Clone)]
pub struct RerankerEndpointConfig {
    pub base_url: String,
    pub model: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: &'a [String],
    top_n: usize,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankScore>,
}

#[derive(Deserialize)]
struct RerankScore {
    index: usize,
    relevance_score: f32,
}

/// Cross-encoder served behind an OpenAI-compatible `/v1/rerank` endpoint.
pub struct HttpCrossEncoder {
    client: Client,
    config: RerankerEndpointConfig,
}

impl HttpCrossEncoder {
    pub fn new(config: RerankerEndpointConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    async fn score_all(&self, query: &str, documents: &[String]) -> Result<Vec<f32>, RagError> {
        let url = format!("{}/v1/rerank", self.config.base_url.trim_end_matches('/'));
        let model = self.config.model.as_deref().unwrap_or("default");

        let response = self
            .client
            .post(&url)
            .timeout(Duration::from_secs(self.config.timeout_secs.min(30)))
            .json(&RerankRequest {
                model,
                query,
                documents,
                top_n: documents.len(),
            })
            .send()
            .await
            .map_err(|error| RagError::upstream("reranker", error))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::upstream("reranker", format!("{status}: {body}")));
        }

        let body: RerankResponse = response
            .json()
            .await
            .map_err(|error| RagError::upstream("reranker", error))?;

        Ok(scores_by_index(body, documents.len()))
    }
}

/// Maps endpoint results back onto input positions. Documents the endpoint
/// left out sort last.
fn scores_by_index(body: RerankResponse, count: usize) -> Vec<f32> {
    let mut scores = vec![f32::NEG_INFINITY; count];
    for result in body.results {
        if let Some(slot) = scores.get_mut(result.index) {
            *slot = sigmoid(result.relevance_score);
        }
    }
    scores
}

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(feature = "local-models")]
pub struct BgeCrossEncoder {
    model: fastembed::TextRerank,
}

#[cfg(feature = "local-models")]
impl BgeCrossEncoder {
    pub fn load() -> Result<Self, RagError> {
        let options = fastembed::RerankInitOptions::new(fastembed::RerankerModel::BGERerankerBase)
            .with_show_download_progress(false);
        let model = fastembed::TextRerank::try_new(options).map_err(|error| {
            RagError::ModelLoad {
                model: "bge-reranker-base".to_string(),
                details: error.to_string(),
            }
        })?;
        Ok(Self { model })
    }

    fn score_all(&self, query: &str, documents: &[String]) -> Result<Vec<f32>, RagError> {
        let documents = documents.iter().map(String::as_str).collect::<Vec<_>>();
        let count = documents.len();
        let results = self
            .model
            .rerank(query, documents, false, None)
            .map_err(|error| RagError::Request(format!("local rerank failed: {error}")))?;

        let mut scores = vec![f32::NEG_INFINITY; count];
        for result in results {
            if let Some(slot) = scores.get_mut(result.index) {
                *slot = result.score;
            }
        }
        Ok(scores)
    }
}

/// The pair scorer, chosen once at startup.
pub enum CrossEncoder {
    Lexical(LexicalScorer),
    Remote(HttpCrossEncoder),
    #[cfg(feature = "local-models")]
    Local(BgeCrossEncoder),
}

impl Default for CrossEncoder {
    fn default() -> Self {
        Self::Lexical(LexicalScorer)
    }
}

impl CrossEncoder {
    /// One score per document, aligned with the input order.
    pub async fn score(&self, query: &str, documents: &[String]) -> Result<Vec<f32>, RagError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        match self {
            Self::Lexical(scorer) => Ok(documents
                .iter()
                .map(|document| scorer.score(query, document))
                .collect()),
            Self::Remote(encoder) => encoder.score_all(query, documents).await,
            #[cfg(feature = "local-models")]
            Self::Local(encoder) => {
                tokio::task::block_in_place(|| encoder.score_all(query, documents))
            }
        }
    }
}

#[derive(Default)]
pub struct Reranker {
    encoder: CrossEncoder,
}

impl Reranker {
    pub fn new(encoder: CrossEncoder) -> Self {
        Self { encoder }
    }

    /// Scores every candidate, sorts by score (stable, so similarity order
    /// breaks ties) and keeps the best `keep`.
    pub async fn rerank(
        &self,
        query: &str,
        candidates: Vec<RetrievedCandidate>,
        keep: usize,
    ) -> Result<Vec<RankedResult>, RagError> {
        let documents = candidates
            .iter()
            .map(|candidate| candidate.chunk.text.clone())
            .collect::<Vec<_>>();
        let scores = self.encoder.score(query, &documents).await?;

        let mut ranked = candidates
            .into_iter()
            .zip(scores)
            .map(|(candidate, rerank_score)| RankedResult {
                chunk: candidate.chunk,
                similarity: candidate.similarity,
                rerank_score,
            })
            .collect::<Vec<_>>();

        ranked.sort_by(|left, right| right.rerank_score.total_cmp(&left.rerank_score));
        ranked.truncate(keep);
        debug!(kept = ranked.len(), scored = documents.len(), "reranked candidates");
        Ok(ranked)
    }
}
