use crate::error::RagError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const DEFAULT: usize = 128;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;

pub const OPENAI_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const MINILM_MODEL: &str = "all-minilm-l6-v2";
pub const HASHED_TRIGRAM_MODEL: &str = "hashed-trigram";

#[async_trait]
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;
    fn dimensions(&self) -> usize;
    /// Returns one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError>;
}

#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        normalize_in_place(&mut vector);
        vector
    }
}

#[async_trait]
impl Embedder for CharacterNgramEmbedder {
    fn name(&self) -> &str {
        HASHED_TRIGRAM_MODEL
    }

    fn dimensions(&self) -> usize {
        self.dimensions.max(1)
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}

fn normalize_in_place(vector: &mut [f32]) {
    let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for value in vector.iter_mut() {
            *value /= magnitude;
        }
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiEmbeddingConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

impl OpenAiEmbeddingConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: api_key.into(),
            model: OPENAI_EMBEDDING_MODEL.to_string(),
        }
    }
}

/// Dimension reported by known OpenAI embedding models.
pub fn openai_model_dimensions(model: &str) -> Option<usize> {
    match model {
        "text-embedding-3-small" | "text-embedding-ada-002" => Some(1536),
        "text-embedding-3-large" => Some(3072),
        _ => None,
    }
}

#[derive(Serialize)]
struct OpenAiEmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<OpenAiEmbeddingItem>,
}

#[derive(Deserialize)]
struct OpenAiEmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

pub struct OpenAiEmbedder {
    client: Client,
    config: OpenAiEmbeddingConfig,
    dimensions: usize,
}

impl OpenAiEmbedder {
    pub fn new(config: OpenAiEmbeddingConfig) -> Result<Self, RagError> {
        let dimensions =
            openai_model_dimensions(&config.model).ok_or_else(|| RagError::ModelLoad {
                model: config.model.clone(),
                details: "unknown embedding dimension for remote model".to_string(),
            })?;

        Ok(Self {
            client: Client::new(),
            config,
            dimensions,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn name(&self) -> &str {
        &self.config.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/embeddings", self.config.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&OpenAiEmbeddingRequest {
                model: &self.config.model,
                input: texts,
            })
            .send()
            .await
            .map_err(|error| RagError::upstream("embedding service", error))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::upstream(
                "embedding service",
                format!("{status}: {body}"),
            ));
        }

        let payload: OpenAiEmbeddingResponse = response
            .json()
            .await
            .map_err(|error| RagError::upstream("embedding service", error))?;

        let vectors = order_embeddings(payload, texts.len(), self.dimensions)?;
        debug!(count = vectors.len(), model = %self.config.model, "remote embeddings received");
        Ok(vectors)
    }
}

fn order_embeddings(
    payload: OpenAiEmbeddingResponse,
    expected: usize,
    dimensions: usize,
) -> Result<Vec<Vec<f32>>, RagError> {
    let mut items = payload.data;
    if items.len() != expected {
        return Err(RagError::upstream(
            "embedding service",
            format!("returned {} vectors for {} inputs", items.len(), expected),
        ));
    }

    items.sort_by_key(|item| item.index);
    items
        .into_iter()
        .map(|item| {
            if item.embedding.len() == dimensions {
                Ok(item.embedding)
            } else {
                Err(RagError::upstream(
                    "embedding service",
                    format!(
                        "vector has {} dimensions, expected {}",
                        item.embedding.len(),
                        dimensions
                    ),
                ))
            }
        })
        .collect()
}

#[cfg(feature = "local-models")]
pub struct MiniLmEmbedder {
    model: fastembed::TextEmbedding,
}

#[cfg(feature = "local-models")]
impl MiniLmEmbedder {
    pub const DIMENSIONS: usize = 384;

    pub fn load() -> Result<Self, RagError> {
        let options = fastembed::InitOptions::new(fastembed::EmbeddingModel::AllMiniLML6V2)
            .with_show_download_progress(false);
        let model = fastembed::TextEmbedding::try_new(options).map_err(|error| {
            RagError::ModelLoad {
                model: MINILM_MODEL.to_string(),
                details: error.to_string(),
            }
        })?;
        Ok(Self { model })
    }

    fn embed_blocking(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let mut vectors = self
            .model
            .embed(texts.to_vec(), None)
            .map_err(|error| RagError::Request(format!("local embedding failed: {error}")))?;
        for vector in &mut vectors {
            normalize_in_place(vector);
        }
        Ok(vectors)
    }
}

/// Embedding models that run in-process.
pub enum LocalEmbedder {
    HashedTrigram(CharacterNgramEmbedder),
    #[cfg(feature = "local-models")]
    MiniLm(MiniLmEmbedder),
}

impl LocalEmbedder {
    pub fn load(model: &str) -> Result<Self, RagError> {
        match model {
            HASHED_TRIGRAM_MODEL => Ok(Self::HashedTrigram(CharacterNgramEmbedder::default())),
            #[cfg(feature = "local-models")]
            MINILM_MODEL => Ok(Self::MiniLm(MiniLmEmbedder::load()?)),
            #[cfg(not(feature = "local-models"))]
            MINILM_MODEL => Err(RagError::ModelLoad {
                model: model.to_string(),
                details: "built without the `local-models` feature".to_string(),
            }),
            other => Err(RagError::ModelLoad {
                model: other.to_string(),
                details: "unknown local embedding model".to_string(),
            }),
        }
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    fn name(&self) -> &str {
        match self {
            Self::HashedTrigram(inner) => inner.name(),
            #[cfg(feature = "local-models")]
            Self::MiniLm(_) => MINILM_MODEL,
        }
    }

    fn dimensions(&self) -> usize {
        match self {
            Self::HashedTrigram(inner) => inner.dimensions(),
            #[cfg(feature = "local-models")]
            Self::MiniLm(_) => MiniLmEmbedder::DIMENSIONS,
        }
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        match self {
            Self::HashedTrigram(inner) => inner.embed(texts).await,
            #[cfg(feature = "local-models")]
            Self::MiniLm(inner) => {
                if texts.is_empty() {
                    return Ok(Vec::new());
                }
                tokio::task::block_in_place(|| inner.embed_blocking(texts))
            }
        }
    }
}

/// Which embedding backend to build, resolved once at startup.
#[derive(Debug, Clone)]
pub struct EmbeddingSettings {
    /// Presence of remote credentials selects the remote backend.
    pub remote: Option<OpenAiEmbeddingConfig>,
    pub local_model: String,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            remote: None,
            local_model: HASHED_TRIGRAM_MODEL.to_string(),
        }
    }
}

pub enum EmbeddingBackend {
    Remote(OpenAiEmbedder),
    Local(LocalEmbedder),
}

impl EmbeddingBackend {
    pub fn from_settings(settings: EmbeddingSettings) -> Result<Self, RagError> {
        let backend = match settings.remote {
            Some(config) => Self::Remote(OpenAiEmbedder::new(config)?),
            None => Self::Local(LocalEmbedder::load(&settings.local_model)?),
        };
        info!(
            backend = backend.name(),
            dimensions = backend.dimensions(),
            "embedding backend selected"
        );
        Ok(backend)
    }
}

#[async_trait]
impl Embedder for EmbeddingBackend {
    fn name(&self) -> &str {
        match self {
            Self::Remote(inner) => inner.name(),
            Self::Local(inner) => inner.name(),
        }
    }

    fn dimensions(&self) -> usize {
        match self {
            Self::Remote(inner) => inner.dimensions(),
            Self::Local(inner) => inner.dimensions(),
        }
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        match self {
            Self::Remote(inner) => inner.embed(texts).await,
            Self::Local(inner) => inner.embed(texts).await,
        }
    }
}
